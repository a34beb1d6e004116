//! 编排器构建：统一的初始化逻辑（CLI 与 Web 共用）
//!
//! 工具集按处理器拆分后校验互不相交；提示词、检查点后端、模式等可逐项覆盖。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{AgentError, RecoveryEngine};
use crate::graph::classifier::Classifier;
use crate::graph::engine::Orchestrator;
use crate::graph::handler::{Handler, HandlerKind, HandlerMode, ToolOwnership};
use crate::graph::prompts::PromptSet;
use crate::graph::router::Router;
use crate::llm::{create_llm_from_config, LlmClient};
use crate::memory::{CheckpointStore, InMemoryCheckpointStore, SqliteCheckpointStore, ThreadLocks};
use crate::notify::{LogNotifier, NotificationDispatcher, Notifier, WebhookNotifier};
use crate::store::{import_csv, Database, PatientDirectory, SlotStore};
use crate::tools::{booking_tools, information_tools, ClinicContext, Roster, ToolRegistry};

/// 编排器构建器
pub struct OrchestratorBuilder {
    llm: Arc<dyn LlmClient>,
    clinic: Arc<ClinicContext>,
    prompts: PromptSet,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    mode: HandlerMode,
    max_steps: usize,
    tool_timeout_secs: u64,
    fast_match: bool,
    today: Option<String>,
}

impl OrchestratorBuilder {
    pub fn new(llm: Arc<dyn LlmClient>, clinic: Arc<ClinicContext>) -> Self {
        Self {
            llm,
            clinic,
            prompts: PromptSet::default(),
            checkpoints: None,
            mode: HandlerMode::default(),
            max_steps: 6,
            tool_timeout_secs: 30,
            fast_match: true,
            today: None,
        }
    }

    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_max_hops(mut self, max_hops: u32) -> Self {
        self.prompts = self.prompts.with_max_hops(max_hops);
        self
    }

    pub fn with_checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn with_mode(mut self, mode: HandlerMode) -> Self {
        self.mode = mode;
        self
    }

    /// 单次进入处理器最多调用几次 LLM
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_tool_timeout(mut self, secs: u64) -> Self {
        self.tool_timeout_secs = secs;
        self
    }

    pub fn with_fast_match(mut self, enable: bool) -> Self {
        self.fast_match = enable;
        self
    }

    /// 固定「今天」（DD-MM-YYYY），测试用
    pub fn with_today(mut self, today: impl Into<String>) -> Self {
        self.today = Some(today.into());
        self
    }

    pub fn build(self) -> Result<Orchestrator, AgentError> {
        let identity = self.clinic.identity;
        let info_tools = information_tools(&self.clinic);
        let booking = booking_tools(&self.clinic);
        let ownership = ToolOwnership::build([
            (HandlerKind::Information, &info_tools),
            (HandlerKind::Booking, &booking),
        ])?;

        let handler = |kind: HandlerKind, tools: ToolRegistry| {
            Handler::new(
                kind,
                self.llm.clone(),
                tools,
                self.tool_timeout_secs,
                self.prompts.handler_template(kind),
                identity,
            )
        };
        let information = handler(HandlerKind::Information, info_tools);
        let booking = handler(HandlerKind::Booking, booking);

        tracing::info!(
            max_hops = self.prompts.routing.max_hops,
            mode = ?self.mode,
            identity = ?identity,
            "orchestrator built"
        );

        Ok(Orchestrator {
            classifier: Classifier::new(self.llm.clone(), self.prompts.classifier.clone(), self.fast_match, identity),
            router: Router::new(self.llm.clone(), self.prompts.routing.clone()),
            information,
            booking,
            ownership,
            checkpoints: self
                .checkpoints
                .unwrap_or_else(|| Arc::new(InMemoryCheckpointStore::new())),
            locks: ThreadLocks::new(),
            mode: self.mode,
            max_steps: self.max_steps,
            recovery: RecoveryEngine::new(),
            llm: self.llm,
            today: self.today,
        })
    }
}

fn build_notifier(cfg: &AppConfig) -> Result<Option<Arc<dyn Notifier>>, AgentError> {
    match cfg.notification.backend.as_str() {
        "none" | "off" => Ok(None),
        "log" => Ok(Some(Arc::new(LogNotifier))),
        "webhook" => {
            let url = cfg.notification.webhook_url.as_deref().ok_or_else(|| {
                AgentError::ConfigError("notification.webhook_url is required for the webhook backend".into())
            })?;
            let notifier = WebhookNotifier::new(url, cfg.notification.timeout_secs)
                .map_err(|e| AgentError::ConfigError(format!("webhook notifier: {e}")))?;
            Ok(Some(Arc::new(notifier)))
        }
        other => Err(AgentError::ConfigError(format!("unknown notification backend '{other}'"))),
    }
}

fn build_checkpoints(cfg: &AppConfig, clinic_db: &Database) -> Result<Arc<dyn CheckpointStore>, AgentError> {
    match cfg.checkpoint.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryCheckpointStore::new())),
        "sqlite" => {
            let db = match &cfg.checkpoint.path {
                Some(path) => Database::open(path)?,
                None => clinic_db.clone(),
            };
            Ok(Arc::new(SqliteCheckpointStore::new(db)))
        }
        other => Err(AgentError::ConfigError(format!("unknown checkpoint backend '{other}'"))),
    }
}

/// 按配置装配完整的编排器：打开号源库、导入种子、选择通知与检查点后端
pub async fn build_from_config(cfg: &AppConfig) -> Result<Arc<Orchestrator>, AgentError> {
    let db = Database::open(&cfg.clinic.database)?;
    let store = SlotStore::new(db.clone());
    if let Some(seed) = &cfg.clinic.seed_csv {
        let inserted = import_csv(&store, seed).await?;
        tracing::info!(path = %seed.display(), inserted, "seed slots imported");
    }

    let roster = Roster::new(cfg.clinic.doctors.clone());
    if roster.doctors().is_empty() {
        return Err(AgentError::ConfigError("clinic.doctors must not be empty".into()));
    }
    let mut clinic = ClinicContext::new(store, roster, cfg.identity.source);
    if let Some(notifier) = build_notifier(cfg)? {
        clinic = clinic.with_notifications(NotificationDispatcher::new(notifier, PatientDirectory::new(db.clone())));
    }

    let prompts = PromptSet::from_config(cfg)?;
    let orchestrator = OrchestratorBuilder::new(create_llm_from_config(cfg), Arc::new(clinic))
        .with_prompts(prompts)
        .with_checkpoints(build_checkpoints(cfg, &db)?)
        .with_mode(cfg.handlers.mode)
        .with_max_steps(cfg.handlers.max_steps)
        .with_tool_timeout(cfg.tools.tool_timeout_secs)
        .with_fast_match(cfg.classifier.fast_match)
        .build()?;
    Ok(Arc::new(orchestrator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentitySource;
    use crate::llm::MockLlmClient;

    fn clinic() -> Arc<ClinicContext> {
        let db = Database::open_in_memory().unwrap();
        Arc::new(ClinicContext::new(
            SlotStore::new(db),
            Roster::new(AppConfig::default().clinic.doctors),
            IdentitySource::Session,
        ))
    }

    #[test]
    fn test_build_binds_disjoint_tool_sets() {
        let o = OrchestratorBuilder::new(Arc::new(MockLlmClient::new()), clinic())
            .with_max_hops(4)
            .build()
            .unwrap();
        assert_eq!(o.router.max_hops(), 4);
        assert_eq!(o.ownership.owner("book_appointment"), Some(HandlerKind::Booking));
        assert_eq!(o.ownership.owner("check_availability_by_doctor"), Some(HandlerKind::Information));
        let info_tools = o.information.tools().tool_names();
        assert!(info_tools.iter().any(|t| t == "check_availability_by_doctor"));
        assert!(!info_tools.iter().any(|t| t == "book_appointment"));
    }

    #[test]
    fn test_unknown_backends_rejected() {
        let mut cfg = AppConfig::default();
        cfg.notification.backend = "pigeon".into();
        assert!(matches!(build_notifier(&cfg), Err(AgentError::ConfigError(_))));

        cfg.notification.backend = "webhook".into();
        assert!(matches!(build_notifier(&cfg), Err(AgentError::ConfigError(_))));

        cfg.checkpoint.backend = "redis".into();
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(build_checkpoints(&cfg, &db), Err(AgentError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_build_from_config_with_seed() {
        let dir = tempfile::tempdir().unwrap();
        let seed = dir.path().join("slots.csv");
        std::fs::write(
            &seed,
            "date_slot,specialization,doctor_name,is_available,patient_to_attend\n\
             16-06-2025 10:00,orthodontist,emily johnson,True,\n",
        )
        .unwrap();
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        cfg.clinic.database = dir.path().join("clinic.db");
        cfg.clinic.seed_csv = Some(seed);
        cfg.checkpoint.backend = "sqlite".into();
        let o = build_from_config(&cfg).await.unwrap();
        assert_eq!(o.mode, HandlerMode::MultiHop);
    }
}
