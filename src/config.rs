//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `DOCUBOT__*` 覆盖（双下划线表示嵌套，如 `DOCUBOT__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::graph::HandlerMode;
use crate::identity::IdentitySource;
use crate::tools::DoctorEntry;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub router: RouterSection,
    pub classifier: ClassifierSection,
    pub handlers: HandlersSection,
    pub tools: ToolsSection,
    pub clinic: ClinicSection,
    pub identity: IdentitySection,
    pub checkpoint: CheckpointSection,
    pub notification: NotificationSection,
    pub server: ServerSection,
}

/// [app] 段：应用名、数据目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub data_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "docubot".to_string(),
            data_dir: PathBuf::from("data"),
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: None,
            base_url: None,
            request_timeout_secs: 60,
        }
    }
}

/// [router] 段：跳数上限、策略文本覆盖
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    pub max_hops: u32,
    /// 路由 system prompt 覆盖文件；未设置时用内置策略
    pub policy_file: Option<PathBuf>,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            max_hops: 10,
            policy_file: None,
        }
    }
}

/// [classifier] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierSection {
    /// 问候 / 身份类输入走规则直答，不调用 LLM
    pub fast_match: bool,
    pub prompt_file: Option<PathBuf>,
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            fast_match: true,
            prompt_file: None,
        }
    }
}

/// [handlers] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HandlersSection {
    pub mode: HandlerMode,
    /// 单次进入处理器最多几步（LLM 调用次数）
    pub max_steps: usize,
    pub information_prompt_file: Option<PathBuf>,
    pub booking_prompt_file: Option<PathBuf>,
}

impl Default for HandlersSection {
    fn default() -> Self {
        Self {
            mode: HandlerMode::MultiHop,
            max_steps: 6,
            information_prompt_file: None,
            booking_prompt_file: None,
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self { tool_timeout_secs: 30 }
    }
}

/// [clinic] 段：号源库、种子 CSV、医生名单
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClinicSection {
    pub database: PathBuf,
    /// 启动时导入的号源 CSV；已存在的 (医生, 时间) 行保持不变
    pub seed_csv: Option<PathBuf>,
    pub doctors: Vec<DoctorEntry>,
}

impl Default for ClinicSection {
    fn default() -> Self {
        Self {
            database: PathBuf::from("data/clinic.db"),
            seed_csv: None,
            doctors: default_doctors(),
        }
    }
}

fn default_doctors() -> Vec<DoctorEntry> {
    [
        ("kevin anderson", "general_dentist"),
        ("robert martinez", "general_dentist"),
        ("susan davis", "cosmetic_dentist"),
        ("daniel miller", "prosthodontist"),
        ("sarah wilson", "pediatric_dentist"),
        ("michael green", "emergency_dentist"),
        ("lisa brown", "oral_surgeon"),
        ("jane smith", "orthodontist"),
        ("emily johnson", "orthodontist"),
        ("john doe", "pediatric_dentist"),
    ]
    .into_iter()
    .map(|(name, specialization)| DoctorEntry {
        name: name.to_string(),
        specialization: specialization.to_string(),
    })
    .collect()
}

/// [identity] 段：预约类工具的患者身份来源（一次部署只用一种）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct IdentitySection {
    pub source: IdentitySource,
    /// docubot-web 的静态凭证表；为空时使用请求体中的 patient_id
    pub credentials: Vec<CredentialEntry>,
}

/// 一条静态凭证：Bearer 令牌 -> 患者 ID
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialEntry {
    pub token: String,
    pub patient_id: i64,
}

/// [checkpoint] 段：会话状态持久化
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckpointSection {
    /// memory / sqlite
    pub backend: String,
    /// sqlite 后端的库文件；未设置时与号源库共用
    pub path: Option<PathBuf>,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            path: None,
        }
    }
}

/// [notification] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationSection {
    /// log / webhook / none
    pub backend: String,
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotificationSection {
    fn default() -> Self {
        Self {
            backend: "log".to_string(),
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

/// [server] 段（docubot-web）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 DOCUBOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 DOCUBOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("DOCUBOT")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
