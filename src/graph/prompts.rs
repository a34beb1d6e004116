//! 提示词与路由策略
//!
//! 所有提示词在启动时装配成 PromptSet，以构造参数注入分类器、路由器与处理器；
//! 可用 config/prompts/ 下的文件覆盖内置文本。占位符：`{today}`、`{handlers}`、`{max_hops}`、
//! `{tools}`、`{tool_call_schema}`、`{identity_note}`。

use std::path::Path;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::graph::HandlerKind;
use crate::identity::IdentitySource;

const CLASSIFIER_PROMPT: &str = r#"You are the front desk of a dental clinic assistant. Today is {today}.
Decide whether the latest user message needs the clinic's scheduling system.

- Greetings, thanks, small talk, questions about who you are, or questions unrelated to the clinic:
  answer directly and briefly.
- Anything about doctors, specializations, availability, booking, cancelling or rescheduling:
  rewrite the request as one clear standalone query. Resolve relative dates ("tomorrow") to DD-MM-YYYY
  and times to HH:MM. Use the conversation history to fill in missing doctor names or dates.

Respond with exactly one JSON object and nothing else:
{"next": "terminal", "direct_answer": "<reply to the user>"}
or
{"next": "continue", "rewritten_query": "<standalone query>"}"#;

const ROUTER_PROMPT: &str = r#"You are a supervisor managing a conversation between the following workers:

{handlers}

Your role is to help the patient make an appointment with a doctor and to answer questions about doctor availability.
Delegate availability and doctor questions to "information"; booking, cancelling or rescheduling to "booking".
Each worker performs its task and reports back.

Rules:
1. If the user's query is fully answered and no further action is required, choose "finish".
2. If the conversation becomes repetitive, circular or unproductive, choose "finish".
3. Never exceed {max_hops} steps; choose "finish" before that.
4. Always consider the last worker response to decide whether the user's intent is satisfied.

Respond with exactly one JSON object and nothing else:
{"next": "information" | "booking" | "finish", "reasoning": "<one short sentence>"}"#;

const INFORMATION_PROMPT: &str = r#"You are the information agent of a dental clinic. You answer questions about doctor availability
and the clinic's doctors and specializations. Ask the user politely if you need more information to use a tool.
Dates are DD-MM-YYYY.

Available tools:
{tools}

To call a tool, reply with exactly one JSON object shaped like this schema and nothing else:
{tool_call_schema}

After you receive an observation, either call another tool or give the final answer to the user in plain text."#;

const BOOKING_PROMPT: &str = r#"You are the booking agent of a dental clinic. You book, cancel or reschedule appointments.
Ask the user politely if you need more information to use a tool. Datetimes are DD-MM-YYYY HH:MM.
{identity_note}

Available tools:
{tools}

To call a tool, reply with exactly one JSON object shaped like this schema and nothing else:
{tool_call_schema}

After you receive an observation, either call another tool or give the final answer to the user in plain text."#;

const SESSION_IDENTITY_NOTE: &str =
    "The patient is identified by the authenticated session. Never pass a patient_id argument.";
const ARGUMENT_IDENTITY_NOTE: &str =
    "Always pass the patient's 7 or 8 digit identification number as patient_id. It is stated in the request.";

/// 路由策略：system prompt、处理器清单、跳数上限
#[derive(Debug, Clone)]
pub struct RoutingPolicy {
    template: String,
    system_prompt: String,
    pub max_hops: u32,
}

impl RoutingPolicy {
    pub fn new(template: &str, max_hops: u32) -> Self {
        let handlers = HandlerKind::ALL
            .iter()
            .map(|h| format!("WORKER: {}\nDESCRIPTION: {}", h.as_str(), h.description()))
            .collect::<Vec<_>>()
            .join("\n\n");
        let system_prompt = template
            .replace("{handlers}", &handlers)
            .replace("{max_hops}", &max_hops.to_string());
        Self {
            template: template.to_string(),
            system_prompt,
            max_hops,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self::new(ROUTER_PROMPT, 10)
    }
}

/// 全部提示词
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub classifier: String,
    pub routing: RoutingPolicy,
    pub information: String,
    pub booking: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            classifier: CLASSIFIER_PROMPT.to_string(),
            routing: RoutingPolicy::default(),
            information: INFORMATION_PROMPT.to_string(),
            booking: BOOKING_PROMPT.to_string(),
        }
    }
}

fn read_override(path: Option<&Path>, builtin: &str) -> Result<String, AgentError> {
    match path {
        Some(p) => std::fs::read_to_string(p)
            .map_err(|e| AgentError::ConfigError(format!("prompt file {}: {e}", p.display()))),
        None => Ok(builtin.to_string()),
    }
}

impl PromptSet {
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        let router = read_override(cfg.router.policy_file.as_deref(), ROUTER_PROMPT)?;
        Ok(Self {
            classifier: read_override(cfg.classifier.prompt_file.as_deref(), CLASSIFIER_PROMPT)?,
            routing: RoutingPolicy::new(&router, cfg.router.max_hops),
            information: read_override(cfg.handlers.information_prompt_file.as_deref(), INFORMATION_PROMPT)?,
            booking: read_override(cfg.handlers.booking_prompt_file.as_deref(), BOOKING_PROMPT)?,
        })
    }

    pub fn with_max_hops(mut self, max_hops: u32) -> Self {
        self.routing = RoutingPolicy::new(&self.routing.template, max_hops);
        self
    }

    /// 处理器模板
    pub fn handler_template(&self, kind: HandlerKind) -> &str {
        match kind {
            HandlerKind::Information => &self.information,
            HandlerKind::Booking => &self.booking,
        }
    }
}

/// 分类器 system prompt（代入当天日期）
pub fn render_classifier(template: &str, today: &str) -> String {
    template.replace("{today}", today)
}

/// 处理器 system prompt（代入工具清单、调用格式、身份说明）
pub fn render_handler(template: &str, tools_json: &str, tool_call_schema: &str, identity: IdentitySource) -> String {
    let note = match identity {
        IdentitySource::Session => SESSION_IDENTITY_NOTE,
        IdentitySource::Arguments => ARGUMENT_IDENTITY_NOTE,
    };
    template
        .replace("{tools}", tools_json)
        .replace("{tool_call_schema}", tool_call_schema)
        .replace("{identity_note}", note)
}
