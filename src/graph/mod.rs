//! 编排图：分类器 → 路由器 → 处理器 → 工具执行
//!
//! - **classifier**: 判断本轮是否需要领域处理，必要时改写查询
//! - **router**: 决定下一个处理器或结束，带跳数上限
//! - **handler**: 信息 / 预约处理器，各自只能调用自己的工具
//! - **engine**: 驱动状态机、写回检查点、产出事件流

pub mod builder;
pub mod classifier;
pub mod engine;
pub mod events;
pub mod handler;
pub mod parse;
pub mod prompts;
pub mod router;
pub mod state;

pub use builder::{build_from_config, OrchestratorBuilder};
pub use classifier::{Classification, Classifier};
pub use engine::{Orchestrator, TurnOutcome, TurnRequest};
pub use events::{EventSink, GraphEvent};
pub use handler::{Handler, HandlerKind, HandlerMode, HandlerStep, PendingToolCall, ToolOwnership};
pub use prompts::{PromptSet, RoutingPolicy};
pub use router::{RouteTarget, Router, RoutingDecision};
pub use state::ConversationState;
