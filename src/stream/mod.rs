//! 流适配：把编排事件转换为对外的 NDJSON 记录（tool / text / error / fatal_error）

pub mod adapter;
pub mod record;

pub use adapter::{adapt, ndjson_lines, StreamAdapter};
pub use record::StreamRecord;
