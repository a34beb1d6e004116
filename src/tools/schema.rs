//! 工具参数 JSON Schema 生成（schemars）
//!
//! 参数结构体派生 JsonSchema，生成的 schema 注入处理器 system prompt，减少 LLM 输出格式错误。

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 返回参数类型 T 的 JSON Schema（去掉 `$schema` 元信息）
pub fn args_schema<T: JsonSchema>() -> Value {
    let mut value = serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
    }
    value
}

/// 从 object schema 中移除某个属性（同时移出 required）
pub fn without_property(mut schema: Value, property: &str) -> Value {
    if let Some(props) = schema.get_mut("properties").and_then(Value::as_object_mut) {
        props.remove(property);
    }
    if let Some(required) = schema.get_mut("required").and_then(Value::as_array_mut) {
        required.retain(|v| v.as_str() != Some(property));
    }
    schema
}

/// 处理器回复格式：调用工具时只输出这一行 JSON（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，必须是可用工具之一
    pub tool: String,
    /// 工具参数，结构见各工具的 parameters
    pub args: serde_json::Map<String, Value>,
}

/// 工具调用格式的 JSON Schema 字符串，拼入处理器 prompt
pub fn tool_call_schema_json() -> String {
    serde_json::to_string_pretty(&args_schema::<ToolCallFormat>()).unwrap_or_default()
}
