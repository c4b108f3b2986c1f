//! 工具参数 JSON Schema 生成（schemars）
//!
//! 各工具用带类型的参数结构体 derive JsonSchema，这里转成发给模型的 parameters 对象。

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 返回类型 T 的 JSON Schema（去掉 $schema / title 等模型用不到的顶层字段）
pub fn parameters_schema_for<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}
