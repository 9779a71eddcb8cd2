//! 计划 JSON Schema 生成（schemars）
//!
//! 用于将「合法计划」的 JSON 结构注入规划提示词，减少 LLM 输出格式错误。

use schemars::{schema_for, JsonSchema};
use serde_json::{Map, Value};

/// 计划中单个步骤的格式（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct PlanStepFormat {
    /// 此步骤要实现的目标
    pub goal: String,
    /// 工具名，必须是可用工具之一
    pub tool_name: String,
    /// 工具参数；字符串值可用 {step_N_result.path} 引用前序步骤的结果
    pub parameters: Map<String, Value>,
}

/// 返回计划（步骤数组）的 JSON Schema 字符串，可拼入 system prompt
pub fn plan_schema_json() -> String {
    let schema = schema_for!(Vec<PlanStepFormat>);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}
