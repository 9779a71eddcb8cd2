//! 单个步骤的执行结果

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::StepError;

/// 一步的执行结果；记录进 StepContext 后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    /// 结构化记录，或工具返回的原始字符串/标量
    pub payload: Value,
    /// 仅在 success 为 false 时存在
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

impl StepResult {
    pub fn success(payload: Value) -> Self {
        Self {
            success: true,
            payload,
            error: None,
        }
    }

    /// 失败结果的 payload 为 `{"error": <原因>}`，后续步骤引用它时解析到错误信息而不是崩溃
    pub fn failure(error: impl Into<StepError>) -> Self {
        let error = error.into();
        Self {
            success: false,
            payload: json!({ "error": error.message }),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}
