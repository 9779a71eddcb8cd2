//! 错误分类
//!
//! 只有 PlanParseError 会在任何步骤执行前中止整个计划；其余错误都以 StepFailure 的形式
//! 记入该步骤的 StepResult，由 ExecutionStrategy 决定继续、降级还是中止。

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::ResolveError;
use crate::plan::PlanParseError;

/// 步骤失败的分类标签（随 StepError 一起序列化给下游）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnsupportedExpression,
    ForwardReference,
    ToolNotFound,
    ToolExecution,
    ToolTimeout,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::UnsupportedExpression => "unsupported_expression",
            FailureKind::ForwardReference => "forward_reference",
            FailureKind::ToolNotFound => "tool_not_found",
            FailureKind::ToolExecution => "tool_execution",
            FailureKind::ToolTimeout => "tool_timeout",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// 单个步骤的失败原因（参数解析或工具调用）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepFailure {
    #[error(transparent)]
    Resolution(#[from] ResolveError),

    #[error("Tool not found: {tool} (available: {})", .available.join(", "))]
    ToolNotFound { tool: String, available: Vec<String> },

    #[error("Tool execution failed: {tool}: {cause}")]
    ToolExecution { tool: String, cause: String },

    #[error("Tool timeout: {tool} did not finish within {timeout_ms}ms")]
    ToolTimeout { tool: String, timeout_ms: u64 },

    #[error("Cancelled while running {tool}")]
    Cancelled { tool: String },
}

impl StepFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            StepFailure::Resolution(ResolveError::UnsupportedExpression { .. }) => {
                FailureKind::UnsupportedExpression
            }
            StepFailure::Resolution(ResolveError::ForwardReference { .. }) => {
                FailureKind::ForwardReference
            }
            StepFailure::ToolNotFound { .. } => FailureKind::ToolNotFound,
            StepFailure::ToolExecution { .. } => FailureKind::ToolExecution,
            StepFailure::ToolTimeout { .. } => FailureKind::ToolTimeout,
            StepFailure::Cancelled { .. } => FailureKind::Cancelled,
        }
    }
}

/// 记录在 StepResult 中的错误：分类 + 人类可读原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&StepFailure> for StepError {
    fn from(failure: &StepFailure) -> Self {
        Self {
            kind: failure.kind(),
            message: failure.to_string(),
        }
    }
}

impl From<StepFailure> for StepError {
    fn from(failure: StepFailure) -> Self {
        Self::from(&failure)
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Agent 外层流程的错误（意图识别 / 规划 / 配置）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Plan parse error: {0}")]
    Plan(#[from] PlanParseError),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Cancelled")]
    Cancelled,
}
