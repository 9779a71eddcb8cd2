//! 占位符解析的错误与告警
//!
//! ResolveError 让整个步骤失败；ResolveWarning 只记录下来，对应的占位符替换为空字符串。

use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// 占位符里出现了语法之外的结构（调用、运算、比较、切片……）
    #[error("Unsupported placeholder expression `{expression}`: {reason}")]
    UnsupportedExpression { expression: String, reason: String },

    /// 引用了当前或之后的步骤
    #[error("Step {current} cannot reference the result of step {referenced}; only earlier steps are available")]
    ForwardReference { current: usize, referenced: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolveWarning {
    /// 被引用的步骤没有记录结果
    MissingStepResult { step: usize },
    /// 路径在结果中走不通（键不存在、下标越界、类型不符、值为 null）
    UnresolvedPath { expression: String, reason: String },
}

impl fmt::Display for ResolveWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveWarning::MissingStepResult { step } => {
                write!(f, "no recorded result for step {step}")
            }
            ResolveWarning::UnresolvedPath { expression, reason } => {
                write!(f, "{expression} unresolved: {reason}")
            }
        }
    }
}
