//! 计划结构校验
//!
//! 输入为松散类型的步骤描述（通常来自 LLM 输出的 JSON 数组），输出 Plan。
//! 任一描述不合法即拒绝整个计划，不接受部分计划；这里不检查工具是否存在（那是执行阶段的事）。

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::plan::{Plan, TaskStep};

/// 计划解析 / 校验失败：在任何步骤执行前直接返回给调用方
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanParseError {
    #[error("no JSON array found in plan text")]
    NoJson,

    #[error("plan must be a JSON array of steps, got {0}")]
    NotAnArray(&'static str),

    #[error("plan JSON is malformed: {0}")]
    Malformed(String),

    #[error("plan contains no steps")]
    EmptyPlan,

    #[error("step {index}: {reason}")]
    InvalidStep { index: usize, reason: String },
}

/// 计划校验器（无状态）
#[derive(Debug, Default, Clone, Copy)]
pub struct PlanValidator;

impl PlanValidator {
    pub fn new() -> Self {
        Self
    }

    /// 校验 JSON 值：必须是步骤描述数组
    pub fn validate(&self, descriptors: &Value) -> Result<Plan, PlanParseError> {
        match descriptors {
            Value::Array(items) => self.validate_descriptors(items),
            other => Err(PlanParseError::NotAnArray(json_type(other))),
        }
    }

    pub fn validate_descriptors(&self, descriptors: &[Value]) -> Result<Plan, PlanParseError> {
        if descriptors.is_empty() {
            return Err(PlanParseError::EmptyPlan);
        }
        let steps = descriptors
            .iter()
            .enumerate()
            .map(|(index, descriptor)| parse_descriptor(index, descriptor))
            .collect::<Result<Vec<_>, _>>()
            .inspect_err(|e| warn!(error = %e, "plan rejected"))?;
        Ok(Plan::from_validated(steps))
    }

    /// 校验已构造好的 TaskStep（例如由代码直接组装的计划）
    pub fn validate_steps(&self, steps: Vec<TaskStep>) -> Result<Plan, PlanParseError> {
        if steps.is_empty() {
            return Err(PlanParseError::EmptyPlan);
        }
        for (index, step) in steps.iter().enumerate() {
            if step.goal.trim().is_empty() {
                return Err(invalid(index, "`goal` must be a non-empty string"));
            }
            if step.tool_name.trim().is_empty() {
                return Err(invalid(index, "`tool_name` must be a non-empty string"));
            }
        }
        Ok(Plan::from_validated(steps))
    }
}

fn parse_descriptor(index: usize, descriptor: &Value) -> Result<TaskStep, PlanParseError> {
    let Value::Object(fields) = descriptor else {
        return Err(invalid(
            index,
            format!("step must be an object, got {}", json_type(descriptor)),
        ));
    };

    let goal = required_string(index, fields, &["goal"])?;
    let tool_name = required_string(index, fields, &["tool_name", "toolName"])?;

    let parameters = match fields.get("parameters") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(invalid(
                index,
                format!("`parameters` must be an object, got {}", json_type(other)),
            ))
        }
    };

    Ok(TaskStep::new(goal, tool_name, parameters))
}

fn required_string(
    index: usize,
    fields: &Map<String, Value>,
    keys: &[&str],
) -> Result<String, PlanParseError> {
    let name = keys[0];
    let value = keys
        .iter()
        .find_map(|k| fields.get(*k))
        .ok_or_else(|| invalid(index, format!("missing required field `{name}`")))?;
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.clone()),
        Value::String(_) => Err(invalid(index, format!("`{name}` must not be empty"))),
        other => Err(invalid(
            index,
            format!("`{name}` must be a string, got {}", json_type(other)),
        )),
    }
}

fn invalid(index: usize, reason: impl Into<String>) -> PlanParseError {
    PlanParseError::InvalidStep {
        index,
        reason: reason.into(),
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
