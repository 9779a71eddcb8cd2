//! 计划类型
//!
//! TaskStep 校验后不可变；每次执行时由 StepContext 派生出参数已解析的副本，原步骤保持原样以便重试。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 单个计划步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    /// 此步骤要实现的目标（人类可读）
    pub goal: String,
    /// 工具注册表中的工具名
    #[serde(alias = "toolName")]
    pub tool_name: String,
    /// 传给工具的参数，值中可含 `{step_N_result...}` 占位符
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl TaskStep {
    pub fn new(
        goal: impl Into<String>,
        tool_name: impl Into<String>,
        parameters: Map<String, Value>,
    ) -> Self {
        Self {
            goal: goal.into(),
            tool_name: tool_name.into(),
            parameters,
        }
    }

    /// 派生一份只替换参数的副本（解析后的步骤）
    pub fn with_parameters(&self, parameters: Map<String, Value>) -> Self {
        Self {
            goal: self.goal.clone(),
            tool_name: self.tool_name.clone(),
            parameters,
        }
    }
}

/// 通过结构校验的计划：至少一个步骤，步骤索引从 0 连续
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Plan {
    steps: Vec<TaskStep>,
}

impl Plan {
    /// 仅由 PlanValidator 构造，保证步骤已校验
    pub(crate) fn from_validated(steps: Vec<TaskStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[TaskStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TaskStep> {
        self.steps.iter()
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a TaskStep;
    type IntoIter = std::slice::Iter<'a, TaskStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}
