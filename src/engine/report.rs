//! 执行报告：一次计划执行的全部结果，交给合成阶段或直接序列化输出

use serde::Serialize;
use serde_json::{Map, Value};

use crate::context::{ResolveWarning, StepResult};
use crate::core::{ExecutionPhase, ExecutionStrategy, StepError};
use crate::extract::ResultManifest;
use crate::plan::TaskStep;

/// 单步执行记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub index: usize,
    /// 计划中的原始步骤
    pub step: TaskStep,
    /// 参数解析后的副本；解析失败时为 None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<TaskStep>,
    pub result: StepResult,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ResolveWarning>,
    pub duration_ms: u64,
}

impl StepRecord {
    /// 交给提取 / 合成的步骤：优先用解析后的副本
    pub fn effective_step(&self) -> &TaskStep {
        self.resolved.as_ref().unwrap_or(&self.step)
    }

    pub fn pair(&self) -> (&TaskStep, &StepResult) {
        (self.effective_step(), &self.result)
    }
}

/// 计划的最终结局
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanOutcome {
    Completed,
    /// 某步失败后停止，但仍基于已成功的步骤生成清单
    Degraded { failed_step: usize, error: StepError },
    /// 某步失败后立即中止，不生成清单
    Aborted { failed_step: usize, error: StepError },
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub run_id: String,
    pub strategy: ExecutionStrategy,
    pub outcome: PlanOutcome,
    /// 依次经过的阶段
    pub phases: Vec<ExecutionPhase>,
    /// 已执行步骤（含失败的那一步），按索引有序
    pub records: Vec<StepRecord>,
    /// Aborted 时为 None
    pub manifest: Option<ResultManifest>,
    /// 从成功结果中抽取的常用字段（step_N_location 等）
    pub highlights: Map<String, Value>,
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: u64,
}

impl ExecutionReport {
    /// 失败的步骤索引与原因
    pub fn failure(&self) -> Option<(usize, &StepError)> {
        match &self.outcome {
            PlanOutcome::Completed => None,
            PlanOutcome::Degraded { failed_step, error }
            | PlanOutcome::Aborted { failed_step, error } => Some((*failed_step, error)),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, PlanOutcome::Aborted { .. })
    }

    pub fn final_phase(&self) -> Option<&ExecutionPhase> {
        self.phases.last()
    }

    /// 有序的 (步骤, 结果) 对
    pub fn step_results(&self) -> impl Iterator<Item = (&TaskStep, &StepResult)> {
        self.records.iter().map(StepRecord::pair)
    }

    /// 成功步骤的 (步骤, 结果) 对，合成阶段使用
    pub fn successful_steps(&self) -> impl Iterator<Item = (&TaskStep, &StepResult)> {
        self.step_results().filter(|(_, result)| result.success)
    }

    /// 实际执行过工具或解析的步骤索引
    pub fn executed_indices(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.index).collect()
    }
}
