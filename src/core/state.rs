//! 计划执行状态机
//!
//! Planning → Executing(0) → … → Executing(n-1) → Synthesizing → Completed；
//! 失败时按策略进入 Degraded（随后 Synthesizing → Completed）或 Aborted（终态）。
//! Synthesizing 指引擎把已有结果整合为 ResultManifest，清单生成后即进入 Completed。

use serde::Serialize;

/// 单次计划执行所处的阶段
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ExecutionPhase {
    Planning,
    Executing { step: usize },
    Degraded { failed_step: usize },
    Aborted { failed_step: usize },
    Synthesizing,
    Completed,
}

impl ExecutionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionPhase::Aborted { .. } | ExecutionPhase::Completed)
    }

    /// 状态机允许的迁移；引擎每次切换阶段前都会检查
    pub fn can_transition_to(&self, next: &ExecutionPhase) -> bool {
        use ExecutionPhase::*;
        match (self, next) {
            (Planning, Executing { step: 0 }) => true,
            (Planning, Synthesizing) => true,
            (Executing { step }, Executing { step: next_step }) => *next_step == step + 1,
            (Executing { step }, Degraded { failed_step }) => failed_step == step,
            (Executing { step }, Aborted { failed_step }) => failed_step == step,
            (Executing { .. }, Synthesizing) => true,
            (Degraded { .. }, Synthesizing) => true,
            (Synthesizing, Completed) => true,
            _ => false,
        }
    }
}
