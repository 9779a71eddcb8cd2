//! 计划执行过程事件：供前端 / 调用方实时展示阶段切换与步骤进度

use serde::Serialize;

use crate::core::ExecutionPhase;

/// 执行过程事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// 状态机进入新阶段
    PhaseChanged { phase: ExecutionPhase },
    /// 开始执行某一步
    StepStarted {
        index: usize,
        tool: String,
        goal: String,
    },
    /// 某一步结束（成功或失败）
    StepFinished {
        index: usize,
        tool: String,
        success: bool,
        duration_ms: u64,
    },
}

pub(crate) fn send_event(
    tx: &Option<tokio::sync::mpsc::UnboundedSender<ExecutionEvent>>,
    ev: ExecutionEvent,
) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}
