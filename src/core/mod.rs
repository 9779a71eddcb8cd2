//! 核心层：错误分类、失败策略、执行状态机

pub mod error;
pub mod state;
pub mod strategy;

pub use error::{AgentError, FailureKind, StepError, StepFailure};
pub use state::ExecutionPhase;
pub use strategy::{decide, Decision, ExecutionStrategy};
