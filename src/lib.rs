//! Stepwise - 多步工具调用的计划编排核心
//!
//! 模块划分：
//! - **plan**: 计划步骤类型、结构校验、从 LLM 文本中提取计划
//! - **context**: 步骤结果存储与 `{step_N_result.path}` 占位符解析
//! - **tools**: 工具 trait、注册表与执行器（超时 / 取消 / 审计日志）
//! - **core**: 错误分类、失败策略、执行状态机
//! - **engine**: 串行执行计划，按策略处理失败，产出执行报告
//! - **extract**: 从步骤结果中提取文件、地图、路线、图片等产物清单
//! - **llm**: LLM 客户端抽象与 Mock
//! - **agent**: 意图识别、规划、执行与结果合成
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **observability**: 日志初始化

pub mod agent;
pub mod config;
pub mod context;
pub mod core;
pub mod engine;
pub mod extract;
pub mod llm;
pub mod observability;
pub mod plan;
pub mod tools;

pub use crate::core::{ExecutionStrategy, StepError};
pub use context::{StepContext, StepResult};
pub use engine::{ExecutionEngine, ExecutionReport, PlanOutcome};
pub use plan::{parse_plan_text, Plan, PlanParseError, PlanValidator, TaskStep};
pub use tools::{Tool, ToolExecutor, ToolRegistry};
