//! 计划层：步骤类型、结构校验、从 LLM 文本中提取计划

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{extract_plan_json, parse_plan_text};
pub use types::{Plan, TaskStep};
pub use validator::{PlanParseError, PlanValidator};
