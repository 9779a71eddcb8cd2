//! 步骤上下文：结果存储 + `{step_N_result.path}` 占位符解析

pub mod error;
pub mod expr;
pub mod result;
pub mod store;

pub use error::{ResolveError, ResolveWarning};
pub use expr::{Accessor, Placeholder, Segment, Template};
pub use result::StepResult;
pub use store::{Resolution, StepContext};
