pub mod echo;
pub mod executor;
pub mod fn_tool;
pub mod registry;
pub mod schema;

pub use echo::EchoTool;
pub use executor::{normalize_output, ToolExecutor};
pub use fn_tool::FnTool;
pub use registry::{Tool, ToolArgs, ToolRegistry};
pub use schema::plan_schema_json;
