//! Echo 工具（诊断 / 测试用）

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{Tool, ToolArgs};

/// Echo 工具：把收到的参数原样作为结构化记录返回，便于检查占位符替换结果
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the given arguments as a record (for diagnostics)"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {"type": "string", "description": "any text to echo back"}
            },
            "required": []
        })
    }

    async fn execute(&self, args: ToolArgs) -> Result<Value, String> {
        Ok(Value::Object(args))
    }
}
