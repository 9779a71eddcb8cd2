//! 闭包工具：用一个异步闭包实现 Tool
//!
//! 适合把外部服务的函数式接口（地图、搜索等）接到注册表上，也用作测试替身。

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{Tool, ToolArgs};

type BoxFuture = Pin<Box<dyn Future<Output = Result<Value, String>> + Send>>;
type Handler = Box<dyn Fn(ToolArgs) -> BoxFuture + Send + Sync>;

pub struct FnTool {
    name: String,
    description: String,
    schema: Option<Value>,
    handler: Handler,
}

impl FnTool {
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema: None,
            handler: Box::new(move |args| Box::pin(handler(args))),
        }
    }

    /// 声明参数 schema（供 describe / to_schema_json 使用）
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        match &self.schema {
            Some(schema) => schema.clone(),
            None => serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    async fn execute(&self, args: ToolArgs) -> Result<Value, String> {
        (self.handler)(args).await
    }
}
