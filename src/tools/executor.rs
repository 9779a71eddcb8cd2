//! 工具执行器
//!
//! 持有共享的 ToolRegistry 与单次调用超时。execute(tool_name, args, cancel) 查找工具并在
//! 超时 / 取消的约束下调用；未找到、失败、超时、取消都转为 StepFailure，由执行策略统一处理。
//! 每次调用输出一行结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::core::{FailureKind, StepFailure};
use crate::tools::{Tool, ToolArgs, ToolRegistry};

/// 工具执行器：对每次调用施加超时与取消，并将结果映射为 StepFailure
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Option<Duration>,
}

impl ToolExecutor {
    /// `timeout_secs` 为 0 表示不限时
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        let timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));
        Self { registry, timeout }
    }

    /// 覆盖单次调用超时（None 为不限时）
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// 执行指定工具；返回值经过 normalize_output，失败时返回 StepFailure；输出 JSON 审计日志
    pub async fn execute(
        &self,
        tool_name: &str,
        args: ToolArgs,
        cancel: &CancellationToken,
    ) -> Result<Value, StepFailure> {
        let start = Instant::now();
        let args_preview = args_preview(&args);

        let result = match self.registry.get(tool_name) {
            Some(tool) => self.invoke(tool_name, tool, args, cancel).await,
            None => Err(StepFailure::ToolNotFound {
                tool: tool_name.to_string(),
                available: self.registry.tool_names(),
            }),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(failure) => match failure.kind() {
                FailureKind::ToolNotFound => "not_found",
                FailureKind::ToolTimeout => "timeout",
                FailureKind::Cancelled => "cancelled",
                _ => "error",
            },
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result.map(normalize_output)
    }

    async fn invoke(
        &self,
        tool_name: &str,
        tool: Arc<dyn Tool>,
        args: ToolArgs,
        cancel: &CancellationToken,
    ) -> Result<Value, StepFailure> {
        let execution_failed = |cause: String| StepFailure::ToolExecution {
            tool: tool_name.to_string(),
            cause,
        };
        let call = tool.execute(args);
        let guarded = async {
            match self.timeout {
                Some(limit) => match timeout(limit, call).await {
                    Ok(result) => result.map_err(execution_failed),
                    Err(_) => Err(StepFailure::ToolTimeout {
                        tool: tool_name.to_string(),
                        timeout_ms: limit.as_millis() as u64,
                    }),
                },
                None => call.await.map_err(execution_failed),
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StepFailure::Cancelled {
                tool: tool_name.to_string(),
            }),
            result = guarded => result,
        }
    }
}

/// 工具返回的 JSON 文本（对象或数组）解析为结构化 payload，其余字符串保持原样
pub fn normalize_output(output: Value) -> Value {
    if let Value::String(text) = &output {
        let trimmed = text.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(parsed @ (Value::Object(_) | Value::Array(_))) =
                serde_json::from_str::<Value>(text)
            {
                return parsed;
            }
        }
    }
    output
}

fn args_preview(args: &ToolArgs) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{EchoTool, FnTool};
    use serde_json::json;

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(FnTool::new("failing", "always fails", |_args| async {
            Err("upstream returned 502".to_string())
        }));
        registry.register(FnTool::new("slow", "sleeps", |_args| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!("done"))
        }));
        registry.register(FnTool::new("json_text", "returns JSON text", |_args| async {
            Ok(json!(r#"{"pois": [{"name": "故宫"}]}"#))
        }));
        ToolExecutor::new(Arc::new(registry), 30)
    }

    #[tokio::test]
    async fn test_success_and_normalization() {
        let exec = executor();
        let cancel = CancellationToken::new();
        let mut args = ToolArgs::new();
        args.insert("text".into(), json!("hi"));
        assert_eq!(
            exec.execute("echo", args, &cancel).await.unwrap(),
            json!({"text": "hi"})
        );
        let out = exec
            .execute("json_text", ToolArgs::new(), &cancel)
            .await
            .unwrap();
        assert_eq!(out["pois"][0]["name"], "故宫");
    }

    #[tokio::test]
    async fn test_not_found_lists_available_tools() {
        let exec = executor();
        let err = exec
            .execute("nope", ToolArgs::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::ToolNotFound);
        assert!(err.to_string().contains("echo, failing, json_text, slow"));
    }

    #[tokio::test]
    async fn test_execution_error_keeps_cause() {
        let err = executor()
            .execute("failing", ToolArgs::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StepFailure::ToolExecution {
                tool: "failing".into(),
                cause: "upstream returned 502".into()
            }
        );
    }

    #[tokio::test]
    async fn test_timeout() {
        let exec = executor().with_timeout(Some(Duration::from_millis(20)));
        let err = exec
            .execute("slow", ToolArgs::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::ToolTimeout);
    }

    #[tokio::test]
    async fn test_cancellation() {
        let exec = executor();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = exec
            .execute("slow", ToolArgs::new(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Cancelled);
    }

    #[test]
    fn test_normalize_output() {
        assert_eq!(normalize_output(json!("[1, 2]")), json!([1, 2]));
        assert_eq!(normalize_output(json!("plain")), json!("plain"));
        assert_eq!(normalize_output(json!("{broken")), json!("{broken"));
        assert_eq!(normalize_output(json!("42")), json!("42"));
        assert_eq!(normalize_output(json!(7)), json!(7));
    }
}
