//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找。
//! 注册表在服务启动时构建一次，以 `Arc<ToolRegistry>` 传给每次计划执行；之后只读，可被并发调用。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// 已解析、完全替换过占位符的工具参数
pub type ToolArgs = Map<String, Value>;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行
///
/// 预期内的业务情况（如「未找到结果」）应返回 Ok 并在 payload 中说明；
/// Err 只留给基础设施层面的失败（网络、权限、上游服务不可用）。
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（计划中 `tool_name` 的取值）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（供 LLM 生成正确的参数格式）
    /// 默认返回空对象，表示无参数或参数格式不限
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具：返回结构化记录或原始字符串/标量
    async fn execute(&self, args: ToolArgs) -> Result<Value, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    /// 注册已共享的工具实例（同名覆盖）
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool re-registered, previous instance replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 按名称排序，保证提示词与错误信息稳定
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 返回 (name, description) 列表，按名称排序
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.sorted()
            .map(|(name, tool)| (name.clone(), tool.description().to_string()))
            .collect()
    }

    /// 能力说明文本：每个工具一行，参数说明取自 schema 的 properties
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (name, tool) in self.sorted() {
            out.push_str(&format!("- {name}: {}\n", tool.description()));
            let schema = tool.parameters_schema();
            let required: Vec<&str> = schema
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                for (param, spec) in props {
                    let ty = spec.get("type").and_then(Value::as_str).unwrap_or("any");
                    let desc = spec.get("description").and_then(Value::as_str).unwrap_or("");
                    let flag = if required.contains(&param.as_str()) {
                        ", required"
                    } else {
                        ""
                    };
                    out.push_str(&format!("    - {param} ({ty}{flag}): {desc}\n"));
                }
            }
        }
        out
    }

    /// 动态生成工具 schema JSON（与实际注册的工具一致）
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self
            .sorted()
            .map(|(name, tool)| {
                serde_json::json!({
                    "name": name,
                    "description": tool.description(),
                    "parameters": tool.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }

    fn sorted(&self) -> impl Iterator<Item = (&String, &Arc<dyn Tool>)> {
        let mut entries: Vec<_> = self.tools.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{EchoTool, FnTool};
    use serde_json::json;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(FnTool::new("maps_geo", "地理编码", |_args| async {
            Ok(json!({"location": "116.4,39.9"}))
        }));
        assert!(registry.contains("echo"));
        assert!(registry.get("maps_geo").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.tool_names(), vec!["echo", "maps_geo"]);
    }

    #[test]
    fn test_describe_lists_parameters() {
        let mut registry = ToolRegistry::new();
        registry.register(
            FnTool::new("maps_weather", "查询城市天气", |_args| async { Ok(json!({})) })
                .with_schema(json!({
                    "type": "object",
                    "properties": {"city": {"type": "string", "description": "城市名或 adcode"}},
                    "required": ["city"]
                })),
        );
        let text = registry.describe();
        assert!(text.contains("- maps_weather: 查询城市天气"));
        assert!(text.contains("- city (string, required): 城市名或 adcode"));

        let schema: Value = serde_json::from_str(&registry.to_schema_json()).unwrap();
        assert_eq!(schema[0]["name"], "maps_weather");
    }
}
