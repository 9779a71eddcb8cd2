//! 任务规划：请 LLM 按可用工具输出步骤数组，再交给 parse_plan_text 校验

use std::sync::Arc;

use tracing::info;

use crate::core::AgentError;
use crate::llm::{LlmClient, Message};
use crate::plan::{parse_plan_text, Plan};
use crate::tools::{plan_schema_json, ToolRegistry};

pub struct TaskPlanner {
    llm: Arc<dyn LlmClient>,
}

impl TaskPlanner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 规划提示词：可用工具说明 + 计划 JSON Schema + 占位符规则
    pub fn build_messages(&self, user_input: &str, registry: &ToolRegistry) -> Vec<Message> {
        let system = format!(
            "你是任务规划助手。把用户请求拆成按顺序执行的工具调用步骤，只输出一个 JSON 数组。\n\n\
             可用工具：\n{}\n\
             步骤格式（JSON Schema）：\n{}\n\n\
             规则：\n\
             - tool_name 必须是可用工具之一\n\
             - 参数中可用 {{step_N_result.字段}} 或 {{step_N_result.列表[0].字段}} 引用第 N 步（从 0 开始）的结果，只能引用之前的步骤\n\
             - 占位符内只允许字段名和数字下标，禁止方法调用、运算、比较和切片",
            registry.describe(),
            plan_schema_json()
        );
        vec![Message::system(system), Message::user(user_input)]
    }

    pub async fn plan(&self, user_input: &str, registry: &ToolRegistry) -> Result<Plan, AgentError> {
        let messages = self.build_messages(user_input, registry);
        let text = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::LlmError)?;
        let plan = parse_plan_text(&text)?;
        info!(steps = plan.len(), "plan generated");
        Ok(plan)
    }
}
