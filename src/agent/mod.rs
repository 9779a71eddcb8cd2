//! Agent：意图识别 → 按意图分流 → （复杂任务）规划、执行、合成
//!
//! LLM 与工具都是外部协作者，分别通过 LlmClient 与 ToolRegistry 接入。

pub mod intent;
pub mod planner;
pub mod synthesis;

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::{AgentError, ExecutionStrategy, StepFailure};
use crate::engine::{ExecutionEngine, ExecutionReport};
use crate::llm::{LlmClient, Message};

pub use intent::{Intent, IntentClassifier};
pub use planner::TaskPlanner;
pub use synthesis::{append_attachments, Synthesizer};

/// 一次请求的处理结果
#[derive(Debug, Clone, Serialize)]
pub struct AgentReply {
    pub intent: Intent,
    pub text: String,
    /// 仅复杂任务有执行报告
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ExecutionReport>,
}

pub struct Agent {
    llm: Arc<dyn LlmClient>,
    engine: ExecutionEngine,
    classifier: IntentClassifier,
    planner: TaskPlanner,
    synthesizer: Synthesizer,
}

impl Agent {
    pub fn new(llm: Arc<dyn LlmClient>, engine: ExecutionEngine) -> Self {
        Self {
            classifier: IntentClassifier::new(llm.clone()),
            planner: TaskPlanner::new(llm.clone()),
            synthesizer: Synthesizer::new(llm.clone()),
            llm,
            engine,
        }
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// 处理一条用户输入。计划不合法时返回 AgentError::Plan，且不会执行任何步骤
    pub async fn handle(
        &self,
        user_input: &str,
        strategy: ExecutionStrategy,
        cancel: &CancellationToken,
    ) -> Result<AgentReply, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let mut intent = self.classifier.classify(user_input).await?;
        if let Some(tool) = intent.knowledge_tool() {
            if !self.engine.registry().contains(tool) {
                warn!(intent = %intent, tool, "knowledge tool not registered, planning instead");
                intent = Intent::ComplexTask;
            }
        }

        match intent {
            Intent::GeneralChat => {
                let messages = [
                    Message::system("你是一个智能助手，可以与用户自然对话。"),
                    Message::user(user_input),
                ];
                let text = self
                    .llm
                    .complete(&messages)
                    .await
                    .map_err(AgentError::LlmError)?;
                Ok(reply(intent, text, None))
            }
            Intent::ToolInfoQuery => {
                let text = format!("我具备以下能力：\n{}", self.engine.registry().describe());
                Ok(reply(intent, text, None))
            }
            Intent::KnowledgeQueryIcl | Intent::KnowledgeQueryRag => {
                let tool = intent.knowledge_tool().unwrap_or("rag_query");
                let text = self.query_knowledge(tool, user_input, cancel).await?;
                Ok(reply(intent, text, None))
            }
            Intent::ComplexTask => self.run_complex_task(user_input, strategy, cancel).await,
        }
    }

    async fn query_knowledge(
        &self,
        tool: &str,
        user_input: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let mut args = Map::new();
        args.insert("query".to_string(), Value::String(user_input.to_string()));
        match self.engine.executor().execute(tool, args, cancel).await {
            Ok(Value::String(text)) => Ok(text),
            Ok(other) => Ok(serde_json::to_string_pretty(&other).unwrap_or_default()),
            Err(StepFailure::Cancelled { .. }) => Err(AgentError::Cancelled),
            Err(failure) => Ok(format!("知识库查询失败：{failure}")),
        }
    }

    async fn run_complex_task(
        &self,
        user_input: &str,
        strategy: ExecutionStrategy,
        cancel: &CancellationToken,
    ) -> Result<AgentReply, AgentError> {
        let plan = self.planner.plan(user_input, self.engine.registry()).await?;
        let report = self.engine.execute(&plan, strategy, cancel).await;

        let text = match (report.is_aborted(), report.failure()) {
            (true, Some((failed_step, error))) => {
                let goal = plan
                    .steps()
                    .get(failed_step)
                    .map(|s| s.goal.as_str())
                    .unwrap_or("");
                info!(failed_step, "plan aborted, reporting failure");
                format!(
                    "抱歉，在执行第 {} 步「{goal}」时遇到问题：{}\n\n请尝试重新描述您的需求。",
                    failed_step + 1,
                    error.message
                )
            }
            _ => self.synthesizer.synthesize(user_input, &report).await?,
        };
        Ok(reply(Intent::ComplexTask, text, Some(report)))
    }
}

fn reply(intent: Intent, text: String, report: Option<ExecutionReport>) -> AgentReply {
    AgentReply {
        intent,
        text,
        report,
    }
}
