//! 意图识别
//!
//! 由 LLM 把用户输入归入五类之一；无法识别的标签降级为 complex_task（走规划执行）。

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::AgentError;
use crate::llm::{LlmClient, Message};

/// 识别出的意图类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// 普通闲聊、问候
    GeneralChat,
    /// 询问 Agent 能力 / 可用工具
    ToolInfoQuery,
    /// 可凭少量示例快速回答的知识问题（推荐、简单比较）
    KnowledgeQueryIcl,
    /// 需要查本地知识库的问题
    KnowledgeQueryRag,
    /// 需要多步工具调用的复杂请求
    ComplexTask,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::GeneralChat,
        Intent::ToolInfoQuery,
        Intent::KnowledgeQueryIcl,
        Intent::KnowledgeQueryRag,
        Intent::ComplexTask,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::GeneralChat => "general_chat",
            Intent::ToolInfoQuery => "tool_info_query",
            Intent::KnowledgeQueryIcl => "knowledge_query_icl",
            Intent::KnowledgeQueryRag => "knowledge_query_rag",
            Intent::ComplexTask => "complex_task",
        }
    }

    /// 解析模型输出的标签；容忍引号、反引号、粗体标记和前后说明文字
    pub fn from_label(label: &str) -> Option<Self> {
        let cleaned = label
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '.' | '。'))
            .trim()
            .to_lowercase();
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str() == cleaned)
            .or_else(|| {
                Self::ALL
                    .into_iter()
                    .find(|intent| cleaned.contains(intent.as_str()))
            })
    }

    /// 知识类意图对应的单一工具
    pub fn knowledge_tool(&self) -> Option<&'static str> {
        match self {
            Intent::KnowledgeQueryIcl => Some("in_context_learning_search"),
            Intent::KnowledgeQueryRag => Some("rag_query"),
            _ => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 意图识别器
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, user_input: &str) -> Result<Intent, AgentError> {
        let messages = [
            Message::system(CLASSIFY_PROMPT),
            Message::user(user_input),
        ];
        let reply = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::LlmError)?;
        let intent = Intent::from_label(&reply).unwrap_or_else(|| {
            warn!(label = %reply.trim(), "unknown intent label, falling back to complex_task");
            Intent::ComplexTask
        });
        info!(intent = %intent, "intent classified");
        Ok(intent)
    }
}

const CLASSIFY_PROMPT: &str = "将用户的最新指令归入以下意图之一，只输出类别名称：\n\
general_chat: 闲聊、问候\n\
tool_info_query: 询问能力或可用工具\n\
knowledge_query_icl: 推荐、简单比较等可快速回答的知识问题\n\
knowledge_query_rag: 需要查本地知识库的问题\n\
complex_task: 需要多个步骤、调用工具才能完成的请求";
