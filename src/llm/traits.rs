//! LLM 客户端抽象
//!
//! 意图识别、计划生成、结果合成都通过 LlmClient 调用外部模型；具体后端不在本 crate 内。

use async_trait::async_trait;

use crate::llm::Message;

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;
}
