//! 结果合成：把有序的步骤/结果对与清单交给 LLM 生成最终回复，再补上正文未提到的附件链接

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::core::AgentError;
use crate::engine::{ExecutionReport, PlanOutcome};
use crate::extract::ResultManifest;
use crate::llm::{LlmClient, Message};

/// 单个步骤结果在提示词中的最大字符数
const MAX_RESULT_CHARS: usize = 2000;
const MAX_INLINE_IMAGES: usize = 10;

pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub fn build_messages(&self, user_input: &str, report: &ExecutionReport) -> Vec<Message> {
        let mut body = format!("用户请求：{user_input}\n\n执行结果：\n");
        for (i, (step, result)) in report.step_results().enumerate() {
            let status = if result.success { "成功" } else { "失败" };
            body.push_str(&format!(
                "步骤 {}（{}，{status}）：{}\n结果：{}\n\n",
                i + 1,
                step.tool_name,
                step.goal,
                truncate(&render(&result.payload), MAX_RESULT_CHARS)
            ));
        }
        if let PlanOutcome::Degraded { failed_step, error } = &report.outcome {
            body.push_str(&format!(
                "注意：第 {} 步失败（{}），之后的步骤未执行，请基于已有结果尽量回答并说明缺失部分。\n\n",
                failed_step + 1,
                error.message
            ));
        }
        if let Some(manifest) = report.manifest.as_ref().filter(|m| !m.is_empty()) {
            let manifest_json =
                serde_json::to_string_pretty(manifest).unwrap_or_else(|_| "{}".to_string());
            body.push_str(&format!("提取的关键信息：\n{manifest_json}\n"));
        }

        vec![
            Message::system(
                "你是结果整合助手。根据各步骤的执行结果回答用户请求，使用 Markdown；\
                 引用文件、地图和图片时直接使用给出的路径或链接，不要编造数据。",
            ),
            Message::user(body),
        ]
    }

    pub async fn synthesize(
        &self,
        user_input: &str,
        report: &ExecutionReport,
    ) -> Result<String, AgentError> {
        let messages = self.build_messages(user_input, report);
        let body = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::LlmError)?;
        let text = match &report.manifest {
            Some(manifest) => append_attachments(&body, manifest),
            None => body,
        };
        info!(chars = text.chars().count(), "reply synthesized");
        Ok(text)
    }
}

/// 在正文后追加正文尚未包含的文件、地图与图片链接
pub fn append_attachments(body: &str, manifest: &ResultManifest) -> String {
    let mut sections: Vec<String> = Vec::new();

    let files: Vec<String> = manifest
        .files
        .iter()
        .filter(|f| !f.path.is_empty() && !body.contains(&f.path))
        .map(|f| format!("- [{}]({})\n", f.kind.label(), f.path))
        .collect();
    if !files.is_empty() {
        sections.push(format!("📄 **生成的文件**:\n\n{}", files.concat()));
    }

    let body_has_map = manifest.maps.iter().any(|m| body.contains(m.as_str()));
    if !body_has_map && !manifest.maps.is_empty() {
        let links: String = manifest
            .maps
            .iter()
            .enumerate()
            .map(|(i, path)| format!("- [打开地图 {}]({path})\n", i + 1))
            .collect();
        sections.push(format!("🗺️ **地图**:\n\n{links}"));
    }

    let body_has_image =
        body.contains("![") || manifest.images.iter().any(|u| body.contains(u.as_str()));
    if !body_has_image {
        let images: String = manifest
            .images
            .iter()
            .filter(|u| u.starts_with("http"))
            .take(MAX_INLINE_IMAGES)
            .enumerate()
            .map(|(i, url)| format!("![图片 {}]({url})\n", i + 1))
            .collect();
        if !images.is_empty() {
            sections.push(format!("🖼️ **图片预览**:\n\n{images}"));
        }
    }

    if sections.is_empty() {
        return body.to_string();
    }
    format!("{body}\n\n---\n\n{}", sections.join("\n"))
}

fn render(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|e| {
            warn!(error = %e, "failed to serialize step result");
            String::new()
        }),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}
