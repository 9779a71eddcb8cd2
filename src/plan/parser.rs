//! 从 LLM 输出文本中提取计划
//!
//! 模型常把计划包在 Markdown 代码块里、夹带注释或尾逗号。这里依次：去掉代码块标记 →
//! 去掉字符串外的注释 → 截取第一个 `[` 到最后一个 `]` → 去掉尾逗号与字符串内的控制字符 → 解析 JSON → 结构校验。

use serde_json::Value;
use tracing::{debug, warn};

use crate::plan::{Plan, PlanParseError, PlanValidator};

/// 解析 LLM 输出的计划文本并做结构校验
pub fn parse_plan_text(text: &str) -> Result<Plan, PlanParseError> {
    let value = extract_plan_json(text)?;
    PlanValidator::new().validate(&value)
}

/// 只做提取与 JSON 解析，不做步骤校验
pub fn extract_plan_json(text: &str) -> Result<Value, PlanParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PlanParseError::NoJson);
    }

    let uncommented = strip_comments(&strip_code_fences(trimmed));
    let (start, end) = match (uncommented.find('['), uncommented.rfind(']')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ if uncommented.contains('{') => return Err(PlanParseError::NotAnArray("object")),
        _ => {
            warn!(preview = %preview(trimmed), "no JSON array in planner output");
            return Err(PlanParseError::NoJson);
        }
    };

    let cleaned = fix_common_errors(&uncommented[start..=end]);
    let value: Value = serde_json::from_str(&cleaned).map_err(|e| {
        warn!(error = %e, preview = %preview(&cleaned), "planner output is not valid JSON");
        PlanParseError::Malformed(e.to_string())
    })?;
    debug!(steps = value.as_array().map(Vec::len), "plan JSON extracted");
    Ok(value)
}

/// 去掉 ``` 与 ```json 等代码块标记，保留其中内容
fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("```") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 3..];
        let tag_len: usize = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .map(char::len_utf8)
            .sum();
        rest = &rest[tag_len..];
    }
    out.push_str(rest);
    out
}

/// 字符串字面量的扫描状态
#[derive(Default)]
struct StringState {
    in_string: bool,
    escaped: bool,
}

impl StringState {
    /// 处理一个字符；返回 true 表示该字符属于字符串字面量（含引号本身）
    fn step(&mut self, c: char) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == '"' {
                self.in_string = false;
            }
            true
        } else if c == '"' {
            self.in_string = true;
            true
        } else {
            false
        }
    }
}

/// 去掉字符串外的 `//` 行注释与 `/* */` 块注释（行注释后的换行保留）
fn strip_comments(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut state = StringState::default();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if state.step(c) {
            out.push(c);
            i += 1;
            continue;
        }
        match (c, chars.get(i + 1)) {
            ('/', Some('/')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// 字符串外去掉 `]`/`}` 前的尾逗号；字符串内换行与制表符替换为空格，其余控制字符丢弃
fn fix_common_errors(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut state = StringState::default();

    for (i, &c) in chars.iter().enumerate() {
        let opens = !state.in_string;
        if state.step(c) {
            if opens || c == '"' || !c.is_control() {
                out.push(c);
            } else if matches!(c, '\n' | '\r' | '\t') {
                out.push(' ');
            }
            continue;
        }
        if c == ',' {
            let next = chars[i + 1..].iter().copied().find(|n| !n.is_whitespace());
            if matches!(next, Some(']') | Some('}')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn preview(text: &str) -> String {
    if text.chars().count() > 200 {
        format!("{}...", text.chars().take(200).collect::<String>())
    } else {
        text.to_string()
    }
}
