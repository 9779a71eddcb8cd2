//! StepContext：单次计划执行内的步骤结果存储与占位符解析
//!
//! 解析是 `(parameters, 结果快照, current_step)` 的纯函数：
//! - 引用当前或之后的步骤 → ForwardReference，整步失败
//! - 表达式含语法外结构 → UnsupportedExpression，整步失败
//! - 步骤结果缺失、路径走不通 → 替换为空字符串并记一条 ResolveWarning，其余参数照常解析

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::context::expr::{Accessor, Placeholder, Segment, Template};
use crate::context::{ResolveError, ResolveWarning, StepResult};
use crate::plan::validator::json_type;

/// 高亮字段：记录结果时顺手抽取，供摘要 / 合成使用
const HIGHLIGHT_FIELDS: [(&str, &str); 4] = [
    ("location", "location"),
    ("formatted_address", "address"),
    ("distance", "distance"),
    ("duration", "duration"),
];

/// 解析后的参数与过程中产生的告警
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub parameters: Map<String, Value>,
    pub warnings: Vec<ResolveWarning>,
}

/// 每次计划执行独占一个实例，不跨执行共享
#[derive(Debug, Default, Clone)]
pub struct StepContext {
    results: Vec<StepResult>,
    highlights: Map<String, Value>,
}

impl StepContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加下一步的结果，返回其步骤索引
    pub fn record(&mut self, result: StepResult) -> usize {
        let index = self.results.len();
        if let (true, Value::Object(fields)) = (result.success, &result.payload) {
            for (field, label) in HIGHLIGHT_FIELDS {
                if let Some(value) = fields.get(field) {
                    self.highlights
                        .insert(format!("step_{index}_{label}"), value.clone());
                }
            }
        }
        debug!(step = index, success = result.success, payload = %preview(&result.payload), "step result recorded");
        self.results.push(result);
        index
    }

    pub fn get(&self, step: usize) -> Option<&StepResult> {
        self.results.get(step)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    /// 例如 `step_0_location`、`step_2_distance`
    pub fn highlights(&self) -> &Map<String, Value> {
        &self.highlights
    }

    /// 解析第 `current_step` 步的参数：递归进入映射与序列，只替换字符串中的占位符
    pub fn resolve(
        &self,
        parameters: &Map<String, Value>,
        current_step: usize,
    ) -> Result<Resolution, ResolveError> {
        let mut warnings = Vec::new();
        let parameters = self
            .resolve_map(parameters, current_step, &mut warnings)
            .inspect_err(|e| error!(step = current_step, error = %e, "parameter resolution failed"))?;
        info!(
            step = current_step,
            warnings = warnings.len(),
            "parameters resolved"
        );
        Ok(Resolution {
            parameters,
            warnings,
        })
    }

    fn resolve_map(
        &self,
        map: &Map<String, Value>,
        current_step: usize,
        warnings: &mut Vec<ResolveWarning>,
    ) -> Result<Map<String, Value>, ResolveError> {
        map.iter()
            .map(|(key, value)| {
                Ok((
                    key.clone(),
                    self.resolve_value(value, current_step, warnings)?,
                ))
            })
            .collect()
    }

    fn resolve_value(
        &self,
        value: &Value,
        current_step: usize,
        warnings: &mut Vec<ResolveWarning>,
    ) -> Result<Value, ResolveError> {
        Ok(match value {
            Value::String(text) => Value::String(self.resolve_text(text, current_step, warnings)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.resolve_value(item, current_step, warnings))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => Value::Object(self.resolve_map(map, current_step, warnings)?),
            other => other.clone(),
        })
    }

    fn resolve_text(
        &self,
        text: &str,
        current_step: usize,
        warnings: &mut Vec<ResolveWarning>,
    ) -> Result<String, ResolveError> {
        let template = Template::parse(text)?;
        if !template.has_placeholders() {
            return Ok(text.to_string());
        }
        let mut out = String::with_capacity(text.len());
        for segment in template.segments() {
            match segment {
                Segment::Literal(literal) => out.push_str(literal),
                Segment::Placeholder(placeholder) => {
                    out.push_str(&self.lookup(placeholder, current_step, warnings)?)
                }
            }
        }
        Ok(out)
    }

    fn lookup(
        &self,
        placeholder: &Placeholder,
        current_step: usize,
        warnings: &mut Vec<ResolveWarning>,
    ) -> Result<String, ResolveError> {
        if placeholder.step >= current_step {
            error!(
                step = current_step,
                referenced = placeholder.step,
                "placeholder references the current or a later step"
            );
            return Err(ResolveError::ForwardReference {
                current: current_step,
                referenced: placeholder.step,
            });
        }

        let Some(result) = self.results.get(placeholder.step) else {
            warn!(
                step = current_step,
                referenced = placeholder.step,
                recorded = self.results.len(),
                "referenced step has no recorded result, substituting empty string"
            );
            warnings.push(ResolveWarning::MissingStepResult {
                step: placeholder.step,
            });
            return Ok(String::new());
        };

        let aliased = alias_root(&result.payload, placeholder.path.first());
        let root = aliased.as_ref().unwrap_or(&result.payload);
        match walk(root, &placeholder.path) {
            Ok(value) => {
                let text = render(value);
                debug!(expression = %placeholder, value = %text, "placeholder resolved");
                Ok(text)
            }
            Err(reason) => {
                warn!(expression = %placeholder, %reason, "placeholder unresolved, substituting empty string");
                warnings.push(ResolveWarning::UnresolvedPath {
                    expression: placeholder.to_string(),
                    reason,
                });
                Ok(String::new())
            }
        }
    }
}

/// 按路径逐段取值；失败时返回原因
fn walk<'v>(root: &'v Value, path: &[Accessor]) -> Result<&'v Value, String> {
    let mut current = root;
    for (depth, accessor) in path.iter().enumerate() {
        current = match (accessor, current) {
            (Accessor::Field(key), Value::Object(map)) => map.get(key).ok_or_else(|| {
                let keys: Vec<&str> = map.keys().take(5).map(String::as_str).collect();
                let more = if map.len() > 5 { ", ..." } else { "" };
                format!("key `{key}` not found (available: {}{more})", keys.join(", "))
            })?,
            (Accessor::Index(i), Value::Array(items)) => items
                .get(*i)
                .ok_or_else(|| format!("index {i} out of range (length {})", items.len()))?,
            (Accessor::Field(key), other) => {
                return Err(format!("cannot read field `{key}` of a {}", json_type(other)))
            }
            (Accessor::Index(i), other) => {
                return Err(format!("cannot index a {} with [{i}]", json_type(other)))
            }
        };
        if current.is_null() {
            return Err(format!("value is null at segment {}", depth + 1));
        }
    }
    Ok(current)
}

/// 单条结果被当成列表引用时的兼容映射：
/// `results` ← 顶层 `pois` 或单条地点记录，`paths` ← 顶层 `routes` 或单条路线，`pois` ← 顶层 `results`
fn alias_root(payload: &Value, first: Option<&Accessor>) -> Option<Value> {
    let (Some(Accessor::Field(key)), Value::Object(map)) = (first, payload) else {
        return None;
    };
    if map.contains_key(key) {
        return None;
    }
    let list_of = |name: &str| map.get(name).filter(|v| v.is_array()).cloned();
    let has_any = |names: &[&str]| names.iter().any(|n| map.contains_key(*n));
    let single = || Value::Array(vec![payload.clone()]);

    let items = match key.as_str() {
        "results" => list_of("pois").or_else(|| {
            has_any(&["location", "formatted_address", "province", "city", "district"])
                .then(single)
        }),
        "paths" => list_of("routes")
            .or_else(|| has_any(&["steps", "distance", "duration"]).then(single)),
        "pois" => list_of("results"),
        _ => None,
    }?;
    debug!(root = %key, "placeholder root aliased");
    let mut wrapped = Map::new();
    wrapped.insert(key.clone(), items);
    Some(Value::Object(wrapped))
}

/// 字符串原样输出，null 为空串，其余用 JSON 文本
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn preview(value: &Value) -> String {
    let text = render(value);
    if text.chars().count() > 100 {
        format!("{}...", text.chars().take(100).collect::<String>())
    } else {
        text
    }
}
