//! 结果提取：按工具名把步骤输出归类进 ResultManifest
//!
//! 尽力而为且保持顺序：payload 中缺少预期字段不是错误，直接略过。
//! 只扫描成功的步骤；以「错误」/「Error」开头的字符串结果视为错误形态，不产出任何条目。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use crate::context::StepResult;
use crate::extract::{
    FileArtifact, FileKind, ManifestRules, PoiImages, ResultManifest, RouteSummary, SearchImages,
};
use crate::plan::TaskStep;

static IMAGE_URL_RE: OnceLock<Regex> = OnceLock::new();

fn image_url_re() -> &'static Regex {
    IMAGE_URL_RE.get_or_init(|| {
        Regex::new(r#"https?://[^\s<>"]+?\.(?:jpg|jpeg|png|gif|webp)"#)
            .expect("image url pattern is valid")
    })
}

#[derive(Debug, Clone, Default)]
pub struct ResultExtractor {
    rules: ManifestRules,
}

impl ResultExtractor {
    pub fn new(rules: ManifestRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ManifestRules {
        &self.rules
    }

    /// 从有序的 (步骤, 结果) 对构建清单
    pub fn extract<'a, I>(&self, pairs: I) -> ResultManifest
    where
        I: IntoIterator<Item = (&'a TaskStep, &'a StepResult)>,
    {
        let mut manifest = ResultManifest::default();
        for (step, result) in pairs {
            if !result.success {
                debug!(tool = %step.tool_name, "skipping failed step");
                continue;
            }
            if is_error_shaped(&result.payload) {
                debug!(tool = %step.tool_name, "skipping error-shaped payload");
                continue;
            }
            self.extract_one(step, &result.payload, &mut manifest);
        }
        bind_poi_images(&mut manifest);
        info!(
            files = manifest.files.len(),
            maps = manifest.maps.len(),
            routes = manifest.routes.len(),
            pois = manifest.pois.len(),
            images = manifest.images.len(),
            "manifest built"
        );
        manifest
    }

    fn extract_one(&self, step: &TaskStep, payload: &Value, manifest: &mut ResultManifest) {
        let tool = step.tool_name.as_str();
        let rules = &self.rules;

        if listed(&rules.weather_tools, tool) {
            if let Some(forecasts) = payload.get("forecasts").and_then(Value::as_array) {
                manifest.weather.extend(forecasts.iter().cloned());
            }
        } else if listed(&rules.file_tools, tool) {
            if let Some(path) = payload.as_str().filter(|p| !p.trim().is_empty()) {
                manifest.files.push(FileArtifact {
                    kind: FileKind::from_path(path),
                    path: path.to_string(),
                });
            }
        } else if listed(&rules.map_tools, tool) {
            if let Some(path) = payload.as_str().filter(|p| p.ends_with(".html")) {
                manifest.maps.push(path.to_string());
            }
        } else if rules.route_keywords.iter().any(|k| tool.contains(k.as_str())) {
            if payload.get("paths").is_some() || payload.get("route").is_some() {
                manifest.routes.push(route_summary(tool, payload));
            }
        } else if listed(&rules.poi_tools, tool) {
            if let Some(pois) = payload.get("pois").and_then(Value::as_array) {
                manifest
                    .pois
                    .extend(pois.iter().take(rules.max_pois_per_step).cloned());
            }
        } else if listed(&rules.search_tools, tool) {
            match payload {
                Value::Object(_) => {
                    let urls: Vec<String> = payload
                        .get("image_urls")
                        .and_then(Value::as_array)
                        .map(|items| {
                            items
                                .iter()
                                .take(rules.max_images_per_search)
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default();
                    if urls.is_empty() {
                        return;
                    }
                    manifest.images.extend(urls.iter().cloned());
                    let query = step
                        .parameters
                        .get("query")
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    if !query.is_empty() {
                        manifest.search_images.push(SearchImages {
                            query: query.to_string(),
                            image_urls: urls,
                        });
                    }
                }
                Value::String(text) => {
                    manifest.images.extend(
                        image_url_re()
                            .find_iter(text)
                            .take(rules.max_images_per_text)
                            .map(|m| m.as_str().to_string()),
                    );
                }
                _ => {}
            }
        }
    }
}

fn listed(names: &[String], tool: &str) -> bool {
    names.iter().any(|n| n == tool)
}

fn is_error_shaped(payload: &Value) -> bool {
    payload
        .as_str()
        .map(|s| {
            let s = s.trim_start();
            s.starts_with("错误") || s.starts_with("Error")
        })
        .unwrap_or(false)
}

/// 距离（米）转公里保留一位小数，时长（秒）转分钟取整；已有 distance_km / duration_min 时直接使用
fn route_summary(tool: &str, payload: &Value) -> RouteSummary {
    let first_path = payload
        .get("paths")
        .or_else(|| payload.get("route").and_then(|r| r.get("paths")))
        .and_then(Value::as_array)
        .and_then(|paths| paths.first());

    let distance_km = number(payload.get("distance_km")).or_else(|| {
        number(first_path.and_then(|p| p.get("distance")))
            .map(|m| (m / 1000.0 * 10.0).round() / 10.0)
    });
    let duration_min = number(payload.get("duration_min")).or_else(|| {
        number(first_path.and_then(|p| p.get("duration"))).map(|s| (s / 60.0).round())
    });

    RouteSummary {
        tool: tool.to_string(),
        distance_km,
        duration_min,
        data: payload.clone(),
    }
}

/// 数字或数字字符串（地图服务常把数值放在字符串里）
fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 搜索查询与 POI 名称互相包含（忽略大小写）时，把该查询的图片绑定到该 POI
fn bind_poi_images(manifest: &mut ResultManifest) {
    let names: Vec<String> = manifest
        .pois
        .iter()
        .filter_map(|poi| poi.get("name").or_else(|| poi.get("title")))
        .filter_map(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        return;
    }

    for pair in &manifest.search_images {
        let query = pair.query.to_lowercase();
        let Some(target) = names.iter().find(|name| {
            let name = name.to_lowercase();
            name.contains(&query) || query.contains(&name)
        }) else {
            continue;
        };
        let index = match manifest.poi_images.iter().position(|b| &b.poi == target) {
            Some(index) => index,
            None => {
                manifest.poi_images.push(PoiImages {
                    poi: target.clone(),
                    urls: Vec::new(),
                });
                manifest.poi_images.len() - 1
            }
        };
        let bucket = &mut manifest.poi_images[index].urls;
        for url in &pair.image_urls {
            if !bucket.contains(url) {
                bucket.push(url.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StepFailure;
    use serde_json::{json, Map};

    fn step(tool: &str, params: Value) -> TaskStep {
        let parameters = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        TaskStep::new(format!("run {tool}"), tool, parameters)
    }

    fn extract(pairs: Vec<(TaskStep, StepResult)>) -> ResultManifest {
        ResultExtractor::default().extract(pairs.iter().map(|(s, r)| (s, r)))
    }

    #[test]
    fn test_categories_by_tool_name() {
        let manifest = extract(vec![
            (
                step("maps_weather", json!({"city": "北京"})),
                StepResult::success(json!({"forecasts": [{"date": "2024-05-01"}, {"date": "2024-05-02"}]})),
            ),
            (
                step("file_tool", json!({})),
                StepResult::success(json!("/output/trip.pdf")),
            ),
            (
                step("visualization_tool", json!({})),
                StepResult::success(json!("/output/map_1.html")),
            ),
            (
                step("maps_direction_driving", json!({})),
                StepResult::success(json!({"paths": [{"distance": "12345", "duration": "1830"}]})),
            ),
        ]);
        assert_eq!(manifest.weather.len(), 2);
        assert_eq!(manifest.files[0].kind, FileKind::Pdf);
        assert_eq!(manifest.maps, vec!["/output/map_1.html"]);
        assert_eq!(manifest.routes[0].distance_km, Some(12.3));
        assert_eq!(manifest.routes[0].duration_min, Some(31.0));
    }

    #[test]
    fn test_pois_are_capped_per_step() {
        let pois: Vec<Value> = (0..8).map(|i| json!({"name": format!("poi{i}")})).collect();
        let manifest = extract(vec![(
            step("maps_text_search", json!({"keywords": "景点"})),
            StepResult::success(json!({ "pois": pois })),
        )]);
        assert_eq!(manifest.pois.len(), 5);
        assert_eq!(manifest.pois[0]["name"], "poi0");
    }

    #[test]
    fn test_failed_and_error_shaped_results_are_skipped() {
        let manifest = extract(vec![
            (
                step("file_tool", json!({})),
                StepResult::success(json!("错误：磁盘已满")),
            ),
            (
                step("visualization_tool", json!({})),
                StepResult::success(json!("Error: renderer unavailable.html")),
            ),
            (
                step("maps_weather", json!({})),
                StepResult::failure(StepFailure::ToolExecution {
                    tool: "maps_weather".into(),
                    cause: "timeout".into(),
                }),
            ),
        ]);
        assert!(manifest.is_empty());
    }

    #[test]
    fn test_search_images_bind_to_pois() {
        let manifest = extract(vec![
            (
                step("maps_text_search", json!({})),
                StepResult::success(json!({"pois": [{"name": "故宫博物院"}, {"name": "Summer Palace"}]})),
            ),
            (
                step("web_search", json!({"query": "故宫"})),
                StepResult::success(json!({"image_urls": ["https://img/a.jpg", "https://img/b.jpg"]})),
            ),
            (
                step("web_search", json!({"query": "summer palace photos"})),
                StepResult::success(json!({"image_urls": ["https://img/c.png"]})),
            ),
            (
                step("web_search", json!({"query": "天气"})),
                StepResult::success(json!({"image_urls": ["https://img/d.png"]})),
            ),
        ]);
        assert_eq!(manifest.images.len(), 4);
        assert_eq!(manifest.search_images.len(), 3);
        assert_eq!(
            manifest.poi_images,
            vec![
                PoiImages {
                    poi: "故宫博物院".into(),
                    urls: vec!["https://img/a.jpg".into(), "https://img/b.jpg".into()]
                },
                PoiImages {
                    poi: "Summer Palace".into(),
                    urls: vec!["https://img/c.png".into()]
                }
            ]
        );
    }

    #[test]
    fn test_image_urls_from_text_results() {
        let text = "见 https://a.com/1.jpg 与 https://a.com/2.png、https://a.com/3.gif 以及 https://a.com/4.webp";
        let manifest = extract(vec![(
            step("web_search", json!({"query": "x"})),
            StepResult::success(json!(text)),
        )]);
        assert_eq!(
            manifest.images,
            vec!["https://a.com/1.jpg", "https://a.com/2.png", "https://a.com/3.gif"]
        );
        assert!(manifest.search_images.is_empty());
    }
}
