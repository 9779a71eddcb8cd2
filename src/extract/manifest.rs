//! 结果清单：执行结束后从步骤输出中提取的产物引用
//!
//! 清单只是交给合成阶段的附加元数据，不影响引擎状态，也不修改已记录的结果。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 文件产物类别（按扩展名判断）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Html,
    Pdf,
    Spreadsheet,
    Document,
}

impl FileKind {
    pub fn from_path(path: &str) -> Self {
        let lower = path.to_lowercase();
        if lower.contains(".html") {
            FileKind::Html
        } else if lower.contains(".pdf") {
            FileKind::Pdf
        } else if lower.contains(".xlsx") || lower.contains(".xls") {
            FileKind::Spreadsheet
        } else {
            FileKind::Document
        }
    }

    /// 附件链接中显示的名称
    pub fn label(&self) -> &'static str {
        match self {
            FileKind::Html => "HTML文档",
            FileKind::Pdf => "PDF文档",
            FileKind::Spreadsheet => "Excel表格",
            FileKind::Document => "行程文档",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileArtifact {
    pub kind: FileKind,
    pub path: String,
}

/// 路线摘要：距离（公里，一位小数）与时长（分钟），取自第一条路径
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_min: Option<f64>,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchImages {
    pub query: String,
    pub image_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiImages {
    pub poi: String,
    pub urls: Vec<String>,
}

/// 按类别组织的产物清单，每次执行结束后重新构建，不持久化
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultManifest {
    pub weather: Vec<Value>,
    pub files: Vec<FileArtifact>,
    pub maps: Vec<String>,
    pub routes: Vec<RouteSummary>,
    pub pois: Vec<Value>,
    pub images: Vec<String>,
    pub search_images: Vec<SearchImages>,
    pub poi_images: Vec<PoiImages>,
}

impl ResultManifest {
    pub fn is_empty(&self) -> bool {
        self.weather.is_empty()
            && self.files.is_empty()
            && self.maps.is_empty()
            && self.routes.is_empty()
            && self.pois.is_empty()
            && self.images.is_empty()
            && self.search_images.is_empty()
            && self.poi_images.is_empty()
    }
}

/// 提取规则：哪些工具属于哪一类，以及各类的数量上限（可由配置 [manifest] 覆盖）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestRules {
    pub weather_tools: Vec<String>,
    pub file_tools: Vec<String>,
    pub map_tools: Vec<String>,
    pub poi_tools: Vec<String>,
    pub search_tools: Vec<String>,
    /// 工具名包含其中任一关键字即视为路线类工具
    pub route_keywords: Vec<String>,
    pub max_pois_per_step: usize,
    pub max_images_per_search: usize,
    pub max_images_per_text: usize,
}

impl Default for ManifestRules {
    fn default() -> Self {
        Self {
            weather_tools: default_weather_tools(),
            file_tools: default_file_tools(),
            map_tools: default_map_tools(),
            poi_tools: default_poi_tools(),
            search_tools: default_search_tools(),
            route_keywords: default_route_keywords(),
            max_pois_per_step: 5,
            max_images_per_search: 5,
            max_images_per_text: 3,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_weather_tools() -> Vec<String> {
    strings(&["maps_weather"])
}

fn default_file_tools() -> Vec<String> {
    strings(&["file_tool"])
}

fn default_map_tools() -> Vec<String> {
    strings(&["visualization_tool"])
}

fn default_poi_tools() -> Vec<String> {
    strings(&["maps_text_search", "maps_around_search"])
}

fn default_search_tools() -> Vec<String> {
    strings(&["web_search"])
}

fn default_route_keywords() -> Vec<String> {
    strings(&["direction", "route"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind_by_extension() {
        assert_eq!(FileKind::from_path("/tmp/trip.HTML"), FileKind::Html);
        assert_eq!(FileKind::from_path("out/plan.pdf"), FileKind::Pdf);
        assert_eq!(FileKind::from_path("budget.xls"), FileKind::Spreadsheet);
        assert_eq!(FileKind::from_path("notes.docx"), FileKind::Document);
    }

    #[test]
    fn test_rules_partial_override() {
        let rules: ManifestRules =
            serde_json::from_str(r#"{"max_pois_per_step": 2, "file_tools": ["doc_writer"]}"#)
                .unwrap();
        assert_eq!(rules.max_pois_per_step, 2);
        assert_eq!(rules.file_tools, vec!["doc_writer"]);
        assert_eq!(rules.weather_tools, vec!["maps_weather"]);
    }
}
