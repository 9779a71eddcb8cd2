//! 结果提取与清单

pub mod extractor;
pub mod manifest;

pub use extractor::ResultExtractor;
pub use manifest::{
    FileArtifact, FileKind, ManifestRules, PoiImages, ResultManifest, RouteSummary, SearchImages,
};
