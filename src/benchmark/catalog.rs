use crate::inference::HardwareCapabilities;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Could not open catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid catalog {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One downloadable model file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuantizedModelInfo {
    #[serde(rename = "modelID", default)]
    pub model_id: String,
    /// File name, or a path relative to the models directory
    #[serde(rename = "fileName", default)]
    pub file_name: String,
    #[serde(rename = "lastModified", default)]
    pub last_modified: String,
    #[serde(default = "default_quantization")]
    pub quantization: String,
    /// Size in bytes; 0 when unknown
    #[serde(rename = "fileSize", default)]
    pub file_size: u64,
}

fn default_quantization() -> String {
    "unknown".to_string()
}

impl QuantizedModelInfo {
    pub fn new(model_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            file_name: file_name.into(),
            last_modified: String::new(),
            quantization: default_quantization(),
            file_size: 0,
        }
    }

    pub fn with_quantization(mut self, quantization: impl Into<String>) -> Self {
        self.quantization = quantization.into();
        self
    }

    pub fn with_file_size(mut self, file_size: u64) -> Self {
        self.file_size = file_size;
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.model_id.is_empty() && !self.file_name.is_empty()
    }

    /// Joins a relative file name onto `base_dir`; absolute names and a
    /// missing base are returned as-is
    pub fn resolve_path(&self, base_dir: Option<&Path>) -> PathBuf {
        let file = Path::new(&self.file_name);
        match base_dir {
            Some(base) if file.is_relative() => base.join(file),
            _ => file.to_path_buf(),
        }
    }

    /// Whether the weights fit into currently available RAM. Unknown sizes
    /// are assumed to fit.
    pub fn fits_in_memory(&self, capabilities: &HardwareCapabilities) -> bool {
        self.file_size == 0 || self.file_size <= capabilities.available_ram_bytes
    }
}

impl fmt::Display for QuantizedModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QuantizedModelInfo(modelId={}, fileName={}, lastModified={}, quantization={}, fileSize={})",
            self.model_id, self.file_name, self.last_modified, self.quantization, self.file_size
        )
    }
}

/// Reads a JSON catalog: either an array of records or an object whose
/// values are records. Malformed records and records without a model id or
/// file name are skipped with a warning; only unreadable files and invalid
/// JSON fail the whole catalog.
pub fn load_catalog(path: &Path) -> Result<Vec<QuantizedModelInfo>, CatalogError> {
    let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|source| CatalogError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let records: Vec<serde_json::Value> = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        other => vec![other],
    };

    let mut models = Vec::with_capacity(records.len());
    for record in records {
        let info: QuantizedModelInfo = match serde_json::from_value(record) {
            Ok(info) => info,
            Err(e) => {
                warn!("Skipping malformed catalog entry in {}: {}", path.display(), e);
                continue;
            }
        };
        if info.is_valid() {
            models.push(info);
        } else {
            warn!("Skipping catalog entry without model id or file name: {}", info);
        }
    }

    info!("Loaded {} models from {}", models.len(), path.display());
    debug!("Catalog: {:?}", models);
    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn caps(available: u64) -> HardwareCapabilities {
        HardwareCapabilities {
            total_ram_bytes: available * 2,
            available_ram_bytes: available,
            cuda_available: false,
            metal_available: false,
            cpu_cores: 4,
            cpu_brand: None,
        }
    }

    #[test]
    fn test_validity() {
        assert!(QuantizedModelInfo::new("id", "m.gguf").is_valid());
        assert!(!QuantizedModelInfo::new("", "m.gguf").is_valid());
        assert!(!QuantizedModelInfo::new("id", "").is_valid());
    }

    #[test]
    fn test_resolve_path() {
        let info = QuantizedModelInfo::new("id", "llama/q4.gguf");
        assert_eq!(
            info.resolve_path(Some(Path::new("/models"))),
            PathBuf::from("/models/llama/q4.gguf")
        );
        assert_eq!(info.resolve_path(None), PathBuf::from("llama/q4.gguf"));

        let absolute = QuantizedModelInfo::new("id", "/abs/q4.gguf");
        assert_eq!(
            absolute.resolve_path(Some(Path::new("/models"))),
            PathBuf::from("/abs/q4.gguf")
        );
    }

    #[test]
    fn test_fits_in_memory() {
        let info = QuantizedModelInfo::new("id", "m.gguf").with_file_size(4_000);
        assert!(info.fits_in_memory(&caps(8_000)));
        assert!(!info.fits_in_memory(&caps(2_000)));
        assert!(QuantizedModelInfo::new("id", "m.gguf").fits_in_memory(&caps(0)));
    }

    #[test]
    fn test_display() {
        let info = QuantizedModelInfo::new("tiny", "tiny.gguf").with_quantization("Q4_K_M");
        assert_eq!(
            info.to_string(),
            "QuantizedModelInfo(modelId=tiny, fileName=tiny.gguf, lastModified=, quantization=Q4_K_M, fileSize=0)"
        );
    }

    #[test]
    fn test_load_catalog_object_form() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models.json");
        std::fs::write(
            &path,
            r#"{
                "a": {"modelID": "org/a", "fileName": "a.gguf", "quantization": "Q8_0", "fileSize": 10},
                "b": {"modelID": "", "fileName": "b.gguf"}
            }"#,
        )
        .unwrap();

        let models = load_catalog(&path).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].model_id, "org/a");
        assert_eq!(models[0].file_size, 10);
    }

    #[test]
    fn test_load_catalog_array_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models.json");
        std::fs::write(&path, r#"[{"modelID": "x", "fileName": "x.gguf"}]"#).unwrap();

        let models = load_catalog(&path).unwrap();
        assert_eq!(models[0].quantization, "unknown");
    }

    #[test]
    fn test_load_catalog_skips_malformed_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models.json");
        std::fs::write(
            &path,
            r#"[
                {"modelID": "good", "fileName": "good.gguf"},
                {"modelID": "bad", "fileName": "bad.gguf", "fileSize": "large"},
                "not a record"
            ]"#,
        )
        .unwrap();

        let models = load_catalog(&path).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].model_id, "good");
    }

    #[test]
    fn test_load_catalog_errors() {
        assert!(matches!(
            load_catalog(Path::new("/nonexistent/models.json")),
            Err(CatalogError::Io { .. })
        ));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_catalog(&path), Err(CatalogError::Parse { .. })));
    }
}
