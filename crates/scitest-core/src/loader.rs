//! Generic file loader: YAML or JSON into the nested data tree and back.

use std::path::Path;

use crate::error::{HarnessError, Result};
use crate::value::Data;

/// File extensions the loader understands.
pub const DATA_EXTENSIONS: [&str; 3] = ["yml", "yaml", "json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "yml" | "yaml" => Some(Format::Yaml),
            "json" => Some(Format::Json),
            _ => None,
        }
    }

    pub fn parse(&self, text: &str) -> std::result::Result<Data, String> {
        match self {
            Format::Yaml if text.trim().is_empty() => Ok(Data::Null),
            Format::Yaml => serde_yaml::from_str::<Data>(text).map_err(|e| e.to_string()),
            Format::Json => serde_json::from_str::<Data>(text).map_err(|e| e.to_string()),
        }
    }

    pub fn render(&self, data: &Data) -> std::result::Result<String, String> {
        match self {
            Format::Yaml => serde_yaml::to_string(data).map_err(|e| e.to_string()),
            Format::Json => serde_json::to_string_pretty(data)
                .map(|s| s + "\n")
                .map_err(|e| e.to_string()),
        }
    }
}

/// Reads and writes nested data files.
pub trait DataLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Data>;

    fn dump(&self, data: &Data, path: &Path) -> Result<()>;
}

/// [`DataLoader`] over the local filesystem, format chosen by extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl FileLoader {
    fn format(path: &Path) -> Result<Format> {
        Format::from_path(path).ok_or_else(|| HarnessError::Parse {
            path: path.display().to_string(),
            reason: "unrecognized file type (expected .yml, .yaml or .json)".to_string(),
        })
    }
}

impl DataLoader for FileLoader {
    fn load(&self, path: &Path) -> Result<Data> {
        let format = Self::format(path)?;
        let text = std::fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
        format.parse(&text).map_err(|reason| HarnessError::Parse {
            path: path.display().to_string(),
            reason,
        })
    }

    fn dump(&self, data: &Data, path: &Path) -> Result<()> {
        let format = Self::format(path)?;
        let text = format.render(data).map_err(|reason| HarnessError::Parse {
            path: path.display().to_string(),
            reason,
        })?;
        std::fs::write(path, text).map_err(|e| HarnessError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_yaml_and_json_agree() {
        let dir = tempfile::tempdir().unwrap();
        let data = json!({"queries": [{"query-name": "a", "properties": {"abs_tol": 0.5, "n": 3}}]});
        for name in ["x.yml", "x.json"] {
            let path = dir.path().join(name);
            FileLoader.dump(&data, &path).unwrap();
            assert_eq!(FileLoader.load(&path).unwrap(), data);
        }
    }

    #[test]
    fn test_empty_yaml_is_null() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("query-empty.yml");
        std::fs::write(&path, "").unwrap();
        assert_eq!(FileLoader.load(&path).unwrap(), Data::Null);
    }

    #[test]
    fn test_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileLoader.load(&path).unwrap_err(),
            HarnessError::Parse { .. }
        ));
        assert!(matches!(
            FileLoader.load(&dir.path().join("x.toml")).unwrap_err(),
            HarnessError::Parse { .. }
        ));
    }
}
