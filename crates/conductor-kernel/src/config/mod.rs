//! Multi-format configuration loader primitive (SPEC_FULL.md §A.3).
//!
//! Auto-detects TOML/YAML/JSON from a file extension and substitutes
//! `${VAR}`/`$VAR` environment-variable references before parsing. Only the
//! loader primitive ships here; configuration *sourcing* (CLI flags, XDG
//! paths) is out of scope (spec §1).

use config::{Config as Cfg, File, FileFormat};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parsing error: {0}")]
    Parse(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("config deserialization error: {0}")]
    Serialization(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Detect configuration format from a file extension.
///
/// Supports `.toml`, `.yaml`/`.yml`, `.json`.
pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("no file extension".to_string()))?;

    match ext.to_lowercase().as_str() {
        "toml" => Ok(FileFormat::Toml),
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "json" => Ok(FileFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Substitute `${VAR}` and `$VAR` references against the process
/// environment. References to unset variables are left untouched.
pub fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();

    let re_braced = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    result = re_braced
        .replace_all(&result, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .to_string();

    let re_simple = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").unwrap();
    result = re_simple
        .replace_all(&result, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .to_string();

    result
}

/// Load and deserialize a partial configuration document, to be layered
/// over a `Default::default()` value by the caller (see
/// `conductor-core::config::OrchestratorConfig::load`).
pub fn load_config<T: DeserializeOwned>(path: &str) -> ConfigResult<T> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    from_str(&content, format)
}

/// As [`load_config`] but from an in-memory string with an explicit format.
pub fn from_str<T: DeserializeOwned>(content: &str, format: FileFormat) -> ConfigResult<T> {
    let substituted = substitute_env_vars(content);

    let config = Cfg::builder()
        .add_source(File::from_str(&substituted, format))
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_format_recognises_supported_extensions() {
        assert_eq!(detect_format("a.toml").unwrap(), FileFormat::Toml);
        assert_eq!(detect_format("a.yaml").unwrap(), FileFormat::Yaml);
        assert_eq!(detect_format("a.yml").unwrap(), FileFormat::Yaml);
        assert_eq!(detect_format("a.json").unwrap(), FileFormat::Json);
        assert!(detect_format("a.xml").is_err());
        assert!(detect_format("noext").is_err());
    }

    #[test]
    fn substitute_env_vars_handles_both_syntaxes() {
        std::env::set_var("CONDUCTOR_TEST_VAR", "hello");
        assert_eq!(substitute_env_vars("${CONDUCTOR_TEST_VAR}"), "hello");
        assert_eq!(substitute_env_vars("$CONDUCTOR_TEST_VAR"), "hello");
        assert_eq!(substitute_env_vars("${CONDUCTOR_TEST_UNSET}"), "${CONDUCTOR_TEST_UNSET}");
    }

    #[test]
    fn from_str_toml_roundtrip() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Partial {
            max_concurrency: Option<usize>,
        }
        let cfg: Partial = from_str("max_concurrency = 5", FileFormat::Toml).unwrap();
        assert_eq!(cfg.max_concurrency, Some(5));
    }

    #[test]
    fn load_config_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conductor.toml");
        std::fs::write(&path, "max_concurrency = 3\n").unwrap();

        #[derive(serde::Deserialize, Debug)]
        struct Partial {
            max_concurrency: Option<usize>,
        }
        let cfg: Partial = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.max_concurrency, Some(3));
    }
}
