//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::BackendConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Toml(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Json(e) => write!(f, "Parse error: {}", e),
            ConfigError::Toml(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration.
///
/// `.toml` files are parsed as TOML, anything else as JSON.
pub fn load_config(path: &Path) -> Result<BackendConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    let config = parse_config(&content, is_toml)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn parse_config(content: &str, is_toml: bool) -> Result<BackendConfig, ConfigError> {
    if is_toml {
        toml::from_str(content).map_err(ConfigError::Toml)
    } else {
        serde_json::from_str(content).map_err(ConfigError::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_json_document() {
        let file = write_temp(".json", r#"{ "port": 3551, "Website": { "websiteport": 100 } }"#);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.port, 3551);
    }

    #[test]
    fn loads_toml_document() {
        let file = write_temp(
            ".toml",
            "port = 4000\nbEnableHTTPS = false\n\n[Website]\nbUseWebsite = true\nwebsiteport = 4001\n",
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.port, 4000);
        assert!(config.website.enabled);
        assert_eq!(config.website.port, 4001);
    }

    #[test]
    fn malformed_document_is_parse_error() {
        let file = write_temp(".json", "{ port: ");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Json(_))));
    }

    #[test]
    fn semantic_errors_are_reported() {
        let file = write_temp(".json", r#"{ "bEnableHTTPS": true }"#);
        match load_config(file.path()) {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = load_config(Path::new("/nonexistent/config.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
