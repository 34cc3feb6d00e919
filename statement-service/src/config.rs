use serde::Deserialize;
use std::{fs, path::PathBuf};

/// Upload size limit carried over from the original web form (4 MiB).
const DEFAULT_MAX_BODY_BYTES: usize = 2048 * 2048;

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub http_bind_addr: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatementsConfig {
    /// Root under which each batch stages its statements directory.
    pub staging_root: PathBuf,
    pub template_path: PathBuf,
    /// Logo image path as the rendered document should reference it.
    pub logo_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub statements: StatementsConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("STATEMENT_CONFIG").unwrap_or_else(|_| "statement-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config {path}: {e}"))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_with_defaults() {
        let cfg = AppConfig::from_toml(
            r#"
            [server]
            http_bind_addr = "127.0.0.1:8080"

            [statements]
            staging_root = "tmp"
            template_path = "assets/statement_template.html"
            logo_path = "assets/logo.png"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.max_body_bytes, 4_194_304);
        assert_eq!(cfg.statements.staging_root, PathBuf::from("tmp"));
        assert!(cfg.metrics.is_none());
    }

    #[test]
    fn missing_statements_section_is_an_error() {
        assert!(AppConfig::from_toml("[server]\nhttp_bind_addr = \"0.0.0.0:1\"\n").is_err());
    }
}
