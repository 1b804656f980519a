use backup_reader::ReaderConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub reader: ReaderConfig,
}

fn default_port() -> u16 {
    8099
}

fn default_static_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("static")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let backup_dir = PathBuf::from(
            std::env::var("HABV_BACKUP_FOLDER").unwrap_or_else(|_| "/backup".into()),
        );
        let mut reader = match std::env::var("HABV_BACKUP_PASSWORD") {
            Ok(password) if !password.is_empty() => ReaderConfig::new(&backup_dir, password),
            _ => ReaderConfig::without_passwords(&backup_dir),
        };
        if let Some(workers) = std::env::var("HABV_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n: &usize| n > 0)
        {
            reader.workers = workers;
        }

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_port),
            static_dir: std::env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_static_dir()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| default_log_level()),
            reader,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.reader.validate()?;
        Ok(config)
    }
}
