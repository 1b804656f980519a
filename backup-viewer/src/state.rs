use crate::config::AppConfig;
use backup_reader::BackupService;
use std::time::Instant;

pub struct AppState {
    pub config: AppConfig,
    pub backups: BackupService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let backups = BackupService::new(config.reader.clone())?;
        Ok(Self {
            config,
            backups,
            started_at: Instant::now(),
        })
    }
}
