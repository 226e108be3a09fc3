use crate::cli::Commands;
use crate::commands;
use keeper_core::{
    config::AppConfig,
    container::DockerManager,
    error::Result,
    store::{
        CacheSnapshotAdapter, PostgresAdapter, StoreAdapter, StoreKind, VolumeArchiveAdapter,
    },
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// 可以覆盖配置项的环境变量
pub mod env_keys {
    pub const BACKUP_DIR: &str = "KEEPER_BACKUP_DIR";
    pub const RETENTION_DAYS: &str = "KEEPER_RETENTION_DAYS";
    pub const POSTGRES_CONTAINER: &str = "POSTGRES_CONTAINER";
    pub const POSTGRES_USER: &str = "POSTGRES_USER";
    pub const POSTGRES_DB: &str = "POSTGRES_DB";
    pub const REDIS_CONTAINER: &str = "REDIS_CONTAINER";
    pub const VOLUME_DATA_DIR: &str = "VOLUME_DATA_DIR";
    pub const HEALTH_URL: &str = "KEEPER_HEALTH_URL";
}

pub struct CliApp {
    pub config: AppConfig,
    pub docker_manager: DockerManager,
}

impl CliApp {
    /// 加载配置文件并应用环境变量覆盖
    ///
    /// 指定的配置文件不存在时按 keeper.toml -> .keeper.toml 查找，都没有则使用默认配置
    pub fn new(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            info!("使用配置文件: {}", config_path.display());
            AppConfig::load_from_file(config_path)?
        } else {
            AppConfig::find_and_load_config()?
        };

        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: AppConfig) -> Self {
        let docker_manager = DockerManager::new(&config.deploy.compose_file);
        Self {
            config,
            docker_manager,
        }
    }

    /// 按配置构建已启用存储的适配器
    pub fn store_adapters(&self) -> Vec<Arc<dyn StoreAdapter>> {
        StoreKind::ALL
            .into_iter()
            .filter(|kind| self.config.is_enabled(*kind))
            .map(|kind| self.adapter_for(kind))
            .collect()
    }

    pub fn adapter_for(&self, kind: StoreKind) -> Arc<dyn StoreAdapter> {
        let stores = &self.config.stores;
        match kind {
            StoreKind::Relational => Arc::new(PostgresAdapter::new(
                self.docker_manager.clone(),
                &stores.relational,
            )),
            StoreKind::Volume => Arc::new(VolumeArchiveAdapter::new(&stores.volume)),
            StoreKind::Cache => Arc::new(CacheSnapshotAdapter::new(
                self.docker_manager.clone(),
                &stores.cache,
            )),
        }
    }

    /// 运行命令，返回进程退出码
    pub async fn run_command(&self, command: Commands) -> Result<i32> {
        match command {
            Commands::Backup => commands::run_backup(self).await,
            Commands::ListBackups { kind } => commands::run_list_backups(self, kind),
            Commands::Restore { artifact, live, yes } => {
                commands::run_restore(self, &artifact, live.as_deref(), yes).await
            }
            Commands::Rollback => commands::run_rollback(self).await,
            Commands::Sweep { kind } => commands::run_sweep(self, kind),
            Commands::RecordDeploy { image } => commands::run_record_deploy(self, &image).await,
            // main 中在加载配置之前处理
            Commands::Init { .. } => Ok(0),
        }
    }
}

/// 用环境变量覆盖部分配置项，`lookup` 通常为 `std::env::var`
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(dir) = get(env_keys::BACKUP_DIR) {
        config.backup.storage_dir = dir;
    }
    if let Some(days) = get(env_keys::RETENTION_DAYS) {
        match days.trim().parse::<u64>() {
            Ok(days) => config.backup.retention_days = days,
            Err(_) => warn!(
                "忽略无效的 {}: {}",
                env_keys::RETENTION_DAYS,
                days
            ),
        }
    }
    if let Some(container) = get(env_keys::POSTGRES_CONTAINER) {
        config.stores.relational.container = container;
    }
    if let Some(user) = get(env_keys::POSTGRES_USER) {
        config.stores.relational.user = user;
    }
    if let Some(database) = get(env_keys::POSTGRES_DB) {
        config.stores.relational.database = database;
    }
    if let Some(container) = get(env_keys::REDIS_CONTAINER) {
        config.stores.cache.container = container;
    }
    if let Some(dir) = get(env_keys::VOLUME_DATA_DIR) {
        config.stores.volume.data_dir = dir;
    }
    if let Some(url) = get(env_keys::HEALTH_URL) {
        config.deploy.health_url = url;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut config = AppConfig::default();
        apply_env_overrides(
            &mut config,
            lookup_from(&[
                (env_keys::BACKUP_DIR, "/srv/backups"),
                (env_keys::RETENTION_DAYS, "7"),
                (env_keys::POSTGRES_DB, "orders"),
                (env_keys::REDIS_CONTAINER, "cache-1"),
                (env_keys::HEALTH_URL, "http://api:8000/ready"),
            ]),
        );

        assert_eq!(config.backup.storage_dir, "/srv/backups");
        assert_eq!(config.backup.retention_days, 7);
        assert_eq!(config.stores.relational.database, "orders");
        assert_eq!(config.stores.relational.user, "postgres");
        assert_eq!(config.stores.cache.container, "cache-1");
        assert_eq!(config.deploy.health_url, "http://api:8000/ready");
    }

    #[test]
    fn test_invalid_and_empty_overrides_are_ignored() {
        let mut config = AppConfig::default();
        apply_env_overrides(
            &mut config,
            lookup_from(&[(env_keys::RETENTION_DAYS, "forever"), (env_keys::BACKUP_DIR, "  ")]),
        );

        assert_eq!(config.backup.retention_days, 30);
        assert_eq!(config.backup.storage_dir, AppConfig::default().backup.storage_dir);
    }

    #[test]
    fn test_adapters_follow_enabled_stores() {
        let mut config = AppConfig::default();
        config.stores.volume.enabled = false;
        let app = CliApp::from_config(config);

        let kinds: Vec<_> = app.store_adapters().iter().map(|a| a.kind()).collect();
        assert_eq!(kinds, vec![StoreKind::Relational, StoreKind::Cache]);
        assert_eq!(app.adapter_for(StoreKind::Relational).name(), "app");
    }

    #[test]
    fn test_explicit_config_file_is_loaded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[backup]\nretention_days = 3\n").unwrap();

        let app = CliApp::new(&path).unwrap();
        assert_eq!(app.config.backup.retention_days, 3);
    }
}
