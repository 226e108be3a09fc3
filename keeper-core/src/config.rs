use crate::constants::{backup, config, deploy, docker, stores, timeout};
use crate::error::Result;
use crate::store::StoreKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub backup: BackupConfig,
    pub stores: StoresConfig,
    pub restore: RestoreConfig,
    pub deploy: DeployConfig,
}

/// 备份相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BackupConfig {
    /// 备份根目录，按存储类型分子目录
    pub storage_dir: String,
    /// 默认保留天数
    pub retention_days: u64,
    /// 单个存储备份的超时时间（秒）
    pub store_timeout_secs: u64,
    /// 是否写入 BackupSet 清单
    pub write_manifest: bool,
}

/// 三类存储的配置
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StoresConfig {
    pub relational: RelationalStoreConfig,
    pub volume: VolumeStoreConfig,
    pub cache: CacheStoreConfig,
}

/// 关系库（PostgreSQL）配置
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RelationalStoreConfig {
    pub enabled: bool,
    pub container: String,
    pub user: String,
    /// 在线数据库名
    pub database: String,
    /// 覆盖默认保留天数
    pub retention_days: Option<u64>,
}

/// 向量/对象卷配置
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct VolumeStoreConfig {
    pub enabled: bool,
    pub data_dir: String,
    pub compression_level: u32,
    pub retention_days: Option<u64>,
}

/// 缓存（Redis）配置
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CacheStoreConfig {
    pub enabled: bool,
    pub container: String,
    /// 容器内 RDB 文件路径
    pub rdb_path: String,
    pub snapshot_timeout_secs: u64,
    pub retention_days: Option<u64>,
}

/// 恢复相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RestoreConfig {
    /// 恢复完成后需要重启的依赖服务
    pub reconnect_services: Vec<String>,
    /// 重启后等待就绪的超时时间（秒）
    pub reconnect_timeout_secs: u64,
    /// 依赖服务就绪探针，为空则不等待
    pub health_url: Option<String>,
}

/// 部署与回滚相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DeployConfig {
    pub compose_file: String,
    /// 回滚时会被重新部署的无状态服务
    pub services: Vec<String>,
    pub history_file: String,
    pub health_url: String,
    pub health_timeout_secs: u64,
    pub health_interval_secs: u64,
    pub probe_request_timeout_secs: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            storage_dir: backup::get_default_storage_dir()
                .to_string_lossy()
                .to_string(),
            retention_days: backup::DEFAULT_RETENTION_DAYS,
            store_timeout_secs: timeout::STORE_BACKUP_TIMEOUT,
            write_manifest: true,
        }
    }
}

impl Default for RelationalStoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            container: stores::POSTGRES_CONTAINER.to_string(),
            user: stores::POSTGRES_USER.to_string(),
            database: stores::POSTGRES_DATABASE.to_string(),
            retention_days: None,
        }
    }
}

impl Default for VolumeStoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: stores::VOLUME_DATA_DIR.to_string(),
            compression_level: backup::VOLUME_COMPRESSION_LEVEL,
            retention_days: None,
        }
    }
}

impl Default for CacheStoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            container: stores::REDIS_CONTAINER.to_string(),
            rdb_path: stores::REDIS_RDB_PATH.to_string(),
            snapshot_timeout_secs: timeout::CACHE_SNAPSHOT_TIMEOUT,
            retention_days: None,
        }
    }
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            reconnect_services: deploy::DEFAULT_STATELESS_SERVICES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            reconnect_timeout_secs: timeout::RECONNECT_TIMEOUT,
            health_url: None,
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            compose_file: docker::get_compose_file_path_str(),
            services: deploy::DEFAULT_STATELESS_SERVICES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            history_file: deploy::DEFAULT_HISTORY_FILE.to_string(),
            health_url: deploy::DEFAULT_HEALTH_URL.to_string(),
            health_timeout_secs: timeout::HEALTH_CHECK_TIMEOUT,
            health_interval_secs: timeout::HEALTH_CHECK_INTERVAL,
            probe_request_timeout_secs: timeout::PROBE_REQUEST_TIMEOUT,
        }
    }
}

impl AppConfig {
    /// 智能查找并加载配置文件
    /// 按优先级查找：keeper.toml -> .keeper.toml，都不存在时使用默认配置
    pub fn find_and_load_config() -> Result<Self> {
        for config_file in config::CONFIG_FILE_CANDIDATES {
            if Path::new(config_file).exists() {
                tracing::info!("找到配置文件: {}", config_file);
                return Self::load_from_file(config_file);
            }
        }

        tracing::warn!("未找到配置文件，使用默认配置");
        Ok(Self::default())
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let body = toml::to_string_pretty(self)?;
        let content = format!(
            "# Keeper 配置文件\n# 备份目录按存储类型分区: <storage_dir>/<relational|volume|cache>/\n\n{body}"
        );
        fs::write(&path, content)?;
        Ok(())
    }

    /// 获取备份目录路径
    pub fn get_backup_dir(&self) -> PathBuf {
        PathBuf::from(&self.backup.storage_dir)
    }

    /// 会话锁目录
    pub fn get_lock_dir(&self) -> PathBuf {
        self.get_backup_dir().join(backup::LOCK_DIR_NAME)
    }

    /// 指定存储的保留时长，存储级配置优先
    pub fn retention_for(&self, kind: StoreKind) -> Duration {
        let override_days = match kind {
            StoreKind::Relational => self.stores.relational.retention_days,
            StoreKind::Volume => self.stores.volume.retention_days,
            StoreKind::Cache => self.stores.cache.retention_days,
        };
        days(override_days.unwrap_or(self.backup.retention_days))
    }

    /// 清单的保留时长，与最长的存储保留时长一致
    pub fn manifest_retention(&self) -> Duration {
        StoreKind::ALL
            .iter()
            .map(|kind| self.retention_for(*kind))
            .max()
            .unwrap_or_else(|| days(self.backup.retention_days))
    }

    /// 指定存储是否启用
    pub fn is_enabled(&self, kind: StoreKind) -> bool {
        match kind {
            StoreKind::Relational => self.stores.relational.enabled,
            StoreKind::Volume => self.stores.volume.enabled,
            StoreKind::Cache => self.stores.cache.enabled,
        }
    }
}

/// 超大的天数饱和到 `u64::MAX` 秒，不会回绕成很短的窗口
fn days(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(24 * 60 * 60))
}
