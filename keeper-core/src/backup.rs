use crate::catalog::{self, ArtifactName};
use crate::config::AppConfig;
use crate::constants::backup::PARTIAL_SUFFIX;
use crate::lock::SessionLock;
use crate::retention::RetentionSweeper;
use crate::store::{StoreAdapter, StoreKind};
use crate::{KeeperError, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// 单个存储的备份结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Succeeded,
    Failed,
    /// 存储未启用或没有对应的适配器
    Skipped,
}

/// 一个存储在一次备份中的记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub kind: StoreKind,
    pub path: Option<PathBuf>,
    pub size_bytes: u64,
    pub status: ArtifactStatus,
    pub error: Option<String>,
}

/// 一次备份运行的全部产物，以创建时间标识，运行结束后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSet {
    pub created_at: DateTime<Utc>,
    pub artifacts: Vec<ArtifactRecord>,
}

impl BackupSet {
    pub fn record(&self, kind: StoreKind) -> Option<&ArtifactRecord> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }
}

/// 备份运行报告
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub set: BackupSet,
    /// 每类存储清理掉的过期备份数量
    pub swept: BTreeMap<StoreKind, usize>,
    pub sweep_errors: Vec<String>,
    pub manifest: Option<PathBuf>,
}

impl BackupReport {
    pub fn status_of(&self, kind: StoreKind) -> Option<ArtifactStatus> {
        self.set.record(kind).map(|r| r.status)
    }

    /// 关系库备份失败即视为整次运行失败
    pub fn run_failed(&self) -> bool {
        self.set
            .artifacts
            .iter()
            .any(|a| a.kind.is_primary() && a.status == ArtifactStatus::Failed)
    }

    /// 是否有存储未能产出备份
    pub fn missing_artifacts(&self) -> bool {
        self.set
            .artifacts
            .iter()
            .any(|a| a.status == ArtifactStatus::Failed)
    }

    /// 0 全部成功；1 关系库失败；2 关系库成功但缺少其他备份
    pub fn exit_code(&self) -> i32 {
        if self.run_failed() {
            1
        } else if self.missing_artifacts() {
            2
        } else {
            0
        }
    }
}

/// 备份协调器
///
/// 按 关系库 → 向量卷 → 缓存 的顺序逐个备份，各存储互相隔离；
/// 结束后无论成败都执行一次保留期清理。
pub struct BackupCoordinator {
    adapters: Vec<Arc<dyn StoreAdapter>>,
    backup_root: PathBuf,
    lock_dir: PathBuf,
    store_timeout: Duration,
    write_manifest: bool,
    enabled: Vec<StoreKind>,
    retention: BTreeMap<StoreKind, Duration>,
    manifest_retention: Duration,
}

impl BackupCoordinator {
    pub fn new(config: &AppConfig, adapters: Vec<Arc<dyn StoreAdapter>>) -> Self {
        Self {
            adapters,
            backup_root: config.get_backup_dir(),
            lock_dir: config.get_lock_dir(),
            store_timeout: Duration::from_secs(config.backup.store_timeout_secs),
            write_manifest: config.backup.write_manifest,
            enabled: StoreKind::ALL
                .into_iter()
                .filter(|kind| config.is_enabled(*kind))
                .collect(),
            retention: StoreKind::ALL
                .into_iter()
                .map(|kind| (kind, config.retention_for(kind)))
                .collect(),
            manifest_retention: config.manifest_retention(),
        }
    }

    /// 覆盖单个存储的备份超时时间
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// 执行一次完整备份并清理过期文件
    pub async fn run_backup(&self) -> BackupReport {
        let created_at = Utc::now().trunc_subsecs(0);
        info!("开始备份，批次时间: {}", created_at.format("%Y-%m-%d %H:%M:%S"));

        let mut artifacts = Vec::with_capacity(StoreKind::ALL.len());
        for kind in StoreKind::ALL {
            let record = self.backup_kind(kind, created_at).await;
            info!(
                store = %kind,
                status = ?record.status,
                size_bytes = record.size_bytes,
                path = %record.path.as_deref().map(|p| p.display().to_string()).unwrap_or_default(),
                "{}备份结束",
                kind.display_name()
            );
            artifacts.push(record);
        }

        let set = BackupSet {
            created_at,
            artifacts,
        };

        let (swept, sweep_errors) = self.sweep_all();

        let manifest = if self.write_manifest {
            match catalog::write_manifest(&self.backup_root, &set) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("写入备份清单失败: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let report = BackupReport {
            set,
            swept,
            sweep_errors,
            manifest,
        };

        if report.run_failed() {
            error!("关系库备份失败，本次备份运行失败");
        } else if report.missing_artifacts() {
            warn!("关系库备份成功，但部分存储缺少备份");
        } else {
            info!("全部存储备份成功");
        }
        report
    }

    async fn backup_kind(&self, kind: StoreKind, created_at: DateTime<Utc>) -> ArtifactRecord {
        let skipped = |reason: &str| {
            info!(store = %kind, "跳过{}备份: {}", kind.display_name(), reason);
            ArtifactRecord {
                kind,
                path: None,
                size_bytes: 0,
                status: ArtifactStatus::Skipped,
                error: None,
            }
        };

        if !self.enabled.contains(&kind) {
            return skipped("配置中未启用");
        }
        let Some(adapter) = self.adapters.iter().find(|a| a.kind() == kind) else {
            return skipped("没有对应的存储适配器");
        };

        let path = ArtifactName::new(kind, created_at).path_in(&self.backup_root);
        match self.backup_store(adapter.as_ref(), &path).await {
            Ok(size_bytes) => ArtifactRecord {
                kind,
                path: Some(path),
                size_bytes,
                status: ArtifactStatus::Succeeded,
                error: None,
            },
            Err(e) => {
                if kind.is_primary() {
                    error!(store = %kind, "{}备份失败: {}", kind.display_name(), e);
                } else {
                    warn!(store = %kind, "{}备份失败: {}", kind.display_name(), e);
                }
                remove_partial(&partial_path(&path)).await;
                ArtifactRecord {
                    kind,
                    path: None,
                    size_bytes: 0,
                    status: ArtifactStatus::Failed,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn backup_store(&self, adapter: &dyn StoreAdapter, path: &Path) -> Result<u64> {
        let kind = adapter.kind();

        // 关系库备份与恢复共用同一把锁
        let _lock = if kind.is_primary() {
            Some(SessionLock::acquire(&self.lock_dir, adapter.name())?)
        } else {
            None
        };

        adapter.health_check().await.map_err(|e| match e {
            KeeperError::StoreUnavailable { .. } => e,
            other => KeeperError::store_unavailable(adapter.name(), other.to_string()),
        })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // 先写入临时文件，成功后再改名，失败时不会影响同名的已有备份
        let partial = partial_path(path);
        tokio::time::timeout(self.store_timeout, adapter.backup(&partial))
            .await
            .map_err(|_| {
                KeeperError::timeout(format!("{}备份", kind.display_name()), self.store_timeout)
            })??;

        // 以磁盘上的实际大小为准
        let size = tokio::fs::metadata(&partial).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(KeeperError::backup(format!(
                "{}备份文件为空: {}",
                kind.display_name(),
                path.display()
            )));
        }
        tokio::fs::rename(&partial, path).await?;
        Ok(size)
    }

    fn sweep_all(&self) -> (BTreeMap<StoreKind, usize>, Vec<String>) {
        let sweeper = RetentionSweeper::new(&self.backup_root);
        let mut swept = BTreeMap::new();
        let mut errors = Vec::new();

        for (kind, retention) in &self.retention {
            match sweeper.sweep(*kind, *retention) {
                Ok(deleted) => {
                    swept.insert(*kind, deleted);
                }
                Err(e) => {
                    warn!(store = %kind, "清理过期备份失败: {}", e);
                    errors.push(format!("{kind}: {e}"));
                }
            }
        }

        if let Err(e) = sweeper.sweep_manifests(self.manifest_retention) {
            warn!("清理过期清单失败: {}", e);
            errors.push(format!("manifests: {e}"));
        }

        (swept, errors)
    }
}

/// 备份进行中使用的文件名，不符合命名约定，列举与清理都会忽略它
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("已删除不完整的备份文件: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("删除不完整的备份文件 {} 失败: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRelationalStore, FakeStore};
    use chrono::TimeZone;
    use tempfile::tempdir;

    const MB: usize = 1024 * 1024;

    fn config_in(root: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.backup.storage_dir = root.to_string_lossy().to_string();
        config
    }

    fn adapters(
        relational: Arc<FakeRelationalStore>,
        volume: FakeStore,
        cache: FakeStore,
    ) -> Vec<Arc<dyn StoreAdapter>> {
        vec![
            relational as Arc<dyn StoreAdapter>,
            Arc::new(volume),
            Arc::new(cache),
        ]
    }

    #[tokio::test]
    async fn test_volume_timeout_does_not_fail_run() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());

        let relational = Arc::new(FakeRelationalStore::new("app", &vec![b'x'; 12 * MB]));
        let coordinator = BackupCoordinator::new(
            &config,
            adapters(
                relational,
                FakeStore::hanging(StoreKind::Volume, Duration::from_secs(30)),
                FakeStore::writing(StoreKind::Cache, b"REDIS0011"),
            ),
        )
        .with_store_timeout(Duration::from_secs(1));

        let report = coordinator.run_backup().await;

        assert_eq!(report.status_of(StoreKind::Relational), Some(ArtifactStatus::Succeeded));
        assert_eq!(report.status_of(StoreKind::Volume), Some(ArtifactStatus::Failed));
        assert_eq!(report.status_of(StoreKind::Cache), Some(ArtifactStatus::Succeeded));
        assert!(report.missing_artifacts());
        assert!(!report.run_failed());
        assert_ne!(report.exit_code(), 0);

        let relational = report.set.record(StoreKind::Relational).unwrap();
        assert_eq!(relational.size_bytes, (12 * MB) as u64);
        assert!(relational.path.as_ref().unwrap().exists());

        // 超时的存储不留下任何文件
        let volume = report.set.record(StoreKind::Volume).unwrap();
        assert!(volume.path.is_none());
        assert!(volume.error.as_deref().unwrap().contains("超时"));
        assert!(catalog::list_artifacts(dir.path(), StoreKind::Volume).unwrap().is_empty());
        let volume_dir = catalog::store_dir(dir.path(), StoreKind::Volume);
        assert_eq!(std::fs::read_dir(volume_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_store_keeps_existing_artifact_with_same_name() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let created_at = Utc.with_ymd_and_hms(2026, 10, 19, 2, 0, 0).unwrap();

        let existing = ArtifactName::new(StoreKind::Cache, created_at).path_in(dir.path());
        std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
        std::fs::write(&existing, b"REDIS0011 good").unwrap();

        let coordinator = BackupCoordinator::new(
            &config,
            vec![Arc::new(FakeStore::failing(StoreKind::Cache)) as Arc<dyn StoreAdapter>],
        );
        let record = coordinator.backup_kind(StoreKind::Cache, created_at).await;

        assert_eq!(record.status, ArtifactStatus::Failed);
        assert_eq!(std::fs::read(&existing).unwrap(), b"REDIS0011 good");
        assert!(!partial_path(&existing).exists());
    }

    #[tokio::test]
    async fn test_relational_failure_marks_run_failed() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());

        let relational = Arc::new(FakeRelationalStore::new("app", b"rows"));
        relational.set_healthy(false);
        let coordinator = BackupCoordinator::new(
            &config,
            adapters(
                relational,
                FakeStore::writing(StoreKind::Volume, b"tar"),
                FakeStore::writing(StoreKind::Cache, b"rdb"),
            ),
        );

        let report = coordinator.run_backup().await;
        assert!(report.run_failed());
        assert_eq!(report.exit_code(), 1);
        // 其余存储仍然执行
        assert_eq!(report.status_of(StoreKind::Volume), Some(ArtifactStatus::Succeeded));
        assert_eq!(report.status_of(StoreKind::Cache), Some(ArtifactStatus::Succeeded));
        assert!(catalog::list_artifacts(dir.path(), StoreKind::Relational).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_byte_artifact_is_failure() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());

        let coordinator = BackupCoordinator::new(
            &config,
            adapters(
                Arc::new(FakeRelationalStore::new("app", b"rows")),
                FakeStore::writing(StoreKind::Volume, b""),
                FakeStore::failing(StoreKind::Cache),
            ),
        );

        let report = coordinator.run_backup().await;
        assert_eq!(report.status_of(StoreKind::Volume), Some(ArtifactStatus::Failed));
        assert_eq!(report.status_of(StoreKind::Cache), Some(ArtifactStatus::Failed));
        assert_eq!(report.exit_code(), 2);
        assert!(catalog::list_artifacts(dir.path(), StoreKind::Volume).unwrap().is_empty());
        assert!(catalog::list_artifacts(dir.path(), StoreKind::Cache).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_store_is_skipped() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.stores.cache.enabled = false;

        let coordinator = BackupCoordinator::new(
            &config,
            vec![
                Arc::new(FakeRelationalStore::new("app", b"rows")) as Arc<dyn StoreAdapter>,
                Arc::new(FakeStore::writing(StoreKind::Cache, b"rdb")),
            ],
        );

        let report = coordinator.run_backup().await;
        assert_eq!(report.status_of(StoreKind::Cache), Some(ArtifactStatus::Skipped));
        // 启用但没有适配器
        assert_eq!(report.status_of(StoreKind::Volume), Some(ArtifactStatus::Skipped));
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_sweep_runs_after_failed_run_and_manifest_written() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());

        let ancient = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let old_volume = ArtifactName::new(StoreKind::Volume, ancient).path_in(dir.path());
        std::fs::create_dir_all(old_volume.parent().unwrap()).unwrap();
        std::fs::write(&old_volume, b"old").unwrap();

        let relational = Arc::new(FakeRelationalStore::new("app", b"rows"));
        relational.set_healthy(false);
        let coordinator = BackupCoordinator::new(
            &config,
            adapters(
                relational,
                FakeStore::failing(StoreKind::Volume),
                FakeStore::writing(StoreKind::Cache, b"rdb"),
            ),
        );

        let report = coordinator.run_backup().await;
        assert!(report.run_failed());
        assert!(!old_volume.exists());
        assert_eq!(report.swept.get(&StoreKind::Volume), Some(&1));
        assert!(report.sweep_errors.is_empty());

        let manifest = report.manifest.as_ref().unwrap();
        let loaded = catalog::read_manifest(manifest).unwrap();
        assert_eq!(loaded, report.set);
    }

    #[tokio::test]
    async fn test_relational_backup_excluded_by_restore_lock() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let _restore = SessionLock::acquire(&config.get_lock_dir(), "app").unwrap();

        let coordinator = BackupCoordinator::new(
            &config,
            vec![Arc::new(FakeRelationalStore::new("app", b"rows")) as Arc<dyn StoreAdapter>],
        );

        let report = coordinator.run_backup().await;
        let record = report.set.record(StoreKind::Relational).unwrap();
        assert_eq!(record.status, ArtifactStatus::Failed);
        assert!(record.error.as_deref().unwrap().contains("app"));
    }
}
