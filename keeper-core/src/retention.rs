use crate::catalog::{self, ArtifactEntry};
use crate::store::StoreKind;
use crate::Result;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 保留期清理器
///
/// 按文件名中的时间戳计算备份年龄，删除严格早于保留窗口的文件。
/// 多次执行结果一致：第二次执行删除 0 个文件。
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    backup_root: PathBuf,
}

impl RetentionSweeper {
    pub fn new(backup_root: impl Into<PathBuf>) -> Self {
        Self {
            backup_root: backup_root.into(),
        }
    }

    /// 清理指定存储的过期备份，返回删除的文件数量
    pub fn sweep(&self, kind: StoreKind, retention: Duration) -> Result<usize> {
        self.sweep_at(kind, retention, Utc::now())
    }

    /// 以给定的当前时间清理
    pub fn sweep_at(&self, kind: StoreKind, retention: Duration, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = cutoff(now, retention);
        let expired: Vec<ArtifactEntry> = catalog::list_artifacts(&self.backup_root, kind)?
            .into_iter()
            .filter(|entry| entry.created_at < cutoff)
            .collect();

        let mut deleted = 0;
        for entry in expired {
            if remove_if_present(&entry.path)? {
                debug!(store = %kind, path = %entry.path.display(), "删除过期备份");
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!(store = %kind, deleted, "{}过期备份清理完成", kind.display_name());
        }
        Ok(deleted)
    }

    /// 清理过期的 BackupSet 清单
    pub fn sweep_manifests(&self, retention: Duration) -> Result<usize> {
        self.sweep_manifests_at(retention, Utc::now())
    }

    pub fn sweep_manifests_at(&self, retention: Duration, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = cutoff(now, retention);
        let mut deleted = 0;
        for (path, created_at) in catalog::list_manifests(&self.backup_root)? {
            if created_at < cutoff && remove_if_present(&path)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

fn cutoff(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(retention)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or_else(|| {
            warn!("保留时长超出范围，跳过清理: {:?}", retention);
            DateTime::<Utc>::MIN_UTC
        })
}

/// 删除文件；列举之后被其他进程删除的文件不算错误
fn remove_if_present(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
