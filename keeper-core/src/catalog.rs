//! 备份文件目录结构
//!
//! ```text
//! <backup_root>/<kind>/<kind>_<YYYY-MM-DD_HH-MM-SS>.<ext>
//! <backup_root>/manifests/backupset_<YYYY-MM-DD_HH-MM-SS>.json
//! ```
//!
//! 文件名本身即可还原存储类型与创建时间，清单只是加速索引，
//! 目录列举始终是权威来源。

use crate::backup::BackupSet;
use crate::constants::backup::{
    MANIFEST_DIR_NAME, MANIFEST_EXTENSION, MANIFEST_PREFIX, TIMESTAMP_FORMAT,
};
use crate::store::StoreKind;
use crate::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// 按约定命名的备份文件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactName {
    pub kind: StoreKind,
    pub created_at: DateTime<Utc>,
}

impl ArtifactName {
    pub fn new(kind: StoreKind, created_at: DateTime<Utc>) -> Self {
        Self { kind, created_at }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.{}",
            self.kind.dir_name(),
            self.created_at.format(TIMESTAMP_FORMAT),
            self.kind.extension()
        )
    }

    /// 备份文件在备份根目录下的完整路径
    pub fn path_in(&self, backup_root: &Path) -> PathBuf {
        store_dir(backup_root, self.kind).join(self.file_name())
    }

    /// 从文件名解析，不符合约定时返回 None
    pub fn parse(file_name: &str) -> Option<Self> {
        StoreKind::ALL.into_iter().find_map(|kind| {
            let created_at = parse_stamped(file_name, kind.dir_name(), kind.extension())?;
            Some(Self { kind, created_at })
        })
    }
}

/// 目录列举得到的备份文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntry {
    pub path: PathBuf,
    pub kind: StoreKind,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// 存储类型对应的备份目录
pub fn store_dir(backup_root: &Path, kind: StoreKind) -> PathBuf {
    backup_root.join(kind.dir_name())
}

/// 清单目录
pub fn manifest_dir(backup_root: &Path) -> PathBuf {
    backup_root.join(MANIFEST_DIR_NAME)
}

/// 列出某类存储的全部备份文件，按创建时间升序
///
/// 目录不存在视为没有备份；不符合命名约定的文件被忽略。
pub fn list_artifacts(backup_root: &Path, kind: StoreKind) -> Result<Vec<ArtifactEntry>> {
    let dir = store_dir(backup_root, kind);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().to_string();
        match ArtifactName::parse(&file_name) {
            Some(name) if name.kind == kind => entries.push(ArtifactEntry {
                path: entry.path(),
                kind,
                created_at: name.created_at,
                size_bytes: metadata.len(),
            }),
            _ => tracing::debug!("忽略不符合命名约定的文件: {}", entry.path().display()),
        }
    }

    entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.path.cmp(&b.path)));
    Ok(entries)
}

/// 最新的一个备份文件
pub fn latest_artifact(backup_root: &Path, kind: StoreKind) -> Result<Option<ArtifactEntry>> {
    Ok(list_artifacts(backup_root, kind)?.pop())
}

/// 清单文件名
pub fn manifest_file_name(created_at: DateTime<Utc>) -> String {
    format!(
        "{}_{}.{}",
        MANIFEST_PREFIX,
        created_at.format(TIMESTAMP_FORMAT),
        MANIFEST_EXTENSION
    )
}

/// 写入 BackupSet 清单
pub fn write_manifest(backup_root: &Path, set: &BackupSet) -> Result<PathBuf> {
    let dir = manifest_dir(backup_root);
    fs::create_dir_all(&dir)?;

    let path = dir.join(manifest_file_name(set.created_at));
    let content = serde_json::to_string_pretty(set)?;
    fs::write(&path, content)?;
    Ok(path)
}

/// 读取 BackupSet 清单
pub fn read_manifest(path: &Path) -> Result<BackupSet> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// 列出清单文件及其时间戳，按时间升序
pub fn list_manifests(backup_root: &Path) -> Result<Vec<(PathBuf, DateTime<Utc>)>> {
    let dir = manifest_dir(backup_root);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut manifests = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        if let Some(created_at) = parse_stamped(&file_name, MANIFEST_PREFIX, MANIFEST_EXTENSION) {
            manifests.push((entry.path(), created_at));
        }
    }

    manifests.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(manifests)
}

fn parse_stamped(file_name: &str, prefix: &str, extension: &str) -> Option<DateTime<Utc>> {
    let stamp = file_name
        .strip_prefix(prefix)?
        .strip_prefix('_')?
        .strip_suffix(extension)?
        .strip_suffix('.')?;

    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
