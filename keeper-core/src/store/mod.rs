//! 存储适配器
//!
//! 三种异构存储（关系库、向量卷、缓存）统一抽象为 [`StoreAdapter`]，
//! 备份与恢复协调器只依赖该接口。

mod cache;
mod postgres;
mod volume;

pub use cache::CacheSnapshotAdapter;
pub use postgres::PostgresAdapter;
pub use volume::VolumeArchiveAdapter;

use crate::constants::restore::MAX_IDENTIFIER_LEN;
use crate::{KeeperError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// 存储类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// 关系库，主数据来源
    Relational,
    /// 向量/对象数据卷
    Volume,
    /// 带持久化的内存缓存
    Cache,
}

impl StoreKind {
    /// 备份顺序
    pub const ALL: [StoreKind; 3] = [StoreKind::Relational, StoreKind::Volume, StoreKind::Cache];

    /// 备份子目录名，同时也是文件名前缀
    pub fn dir_name(&self) -> &'static str {
        match self {
            StoreKind::Relational => "relational",
            StoreKind::Volume => "volume",
            StoreKind::Cache => "cache",
        }
    }

    /// 备份文件扩展名
    pub fn extension(&self) -> &'static str {
        match self {
            StoreKind::Relational => "dump",
            StoreKind::Volume => "tar.gz",
            StoreKind::Cache => "rdb",
        }
    }

    /// 获取类型的中文显示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            StoreKind::Relational => "关系库",
            StoreKind::Volume => "向量卷",
            StoreKind::Cache => "缓存",
        }
    }

    /// 关系库是主数据来源，其备份失败对整次备份是致命的
    pub fn is_primary(&self) -> bool {
        matches!(self, StoreKind::Relational)
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for StoreKind {
    type Err = KeeperError;

    fn from_str(s: &str) -> Result<Self> {
        StoreKind::ALL
            .into_iter()
            .find(|kind| kind.dir_name() == s.to_lowercase())
            .ok_or_else(|| KeeperError::custom(format!("未知的存储类型: {s}")))
    }
}

/// 存储适配器
///
/// `backup` 与 `health_check` 所有存储都必须实现；其余能力只在关系库上用于
/// 交换-重命名恢复，默认返回 [`KeeperError::Unsupported`]。
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// 存储类型
    fn kind(&self) -> StoreKind;

    /// 存储实例名称（关系库为在线数据库名）
    fn name(&self) -> &str;

    /// 检查存储是否可用
    async fn health_check(&self) -> Result<()>;

    /// 将存储内容写入 `artifact_path`，返回写入的字节数
    async fn backup(&self, artifact_path: &Path) -> Result<u64>;

    /// 指定名称的存储是否存在
    async fn exists(&self, _name: &str) -> Result<bool> {
        Err(unsupported(self.kind(), "exists"))
    }

    /// 创建空的存储
    async fn create(&self, _name: &str) -> Result<()> {
        Err(unsupported(self.kind(), "create"))
    }

    /// 将备份文件加载到指定存储
    async fn load_into(&self, _name: &str, _artifact: &Path) -> Result<()> {
        Err(unsupported(self.kind(), "load_into"))
    }

    /// 检查指定存储可查询，返回其中的对象数量
    async fn verify(&self, _name: &str) -> Result<u64> {
        Err(unsupported(self.kind(), "verify"))
    }

    /// 重命名存储
    async fn rename(&self, _from: &str, _to: &str) -> Result<()> {
        Err(unsupported(self.kind(), "rename"))
    }

    /// 删除存储（不存在时不报错）
    async fn drop_store(&self, _name: &str) -> Result<()> {
        Err(unsupported(self.kind(), "drop"))
    }
}

fn unsupported(kind: StoreKind, operation: &str) -> KeeperError {
    KeeperError::Unsupported {
        store: kind.display_name().to_string(),
        operation: operation.to_string(),
    }
}

/// 校验存储名称，只允许 `[A-Za-z0-9_]`，长度不超过 63 字节
///
/// 名称会被直接拼接进 SQL 与锁文件名中。
pub fn validate_store_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_IDENTIFIER_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(KeeperError::InvalidStoreName(name.to_string()))
    }
}
