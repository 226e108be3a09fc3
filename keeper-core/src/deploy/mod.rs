//! 部署元数据：部署历史与部署执行器
//!
//! 回滚控制器只依赖这里的两个接口，具体实现分别基于 JSON 文件与 docker-compose。

mod compose;
mod history;

pub use compose::{ComposeDeployer, service_image, set_service_images};
pub use history::FileDeploymentHistory;

use crate::{KeeperError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 一次部署记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentVersion {
    pub image: String,
    pub deployed_at: DateTime<Utc>,
}

/// 只追加的部署历史
#[async_trait]
pub trait DeploymentHistory: Send + Sync {
    /// 全部部署记录，最早的在前
    async fn versions(&self) -> Result<Vec<DeploymentVersion>>;

    /// 追加一次部署；与最近一条记录镜像相同时不追加，返回 false
    async fn record(&self, image: &str) -> Result<bool>;
}

/// 回滚目标：倒数第二条记录，当前版本永远不是目标
pub fn rollback_target(versions: &[DeploymentVersion]) -> Result<&DeploymentVersion> {
    match versions {
        [.., previous, _current] => Ok(previous),
        _ => Err(KeeperError::NoPriorVersion),
    }
}

/// 部署执行器，只作用于无状态服务
#[async_trait]
pub trait Deployer: Send + Sync {
    /// 部署描述中当前引用的镜像
    async fn current_image(&self) -> Result<Option<String>>;

    /// 将部署描述中的服务镜像改为 `image`
    async fn apply_image(&self, image: &str) -> Result<()>;

    /// 按部署描述重新创建服务
    async fn redeploy(&self) -> Result<()>;
}
