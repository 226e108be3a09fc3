use crate::config::AppConfig;
use crate::constants::deploy::DEPLOYMENT_LOCK;
use crate::deploy::{Deployer, DeploymentHistory, DeploymentVersion, rollback_target};
use crate::health::{HealthProbe, wait_until_ready};
use crate::lock::SessionLock;
use crate::{KeeperError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// 回滚结果
#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    /// 回滚前部署描述中的镜像
    pub from_image: Option<String>,
    pub target: DeploymentVersion,
    /// 回滚前部署描述已指向目标版本（上一次回滚可能在重新部署时中断）
    pub already_applied: bool,
    pub ready_after: Duration,
}

/// 回滚控制器
///
/// 重新部署上一个版本并以健康检查作为成功条件。部署历史不会被修改，
/// 因此重复执行总是指向同一个目标。部署描述只代表期望状态，
/// 每次回滚都会改写并重新部署，`up -d` 本身是幂等的。
pub struct RollbackController {
    history: Arc<dyn DeploymentHistory>,
    deployer: Arc<dyn Deployer>,
    probe: Arc<dyn HealthProbe>,
    lock_dir: PathBuf,
    health_timeout: Duration,
    health_interval: Duration,
}

impl RollbackController {
    pub fn new(
        config: &AppConfig,
        history: Arc<dyn DeploymentHistory>,
        deployer: Arc<dyn Deployer>,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        Self {
            history,
            deployer,
            probe,
            lock_dir: config.get_lock_dir(),
            health_timeout: Duration::from_secs(config.deploy.health_timeout_secs),
            health_interval: Duration::from_secs(config.deploy.health_interval_secs),
        }
    }

    pub fn with_health_timing(mut self, timeout: Duration, interval: Duration) -> Self {
        self.health_timeout = timeout;
        self.health_interval = interval;
        self
    }

    pub async fn rollback(&self) -> Result<RollbackOutcome> {
        let _lock = SessionLock::acquire(&self.lock_dir, DEPLOYMENT_LOCK)?;

        let versions = self.history.versions().await?;
        let target = rollback_target(&versions)?.clone();
        let from_image = self.deployer.current_image().await?;

        let already_applied = from_image.as_deref() == Some(target.image.as_str());
        if already_applied {
            info!("部署描述已指向 {}，重新部署以确保其运行", target.image);
        } else {
            info!(
                "回滚: {} -> {}",
                from_image.as_deref().unwrap_or("<未知>"),
                target.image
            );
        }
        self.deployer.apply_image(&target.image).await?;
        self.deployer.redeploy().await?;

        match wait_until_ready(self.probe.as_ref(), self.health_timeout, self.health_interval).await {
            Ok(ready_after) => {
                info!("回滚到 {} 成功，服务已就绪", target.image);
                Ok(RollbackOutcome {
                    from_image,
                    target,
                    already_applied,
                    ready_after,
                })
            }
            Err(e) => {
                error!("回滚到 {} 后服务未就绪: {}", target.image, e);
                Err(KeeperError::RollbackUnhealthy {
                    image: target.image,
                    timeout_secs: self.health_timeout.as_secs(),
                })
            }
        }
    }
}
