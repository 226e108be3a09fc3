use super::{StoreAdapter, StoreKind};
use crate::config::CacheStoreConfig;
use crate::constants::timeout::CACHE_SNAPSHOT_POLL_MS;
use crate::container::DockerManager;
use crate::{KeeperError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Redis 快照适配器：触发 BGSAVE，等待完成后把 RDB 文件复制出容器
#[derive(Debug, Clone)]
pub struct CacheSnapshotAdapter {
    docker: DockerManager,
    container: String,
    rdb_path: String,
    snapshot_timeout: Duration,
}

impl CacheSnapshotAdapter {
    pub fn new(docker: DockerManager, config: &CacheStoreConfig) -> Self {
        Self {
            docker,
            container: config.container.clone(),
            rdb_path: config.rdb_path.clone(),
            snapshot_timeout: Duration::from_secs(config.snapshot_timeout_secs),
        }
    }

    async fn redis_cli(&self, args: &[&str]) -> Result<String> {
        let mut cmd = vec!["redis-cli"];
        cmd.extend(args);

        let output = self.docker.exec(&self.container, &cmd).await?;
        // redis-cli 在非交互模式下遇到错误回复时仍可能以 0 退出
        if output.starts_with("ERR") || output.starts_with("(error)") {
            return Err(KeeperError::Docker(format!(
                "redis-cli {} 返回错误: {output}",
                args.join(" ")
            )));
        }
        Ok(output)
    }

    async fn persistence(&self) -> Result<PersistenceStatus> {
        let output = self.redis_cli(&["INFO", "persistence"]).await?;
        PersistenceStatus::parse(&output)
            .ok_or_else(|| KeeperError::backup("无法解析 INFO persistence 输出"))
    }

    /// 等待当前的后台快照结束，返回结束后的状态
    async fn wait_for_bgsave(&self, start: Instant) -> Result<PersistenceStatus> {
        loop {
            let status = self.persistence().await?;
            if !status.bgsave_in_progress {
                return Ok(status);
            }
            if start.elapsed() >= self.snapshot_timeout {
                return Err(KeeperError::timeout("等待 Redis BGSAVE", self.snapshot_timeout));
            }
            tokio::time::sleep(Duration::from_millis(CACHE_SNAPSHOT_POLL_MS)).await;
        }
    }

    /// 触发后台快照并等待其完成
    ///
    /// 已有快照在进行时先等它结束再发起自己的快照，保证 RDB 不早于本次备份开始。
    async fn snapshot(&self) -> Result<()> {
        let start = Instant::now();

        if self.persistence().await?.bgsave_in_progress {
            info!("Redis 已有后台快照在进行，等待其完成");
            self.wait_for_bgsave(start).await?;
        }

        match self.redis_cli(&["BGSAVE"]).await {
            Ok(_) => {}
            Err(KeeperError::Docker(msg)) if msg.contains("already in progress") => {
                debug!("BGSAVE 与自动快照冲突，等待进行中的快照");
            }
            Err(e) => return Err(e),
        }

        let status = self.wait_for_bgsave(start).await?;
        if !status.last_bgsave_ok {
            return Err(KeeperError::backup("Redis 报告最近一次 BGSAVE 失败"));
        }
        debug!(elapsed = ?start.elapsed(), "BGSAVE 完成");
        Ok(())
    }
}

/// `INFO persistence` 中与快照相关的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PersistenceStatus {
    bgsave_in_progress: bool,
    last_bgsave_ok: bool,
}

impl PersistenceStatus {
    fn parse(info: &str) -> Option<Self> {
        let field = |key: &str| {
            info.lines()
                .find_map(|line| line.trim().strip_prefix(key)?.strip_prefix(':'))
        };
        Some(Self {
            bgsave_in_progress: field("rdb_bgsave_in_progress")? == "1",
            last_bgsave_ok: field("rdb_last_bgsave_status")? == "ok",
        })
    }
}

#[async_trait]
impl StoreAdapter for CacheSnapshotAdapter {
    fn kind(&self) -> StoreKind {
        StoreKind::Cache
    }

    fn name(&self) -> &str {
        &self.container
    }

    async fn health_check(&self) -> Result<()> {
        match self.redis_cli(&["PING"]).await {
            Ok(reply) if reply == "PONG" => Ok(()),
            Ok(reply) => Err(KeeperError::store_unavailable(
                &self.container,
                format!("PING 返回 `{reply}`"),
            )),
            Err(e) => Err(KeeperError::store_unavailable(&self.container, e.to_string())),
        }
    }

    async fn backup(&self, artifact_path: &Path) -> Result<u64> {
        self.snapshot().await?;

        info!("复制 RDB 快照 {} -> {}", self.rdb_path, artifact_path.display());
        self.docker
            .copy_from_container(&self.container, &self.rdb_path, artifact_path)
            .await?;

        Ok(tokio::fs::metadata(artifact_path).await?.len())
    }
}
