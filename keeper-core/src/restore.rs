//! 关系库的交换-重命名恢复
//!
//! 备份先加载到临时库 `<live>_tmp` 并校验，之后通过两次重命名完成切换：
//!
//! ```text
//! live      -> live_retired
//! live_tmp  -> live
//! ```
//!
//! 第二次重命名失败时立即把 `live_retired` 改回 `live`；只有这一步也失败时，
//! 才会出现没有在线库的状态，并以 [`KeeperError::SwapPartiallyApplied`] 报告。
//! 成功后旧数据保留在 `live_retired` 中，不会自动删除。

use crate::config::AppConfig;
use crate::constants::restore::{RETIRED_SUFFIX, TEMP_SUFFIX};
use crate::container::{DockerManager, check_output};
use crate::health::{HealthProbe, wait_until_ready};
use crate::lock::SessionLock;
use crate::store::{StoreAdapter, validate_store_name};
use crate::{KeeperError, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePhase {
    Idle,
    Preparing,
    Loading,
    Verifying,
    Swapping,
    Completed,
    Failed,
}

impl fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RestorePhase::Idle => "idle",
            RestorePhase::Preparing => "preparing",
            RestorePhase::Loading => "loading",
            RestorePhase::Verifying => "verifying",
            RestorePhase::Swapping => "swapping",
            RestorePhase::Completed => "completed",
            RestorePhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// 一次恢复会话
#[derive(Debug, Clone)]
pub struct RestoreSession {
    pub artifact: PathBuf,
    pub live_name: String,
    pub temp_name: String,
    pub retired_name: String,
    phase: RestorePhase,
}

impl RestoreSession {
    pub fn new(artifact: &Path, live_name: &str) -> Result<Self> {
        let temp_name = format!("{live_name}{TEMP_SUFFIX}");
        let retired_name = format!("{live_name}{RETIRED_SUFFIX}");
        for name in [live_name, temp_name.as_str(), retired_name.as_str()] {
            validate_store_name(name)?;
        }

        Ok(Self {
            artifact: artifact.to_path_buf(),
            live_name: live_name.to_string(),
            temp_name,
            retired_name,
            phase: RestorePhase::Idle,
        })
    }

    pub fn phase(&self) -> RestorePhase {
        self.phase
    }

    fn advance(&mut self, next: RestorePhase) {
        info!(
            live = %self.live_name,
            from = %self.phase,
            to = %next,
            "恢复阶段切换"
        );
        self.phase = next;
    }
}

/// 恢复结果
#[derive(Debug)]
pub struct RestoreOutcome {
    pub live_name: String,
    pub retired_name: String,
    pub artifact: PathBuf,
    /// 校验时在新库中看到的对象数量
    pub objects_restored: u64,
    /// 通知依赖服务失败不影响恢复本身，错误保留在这里
    pub reconnect_error: Option<KeeperError>,
}

/// 恢复完成后通知依赖服务重新建立连接
#[async_trait]
pub trait ReconnectSignal: Send + Sync {
    fn describe(&self) -> String;

    async fn send(&self) -> Result<()>;
}

/// 通过 `docker compose restart` 重启依赖关系库的服务
#[derive(Debug, Clone)]
pub struct ComposeRestartSignal {
    docker: DockerManager,
    services: Vec<String>,
}

impl ComposeRestartSignal {
    pub fn new(docker: DockerManager, services: Vec<String>) -> Self {
        Self { docker, services }
    }
}

#[async_trait]
impl ReconnectSignal for ComposeRestartSignal {
    fn describe(&self) -> String {
        format!("docker compose restart {}", self.services.join(" "))
    }

    async fn send(&self) -> Result<()> {
        if self.services.is_empty() {
            return Ok(());
        }

        let mut args = vec!["restart"];
        args.extend(self.services.iter().map(String::as_str));
        let output = self.docker.run_compose_command(&args).await?;
        check_output(output, &self.describe())?;
        Ok(())
    }
}

/// 恢复协调器
pub struct RestoreCoordinator {
    adapter: Arc<dyn StoreAdapter>,
    lock_dir: PathBuf,
    reconnect: Option<Arc<dyn ReconnectSignal>>,
    probe: Option<Arc<dyn HealthProbe>>,
    reconnect_timeout: Duration,
    probe_interval: Duration,
}

impl RestoreCoordinator {
    pub fn new(config: &AppConfig, adapter: Arc<dyn StoreAdapter>) -> Self {
        Self {
            adapter,
            lock_dir: config.get_lock_dir(),
            reconnect: None,
            probe: None,
            reconnect_timeout: Duration::from_secs(config.restore.reconnect_timeout_secs),
            probe_interval: Duration::from_secs(config.deploy.health_interval_secs),
        }
    }

    pub fn with_reconnect(mut self, signal: Arc<dyn ReconnectSignal>) -> Self {
        self.reconnect = Some(signal);
        self
    }

    pub fn with_health_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_reconnect_timeout(mut self, timeout: Duration, probe_interval: Duration) -> Self {
        self.reconnect_timeout = timeout;
        self.probe_interval = probe_interval;
        self
    }

    /// 适配器对应的在线库名称
    pub fn default_live_name(&self) -> &str {
        self.adapter.name()
    }

    /// 用备份替换在线库
    ///
    /// `confirmed` 必须为 true，否则在产生任何副作用之前返回
    /// [`KeeperError::ConfirmationRequired`]。进入 Preparing 之后不可取消。
    pub async fn restore(
        &self,
        artifact: &Path,
        live_name: &str,
        confirmed: bool,
    ) -> Result<RestoreOutcome> {
        if !confirmed {
            return Err(KeeperError::ConfirmationRequired);
        }

        let mut session = RestoreSession::new(artifact, live_name)?;
        let _lock = SessionLock::acquire(&self.lock_dir, live_name)?;

        let objects_restored = match self.run_protocol(&mut session).await {
            Ok(objects) => objects,
            Err(e) => {
                session.advance(RestorePhase::Failed);
                error!(live = %session.live_name, "恢复失败: {}", e);
                return Err(e);
            }
        };

        session.advance(RestorePhase::Completed);
        info!(
            "恢复完成: {} 已替换为 {}，旧数据保留在 {}",
            session.live_name,
            session.artifact.display(),
            session.retired_name
        );

        let reconnect_error = self.reconnect().await.err();
        if let Some(e) = &reconnect_error {
            warn!("{}", e);
        }

        Ok(RestoreOutcome {
            live_name: session.live_name,
            retired_name: session.retired_name,
            artifact: session.artifact,
            objects_restored,
            reconnect_error,
        })
    }

    async fn run_protocol(&self, session: &mut RestoreSession) -> Result<u64> {
        session.advance(RestorePhase::Preparing);
        self.prepare(session).await?;

        session.advance(RestorePhase::Loading);
        if let Err(e) = self.load_temp(session).await {
            self.drop_temp(session).await;
            return Err(KeeperError::LoadFailed(e.to_string()));
        }

        session.advance(RestorePhase::Verifying);
        let objects = match self.adapter.verify(&session.temp_name).await {
            Ok(0) => {
                self.drop_temp(session).await;
                return Err(KeeperError::VerificationFailed(format!(
                    "{} 中没有任何表",
                    session.temp_name
                )));
            }
            Ok(objects) => objects,
            Err(e) => {
                self.drop_temp(session).await;
                return Err(KeeperError::VerificationFailed(e.to_string()));
            }
        };

        session.advance(RestorePhase::Swapping);
        self.swap(session).await?;
        Ok(objects)
    }

    async fn prepare(&self, session: &RestoreSession) -> Result<()> {
        let readable = match tokio::fs::metadata(&session.artifact).await {
            Ok(metadata) if metadata.is_file() => {
                tokio::fs::File::open(&session.artifact).await.is_ok()
            }
            _ => false,
        };
        if !readable {
            return Err(KeeperError::ArtifactNotFound(session.artifact.clone()));
        }

        let adapter = &self.adapter;
        adapter.health_check().await.map_err(|e| match e {
            KeeperError::StoreUnavailable { .. } => e,
            other => KeeperError::store_unavailable(adapter.name(), other.to_string()),
        })?;

        if !adapter.exists(&session.live_name).await? {
            return Err(KeeperError::store_unavailable(
                &session.live_name,
                "在线数据库不存在",
            ));
        }

        if adapter.exists(&session.retired_name).await? {
            return Err(KeeperError::RetiredStoreExists {
                retired: session.retired_name.clone(),
            });
        }

        if adapter.exists(&session.temp_name).await? {
            warn!("删除上次遗留的临时库: {}", session.temp_name);
            adapter.drop_store(&session.temp_name).await?;
        }

        Ok(())
    }

    async fn load_temp(&self, session: &RestoreSession) -> Result<()> {
        self.adapter.create(&session.temp_name).await?;
        self.adapter
            .load_into(&session.temp_name, &session.artifact)
            .await
    }

    async fn swap(&self, session: &RestoreSession) -> Result<()> {
        let adapter = &self.adapter;
        let (live, temp, retired) = (
            &session.live_name,
            &session.temp_name,
            &session.retired_name,
        );

        if let Err(e) = adapter.rename(live, retired).await {
            self.drop_temp(session).await;
            return Err(KeeperError::LoadFailed(format!(
                "无法将 {live} 重命名为 {retired}，在线库未改动: {e}"
            )));
        }

        let Err(e) = adapter.rename(temp, live).await else {
            return Ok(());
        };

        warn!("将 {} 重命名为 {} 失败，回退: {}", temp, live, e);
        match adapter.rename(retired, live).await {
            Ok(()) => {
                self.drop_temp(session).await;
                Err(KeeperError::LoadFailed(format!(
                    "无法将 {temp} 重命名为 {live}，已回退到原在线库: {e}"
                )))
            }
            Err(corrective) => {
                error!("回退重命名 {} -> {} 失败: {}", retired, live, corrective);
                Err(KeeperError::SwapPartiallyApplied {
                    live: live.clone(),
                    retired: retired.clone(),
                    temp: temp.clone(),
                })
            }
        }
    }

    async fn drop_temp(&self, session: &RestoreSession) {
        if let Err(e) = self.adapter.drop_store(&session.temp_name).await {
            warn!("删除临时库 {} 失败: {}", session.temp_name, e);
        }
    }

    async fn reconnect(&self) -> Result<()> {
        if let Some(signal) = &self.reconnect {
            info!("通知依赖服务重新连接: {}", signal.describe());
            match tokio::time::timeout(self.reconnect_timeout, signal.send()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(KeeperError::ReconnectSignalFailed(format!(
                        "{}: {e}",
                        signal.describe()
                    )));
                }
                Err(_) => {
                    return Err(KeeperError::ReconnectSignalFailed(format!(
                        "{} 在 {:?} 内未完成",
                        signal.describe(),
                        self.reconnect_timeout
                    )));
                }
            }
        }

        if let Some(probe) = &self.probe {
            wait_until_ready(probe.as_ref(), self.reconnect_timeout, self.probe_interval)
                .await
                .map_err(|e| KeeperError::ReconnectSignalFailed(e.to_string()))?;
        }

        Ok(())
    }
}
