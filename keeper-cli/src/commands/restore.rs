use crate::app::CliApp;
use keeper_core::{
    KeeperError, catalog,
    error::Result,
    health::HttpHealthProbe,
    restore::{ComposeRestartSignal, RestoreCoordinator},
    store::StoreKind,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const LATEST: &str = "latest";

/// 用关系库备份替换在线数据库
pub async fn run_restore(
    app: &CliApp,
    artifact: &str,
    live: Option<&str>,
    confirmed: bool,
) -> Result<i32> {
    let artifact = resolve_artifact(app, artifact)?;
    let mut coordinator = RestoreCoordinator::new(
        &app.config,
        app.adapter_for(StoreKind::Relational),
    )
    .with_reconnect(Arc::new(ComposeRestartSignal::new(
        app.docker_manager.clone(),
        app.config.restore.reconnect_services.clone(),
    )));
    let live = live.unwrap_or(coordinator.default_live_name()).to_string();

    info!("♻️  恢复数据库 {}", live);
    info!("===============");
    info!("备份文件: {}", artifact.display());

    if let Some(url) = &app.config.restore.health_url {
        let probe = HttpHealthProbe::new(
            url.clone(),
            Duration::from_secs(app.config.deploy.probe_request_timeout_secs),
        )?;
        coordinator = coordinator.with_health_probe(Arc::new(probe));
    }

    let outcome = coordinator.restore(&artifact, &live, confirmed).await?;

    info!(
        "✅ 恢复完成: {} 包含 {} 张表",
        outcome.live_name, outcome.objects_restored
    );
    info!("💡 旧数据保留在 {}，确认无误后可手动删除", outcome.retired_name);
    if let Some(e) = &outcome.reconnect_error {
        warn!("⚠️  {}", e);
        warn!("👉 请手动重启依赖数据库的服务");
    }
    Ok(0)
}

/// `latest` 表示最新的关系库备份，其余按文件路径处理
fn resolve_artifact(app: &CliApp, artifact: &str) -> Result<PathBuf> {
    if artifact != LATEST {
        return Ok(PathBuf::from(artifact));
    }

    let root = app.config.get_backup_dir();
    catalog::latest_artifact(&root, StoreKind::Relational)?
        .map(|entry| entry.path)
        .ok_or_else(|| KeeperError::ArtifactNotFound(catalog::store_dir(&root, StoreKind::Relational)))
}
