use crate::app::CliApp;
use keeper_core::{
    constants::deploy::DEPLOYMENT_LOCK,
    deploy::{ComposeDeployer, DeploymentHistory, FileDeploymentHistory},
    error::Result,
    health::HttpHealthProbe,
    lock::SessionLock,
    rollback::RollbackController,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn history(app: &CliApp) -> FileDeploymentHistory {
    FileDeploymentHistory::new(&app.config.deploy.history_file)
}

/// 回滚到上一个部署版本
pub async fn run_rollback(app: &CliApp) -> Result<i32> {
    info!("⏪ 回滚部署");
    info!("===========");

    let deploy = &app.config.deploy;
    let probe = HttpHealthProbe::new(
        deploy.health_url.clone(),
        Duration::from_secs(deploy.probe_request_timeout_secs),
    )?;
    let controller = RollbackController::new(
        &app.config,
        Arc::new(history(app)),
        Arc::new(ComposeDeployer::new(
            app.docker_manager.clone(),
            deploy.services.clone(),
        )),
        Arc::new(probe),
    );

    let outcome = controller.rollback().await?;
    if outcome.already_applied {
        info!("ℹ️  部署描述此前已指向 {}，已重新部署", outcome.target.image);
    }
    info!(
        "✅ 已回滚到 {} (部署于 {})，{:.1} 秒后就绪",
        outcome.target.image,
        outcome.target.deployed_at.format("%Y-%m-%d %H:%M:%S"),
        outcome.ready_after.as_secs_f64()
    );
    Ok(0)
}

/// 记录一次部署
pub async fn run_record_deploy(app: &CliApp, image: &str) -> Result<i32> {
    let _lock = SessionLock::acquire(&app.config.get_lock_dir(), DEPLOYMENT_LOCK)?;

    let history = history(app);
    if history.record(image).await? {
        info!("📝 已记录部署: {}", image);
    } else {
        info!("ℹ️  {} 已是最近一次部署", image);
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_core::config::AppConfig;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_record_deploy_writes_history() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.backup.storage_dir = dir.path().join("backups").to_string_lossy().to_string();
        config.deploy.history_file = dir
            .path()
            .join("deploy-history.json")
            .to_string_lossy()
            .to_string();
        let app = CliApp::from_config(config);

        assert_eq!(run_record_deploy(&app, "app:v1").await.unwrap(), 0);
        assert_eq!(run_record_deploy(&app, "app:v2").await.unwrap(), 0);
        assert_eq!(run_record_deploy(&app, "app:v2").await.unwrap(), 0);

        let versions = history(&app).versions().await.unwrap();
        let images: Vec<_> = versions.iter().map(|v| v.image.as_str()).collect();
        assert_eq!(images, vec!["app:v1", "app:v2"]);
    }

    #[tokio::test]
    async fn test_rollback_without_history_fails() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.backup.storage_dir = dir.path().to_string_lossy().to_string();
        config.deploy.history_file = dir.path().join("none.json").to_string_lossy().to_string();
        let app = CliApp::from_config(config);

        let err = run_rollback(&app).await.unwrap_err();
        assert!(matches!(err, keeper_core::KeeperError::NoPriorVersion));
    }
}
