use crate::app::CliApp;
use crate::utils::format_size;
use keeper_core::{
    backup::{ArtifactStatus, BackupCoordinator},
    catalog,
    error::Result,
    retention::RetentionSweeper,
    store::StoreKind,
};
use tracing::{error, info, warn};

/// 备份全部存储并清理过期备份
pub async fn run_backup(app: &CliApp) -> Result<i32> {
    info!("💾 创建数据备份");
    info!("===============");

    if let Err(e) = app.docker_manager.check_docker_status().await {
        warn!("⚠️  {}，依赖容器的存储将备份失败", e);
    }

    let coordinator = BackupCoordinator::new(&app.config, app.store_adapters());
    let report = coordinator.run_backup().await;

    info!(
        "{:<8} {:<10} {:<10} {}",
        "存储", "状态", "大小", "文件路径"
    );
    info!("{}", "-".repeat(80));
    for record in &report.set.artifacts {
        let status = match record.status {
            ArtifactStatus::Succeeded => "✅ 成功",
            ArtifactStatus::Failed => "❌ 失败",
            ArtifactStatus::Skipped => "⏭️  跳过",
        };
        let path = record
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "---".to_string());
        info!(
            "{:<8} {:<10} {:<10} {}",
            record.kind.display_name(),
            status,
            format_size(record.size_bytes),
            path
        );
        if let Some(reason) = &record.error {
            warn!("   {}: {}", record.kind.display_name(), reason);
        }
    }

    let swept: usize = report.swept.values().sum();
    if swept > 0 {
        info!("🧹 清理过期备份 {} 个", swept);
    }
    for sweep_error in &report.sweep_errors {
        warn!("⚠️  清理失败: {}", sweep_error);
    }
    if let Some(manifest) = &report.manifest {
        info!("📝 备份清单: {}", manifest.display());
    }

    match report.exit_code() {
        0 => info!("✅ 备份完成"),
        1 => error!("❌ 关系库备份失败"),
        _ => warn!("⚠️  关系库备份成功，但部分存储缺少备份"),
    }
    Ok(report.exit_code())
}

/// 从文件系统列出备份
pub fn run_list_backups(app: &CliApp, kind: Option<StoreKind>) -> Result<i32> {
    let root = app.config.get_backup_dir();
    let kinds: Vec<StoreKind> = match kind {
        Some(kind) => vec![kind],
        None => StoreKind::ALL.to_vec(),
    };

    let mut total = 0usize;
    let mut total_size = 0u64;
    for kind in kinds {
        let entries = catalog::list_artifacts(&root, kind)?;
        if entries.is_empty() {
            continue;
        }

        info!("📦 {} ({} 个)", kind.display_name(), entries.len());
        info!("{:<20} {:<10} {}", "创建时间 (UTC)", "大小", "文件路径");
        info!("{}", "-".repeat(80));
        for entry in entries.iter().rev() {
            info!(
                "{:<20} {:<10} {}",
                entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                format_size(entry.size_bytes),
                entry.path.display()
            );
            total_size += entry.size_bytes;
        }
        total += entries.len();
    }

    if total == 0 {
        info!("📦 暂无备份 ({})", root.display());
        info!("💡 使用以下命令创建备份:");
        info!("   keeper backup");
    } else {
        info!("共 {} 个备份，{}", total, format_size(total_size));
    }
    Ok(0)
}

/// 只执行保留期清理
pub fn run_sweep(app: &CliApp, kind: Option<StoreKind>) -> Result<i32> {
    let sweeper = RetentionSweeper::new(app.config.get_backup_dir());
    let kinds: Vec<StoreKind> = match kind {
        Some(kind) => vec![kind],
        None => StoreKind::ALL.to_vec(),
    };

    let mut deleted = 0;
    for kind in kinds {
        let retention = app.config.retention_for(kind);
        let count = sweeper.sweep(kind, retention)?;
        info!(
            "🧹 {}: 删除 {} 个超过 {} 天的备份",
            kind.display_name(),
            count,
            retention.as_secs() / 86400
        );
        deleted += count;
    }
    if kind.is_none() {
        deleted += sweeper.sweep_manifests(app.config.manifest_retention())?;
    }

    info!("✅ 清理完成，共删除 {} 个文件", deleted);
    Ok(0)
}
