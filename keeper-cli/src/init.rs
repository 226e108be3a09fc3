use crate::project_info::get_version_string;
use keeper_core::{config::AppConfig, error::Result};
use std::path::Path;
use tracing::{info, warn};

/// 写入默认配置文件并创建备份目录
pub fn run_init(config_path: &Path, force: bool) -> Result<()> {
    info!("🗄️  {} 初始化", get_version_string());
    info!("======================");

    let Some(config) = write_default_config(config_path, force)? else {
        warn!("⚠️  配置文件已存在: {}", config_path.display());
        info!("如果您要重新初始化，请使用 --force 参数");
        info!("示例: keeper init --force");
        return Ok(());
    };
    info!("   ✅ 创建配置文件: {}", config_path.display());

    let backup_dir = config.get_backup_dir();
    std::fs::create_dir_all(&backup_dir)?;
    info!("   ✅ 创建备份目录: {}", backup_dir.display());
    for kind in keeper_core::store::StoreKind::ALL {
        info!(
            "      - {}/  ({})",
            kind.dir_name(),
            kind.display_name()
        );
    }

    info!("💡 修改 {} 中的容器名与数据库名后执行: keeper backup", config_path.display());
    Ok(())
}

/// 配置文件已存在且未指定 `force` 时不写入，返回 None
fn write_default_config(config_path: &Path, force: bool) -> Result<Option<AppConfig>> {
    if config_path.exists() && !force {
        return Ok(None);
    }

    let config = AppConfig::default();
    config.save_to_file(config_path)?;
    Ok(Some(config))
}
