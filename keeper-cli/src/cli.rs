use crate::project_info::{metadata, version_info};
use clap::{Parser, Subcommand};
use keeper_core::constants::config::DEFAULT_CONFIG_FILE;
use keeper_core::store::StoreKind;
use std::path::PathBuf;

/// Keeper CLI - 多存储备份、原子恢复与部署回滚
#[derive(Parser, Debug)]
#[command(name = "keeper")]
#[command(about = metadata::PROJECT_DESCRIPTION)]
#[command(version = version_info::CLI_VERSION)]
#[command(long_about = metadata::display::DESCRIPTION_LONG)]
#[command(author = metadata::PROJECT_AUTHORS)]
pub struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// 详细输出
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// 创建默认配置文件
    Init {
        /// 如果配置文件已存在，强制覆盖
        #[arg(long)]
        force: bool,
    },
    /// 备份全部存储并清理过期备份
    Backup,
    /// 列出备份文件
    ListBackups {
        /// 只列出指定存储类型 (relational, volume, cache)
        #[arg(long, value_parser = parse_store_kind)]
        kind: Option<StoreKind>,
    },
    /// 用关系库备份替换在线数据库
    Restore {
        /// 备份文件路径，或 `latest` 表示最新的关系库备份
        artifact: String,
        /// 在线数据库名称（默认使用配置中的数据库）
        #[arg(long)]
        live: Option<String>,
        /// 确认替换在线数据库
        #[arg(long)]
        yes: bool,
    },
    /// 回滚到上一个部署版本
    Rollback,
    /// 只执行保留期清理
    Sweep {
        /// 只清理指定存储类型
        #[arg(long, value_parser = parse_store_kind)]
        kind: Option<StoreKind>,
    },
    /// 记录一次部署的镜像
    RecordDeploy {
        /// 镜像引用，例如 registry.local/app:v3
        image: String,
    },
}

fn parse_store_kind(value: &str) -> Result<StoreKind, String> {
    value.parse::<StoreKind>().map_err(|e| e.to_string())
}
