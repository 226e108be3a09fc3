use keeper_core::KeeperError;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

/// 日志文件环境变量
pub const LOG_FILE_ENV: &str = "KEEPER_LOG_FILE";

/// # Keeper CLI 日志系统
///
/// 库代码只使用 `tracing` 宏，日志配置由 `main.rs` 调用 `setup_logging()` 完成。
///
/// - `-v, --verbose`：DEBUG 级别
/// - `RUST_LOG`：标准的日志级别控制，优先于 `-v`
/// - `KEEPER_LOG_FILE`：设置后日志写入该文件（非阻塞写入，包含模块路径与行号）
///
/// ```bash
/// KEEPER_LOG_FILE=keeper.log keeper backup
/// RUST_LOG=keeper_core::restore=debug keeper restore latest --yes
/// ```
///
/// 返回的 guard 必须持有到进程退出前，否则缓冲中的日志会丢失。
pub fn setup_logging(verbose: bool) -> Option<WorkerGuard> {
    use tracing_subscriber::{EnvFilter, fmt};

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if let Ok(log_file) = std::env::var(LOG_FILE_ENV) {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
        {
            Ok(file) => {
                let (writer, guard) = tracing_appender::non_blocking(file);
                fmt()
                    .with_env_filter(env_filter)
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_line_number(true)
                    .init();
                return Some(guard);
            }
            Err(e) => eprintln!("无法打开日志文件 {log_file}: {e}，日志输出到终端"),
        }
    }

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_names(false)
        .with_line_number(false)
        .without_time()
        .compact()
        .init();
    None
}

/// 输出错误及操作员需要执行的下一步
pub fn report_error(e: &KeeperError) {
    error!("❌ 操作失败: {}", e);
    if e.is_fatal() {
        error!("🚨 需要人工介入，请勿在处理前再次执行恢复");
    }
    if let Some(hint) = e.recovery_hint() {
        info!("👉 {}", hint);
    }
}

/// 人类可读的文件大小
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes}B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0B");
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(2048), "2.0KB");
        assert_eq!(format_size(12 * 1024 * 1024), "12.0MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024 / 2), "1.5GB");
    }
}
