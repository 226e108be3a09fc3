// 模块声明
mod command;
mod manager;
mod types;

// 重新导出公共API
pub(crate) use command::check_output;
pub use types::DockerManager;
