//! Keeper CLI 项目信息模块
//!
//! keeper-cli 是面向用户的主程序，项目元数据统一在这里定义，
//! keeper-core 作为内部库只提供技术性常量

/// 项目元数据（自动从 keeper-cli 的 Cargo.toml 同步）
pub mod metadata {
    /// 项目名称
    pub const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

    /// 项目描述
    pub const PROJECT_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

    /// 项目作者
    pub const PROJECT_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

    /// 用户友好的显示名称（手动维护）
    pub mod display {
        /// 用户友好的项目名称
        pub const FRIENDLY_NAME: &str = "Keeper";

        /// 项目详细描述
        pub const DESCRIPTION_LONG: &str = "为关系库、向量数据卷与缓存生成带时间戳的备份，按保留期自动清理；\
             以交换-重命名方式原子恢复关系库，并在健康检查把关下回滚无状态服务的部署";
    }
}

/// 版本信息
pub mod version_info {
    /// CLI 版本（自动从 Cargo.toml 同步）
    pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// 获取版本信息字符串
pub fn get_version_string() -> String {
    format!(
        "{} v{}",
        metadata::display::FRIENDLY_NAME,
        version_info::CLI_VERSION
    )
}
