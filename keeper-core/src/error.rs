use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KeeperError>;

#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("配置错误: {0}")]
    Config(#[from] toml::de::Error),

    #[error("配置序列化错误: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("HTTP 请求错误: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("YAML 解析错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("任务执行错误: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("目录遍历错误: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Docker 命令执行失败: {0}")]
    Docker(String),

    #[error("备份操作失败: {0}")]
    Backup(String),

    #[error("健康检查失败: {0}")]
    HealthCheck(String),

    #[error("存储 `{store}` 不可用: {reason}")]
    StoreUnavailable { store: String, reason: String },

    #[error("备份文件不存在或不可读: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("加载备份失败: {0}")]
    LoadFailed(String),

    #[error("临时库校验失败: {0}")]
    VerificationFailed(String),

    #[error(
        "交换只完成了一半，当前不存在名为 `{live}` 的数据库。旧数据仍在 `{retired}` 中，请手动执行 \
         ALTER DATABASE \"{retired}\" RENAME TO \"{live}\" 恢复原状；\
         新加载的数据保留在 `{temp}` 中，确认后也可改为将其重命名为 `{live}`"
    )]
    SwapPartiallyApplied {
        live: String,
        retired: String,
        temp: String,
    },

    #[error(
        "`{target}` 上已有会话正在进行（锁文件: {}）；请等待其结束，确认没有进程在运行后可手动删除该锁文件",
        .lock.display()
    )]
    SessionBusy { target: String, lock: PathBuf },

    #[error("部署历史少于两条记录，没有可回滚的上一个版本")]
    NoPriorVersion,

    #[error(
        "回滚到 {image} 后健康检查未在 {timeout_secs} 秒内通过；该版本保持部署，不会再次自动回滚，请人工排查"
    )]
    RollbackUnhealthy { image: String, timeout_secs: u64 },

    #[error("通知依赖服务重新连接失败: {0}")]
    ReconnectSignalFailed(String),

    #[error("恢复操作会替换在线数据库，必须显式确认")]
    ConfirmationRequired,

    #[error(
        "退役库 `{retired}` 已存在，其中保存着上一次恢复前的数据；请先手动归档或执行 DROP DATABASE \"{retired}\" 后再恢复"
    )]
    RetiredStoreExists { retired: String },

    #[error("{store} 存储不支持操作: {operation}")]
    Unsupported { store: String, operation: String },

    #[error("非法的存储名称: {0}")]
    InvalidStoreName(String),

    #[error("超时错误: {operation} 操作超时 ({timeout_seconds}秒)")]
    Timeout {
        operation: String,
        timeout_seconds: u64,
    },

    #[error("自定义错误: {0}")]
    Custom(String),
}

impl KeeperError {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    pub fn docker(msg: impl Into<String>) -> Self {
        Self::Docker(msg.into())
    }

    pub fn backup(msg: impl Into<String>) -> Self {
        Self::Backup(msg.into())
    }

    pub fn store_unavailable(store: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            store: store.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_seconds: timeout.as_secs(),
        }
    }

    /// 是否为需要人工介入、无法自动恢复的错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SwapPartiallyApplied { .. })
    }

    /// 面向操作员的下一步建议
    pub fn recovery_hint(&self) -> Option<String> {
        match self {
            Self::SwapPartiallyApplied {
                live, retired, ..
            } => Some(format!(
                "需要人工介入: 将 `{retired}` 重命名回 `{live}` 后再重启依赖服务"
            )),
            Self::LoadFailed(_) | Self::VerificationFailed(_) | Self::ArtifactNotFound(_) => {
                Some("在线数据库未被修改，修正问题后可以直接重试".to_string())
            }
            Self::RetiredStoreExists { retired } => Some(format!(
                "先处理 `{retired}`（归档或删除），再重新执行恢复"
            )),
            Self::SessionBusy { lock, .. } => Some(format!(
                "等待当前操作结束；若确认无进程运行，删除 {}",
                lock.display()
            )),
            Self::ConfirmationRequired => Some("确认无误后添加 --yes 参数重新执行".to_string()),
            Self::RollbackUnhealthy { image, .. } => Some(format!(
                "{image} 仍在运行，请检查服务日志并手动决定下一步部署"
            )),
            Self::NoPriorVersion => Some("使用 record-deploy 记录部署历史后才能回滚".to_string()),
            _ => None,
        }
    }
}
