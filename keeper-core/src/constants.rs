/// 配置文件相关常量
pub mod config {
    /// 默认配置文件名
    pub const DEFAULT_CONFIG_FILE: &str = "keeper.toml";

    /// 按优先级查找的配置文件名
    pub const CONFIG_FILE_CANDIDATES: &[&str] = &[DEFAULT_CONFIG_FILE, ".keeper.toml"];
}

/// Docker相关路径常量
pub mod docker {
    use std::path::{Path, PathBuf};

    /// docker-compose.yml文件名
    pub const COMPOSE_FILE_NAME: &str = "docker-compose.yml";

    /// Docker工作目录名
    pub const DOCKER_DIR_NAME: &str = "docker";

    /// 获取默认的docker-compose.yml文件路径（跨平台）
    pub fn get_compose_file_path() -> PathBuf {
        Path::new(".").join(DOCKER_DIR_NAME).join(COMPOSE_FILE_NAME)
    }

    /// 获取默认compose文件路径的字符串表示
    pub fn get_compose_file_path_str() -> String {
        get_compose_file_path().to_string_lossy().to_string()
    }
}

/// 备份相关常量
pub mod backup {
    use std::path::{Path, PathBuf};

    /// 备份目录名
    pub const BACKUP_DIR_NAME: &str = "backups";

    /// BackupSet 清单目录名
    pub const MANIFEST_DIR_NAME: &str = "manifests";

    /// BackupSet 清单文件前缀
    pub const MANIFEST_PREFIX: &str = "backupset";

    /// 清单文件扩展名
    pub const MANIFEST_EXTENSION: &str = "json";

    /// 备份进行中的临时文件后缀
    pub const PARTIAL_SUFFIX: &str = ".partial";

    /// 会话锁目录名
    pub const LOCK_DIR_NAME: &str = ".locks";

    /// 备份文件名中的时间戳格式（UTC）
    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

    /// 默认保留天数
    pub const DEFAULT_RETENTION_DAYS: u64 = 30;

    /// 卷归档压缩级别 (0-9)
    pub const VOLUME_COMPRESSION_LEVEL: u32 = 6;

    /// 获取默认备份存储目录（用于配置）
    pub fn get_default_storage_dir() -> PathBuf {
        Path::new(".").join(BACKUP_DIR_NAME)
    }
}

/// 恢复相关常量
pub mod restore {
    /// 临时库名后缀
    pub const TEMP_SUFFIX: &str = "_tmp";

    /// 退役库名后缀
    pub const RETIRED_SUFFIX: &str = "_retired";

    /// PostgreSQL 标识符最大长度（字节）
    pub const MAX_IDENTIFIER_LEN: usize = 63;

    /// 执行维护语句时连接的数据库
    pub const MAINTENANCE_DATABASE: &str = "postgres";
}

/// 部署相关常量
pub mod deploy {
    /// 默认部署历史文件
    pub const DEFAULT_HISTORY_FILE: &str = "deploy-history.json";

    /// 部署锁名称
    pub const DEPLOYMENT_LOCK: &str = "deployment";

    /// 默认无状态服务
    pub const DEFAULT_STATELESS_SERVICES: &[&str] = &["api", "worker"];

    /// 默认就绪探针地址
    pub const DEFAULT_HEALTH_URL: &str = "http://127.0.0.1:8000/health/ready";
}

/// 存储默认值
pub mod stores {
    /// PostgreSQL 容器名
    pub const POSTGRES_CONTAINER: &str = "postgres";

    /// PostgreSQL 用户
    pub const POSTGRES_USER: &str = "postgres";

    /// 在线数据库名
    pub const POSTGRES_DATABASE: &str = "app";

    /// Redis 容器名
    pub const REDIS_CONTAINER: &str = "redis";

    /// 容器内 RDB 文件路径
    pub const REDIS_RDB_PATH: &str = "/data/dump.rdb";

    /// 向量库数据目录
    pub const VOLUME_DATA_DIR: &str = "./docker/data/vectors";
}

/// 超时时间常量（秒）
pub mod timeout {
    /// 单个存储备份的超时时间
    pub const STORE_BACKUP_TIMEOUT: u64 = 1800;

    /// 回滚后健康检查超时时间
    pub const HEALTH_CHECK_TIMEOUT: u64 = 30;

    /// 健康检查间隔时间
    pub const HEALTH_CHECK_INTERVAL: u64 = 2;

    /// 单次探针请求超时时间
    pub const PROBE_REQUEST_TIMEOUT: u64 = 5;

    /// 恢复后等待依赖服务重连的超时时间
    pub const RECONNECT_TIMEOUT: u64 = 60;

    /// Redis BGSAVE 完成等待时间
    pub const CACHE_SNAPSHOT_TIMEOUT: u64 = 120;

    /// Redis 快照状态轮询间隔（毫秒）
    pub const CACHE_SNAPSHOT_POLL_MS: u64 = 500;
}
