use std::path::PathBuf;

/// Docker 命令执行器
///
/// 所有对容器的进程调用（`docker exec`、`docker cp`、`docker compose`）都经过这里，
/// 上层的协调器只依赖存储适配器接口。
#[derive(Debug, Clone)]
pub struct DockerManager {
    pub(crate) compose_file: PathBuf,
}
