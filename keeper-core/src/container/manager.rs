use super::types::DockerManager;
use std::path::Path;

impl DockerManager {
    /// 创建新的 Docker 管理器
    ///
    /// 不在初始化时检查文件存在性，而是在实际执行 compose 命令时检查
    pub fn new<P: AsRef<Path>>(compose_file: P) -> Self {
        Self {
            compose_file: compose_file.as_ref().to_path_buf(),
        }
    }

    /// 检查 Docker Compose 文件是否存在
    pub fn compose_file_exists(&self) -> bool {
        self.compose_file.exists()
    }

    /// 获取 Docker Compose 文件路径
    pub fn get_compose_file(&self) -> &Path {
        &self.compose_file
    }
}
