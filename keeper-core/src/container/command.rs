use super::types::DockerManager;
use crate::{KeeperError, Result};
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;

impl DockerManager {
    /// 检查 Docker 状态
    pub async fn check_docker_status(&self) -> Result<()> {
        if which::which("docker").is_err() {
            return Err(KeeperError::docker("Docker 未安装或不在 PATH 中"));
        }

        let output = self.run_docker_command(&["info"]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KeeperError::Docker(format!("Docker 服务未运行: {stderr}")));
        }

        Ok(())
    }

    /// 在容器内执行命令并返回标准输出
    pub async fn exec(&self, container: &str, cmd: &[&str]) -> Result<String> {
        let mut args = vec!["exec", container];
        args.extend(cmd);

        let output = self.run_docker_command(&args).await?;
        let output = check_output(output, &describe(container, cmd))?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// 在容器内执行命令，标准输出直接写入宿主机文件，返回写入的字节数
    pub async fn exec_to_file(&self, container: &str, cmd: &[&str], dest: &Path) -> Result<u64> {
        let file = tokio::fs::File::create(dest).await?.into_std().await;

        let output = Command::new("docker")
            .arg("exec")
            .arg(container)
            .args(cmd)
            .stdout(Stdio::from(file))
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;
        check_output(output, &describe(container, cmd))?;

        Ok(tokio::fs::metadata(dest).await?.len())
    }

    /// 在容器内执行命令，以宿主机文件作为标准输入
    pub async fn exec_with_input(&self, container: &str, cmd: &[&str], input: &Path) -> Result<()> {
        let file = tokio::fs::File::open(input).await?.into_std().await;

        let output = Command::new("docker")
            .arg("exec")
            .arg("-i")
            .arg(container)
            .args(cmd)
            .stdin(Stdio::from(file))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;
        check_output(output, &describe(container, cmd))?;

        Ok(())
    }

    /// 从容器中复制文件到宿主机
    pub async fn copy_from_container(&self, container: &str, src: &str, dest: &Path) -> Result<()> {
        let source = format!("{container}:{src}");
        let dest_str = dest.to_string_lossy().to_string();

        let output = self.run_docker_command(&["cp", &source, &dest_str]).await?;
        check_output(output, &format!("docker cp {source}"))?;
        Ok(())
    }

    /// 执行 docker-compose 命令
    pub async fn run_compose_command(&self, args: &[&str]) -> Result<Output> {
        if !self.compose_file_exists() {
            return Err(KeeperError::Docker(format!(
                "Docker Compose 文件不存在: {}",
                self.compose_file.display()
            )));
        }

        // 尝试使用 docker compose（新语法）
        if let Ok(output) = self.run_docker_compose_subcommand(args).await {
            return Ok(output);
        }

        // 回退到 docker-compose（旧语法）
        self.run_docker_compose_standalone(args).await
    }

    /// 使用 docker compose 子命令
    async fn run_docker_compose_subcommand(&self, args: &[&str]) -> Result<Output> {
        let compose_path = self.compose_file.to_string_lossy().to_string();
        let mut cmd_args = vec!["compose", "-f", &compose_path];
        cmd_args.extend(args);

        self.run_docker_command(&cmd_args).await
    }

    /// 使用独立的 docker-compose 命令
    async fn run_docker_compose_standalone(&self, args: &[&str]) -> Result<Output> {
        let compose_path = self.compose_file.to_string_lossy().to_string();
        let mut cmd_args = vec!["-f", &compose_path];
        cmd_args.extend(args);

        let output = Command::new("docker-compose")
            .args(&cmd_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(output)
    }

    /// 执行 docker 命令
    pub(crate) async fn run_docker_command(&self, args: &[&str]) -> Result<Output> {
        let output = Command::new("docker")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(output)
    }
}

/// 检查命令退出状态，失败时携带 stderr
pub(crate) fn check_output(output: Output, what: &str) -> Result<Output> {
    if output.status.success() {
        return Ok(output);
    }

    // 部分客户端工具（如 redis-cli）把错误回复写到标准输出
    let stderr = String::from_utf8_lossy(&output.stderr);
    let detail = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout)
    } else {
        stderr
    };
    Err(KeeperError::Docker(format!(
        "{what} 执行失败 ({}): {}",
        output.status,
        detail.trim()
    )))
}

fn describe(container: &str, cmd: &[&str]) -> String {
    format!(
        "docker exec {container} {}",
        cmd.first().copied().unwrap_or_default()
    )
}
