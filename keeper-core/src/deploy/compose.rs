use super::Deployer;
use crate::container::{DockerManager, check_output};
use crate::{KeeperError, Result};
use async_trait::async_trait;
use serde_yaml::Value;
use tracing::{info, warn};

/// 基于 docker-compose.yml 的部署执行器
///
/// 只改写并重建配置中列出的无状态服务，数据库等有状态服务不受影响。
#[derive(Debug, Clone)]
pub struct ComposeDeployer {
    docker: DockerManager,
    services: Vec<String>,
}

impl ComposeDeployer {
    pub fn new(docker: DockerManager, services: Vec<String>) -> Self {
        Self { docker, services }
    }

    async fn read_descriptor(&self) -> Result<Value> {
        let path = self.docker.get_compose_file();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            KeeperError::Docker(format!("无法读取 {}: {e}", path.display()))
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }

    async fn write_descriptor(&self, doc: &Value) -> Result<()> {
        let path = self.docker.get_compose_file();
        let tmp = path.with_extension("yml.tmp");
        tokio::fs::write(&tmp, serde_yaml::to_string(doc)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl Deployer for ComposeDeployer {
    async fn current_image(&self) -> Result<Option<String>> {
        let doc = self.read_descriptor().await?;
        let images: Vec<Option<&str>> = self
            .services
            .iter()
            .map(|service| service_image(&doc, service))
            .collect();

        if images.windows(2).any(|pair| pair[0] != pair[1]) {
            warn!("无状态服务引用的镜像不一致: {:?}", images);
        }
        Ok(images.first().copied().flatten().map(str::to_string))
    }

    async fn apply_image(&self, image: &str) -> Result<()> {
        let mut doc = self.read_descriptor().await?;
        set_service_images(&mut doc, &self.services, image)?;
        self.write_descriptor(&doc).await?;
        info!(
            "已将 {} 的镜像改为 {}",
            self.services.join(", "),
            image
        );
        Ok(())
    }

    async fn redeploy(&self) -> Result<()> {
        let mut args = vec!["up", "-d", "--no-deps"];
        args.extend(self.services.iter().map(String::as_str));

        info!("重新部署服务: {}", self.services.join(", "));
        let output = self.docker.run_compose_command(&args).await?;
        check_output(output, "docker compose up")?;
        Ok(())
    }
}

/// 读取 `services.<service>.image`
pub fn service_image<'a>(doc: &'a Value, service: &str) -> Option<&'a str> {
    doc.get("services")?.get(service)?.get("image")?.as_str()
}

/// 将指定服务的 `image` 改为 `image`，任一服务不存在时报错且不修改文档
pub fn set_service_images(doc: &mut Value, services: &[String], image: &str) -> Result<()> {
    let missing: Vec<&str> = services
        .iter()
        .filter(|s| doc.get("services").and_then(|all| all.get(s.as_str())).is_none())
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(KeeperError::Docker(format!(
            "docker-compose.yml 中缺少服务: {}",
            missing.join(", ")
        )));
    }

    for service in services {
        let Some(Value::Mapping(config)) = doc
            .get_mut("services")
            .and_then(|all| all.get_mut(service.as_str()))
        else {
            return Err(KeeperError::Docker(format!("服务 {service} 的配置不是映射")));
        };
        config.insert(
            Value::String("image".to_string()),
            Value::String(image.to_string()),
        );
    }
    Ok(())
}
