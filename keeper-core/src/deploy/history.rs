use super::{DeploymentHistory, DeploymentVersion};
use crate::Result;
use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    versions: Vec<DeploymentVersion>,
}

/// 以 JSON 文件保存的部署历史
#[derive(Debug, Clone)]
pub struct FileDeploymentHistory {
    path: PathBuf,
}

impl FileDeploymentHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<HistoryFile> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HistoryFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// 先写临时文件再重命名，避免写到一半的历史文件
    async fn store(&self, history: &HistoryFile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(history)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DeploymentHistory for FileDeploymentHistory {
    async fn versions(&self) -> Result<Vec<DeploymentVersion>> {
        Ok(self.load().await?.versions)
    }

    async fn record(&self, image: &str) -> Result<bool> {
        let mut history = self.load().await?;
        if history.versions.last().is_some_and(|v| v.image == image) {
            info!("{} 已是最近一次部署，不重复记录", image);
            return Ok(false);
        }

        history.versions.push(DeploymentVersion {
            image: image.to_string(),
            deployed_at: Utc::now().trunc_subsecs(0),
        });
        self.store(&history).await?;
        info!("记录部署: {} (共 {} 条)", image, history.versions.len());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::rollback_target;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_is_empty_history() {
        let dir = tempdir().unwrap();
        let history = FileDeploymentHistory::new(dir.path().join("deploy-history.json"));
        assert!(history.versions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_appends_and_skips_duplicates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("deploy-history.json");
        let history = FileDeploymentHistory::new(&path);

        assert!(history.record("app:v1").await.unwrap());
        assert!(history.record("app:v2").await.unwrap());
        assert!(!history.record("app:v2").await.unwrap());
        assert!(history.record("app:v3").await.unwrap());

        // 重新打开文件读取
        let reopened = FileDeploymentHistory::new(&path);
        let versions = reopened.versions().await.unwrap();
        let images: Vec<_> = versions.iter().rev().map(|v| v.image.as_str()).collect();
        assert_eq!(images, vec!["app:v3", "app:v2", "app:v1"]);

        assert_eq!(rollback_target(&versions).unwrap().image, "app:v2");
        assert!(!path.with_extension("json.tmp").exists());
    }
}
