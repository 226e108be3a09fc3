use super::{StoreAdapter, StoreKind};
use crate::config::VolumeStoreConfig;
use crate::{KeeperError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 向量/对象卷适配器，将宿主机上的数据目录打包为 `.tar.gz`
#[derive(Debug, Clone)]
pub struct VolumeArchiveAdapter {
    source_dir: PathBuf,
    compression_level: u32,
    name: String,
}

impl VolumeArchiveAdapter {
    pub fn new(config: &VolumeStoreConfig) -> Self {
        Self::with_source(PathBuf::from(&config.data_dir), config.compression_level)
    }

    pub fn with_source(source_dir: PathBuf, compression_level: u32) -> Self {
        let name = source_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "volume".to_string());

        Self {
            source_dir,
            compression_level: compression_level.min(9),
            name,
        }
    }
}

#[async_trait]
impl StoreAdapter for VolumeArchiveAdapter {
    fn kind(&self) -> StoreKind {
        StoreKind::Volume
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> Result<()> {
        if tokio::fs::metadata(&self.source_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            Ok(())
        } else {
            Err(KeeperError::store_unavailable(
                &self.name,
                format!("数据目录不存在: {}", self.source_dir.display()),
            ))
        }
    }

    async fn backup(&self, artifact_path: &Path) -> Result<u64> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::fs::File;
        use tar::Builder;

        let source_dir = self.source_dir.clone();
        let backup_path = artifact_path.to_path_buf();
        let dir_name = self.name.clone();
        let compression_level = self.compression_level;

        // 在后台线程中执行压缩操作，避免阻塞异步运行时
        tokio::task::spawn_blocking(move || {
            let file = File::create(&backup_path)?;
            let encoder = GzEncoder::new(file, Compression::new(compression_level));
            let mut archive = Builder::new(encoder);

            for entry in WalkDir::new(&source_dir) {
                let entry = entry?;
                let path = entry.path();

                if path.is_file() {
                    let relative_path = path
                        .strip_prefix(&source_dir)
                        .map_err(|e| KeeperError::backup(format!("计算相对路径失败: {e}")))?;

                    // tar 归档内部统一使用 Unix 风格路径
                    let archive_path = format!(
                        "{}/{}",
                        dir_name,
                        relative_path.display().to_string().replace('\\', "/")
                    );

                    archive
                        .append_path_with_name(path, archive_path)
                        .map_err(|e| KeeperError::backup(format!("添加文件到归档失败: {e}")))?;
                }
            }

            archive
                .into_inner()
                .and_then(|encoder| encoder.finish())
                .map_err(|e| KeeperError::backup(format!("完成归档失败: {e}")))?;

            Ok::<(), KeeperError>(())
        })
        .await??;

        Ok(tokio::fs::metadata(artifact_path).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tar::Archive;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_volume_archive_contains_nested_files() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("vectors");
        std::fs::create_dir_all(source.join("collection")).unwrap();
        std::fs::write(source.join("index.bin"), b"index").unwrap();
        std::fs::write(source.join("collection").join("segment"), b"segment").unwrap();

        let adapter = VolumeArchiveAdapter::with_source(source, 6);
        adapter.health_check().await.unwrap();

        let artifact = dir.path().join("volume.tar.gz");
        let size = adapter.backup(&artifact).await.unwrap();
        assert!(size > 0);

        let mut archive = Archive::new(GzDecoder::new(std::fs::File::open(&artifact).unwrap()));
        let mut names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["vectors/collection/segment", "vectors/index.bin"]);
    }

    #[tokio::test]
    async fn test_missing_source_is_unavailable() {
        let dir = tempdir().unwrap();
        let adapter = VolumeArchiveAdapter::with_source(dir.path().join("missing"), 6);

        let err = adapter.health_check().await.unwrap_err();
        assert!(matches!(err, KeeperError::StoreUnavailable { .. }));
    }
}
