use super::{StoreAdapter, StoreKind, validate_store_name};
use crate::config::RelationalStoreConfig;
use crate::constants::restore::MAINTENANCE_DATABASE;
use crate::container::DockerManager;
use crate::{KeeperError, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

/// PostgreSQL 适配器，通过 `docker exec` 调用容器内的客户端工具
#[derive(Debug, Clone)]
pub struct PostgresAdapter {
    docker: DockerManager,
    container: String,
    user: String,
    database: String,
}

impl PostgresAdapter {
    pub fn new(docker: DockerManager, config: &RelationalStoreConfig) -> Self {
        Self {
            docker,
            container: config.container.clone(),
            user: config.user.clone(),
            database: config.database.clone(),
        }
    }

    /// 在指定数据库上执行一条 SQL，返回无格式的结果
    async fn psql(&self, database: &str, sql: &str) -> Result<String> {
        debug!(database, sql, "执行 SQL");
        self.docker
            .exec(
                &self.container,
                &[
                    "psql",
                    "-U",
                    &self.user,
                    "-d",
                    database,
                    "-v",
                    "ON_ERROR_STOP=1",
                    "-tAc",
                    sql,
                ],
            )
            .await
    }

    /// 断开指定数据库上的所有连接，重命名与删除前必须执行
    async fn terminate_connections(&self, name: &str) -> Result<()> {
        self.psql(
            MAINTENANCE_DATABASE,
            &format!(
                "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
                 WHERE datname = '{name}' AND pid <> pg_backend_pid()"
            ),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StoreAdapter for PostgresAdapter {
    fn kind(&self) -> StoreKind {
        StoreKind::Relational
    }

    fn name(&self) -> &str {
        &self.database
    }

    async fn health_check(&self) -> Result<()> {
        self.docker
            .exec(
                &self.container,
                &["pg_isready", "-U", &self.user, "-d", &self.database],
            )
            .await
            .map(|_| ())
            .map_err(|e| KeeperError::store_unavailable(&self.database, e.to_string()))
    }

    async fn backup(&self, artifact_path: &Path) -> Result<u64> {
        validate_store_name(&self.database)?;
        info!("导出数据库 {} -> {}", self.database, artifact_path.display());

        self.docker
            .exec_to_file(
                &self.container,
                &["pg_dump", "-U", &self.user, "-Fc", &self.database],
                artifact_path,
            )
            .await
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        validate_store_name(name)?;
        let output = self
            .psql(
                MAINTENANCE_DATABASE,
                &format!("SELECT 1 FROM pg_database WHERE datname = '{name}'"),
            )
            .await?;
        Ok(output.trim() == "1")
    }

    async fn create(&self, name: &str) -> Result<()> {
        validate_store_name(name)?;
        self.psql(MAINTENANCE_DATABASE, &format!("CREATE DATABASE \"{name}\""))
            .await?;
        Ok(())
    }

    async fn load_into(&self, name: &str, artifact: &Path) -> Result<()> {
        validate_store_name(name)?;
        info!("加载 {} 到数据库 {}", artifact.display(), name);

        self.docker
            .exec_with_input(
                &self.container,
                &[
                    "pg_restore",
                    "-U",
                    &self.user,
                    "-d",
                    name,
                    "--no-owner",
                    "--no-privileges",
                    "--exit-on-error",
                ],
                artifact,
            )
            .await
    }

    async fn verify(&self, name: &str) -> Result<u64> {
        validate_store_name(name)?;
        let output = self
            .psql(
                name,
                "SELECT count(*) FROM information_schema.tables \
                 WHERE table_schema NOT IN ('pg_catalog', 'information_schema')",
            )
            .await?;

        output
            .trim()
            .parse::<u64>()
            .map_err(|e| KeeperError::VerificationFailed(format!("无法解析表数量 `{output}`: {e}")))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        validate_store_name(from)?;
        validate_store_name(to)?;

        self.terminate_connections(from).await?;
        self.psql(
            MAINTENANCE_DATABASE,
            &format!("ALTER DATABASE \"{from}\" RENAME TO \"{to}\""),
        )
        .await?;
        info!("数据库已重命名: {} -> {}", from, to);
        Ok(())
    }

    async fn drop_store(&self, name: &str) -> Result<()> {
        validate_store_name(name)?;

        self.terminate_connections(name).await?;
        self.psql(
            MAINTENANCE_DATABASE,
            &format!("DROP DATABASE IF EXISTS \"{name}\""),
        )
        .await?;
        info!("数据库已删除: {}", name);
        Ok(())
    }
}
