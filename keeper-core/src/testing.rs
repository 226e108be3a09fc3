//! 单元测试使用的内存实现

use crate::deploy::{Deployer, DeploymentHistory, DeploymentVersion};
use crate::health::HealthProbe;
use crate::restore::ReconnectSignal;
use crate::store::{StoreAdapter, StoreKind};
use crate::{KeeperError, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// 内存中的关系库：数据库名到内容的映射，内容的每个非空行算作一张表
pub struct FakeRelationalStore {
    live: String,
    databases: Mutex<BTreeMap<String, Vec<u8>>>,
    healthy: AtomicBool,
    fail_load: AtomicBool,
    fail_verify: AtomicBool,
    failing_renames: Mutex<Vec<(String, String)>>,
    load_delay: Mutex<Duration>,
    operations: Mutex<Vec<String>>,
}

impl FakeRelationalStore {
    pub fn new(live: &str, content: &[u8]) -> Self {
        let mut databases = BTreeMap::new();
        databases.insert(live.to_string(), content.to_vec());
        Self {
            live: live.to_string(),
            databases: Mutex::new(databases),
            healthy: AtomicBool::new(true),
            fail_load: AtomicBool::new(false),
            fail_verify: AtomicBool::new(false),
            failing_renames: Mutex::new(Vec::new()),
            load_delay: Mutex::new(Duration::ZERO),
            operations: Mutex::new(Vec::new()),
        }
    }

    pub fn database(&self, name: &str) -> Option<Vec<u8>> {
        self.databases.lock().unwrap().get(name).cloned()
    }

    pub fn database_names(&self) -> Vec<String> {
        self.databases.lock().unwrap().keys().cloned().collect()
    }

    pub fn insert(&self, name: &str, content: &[u8]) {
        self.databases
            .lock()
            .unwrap()
            .insert(name.to_string(), content.to_vec());
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn fail_load(&self) {
        self.fail_load.store(true, Ordering::SeqCst);
    }

    pub fn fail_verify(&self) {
        self.fail_verify.store(true, Ordering::SeqCst);
    }

    pub fn fail_rename(&self, from: &str, to: &str) {
        self.failing_renames
            .lock()
            .unwrap()
            .push((from.to_string(), to.to_string()));
    }

    pub fn set_load_delay(&self, delay: Duration) {
        *self.load_delay.lock().unwrap() = delay;
    }

    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().unwrap().clone()
    }

    fn log(&self, operation: String) {
        self.operations.lock().unwrap().push(operation);
    }
}

#[async_trait]
impl StoreAdapter for FakeRelationalStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Relational
    }

    fn name(&self) -> &str {
        &self.live
    }

    async fn health_check(&self) -> Result<()> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(KeeperError::store_unavailable(&self.live, "connection refused"))
        }
    }

    async fn backup(&self, artifact_path: &Path) -> Result<u64> {
        let content = self
            .database(&self.live)
            .ok_or_else(|| KeeperError::backup("live database missing"))?;
        tokio::fs::write(artifact_path, &content).await?;
        Ok(content.len() as u64)
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.databases.lock().unwrap().contains_key(name))
    }

    async fn create(&self, name: &str) -> Result<()> {
        self.log(format!("create {name}"));
        let mut databases = self.databases.lock().unwrap();
        if databases.contains_key(name) {
            return Err(KeeperError::custom(format!("database {name} already exists")));
        }
        databases.insert(name.to_string(), Vec::new());
        Ok(())
    }

    async fn load_into(&self, name: &str, artifact: &Path) -> Result<()> {
        self.log(format!("load {name}"));
        let delay = *self.load_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(KeeperError::custom("pg_restore: corrupt archive"));
        }

        let content = tokio::fs::read(artifact).await?;
        self.insert(name, &content);
        Ok(())
    }

    async fn verify(&self, name: &str) -> Result<u64> {
        if self.fail_verify.load(Ordering::SeqCst) {
            return Err(KeeperError::custom("relation does not exist"));
        }
        let content = self
            .database(name)
            .ok_or_else(|| KeeperError::custom(format!("database {name} does not exist")))?;
        Ok(content
            .split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .count() as u64)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.log(format!("rename {from} {to}"));
        let injected = self
            .failing_renames
            .lock()
            .unwrap()
            .iter()
            .any(|(f, t)| f == from && t == to);
        if injected {
            return Err(KeeperError::custom(format!("cannot rename {from} to {to}")));
        }

        let mut databases = self.databases.lock().unwrap();
        if databases.contains_key(to) {
            return Err(KeeperError::custom(format!("database {to} already exists")));
        }
        let content = databases
            .remove(from)
            .ok_or_else(|| KeeperError::custom(format!("database {from} does not exist")))?;
        databases.insert(to.to_string(), content);
        Ok(())
    }

    async fn drop_store(&self, name: &str) -> Result<()> {
        self.log(format!("drop {name}"));
        self.databases.lock().unwrap().remove(name);
        Ok(())
    }
}

enum Behaviour {
    Write(Vec<u8>),
    Fail,
    Hang(Duration),
}

/// 只支持备份的存储
pub struct FakeStore {
    kind: StoreKind,
    behaviour: Behaviour,
}

impl FakeStore {
    pub fn writing(kind: StoreKind, content: &[u8]) -> Self {
        Self {
            kind,
            behaviour: Behaviour::Write(content.to_vec()),
        }
    }

    pub fn failing(kind: StoreKind) -> Self {
        Self {
            kind,
            behaviour: Behaviour::Fail,
        }
    }

    /// 写入部分内容后挂起
    pub fn hanging(kind: StoreKind, duration: Duration) -> Self {
        Self {
            kind,
            behaviour: Behaviour::Hang(duration),
        }
    }
}

#[async_trait]
impl StoreAdapter for FakeStore {
    fn kind(&self) -> StoreKind {
        self.kind
    }

    fn name(&self) -> &str {
        self.kind.dir_name()
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn backup(&self, artifact_path: &Path) -> Result<u64> {
        match &self.behaviour {
            Behaviour::Write(content) => {
                tokio::fs::write(artifact_path, content).await?;
                Ok(content.len() as u64)
            }
            Behaviour::Fail => {
                tokio::fs::write(artifact_path, b"partial").await?;
                Err(KeeperError::backup("snapshot failed"))
            }
            Behaviour::Hang(duration) => {
                tokio::fs::write(artifact_path, b"partial").await?;
                tokio::time::sleep(*duration).await;
                Ok(7)
            }
        }
    }
}

/// 内存部署历史
pub struct FakeHistory {
    versions: Mutex<Vec<DeploymentVersion>>,
}

impl FakeHistory {
    pub fn with_images(images: &[&str]) -> Self {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        let versions = images
            .iter()
            .enumerate()
            .map(|(i, image)| DeploymentVersion {
                image: image.to_string(),
                deployed_at: start + ChronoDuration::hours(i as i64),
            })
            .collect();
        Self {
            versions: Mutex::new(versions),
        }
    }
}

#[async_trait]
impl DeploymentHistory for FakeHistory {
    async fn versions(&self) -> Result<Vec<DeploymentVersion>> {
        Ok(self.versions.lock().unwrap().clone())
    }

    async fn record(&self, image: &str) -> Result<bool> {
        let mut versions = self.versions.lock().unwrap();
        if versions.last().is_some_and(|v| v.image == image) {
            return Ok(false);
        }
        versions.push(DeploymentVersion {
            image: image.to_string(),
            deployed_at: Utc::now(),
        });
        Ok(true)
    }
}

/// 记录镜像改写与重新部署次数的部署执行器
pub struct FakeDeployer {
    current: Mutex<String>,
    running: Mutex<String>,
    applied: Mutex<Vec<String>>,
    redeploys: AtomicUsize,
    failing_redeploys: AtomicUsize,
}

impl FakeDeployer {
    pub fn new(current: &str) -> Self {
        Self {
            current: Mutex::new(current.to_string()),
            running: Mutex::new(current.to_string()),
            applied: Mutex::new(Vec::new()),
            redeploys: AtomicUsize::new(0),
            failing_redeploys: AtomicUsize::new(0),
        }
    }

    /// 接下来的 `count` 次重新部署失败，运行中的镜像保持不变
    pub fn fail_redeploys(&self, count: usize) {
        self.failing_redeploys.store(count, Ordering::SeqCst);
    }

    /// 实际运行中的镜像
    pub fn running(&self) -> String {
        self.running.lock().unwrap().clone()
    }

    pub fn current(&self) -> String {
        self.current.lock().unwrap().clone()
    }

    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }

    pub fn redeploys(&self) -> usize {
        self.redeploys.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Deployer for FakeDeployer {
    async fn current_image(&self) -> Result<Option<String>> {
        Ok(Some(self.current()))
    }

    async fn apply_image(&self, image: &str) -> Result<()> {
        *self.current.lock().unwrap() = image.to_string();
        self.applied.lock().unwrap().push(image.to_string());
        Ok(())
    }

    async fn redeploy(&self) -> Result<()> {
        self.redeploys.fetch_add(1, Ordering::SeqCst);
        let pending = self.failing_redeploys.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_redeploys.store(pending - 1, Ordering::SeqCst);
            return Err(KeeperError::docker("pull access denied"));
        }
        *self.running.lock().unwrap() = self.current();
        Ok(())
    }
}

/// 第 N 次探测起返回就绪的探针
pub struct FakeProbe {
    ready_on: Option<usize>,
    hang: bool,
    calls: AtomicUsize,
}

impl FakeProbe {
    pub fn healthy_after(attempts: usize) -> Self {
        Self {
            ready_on: Some(attempts),
            hang: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn never_healthy() -> Self {
        Self {
            ready_on: None,
            hang: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn hanging() -> Self {
        Self {
            ready_on: None,
            hang: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for FakeProbe {
    fn endpoint(&self) -> &str {
        "fake://ready"
    }

    async fn probe(&self) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        match self.ready_on {
            Some(n) if call >= n => Ok(()),
            _ => Err(KeeperError::HealthCheck("503 Service Unavailable".to_string())),
        }
    }
}

/// 计数的重连信号
pub struct FakeSignal {
    fail: bool,
    sent: AtomicUsize,
}

impl FakeSignal {
    pub fn new() -> Self {
        Self {
            fail: false,
            sent: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            sent: AtomicUsize::new(0),
        }
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReconnectSignal for FakeSignal {
    fn describe(&self) -> String {
        "fake restart api".to_string()
    }

    async fn send(&self) -> Result<()> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(KeeperError::docker("service api not found"))
        } else {
            Ok(())
        }
    }
}
