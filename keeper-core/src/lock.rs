use crate::{KeeperError, Result};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use sysinfo::{Pid, System};
use tracing::{debug, warn};

/// 会话锁
///
/// 通过 `create_new` 创建锁文件实现跨进程互斥，同一目标同一时刻只允许一个会话。
/// 锁在 guard 被丢弃时释放。持有进程被强制结束时锁文件会残留，
/// 下一次获取时若记录的进程已不存在，则接管该锁。
#[derive(Debug)]
pub struct SessionLock {
    target: String,
    path: PathBuf,
}

impl SessionLock {
    /// 获取锁，已被占用时立即返回 [`KeeperError::SessionBusy`]，不排队等待
    pub fn acquire(lock_dir: &Path, target: &str) -> Result<Self> {
        fs::create_dir_all(lock_dir)?;
        let path = lock_dir.join(format!("{target}.lock"));

        if let Some(lock) = Self::try_create(&path, target)? {
            return Ok(lock);
        }

        match read_holder_pid(&path)? {
            Some(pid) if !process_alive(pid) => {
                warn!(
                    "会话锁 {} 的持有进程 {} 已不存在，接管该锁",
                    path.display(),
                    pid
                );
                if take_over_stale(&path, pid)? {
                    if let Some(lock) = Self::try_create(&path, target)? {
                        return Ok(lock);
                    }
                }
                Err(busy(target, path))
            }
            _ => Err(busy(target, path)),
        }
    }

    /// 锁文件已存在时返回 `None`
    fn try_create(path: &Path, target: &str) -> Result<Option<Self>> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                writeln!(
                    file,
                    "pid={}\nacquired_at={}",
                    std::process::id(),
                    Utc::now().to_rfc3339()
                )?;
                debug!("获取会话锁: {}", path.display());
                Ok(Some(Self {
                    target: target.to_string(),
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("释放会话锁: {}", self.path.display()),
            Err(e) => warn!("释放会话锁 {} 失败: {}", self.path.display(), e),
        }
    }
}

fn busy(target: &str, lock: PathBuf) -> KeeperError {
    KeeperError::SessionBusy {
        target: target.to_string(),
        lock,
    }
}

/// 读取锁文件中记录的 pid；文件消失或内容不完整时返回 `None`
fn read_holder_pid(path: &Path) -> Result<Option<u32>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(content
        .lines()
        .find_map(|line| line.strip_prefix("pid="))
        .and_then(|pid| pid.trim().parse().ok()))
}

fn process_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_process(pid);
    sys.process(pid).is_some()
}

/// 把残留锁移到独占的位置再删除
///
/// 移走后再核对 pid：若期间已有其他进程接管并写入了新锁，把它放回原处
/// (`hard_link` 在目标已存在时失败，不会覆盖更新的锁)。
fn take_over_stale(path: &Path, stale_pid: u32) -> Result<bool> {
    let moved = path.with_extension(format!("lock.stale-{}", std::process::id()));
    match fs::rename(path, &moved) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    }

    if read_holder_pid(&moved)? == Some(stale_pid) {
        fs::remove_file(&moved)?;
        return Ok(true);
    }

    if let Err(e) = fs::hard_link(&moved, path) {
        warn!("恢复会话锁 {} 失败: {}", path.display(), e);
    }
    fs::remove_file(&moved)?;
    Ok(false)
}
