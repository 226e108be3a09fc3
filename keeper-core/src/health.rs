use crate::{KeeperError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 就绪探针
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// 探测目标的描述（通常为 URL）
    fn endpoint(&self) -> &str;

    /// 单次探测，服务就绪时返回 Ok
    async fn probe(&self) -> Result<()>;
}

/// 基于 HTTP GET 的就绪探针，2xx 视为就绪
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    url: String,
    client: Client,
}

impl HttpHealthProbe {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn probe(&self) -> Result<()> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(KeeperError::HealthCheck(format!(
                "{} 返回状态码 {}",
                self.url, status
            )))
        }
    }
}

/// 轮询探针直到就绪，超时即失败
///
/// 返回就绪前经过的时间。单次探测本身也受剩余时间约束，
/// 挂起的请求不会让等待超过 `timeout`。
pub async fn wait_until_ready(
    probe: &dyn HealthProbe,
    timeout: Duration,
    interval: Duration,
) -> Result<Duration> {
    let start = Instant::now();
    info!("等待 {} 就绪，超时时间: {:?}", probe.endpoint(), timeout);

    loop {
        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, probe.probe()).await {
            Ok(Ok(())) => {
                let elapsed = start.elapsed();
                info!("{} 已就绪，用时: {:?}", probe.endpoint(), elapsed);
                return Ok(elapsed);
            }
            Ok(Err(e)) => debug!("探测未通过: {}", e),
            Err(_) => debug!("探测请求未在剩余时间内返回"),
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            break;
        }
        tokio::time::sleep(interval.min(remaining)).await;
    }

    warn!("{} 在 {:?} 内未就绪", probe.endpoint(), timeout);
    Err(KeeperError::timeout(
        format!("等待 {} 就绪", probe.endpoint()),
        timeout,
    ))
}
