use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::service::{CompressJobStatus, FileService};
use crate::{Error, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// Maximum number of status queries before giving up. `None` polls until
    /// the job reaches a terminal state, matching the service's contract that
    /// every job eventually becomes ready or fails.
    pub max_attempts: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
        }
    }
}

#[derive(Default)]
pub struct PollOptions<'a> {
    pub cancel: Option<&'a CancellationToken>,
}

pub async fn resolve_download_url<S: FileService>(
    service: &S,
    job_id: &str,
    config: PollConfig,
) -> Result<String> {
    resolve_download_url_with(service, job_id, config, PollOptions::default()).await
}

/// Polls the compression job until it is ready, then resolves the final
/// download URL. Queries are strictly sequential; only a pending status is
/// retried, every failure is terminal.
pub async fn resolve_download_url_with<S: FileService>(
    service: &S,
    job_id: &str,
    config: PollConfig,
    options: PollOptions<'_>,
) -> Result<String> {
    if config.interval.is_zero() {
        return Err(Error::InvalidConfig {
            message: "poll interval must be > 0".to_string(),
        });
    }

    let mut attempts: u32 = 0;
    loop {
        if let Some(cancel) = options.cancel
            && cancel.is_cancelled()
        {
            return Err(Error::Cancelled);
        }

        let status = service.compress_status(job_id).await?;
        attempts += 1;

        match status {
            CompressJobStatus::Ready { resource_key } => {
                debug!(
                    event = "compress.ready",
                    provider = service.provider(),
                    job_id = %job_id,
                    attempts,
                    "compress.ready"
                );
                return service.compress_download_url(&resource_key).await;
            }
            CompressJobStatus::Pending => {
                if let Some(max) = config.max_attempts
                    && attempts >= max
                {
                    return Err(Error::PollLimitExceeded { attempts });
                }
                debug!(
                    event = "compress.pending",
                    job_id = %job_id,
                    attempts,
                    "compress.pending"
                );
                tokio::time::sleep(config.interval).await;
            }
        }
    }
}
