use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};
use mosaic_core::{JobId, JobStatus};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::client::MosaicApi;
use crate::types::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay between receiving a status response and issuing the next request.
    pub interval: Duration,
    /// Consecutive network failures tolerated before the poll gives up.
    pub network_retry_budget: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            network_retry_budget: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("polling cancelled")]
    Cancelled,
}

/// Fetches the job status until it is terminal, handing every snapshot to
/// `on_update` before deciding whether to continue.
pub async fn poll<F>(
    api: &dyn MosaicApi,
    job_id: &JobId,
    settings: &PollSettings,
    cancel: &CancellationToken,
    mut on_update: F,
) -> Result<JobStatus, PollError>
where
    F: FnMut(&Value) + Send,
{
    let mut retries_left = settings.network_retry_budget;
    let mut iteration: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }
        iteration += 1;

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PollError::Cancelled),
            response = api.job_status(job_id) => response,
        };

        match response {
            Ok(snapshot) => {
                retries_left = settings.network_retry_budget;
                let status = JobStatus::from_payload(&snapshot);
                engine_debug!(
                    "Poll #{} for job {}: {}",
                    iteration,
                    job_id,
                    status.map_or("no status", JobStatus::as_str)
                );
                on_update(&snapshot);
                if let Some(status) = status.filter(|status| status.is_terminal()) {
                    engine_info!("Polling for job {} ended with {}", job_id, status);
                    return Ok(status);
                }
            }
            Err(TransportError::Network(message)) if retries_left > 0 => {
                retries_left -= 1;
                engine_warn!(
                    "Status request for job {} failed ({}); {} retries left",
                    job_id,
                    message,
                    retries_left
                );
            }
            Err(err) => {
                engine_warn!("Polling for job {} failed: {}", job_id, err);
                return Err(err.into());
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PollError::Cancelled),
            () = tokio::time::sleep(settings.interval) => {}
        }
    }
}
