//! Remote call sequences behind job mutations. Each returns the message the
//! reducer needs to settle or roll back the pending mutation.
use engine_logging::{engine_info, engine_warn};
use mosaic_core::{BlockSize, FilterId, JobId, Msg};
use serde_json::json;

use crate::client::MosaicApi;

pub async fn apply_filter(api: &dyn MosaicApi, job_id: JobId, filter: FilterId) -> Msg {
    engine_info!("Applying filter {} to job {}", filter, job_id);
    match api.apply_filter(&job_id, &filter, &json!({})).await {
        Ok(payload) => Msg::FilterApplied { job_id, payload },
        Err(err) => {
            engine_warn!("Filter {} failed for job {}: {}", filter, job_id, err);
            Msg::FilterFailed {
                job_id,
                message: err.to_string(),
            }
        }
    }
}

/// Sets the block size, then regenerates the mosaic with it.
pub async fn change_block_size(api: &dyn MosaicApi, job_id: JobId, size: BlockSize) -> Msg {
    engine_info!("Changing block size of job {} to {}", job_id, size);
    if let Err(err) = api.set_block_size(&job_id, size).await {
        engine_warn!("Block size {} rejected for job {}: {}", size, job_id, err);
        return Msg::BlockSizeFailed {
            job_id,
            message: err.to_string(),
        };
    }

    match api.generate(&job_id).await {
        Ok(payload) => Msg::BlockSizeApplied { job_id, payload },
        Err(err) => {
            engine_warn!("Regeneration of job {} failed: {}", job_id, err);
            Msg::BlockSizeFailed {
                job_id,
                message: err.to_string(),
            }
        }
    }
}
