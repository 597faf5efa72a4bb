use engine_logging::{engine_debug, engine_info, engine_warn};
use serde_json::Value;

use crate::outputs::normalize_filter_fragment;
use crate::{
    ActiveView, Effect, JobId, JobState, JobStatus, Msg, PendingMutation, Stage, ValidationError,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: JobState, msg: Msg) -> (JobState, Vec<Effect>) {
    let effects = match msg {
        Msg::UploadSubmitted { element, target } => {
            let (element, target) = match (element, target) {
                (Some(element), Some(target)) => (element, target),
                _ => {
                    state.record_error(ValidationError::MissingImages.to_string());
                    return (state, Vec::new());
                }
            };
            if let Err(err) = element.validate().and_then(|()| target.validate()) {
                state.record_error(err.to_string());
                return (state, Vec::new());
            }

            let abandoned = state.start_new_job();
            let mut effects = Vec::with_capacity(2);
            if let Some(job_id) = abandoned {
                engine_info!("New upload supersedes job {}", job_id);
                effects.push(Effect::CancelPolling { job_id });
            }
            effects.push(Effect::Upload {
                attempt: state.attempt(),
                element,
                target,
            });
            effects
        }
        Msg::UploadSucceeded {
            attempt,
            job_id,
            payload,
        } => {
            if attempt != state.attempt() || !state.bind_job(job_id.clone()) {
                engine_debug!("Ignoring stale upload result for job {}", job_id);
                return (state, Vec::new());
            }
            state.apply_fragment(&payload);
            state.advance_stage(Stage::Preprocess);
            vec![Effect::Preprocess { job_id }]
        }
        Msg::UploadFailed { attempt, message } => {
            if attempt == state.attempt() {
                state.record_error(message);
                state.finish_pipeline();
            }
            Vec::new()
        }
        Msg::PreprocessSucceeded { job_id, payload } => {
            if !is_current(&state, &job_id) {
                return (state, Vec::new());
            }
            state.apply_fragment(&payload);
            state.advance_stage(Stage::Generate);
            vec![Effect::Generate { job_id }]
        }
        Msg::GenerateSucceeded { job_id, payload } => {
            if !is_current(&state, &job_id) {
                return (state, Vec::new());
            }
            state.apply_fragment(&payload);
            state.advance_stage(Stage::Complete);
            state.finish_pipeline();
            state.set_polling(true);
            vec![Effect::StartPolling { job_id }]
        }
        Msg::StageFailed {
            job_id,
            stage,
            message,
        } => {
            if is_current(&state, &job_id) {
                engine_warn!("Job {} halted at {:?}: {}", job_id, stage, message);
                state.record_error(message);
                state.finish_pipeline();
            }
            Vec::new()
        }
        Msg::StatusReceived { job_id, payload } => {
            if is_current(&state, &job_id) {
                state.apply_fragment(&payload);
                if JobStatus::from_payload(&payload) == Some(JobStatus::Error) {
                    state.record_error(remote_failure_reason(&payload));
                }
            }
            Vec::new()
        }
        Msg::PollingFinished { job_id, status } => {
            if is_current(&state, &job_id) {
                engine_info!("Job {} reached terminal status {}", job_id, status);
                state.set_polling(false);
            }
            Vec::new()
        }
        Msg::PollingFailed { job_id, message } => {
            if is_current(&state, &job_id) {
                state.set_polling(false);
                state.record_error(message);
            }
            Vec::new()
        }
        Msg::FilterRequested(filter) => {
            if &filter == state.selected_filter() {
                return (state, Vec::new());
            }
            let Some(job_id) = state.job_id().cloned() else {
                return (state, Vec::new());
            };
            if !state.can_mutate() {
                engine_debug!("Filter {} ignored: job {} is busy", filter, job_id);
                return (state, Vec::new());
            }
            if !state.knows_filter(&filter) {
                state.record_error(ValidationError::UnknownFilter(filter.to_string()).to_string());
                return (state, Vec::new());
            }
            let mutation = PendingMutation::Filter {
                requested: filter.clone(),
                previous: state.selected_filter().clone(),
            };
            if !state.begin_mutation(mutation) {
                engine_debug!("Filter {} ignored: job {} is busy", filter, job_id);
                return (state, Vec::new());
            }
            vec![Effect::ApplyFilter { job_id, filter }]
        }
        Msg::FilterApplied { job_id, payload } => {
            if !is_current(&state, &job_id) {
                return (state, Vec::new());
            }
            if let Some(PendingMutation::Filter { requested, .. }) = state.settle_mutation() {
                state.apply_fragment(&normalize_filter_fragment(&payload));
                let view = if requested.is_none() {
                    ActiveView::Original
                } else {
                    ActiveView::Filtered
                };
                state.set_active_view(view);
            }
            Vec::new()
        }
        Msg::FilterFailed { job_id, message } => {
            if is_current(&state, &job_id) {
                state.rollback_mutation(message);
            }
            Vec::new()
        }
        Msg::BlockSizeRequested(size) => {
            if size == state.selected_block_size() {
                return (state, Vec::new());
            }
            let Some(job_id) = state.job_id().cloned() else {
                return (state, Vec::new());
            };
            let mutation = PendingMutation::BlockSize {
                requested: size,
                previous: state.selected_block_size(),
            };
            if !state.begin_mutation(mutation) {
                engine_debug!("Block size {} ignored: job {} is busy", size, job_id);
                return (state, Vec::new());
            }
            vec![Effect::ChangeBlockSize { job_id, size }]
        }
        Msg::BlockSizeApplied { job_id, payload } => {
            if !is_current(&state, &job_id) {
                return (state, Vec::new());
            }
            if let Some(PendingMutation::BlockSize { .. }) = state.settle_mutation() {
                state.apply_fragment(&payload);
                state.reset_filter_selection();
            }
            Vec::new()
        }
        Msg::BlockSizeFailed { job_id, message } => {
            if is_current(&state, &job_id) {
                state.rollback_mutation(message);
            }
            Vec::new()
        }
        Msg::OutputsReceived { job_id, payload } => {
            if is_current(&state, &job_id) {
                state.apply_fragment(&payload);
            }
            Vec::new()
        }
        Msg::FilterCatalogLoaded(filters) => {
            state.set_filter_catalog(filters);
            Vec::new()
        }
        Msg::MetricsLoaded { job_id, metrics } => {
            if is_current(&state, &job_id) {
                state.set_metrics(metrics);
            }
            Vec::new()
        }
        Msg::ErrorDismissed => {
            state.dismiss_error();
            Vec::new()
        }
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn is_current(state: &JobState, job_id: &JobId) -> bool {
    let current = state.is_current(job_id);
    if !current {
        engine_debug!("Dropping result for superseded job {}", job_id);
    }
    current
}

fn remote_failure_reason(payload: &Value) -> String {
    payload
        .get("error")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| "mosaic generation failed".to_string())
}
