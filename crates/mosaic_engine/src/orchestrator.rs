use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use engine_logging::{engine_debug, engine_info, engine_warn};
use mosaic_core::{
    normalize_multiresolution_fragment, update, BlockSize, Effect, FilterId, FilterInfo,
    ImageUpload, JobId, JobState, JobViewModel, MetricsReport, Msg, Stage, ValidationError,
};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::MosaicApi;
use crate::mutations;
use crate::poller::{self, PollError, PollSettings};
use crate::types::{LegacyMosaic, TransportError};

/// Receives a fresh view model whenever the job state changed.
pub trait ViewSink: Send + Sync {
    fn publish(&self, view: &JobViewModel);
}

/// Sink for callers that only read [`Orchestrator::view`].
pub struct NullSink;

impl ViewSink for NullSink {
    fn publish(&self, _view: &JobViewModel) {}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    #[error("no job has been uploaded yet")]
    NoActiveJob,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

struct ActivePoll {
    job_id: JobId,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    api: Arc<dyn MosaicApi>,
    state: Mutex<JobState>,
    poll_settings: PollSettings,
    sink: Arc<dyn ViewSink>,
    active_poll: Mutex<Option<ActivePoll>>,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_poll(&self) -> MutexGuard<'_, Option<ActivePoll>> {
        self.active_poll
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs one reducer step and publishes the result under the state lock, so
    /// sinks observe views in the order the state changed. Sinks must not call
    /// back into the orchestrator.
    fn apply(&self, msg: Msg) -> Vec<Effect> {
        let mut state = self.lock_state();
        let (next, effects) = update(std::mem::take(&mut *state), msg);
        *state = next;
        let view = state.view();
        if state.consume_dirty() {
            self.sink.publish(&view);
        }
        effects
    }

    fn current_job(&self) -> Result<JobId, OrchestratorError> {
        self.lock_state()
            .job_id()
            .cloned()
            .ok_or(OrchestratorError::NoActiveJob)
    }
}

/// Drives one job at a time: executes the effects the reducer asks for and
/// feeds their outcomes back as messages.
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        api: Arc<dyn MosaicApi>,
        poll_settings: PollSettings,
        sink: Arc<dyn ViewSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                state: Mutex::new(JobState::new()),
                poll_settings,
                sink,
                active_poll: Mutex::new(None),
            }),
        }
    }

    pub fn view(&self) -> JobViewModel {
        self.inner.lock_state().view()
    }

    /// Starts a new job and runs upload, preprocess and generate. Returns once
    /// the pipeline stopped; status polling continues in the background.
    pub async fn submit(
        &self,
        element: Option<ImageUpload>,
        target: Option<ImageUpload>,
    ) -> JobViewModel {
        self.dispatch(Msg::UploadSubmitted { element, target })
            .await;
        self.view()
    }

    pub async fn apply_filter(&self, filter: FilterId) -> JobViewModel {
        self.dispatch(Msg::FilterRequested(filter)).await;
        self.view()
    }

    pub async fn change_block_size(&self, size: BlockSize) -> JobViewModel {
        self.dispatch(Msg::BlockSizeRequested(size)).await;
        self.view()
    }

    pub fn dismiss_error(&self) {
        self.inner.apply(Msg::ErrorDismissed);
    }

    pub async fn load_filters(&self) -> Result<Vec<FilterInfo>, OrchestratorError> {
        let filters = self.inner.api.list_filters().await?;
        self.inner.apply(Msg::FilterCatalogLoaded(filters.clone()));
        Ok(filters)
    }

    /// Fetches quality metrics for the current job. A failed retrieval is
    /// reported as unavailable metrics rather than as a job error.
    pub async fn refresh_metrics(&self) -> Result<MetricsReport, OrchestratorError> {
        let job_id = self.inner.current_job()?;
        let metrics = match self.inner.api.metrics(&job_id).await {
            Ok(metrics) => metrics,
            Err(err) => {
                engine_warn!("Metrics unavailable for job {}: {}", job_id, err);
                MetricsReport::unavailable()
            }
        };
        self.inner.apply(Msg::MetricsLoaded { job_id, metrics });
        Ok(metrics)
    }

    /// Waits until the background status poll for the current job has ended.
    pub async fn wait_for_polling(&self) {
        let handle = self
            .inner
            .lock_poll()
            .as_mut()
            .and_then(|active| active.handle.take());
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                engine_warn!("Status poll task ended abnormally: {}", err);
            }
        }
    }

    pub async fn multiresolution_preview(&self) -> Result<Value, OrchestratorError> {
        let job_id = self.inner.current_job()?;
        Ok(self.inner.api.multiresolution_preview(&job_id).await?)
    }

    /// Renders the mosaic at every block size and merges the results.
    pub async fn generate_multiresolution(&self) -> Result<(), OrchestratorError> {
        let job_id = self.inner.current_job()?;
        let payload = self.inner.api.generate_multiresolution(&job_id).await?;
        self.inner.apply(Msg::OutputsReceived {
            job_id,
            payload: normalize_multiresolution_fragment(&payload),
        });
        Ok(())
    }

    pub async fn filter_previews(&self) -> Result<BTreeMap<String, String>, OrchestratorError> {
        let job_id = self.inner.current_job()?;
        Ok(self.inner.api.filter_previews(&job_id).await?)
    }

    pub async fn compare_filters(&self, filters: &[FilterId]) -> Result<Value, OrchestratorError> {
        let job_id = self.inner.current_job()?;
        Ok(self.inner.api.compare_filters(&job_id, filters).await?)
    }

    pub async fn compare_metrics(&self) -> Result<Value, OrchestratorError> {
        let job_id = self.inner.current_job()?;
        Ok(self.inner.api.compare_metrics(&job_id).await?)
    }

    pub async fn batch_metrics(&self, job_ids: &[JobId]) -> Result<Value, OrchestratorError> {
        Ok(self.inner.api.batch_metrics(job_ids).await?)
    }

    /// One-shot generation outside the staged pipeline; job state is untouched.
    pub async fn generate_legacy(
        &self,
        element: &ImageUpload,
        target: &ImageUpload,
    ) -> Result<LegacyMosaic, OrchestratorError> {
        element.validate()?;
        target.validate()?;
        Ok(self.inner.api.generate_legacy(element, target).await?)
    }

    async fn dispatch(&self, msg: Msg) {
        let mut queue = VecDeque::from([msg]);
        while let Some(msg) = queue.pop_front() {
            for effect in self.inner.apply(msg) {
                if let Some(next) = self.run_effect(effect).await {
                    queue.push_back(next);
                }
            }
        }
    }

    async fn run_effect(&self, effect: Effect) -> Option<Msg> {
        let api = self.inner.api.as_ref();
        match effect {
            Effect::Upload {
                attempt,
                element,
                target,
            } => {
                engine_info!("Uploading {} and {}", element.file_name(), target.file_name());
                Some(match api.upload(&element, &target).await {
                    Ok(response) => Msg::UploadSucceeded {
                        attempt,
                        job_id: response.job_id,
                        payload: response.fragment,
                    },
                    Err(err) => {
                        engine_warn!("Upload failed: {}", err);
                        Msg::UploadFailed {
                            attempt,
                            message: err.to_string(),
                        }
                    }
                })
            }
            Effect::Preprocess { job_id } => {
                engine_info!("Preprocessing job {}", job_id);
                Some(match api.preprocess(&job_id).await {
                    Ok(payload) => Msg::PreprocessSucceeded { job_id, payload },
                    Err(err) => stage_failed(job_id, Stage::Preprocess, err),
                })
            }
            Effect::Generate { job_id } => {
                engine_info!("Generating mosaic for job {}", job_id);
                Some(match api.generate(&job_id).await {
                    Ok(payload) => Msg::GenerateSucceeded { job_id, payload },
                    Err(err) => stage_failed(job_id, Stage::Generate, err),
                })
            }
            Effect::StartPolling { job_id } => {
                self.start_polling(job_id);
                None
            }
            Effect::CancelPolling { job_id } => {
                self.cancel_polling(&job_id);
                None
            }
            Effect::ApplyFilter { job_id, filter } => {
                Some(mutations::apply_filter(api, job_id, filter).await)
            }
            Effect::ChangeBlockSize { job_id, size } => {
                Some(mutations::change_block_size(api, job_id, size).await)
            }
        }
    }

    fn start_polling(&self, job_id: JobId) {
        // Holding the poll slot while checking the job makes a concurrent
        // CancelPolling either see this poll or stop it from starting.
        let mut active = self.inner.lock_poll();
        if !self.inner.lock_state().is_current(&job_id) {
            engine_debug!("Not polling superseded job {}", job_id);
            return;
        }

        let token = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let task_token = token.clone();
        let task_job = job_id.clone();

        let handle = tokio::spawn(async move {
            let outcome = poller::poll(
                inner.api.as_ref(),
                &task_job,
                &inner.poll_settings,
                &task_token,
                |snapshot| {
                    inner.apply(Msg::StatusReceived {
                        job_id: task_job.clone(),
                        payload: snapshot.clone(),
                    });
                },
            )
            .await;

            let msg = match outcome {
                Ok(status) => Msg::PollingFinished {
                    job_id: task_job,
                    status,
                },
                Err(PollError::Cancelled) => {
                    engine_debug!("Polling for job {} cancelled", task_job);
                    return;
                }
                Err(PollError::Transport(err)) => Msg::PollingFailed {
                    job_id: task_job,
                    message: err.to_string(),
                },
            };
            inner.apply(msg);
        });

        let previous = active.replace(ActivePoll {
            job_id,
            token,
            handle: Some(handle),
        });
        if let Some(previous) = previous {
            previous.token.cancel();
        }
    }

    fn cancel_polling(&self, job_id: &JobId) {
        let mut active = self.inner.lock_poll();
        if active.as_ref().is_some_and(|poll| &poll.job_id == job_id) {
            if let Some(poll) = active.take() {
                engine_info!("Cancelling status poll for job {}", job_id);
                poll.token.cancel();
            }
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(poll) = self.inner.lock_poll().take() {
            poll.token.cancel();
        }
    }
}

fn stage_failed(job_id: JobId, stage: Stage, err: TransportError) -> Msg {
    engine_warn!("{} failed for job {}: {}", stage.label(), job_id, err);
    Msg::StageFailed {
        job_id,
        stage,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientSettings, ReqwestMosaicClient};
    use serde_json::json;

    fn offline_orchestrator() -> Orchestrator {
        engine_logging::initialize_for_tests();
        let settings = ClientSettings::parse("http://127.0.0.1:9").unwrap();
        let api: Arc<dyn MosaicApi> = Arc::new(ReqwestMosaicClient::new(settings).unwrap());
        Orchestrator::new(api, PollSettings::default(), Arc::new(NullSink))
    }

    fn bind(orchestrator: &Orchestrator, job: &str, attempt: u64) {
        orchestrator.inner.apply(Msg::UploadSubmitted {
            element: Some(ImageUpload::new("e.png", vec![1])),
            target: Some(ImageUpload::new("b.png", vec![2])),
        });
        orchestrator.inner.apply(Msg::UploadSucceeded {
            attempt,
            job_id: JobId::new(job),
            payload: json!({"job_id": job}),
        });
    }

    #[tokio::test]
    async fn superseded_job_is_never_polled() {
        let orchestrator = offline_orchestrator();
        bind(&orchestrator, "J1", 1);
        bind(&orchestrator, "J2", 2);

        orchestrator.start_polling(JobId::new("J1"));
        assert!(orchestrator.inner.lock_poll().is_none());

        orchestrator.start_polling(JobId::new("J2"));
        let registered = orchestrator
            .inner
            .lock_poll()
            .as_ref()
            .map(|poll| poll.job_id.clone());
        assert_eq!(registered, Some(JobId::new("J2")));
        orchestrator.cancel_polling(&JobId::new("J2"));
    }
}
