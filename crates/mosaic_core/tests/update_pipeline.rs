use std::sync::Once;

use mosaic_core::{update, Effect, ImageUpload, JobId, JobState, JobStatus, Msg, Stage};
use pretty_assertions::assert_eq;
use serde_json::json;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn element() -> ImageUpload {
    ImageUpload::new("element.png", vec![0x89, 0x50, 0x4e, 0x47])
}

fn target() -> ImageUpload {
    ImageUpload::new("target.jpg", vec![0xff, 0xd8, 0xff])
}

fn submit(state: JobState) -> (JobState, Vec<Effect>) {
    update(
        state,
        Msg::UploadSubmitted {
            element: Some(element()),
            target: Some(target()),
        },
    )
}

fn upload_ok(state: JobState, job: &str) -> (JobState, Vec<Effect>) {
    let attempt = state.attempt();
    update(
        state,
        Msg::UploadSucceeded {
            attempt,
            job_id: JobId::new(job),
            payload: json!({
                "job_id": job,
                "status": "uploaded",
                "progress": 5,
                "element_url": "/e.png",
                "big_url": "/b.png",
            }),
        },
    )
}

#[test]
fn submit_without_both_images_is_rejected_locally() {
    init_logging();
    let (mut state, effects) = update(
        JobState::new(),
        Msg::UploadSubmitted {
            element: Some(element()),
            target: None,
        },
    );

    assert!(effects.is_empty());
    assert_eq!(state.error(), Some("Please select both images"));
    assert_eq!(state.stage(), Stage::Upload);
    assert!(state.job_id().is_none());
    assert!(state.consume_dirty());
}

#[test]
fn submit_with_unsupported_image_is_rejected_locally() {
    init_logging();
    let (state, effects) = update(
        JobState::new(),
        Msg::UploadSubmitted {
            element: Some(ImageUpload::new("element.gif", vec![1])),
            target: Some(target()),
        },
    );

    assert!(effects.is_empty());
    assert!(state.error().unwrap().contains("element.gif"));
}

#[test]
fn submit_emits_upload_effect() {
    init_logging();
    let (state, effects) = submit(JobState::new());

    assert_eq!(
        effects,
        vec![Effect::Upload {
            attempt: 1,
            element: element(),
            target: target(),
        }]
    );
    assert!(state.view().is_running);
    assert_eq!(state.status(), JobStatus::Pending);
}

#[test]
fn upload_success_binds_job_and_advances_to_preprocess() {
    init_logging();
    let (state, _) = submit(JobState::new());
    let (state, effects) = upload_ok(state, "J1");

    let view = state.view();
    assert_eq!(view.job_id, Some(JobId::new("J1")));
    assert_eq!(view.stage, Stage::Preprocess);
    assert_eq!(view.stage.index(), 1);
    assert_eq!(view.outputs.get("element_url"), Some(&json!("/e.png")));
    assert_eq!(view.outputs.get("big_url"), Some(&json!("/b.png")));
    assert_eq!(view.progress, 5);
    assert_eq!(
        effects,
        vec![Effect::Preprocess {
            job_id: JobId::new("J1")
        }]
    );
}

#[test]
fn upload_failure_halts_pipeline() {
    init_logging();
    let (state, _) = submit(JobState::new());
    let (state, effects) = update(
        state,
        Msg::UploadFailed {
            attempt: 1,
            message: "Missing files".to_string(),
        },
    );

    assert!(effects.is_empty());
    let view = state.view();
    assert_eq!(view.error.as_deref(), Some("Missing files"));
    assert_eq!(view.stage, Stage::Upload);
    assert!(!view.is_running);
}

#[test]
fn full_pipeline_reaches_complete_and_starts_polling() {
    init_logging();
    let job = JobId::new("J1");
    let (state, _) = submit(JobState::new());
    let (state, _) = upload_ok(state, "J1");
    let (state, effects) = update(
        state,
        Msg::PreprocessSucceeded {
            job_id: job.clone(),
            payload: json!({
                "status": "preprocessed",
                "progress": 25,
                "intermediate_outputs": {"resized_big": "/rb.png", "gray_big": "/gb.png"},
            }),
        },
    );
    assert_eq!(state.stage(), Stage::Generate);
    assert_eq!(effects, vec![Effect::Generate { job_id: job.clone() }]);

    let (state, effects) = update(
        state,
        Msg::GenerateSucceeded {
            job_id: job.clone(),
            payload: json!({
                "status": "completed",
                "progress": 100,
                "final_outputs": {"mosaic": "/m.png", "simple_mosaic": "/s.png"},
            }),
        },
    );

    let view = state.view();
    assert_eq!(view.stage, Stage::Complete);
    assert_eq!(view.status, JobStatus::Completed);
    assert!(view.is_polling);
    assert!(!view.is_running);
    for key in [
        "element_url",
        "big_url",
        "resized_big",
        "gray_big",
        "mosaic",
        "simple_mosaic",
    ] {
        assert!(view.outputs.contains_key(key), "missing {key}");
    }
    assert_eq!(effects, vec![Effect::StartPolling { job_id: job }]);
}

#[test]
fn preprocess_failure_leaves_job_at_step_one() {
    init_logging();
    let (state, _) = submit(JobState::new());
    let (state, _) = upload_ok(state, "J1");
    let (state, effects) = update(
        state,
        Msg::StageFailed {
            job_id: JobId::new("J1"),
            stage: Stage::Preprocess,
            message: "Target image path not found in job state".to_string(),
        },
    );

    assert!(effects.is_empty());
    let view = state.view();
    assert_eq!(view.stage, Stage::Preprocess);
    assert_eq!(
        view.error.as_deref(),
        Some("Target image path not found in job state")
    );
    // Upload outputs stay visible.
    assert!(view.outputs.contains_key("element_url"));
}

#[test]
fn generate_failure_leaves_job_at_step_two_without_polling() {
    init_logging();
    let job = JobId::new("J1");
    let (state, _) = submit(JobState::new());
    let (state, _) = upload_ok(state, "J1");
    let (state, effects) = update(
        state,
        Msg::PreprocessSucceeded {
            job_id: job.clone(),
            payload: json!({"status": "preprocessed", "progress": 20}),
        },
    );
    assert_eq!(effects, vec![Effect::Generate { job_id: job.clone() }]);

    let (state, effects) = update(
        state,
        Msg::StageFailed {
            job_id: job,
            stage: Stage::Generate,
            message: "server error 500".to_string(),
        },
    );

    assert!(effects.is_empty());
    let view = state.view();
    assert_eq!(view.stage, Stage::Generate);
    assert_eq!(view.error.as_deref(), Some("server error 500"));
    assert!(!view.is_polling);
}

#[test]
fn status_updates_merge_and_terminal_stops_polling() {
    init_logging();
    let job = JobId::new("J1");
    let (state, _) = submit(JobState::new());
    let (state, _) = upload_ok(state, "J1");
    let (state, _) = update(
        state,
        Msg::GenerateSucceeded {
            job_id: job.clone(),
            payload: json!({"status": "generating_mosaic", "progress": 30}),
        },
    );
    let (state, _) = update(
        state,
        Msg::StatusReceived {
            job_id: job.clone(),
            payload: json!({
                "status": "completed",
                "progress": 100,
                "final_outputs": {"mosaic": "/m.png"},
                "metrics": {"ssim": 0.91},
            }),
        },
    );
    let (state, effects) = update(
        state,
        Msg::PollingFinished {
            job_id: job,
            status: JobStatus::Completed,
        },
    );

    assert!(effects.is_empty());
    let view = state.view();
    assert!(!view.is_polling);
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.progress, 100);
    assert_eq!(view.outputs.get("ssim"), Some(&json!(0.91)));
    assert_eq!(view.displayed_mosaic(), Some("/m.png"));
}

#[test]
fn remote_error_status_is_surfaced() {
    init_logging();
    let job = JobId::new("J1");
    let (state, _) = submit(JobState::new());
    let (state, _) = upload_ok(state, "J1");
    let (state, _) = update(
        state,
        Msg::StatusReceived {
            job_id: job,
            payload: json!({"status": "error", "error": "out of memory"}),
        },
    );

    assert_eq!(state.status(), JobStatus::Error);
    assert_eq!(state.error(), Some("out of memory"));
}

#[test]
fn new_upload_abandons_previous_job() {
    init_logging();
    let old = JobId::new("J1");
    let (state, _) = submit(JobState::new());
    let (state, _) = upload_ok(state, "J1");
    let (state, effects) = submit(state);

    assert_eq!(
        effects,
        vec![
            Effect::CancelPolling {
                job_id: old.clone()
            },
            Effect::Upload {
                attempt: 2,
                element: element(),
                target: target(),
            },
        ]
    );
    assert!(state.job_id().is_none());
    assert!(state.outputs().is_empty());

    // Late results for the old job change nothing.
    let before = state.clone();
    let (state, effects) = update(
        state,
        Msg::PreprocessSucceeded {
            job_id: old.clone(),
            payload: json!({"intermediate_outputs": {"resized_big": "/old.png"}}),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state, before);

    // A late upload answer from the first attempt is ignored too.
    let (state, effects) = update(
        state,
        Msg::UploadSucceeded {
            attempt: 1,
            job_id: old,
            payload: json!({"element_url": "/old.png"}),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state, before);
}

#[test]
fn dismissing_error_does_not_retry() {
    init_logging();
    let (state, _) = submit(JobState::new());
    let (state, _) = update(
        state,
        Msg::UploadFailed {
            attempt: 1,
            message: "boom".to_string(),
        },
    );
    let (state, effects) = update(state, Msg::ErrorDismissed);

    assert!(effects.is_empty());
    assert_eq!(state.error(), None);
    assert_eq!(state.stage(), Stage::Upload);
}
