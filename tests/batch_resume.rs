mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use serde_json::json;
use taskexec::batch::{
    Advance, BatchSettings, DEFAULT_POLL_INTERVAL, ResumableExecutionController, TaskOutcome,
};
use taskexec::errors::TaskExecError;
use taskexec::params::Params;
use taskexec::secrets::StaticSecrets;
use taskexec::state::{COMMAND_STATUS_KEY, TaskState};
use taskexec::template::ParamTemplateEngine;

fn controller(launcher: FakeLauncher) -> ResumableExecutionController<FakeLauncher> {
    ResumableExecutionController::new(
        launcher,
        BatchSettings::default(),
        Arc::new(ParamTemplateEngine::new()),
        Arc::new(StaticSecrets::default().with("db.password", "hunter2")),
        Arc::new(StaticSecrets::default().with("API_TOKEN", "t0k3n")),
    )
}

fn structured_params() -> Params {
    ParamsBuilder::new()
        .with("config", json!({ "in": { "type": "file", "path_prefix": "/data/in" } }))
        .build()
}

#[tokio::test]
async fn submit_then_poll_until_success() {
    init_tracing();
    let project = TempProject::new();
    let ws = workspace(project.path());
    let launcher = FakeLauncher::new(1, 0);
    let ctl = controller(launcher.clone());
    let params = structured_params();
    let task = task(7, "load");

    let mut state = TaskState::new();
    let first = ctl.advance(&mut state, &params, &ws, &task).await.unwrap();
    assert_eq!(
        first,
        Advance::Pending {
            retry_after: Duration::from_secs(3)
        }
    );
    assert_eq!(DEFAULT_POLL_INTERVAL, Duration::from_secs(3));
    assert!(state.has(COMMAND_STATUS_KEY));
    assert_eq!(launcher.submit_count(), 1);

    let second = ctl.advance(&mut state, &params, &ws, &task).await.unwrap();
    assert_eq!(second, Advance::Completed(TaskOutcome::Success));
    assert!(state.is_empty());
    assert_eq!(launcher.submit_count(), 1);
    assert_eq!(launcher.poll_count(), 1);
}

#[tokio::test]
async fn unfinished_handle_is_never_resubmitted() {
    let project = TempProject::new();
    let ws = workspace(project.path());
    let launcher = FakeLauncher::new(5, 0);
    let ctl = controller(launcher.clone());
    let params = structured_params();
    let task = task(1, "load");

    let mut state = TaskState::new();
    for _ in 0..4 {
        let step = ctl.advance(&mut state, &params, &ws, &task).await.unwrap();
        assert!(step.is_pending());
    }
    assert_eq!(launcher.submit_count(), 1);
    assert_eq!(launcher.poll_count(), 3);

    let last = ctl.advance(&mut state, &params, &ws, &task).await.unwrap();
    assert_eq!(last, Advance::Completed(TaskOutcome::Success));
    assert_eq!(launcher.submit_count(), 1);
}

#[tokio::test]
async fn resumes_from_saved_state_with_fresh_controller() {
    let project = TempProject::new();
    let ws = workspace(project.path());
    let params = structured_params();
    let task = task(3, "load");
    let path = state_file(project.path());

    let first_launcher = FakeLauncher::new(1, 0);
    {
        let ctl = controller(first_launcher.clone());
        let mut state = TaskState::load(&path).unwrap();
        let step = ctl.advance(&mut state, &params, &ws, &task).await.unwrap();
        assert!(step.is_pending());
        state.save(&path).unwrap();
    }

    // A restarted orchestrator with a new launcher instance.
    let second_launcher = FakeLauncher::new(1, 0);
    let ctl = controller(second_launcher.clone());
    let mut state = TaskState::load(&path).unwrap();
    let step = ctl.advance(&mut state, &params, &ws, &task).await.unwrap();

    assert_eq!(step, Advance::Completed(TaskOutcome::Success));
    assert_eq!(first_launcher.submit_count(), 1);
    assert_eq!(second_launcher.submit_count(), 0);
    assert_eq!(second_launcher.poll_count(), 1);
}

#[tokio::test]
async fn failure_clears_handle_and_next_attempt_resubmits() {
    let project = TempProject::new();
    let ws = workspace(project.path());
    let launcher = FakeLauncher::new(0, 4);
    let ctl = controller(launcher.clone());
    let params = structured_params();
    let task = task(2, "load");

    let mut state = TaskState::new();
    let step = ctl.advance(&mut state, &params, &ws, &task).await.unwrap();
    assert_eq!(step, Advance::Completed(TaskOutcome::Failed(4)));
    assert!(!state.has(COMMAND_STATUS_KEY));

    let err = step.into_result().unwrap_err();
    assert!(matches!(err, TaskExecError::CommandFailed { code: 4 }));

    ctl.advance(&mut state, &params, &ws, &task).await.unwrap();
    assert_eq!(launcher.submit_count(), 2);
}

#[tokio::test]
async fn poll_errors_leave_state_untouched() {
    let project = TempProject::new();
    let ws = workspace(project.path());
    let launcher = FakeLauncher::new(2, 0).failing_polls();
    let ctl = controller(launcher.clone());
    let params = structured_params();
    let task = task(2, "load");

    let mut state = TaskState::new();
    ctl.advance(&mut state, &params, &ws, &task).await.unwrap();
    let saved = state.clone();

    let err = ctl.advance(&mut state, &params, &ws, &task).await.unwrap_err();
    assert!(!err.is_config_error());
    assert_eq!(state, saved);
    assert_eq!(launcher.submit_count(), 1);
}

#[tokio::test]
async fn unreadable_handle_fails_without_resubmitting() {
    let project = TempProject::new();
    let ws = workspace(project.path());
    let launcher = FakeLauncher::new(1, 0);
    let ctl = controller(launcher.clone());
    let params = structured_params();
    let task = task(2, "load");

    let mut state = TaskState::new();
    state.set(COMMAND_STATUS_KEY, json!("garbage"));

    let err = ctl.advance(&mut state, &params, &ws, &task).await.unwrap_err();
    assert!(matches!(err, TaskExecError::StatusDecode(_)));
    assert_eq!(launcher.submit_count(), 0);
    assert_eq!(state.get(COMMAND_STATUS_KEY), Some(&json!("garbage")));
}

#[tokio::test]
async fn request_uses_relative_paths_and_privileged_env() {
    let project = TempProject::new();
    let ws = workspace(project.path());
    let launcher = FakeLauncher::new(1, 0);
    let ctl = controller(launcher.clone());

    let mut state = TaskState::new();
    ctl.advance(&mut state, &structured_params(), &ws, &task(42, "load"))
        .await
        .unwrap();

    let requests = launcher.submitted();
    let request = &requests[0];
    assert_eq!(request.working_directory, std::path::PathBuf::from(""));
    assert!(request.io_directory.is_relative());
    assert!(
        request
            .io_directory
            .to_string_lossy()
            .contains("taskexec-batch-42-")
    );

    assert_eq!(&request.command[..2], &["embulk".to_string(), "run".to_string()]);
    let config_arg = std::path::Path::new(&request.command[2]);
    assert!(config_arg.is_relative());
    assert!(config_arg.ends_with("load.yml"));
    assert!(config_arg.starts_with(&request.io_directory));

    assert_eq!(request.environment.get("API_TOKEN").map(String::as_str), Some("t0k3n"));
    assert!(request.environment.contains_key("PATH"));

    let yaml = std::fs::read_to_string(project.path().join(config_arg)).unwrap();
    assert!(!yaml.starts_with("---"));
    assert!(yaml.contains("path_prefix: /data/in"));
}

#[tokio::test]
async fn template_mode_expands_params_and_secrets() {
    let project = TempProject::new();
    project.write(
        "load.yml.tmpl",
        "in:\n  type: postgres\n  table: ${table}\n  password_secret: db.password\n",
    );
    let ws = workspace(project.path());
    let launcher = FakeLauncher::new(1, 0);
    let ctl = controller(launcher.clone());
    let params = ParamsBuilder::new()
        .with("_command", json!("load.yml.tmpl"))
        .with("table", json!("events"))
        .build();

    let mut state = TaskState::new();
    ctl.advance(&mut state, &params, &ws, &task(1, "load"))
        .await
        .unwrap();

    let request = &launcher.submitted()[0];
    let yaml = std::fs::read_to_string(project.path().join(&request.command[2])).unwrap();
    assert!(yaml.contains("table: events"));
    assert!(yaml.contains("password: hunter2"));
    assert!(!yaml.contains("password_secret"));
}

#[tokio::test]
async fn config_errors_do_not_touch_state_or_launcher() {
    let project = TempProject::new();
    let ws = workspace(project.path());
    let launcher = FakeLauncher::new(1, 0);
    let ctl = controller(launcher.clone());

    let cases = [
        Params::new(),
        ParamsBuilder::new().with("config", json!("not a mapping")).build(),
        ParamsBuilder::new().with("_command", json!("missing.yml")).build(),
    ];
    for params in cases {
        let mut state = TaskState::new();
        let err = ctl
            .advance(&mut state, &params, &ws, &task(1, "load"))
            .await
            .unwrap_err();
        assert!(state.is_empty(), "state changed for {params:?}");
        assert!(!matches!(err, TaskExecError::CommandFailed { .. }));
    }
    assert_eq!(launcher.submit_count(), 0);
}
