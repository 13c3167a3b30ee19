mod common;

use std::sync::Arc;

use common::*;
use proptest::prelude::*;
use serde_json::{Value, json};
use taskexec::batch::{Advance, BatchSettings, ResumableExecutionController, TaskOutcome};
use taskexec::exec::CommandStatus;
use taskexec::params::Params;
use taskexec::secrets::{StaticSecrets, resolve_secrets};
use taskexec::state::{COMMAND_STATUS_KEY, TaskState};
use taskexec::template::ParamTemplateEngine;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn flat_params() -> impl Strategy<Value = Params> {
    proptest::collection::btree_map("[a-z]{1,4}", 0i64..100, 0..6).prop_map(|m| {
        let mut params = Params::new();
        for (k, v) in m {
            params.set(k, json!(v));
        }
        params
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // However long the command runs, it is submitted exactly once, every
    // unfinished step is Pending with the handle saved, and the final exit
    // code decides the outcome.
    #[test]
    fn controller_submits_once_and_reports_exit_code(
        polls in 0u64..6,
        exit_code in 0i32..4,
    ) {
        let project = TempProject::new();
        let ws = workspace(project.path());
        let launcher = FakeLauncher::new(polls, exit_code);
        let ctl = ResumableExecutionController::new(
            launcher.clone(),
            BatchSettings::default(),
            Arc::new(ParamTemplateEngine::new()),
            Arc::new(StaticSecrets::default()),
            Arc::new(StaticSecrets::default()),
        );
        let params = ParamsBuilder::new().with("config", json!({ "in": {} })).build();
        let task = task(1, "prop");

        let steps = runtime().block_on(async {
            let mut state = TaskState::new();
            let mut steps = Vec::new();
            loop {
                let step = ctl.advance(&mut state, &params, &ws, &task).await.unwrap();
                let pending = step.is_pending();
                prop_assert_eq!(state.has(COMMAND_STATUS_KEY), pending);
                steps.push(step);
                if !pending {
                    break;
                }
                prop_assert!(steps.len() <= 10);
            }
            Ok::<_, TestCaseError>(steps)
        })?;

        prop_assert_eq!(launcher.submit_count(), 1);
        prop_assert_eq!(steps.len() as u64, polls + 1);
        let expected = if exit_code == 0 {
            TaskOutcome::Success
        } else {
            TaskOutcome::Failed(exit_code)
        };
        prop_assert_eq!(steps.last().copied(), Some(Advance::Completed(expected)));
    }

    #[test]
    fn merge_default_keeps_existing_keys(own in flat_params(), defaults in flat_params()) {
        let merged = own.merge_default(&defaults);
        for (key, value) in own.as_map() {
            prop_assert_eq!(merged.get(key), Some(value));
        }
        for key in defaults.as_map().keys() {
            prop_assert!(merged.has(key));
        }

        let overridden = defaults.merge(&own);
        for (key, value) in own.as_map() {
            prop_assert_eq!(overridden.get(key), Some(value));
        }
    }

    #[test]
    fn resolved_tree_has_no_secret_references(
        keys in proptest::collection::btree_set("[a-z]{1,5}", 1..5),
    ) {
        let mut secrets = StaticSecrets::default();
        let mut tree = serde_json::Map::new();
        for (i, key) in keys.iter().enumerate() {
            let secret_key = format!("s.{}", key);
            secrets = secrets.with(secret_key.clone(), format!("v{}", i));
            tree.insert(format!("{}_secret", key), json!(secret_key));
        }
        let value = Value::Object(tree);
        let resolved = resolve_secrets(&json!({ "nested": value }), &secrets).unwrap();

        let nested = resolved["nested"].as_object().unwrap();
        prop_assert_eq!(nested.len(), keys.len());
        for key in &keys {
            let secret_key = format!("{}_secret", key);
            prop_assert!(!nested.contains_key(&secret_key));
            prop_assert!(nested[key].is_string());
        }
    }

    // A handle read back from the task state answers both queries the same
    // way, whatever the launcher put in its detail.
    #[test]
    fn persisted_handle_answers_like_the_original(
        finished in any::<bool>(),
        code in -5i32..300,
        pid in proptest::option::of(1u32..100_000),
    ) {
        let detail = match pid {
            Some(pid) => json!({ "pid": pid, "io_directory": "tmp/x" }),
            None => Value::Null,
        };
        let status = if finished {
            CommandStatus::finished(code, detail)
        } else {
            CommandStatus::running(detail)
        };

        let mut state = TaskState::new();
        state.set(COMMAND_STATUS_KEY, status.to_value().unwrap());
        let decoded = CommandStatus::from_value(state.get(COMMAND_STATUS_KEY).unwrap()).unwrap();

        prop_assert_eq!(decoded.is_finished(), status.is_finished());
        prop_assert_eq!(decoded.exit_code(), status.exit_code());
        prop_assert_eq!(decoded.detail(), status.detail());
    }
}
