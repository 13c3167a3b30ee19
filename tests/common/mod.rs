#![allow(dead_code)]

use std::path::{Path, PathBuf};

use taskexec::exec::TaskIdentity;
use taskexec::workspace::Workspace;

pub use taskexec_test_utils::builders::{ConfigFileBuilder, ParamsBuilder, TempProject, FAST_POLL};
pub use taskexec_test_utils::fake_launcher::FakeLauncher;
pub use taskexec_test_utils::{init_tracing, with_timeout};

pub fn task(id: u64, name: &str) -> TaskIdentity {
    TaskIdentity::new(id, name)
}

pub fn workspace(project: &Path) -> Workspace {
    Workspace::new(project, ".").expect("valid workspace")
}

pub fn state_file(project: &Path) -> PathBuf {
    project.join("state.json")
}
