mod case;
mod cli;
mod definition;
mod env;
mod init;
mod lifecycle;
mod poll;
mod progress;
mod report;
mod run;
mod shutdown;

pub mod prelude {
    pub use crate::cli::HarnessCli;
    pub use crate::definition::{HarnessDefinition, HarnessDefinitionBuilder, TestCase};
    pub use crate::env::HarnessEnv;
    pub use crate::init::init;
    pub use crate::lifecycle::{LifecycleDriver, ScopedOutcome};
    pub use crate::poll::{poll_for_sentinel, DEFAULT_POLL_INTERVAL};
    pub use crate::report::{format_report_table, CaseReport};
    pub use crate::run::{new_run_id, run, run_definition, RunOutcome};

    // Re-exports so that scenarios only need to depend on the runner
    pub use profiler_e2e_core::prelude::*;
    pub use profiler_e2e_profile_model::prelude::{BackoffMarkers, ProfileQuerier, QueryError};
    pub use startup_script::{render_startup_script, RenderError, ScriptTemplate};
}
