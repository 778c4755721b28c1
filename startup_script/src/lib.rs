//! Startup scripts for test instances.
//!
//! A [ScriptTemplate] holds named sections, [ScriptParams] holds the values of one test case.
//! [render_startup_script] puts the two together for the section that the case's scenario
//! selects.

mod params;
mod template;

use profiler_e2e_core::prelude::RunConfig;

pub use params::{ScriptParams, KNOWN_PLACEHOLDERS};
pub use template::ScriptTemplate;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("required field `{field}` is not set")]
    MissingField { field: &'static str },
    #[error("template has no section `{section}`")]
    MissingSection { section: String },
    #[error("section `{section}` uses `{placeholder}` which has no value for this case")]
    MissingValue {
        section: String,
        placeholder: String,
    },
    #[error("section `{section}` uses unknown placeholder `{placeholder}`")]
    UnknownPlaceholder {
        section: String,
        placeholder: String,
    },
    #[error("section `{section}` has an unterminated placeholder")]
    Unterminated { section: String },
    #[error("sections include each other: {}", chain.join(" -> "))]
    IncludeCycle { chain: Vec<String> },
    #[error("template defines no sections")]
    NoSections,
    #[error("invalid template: {0}")]
    Toml(String),
    #[error("failed to read template {path}: {message}")]
    Io { path: String, message: String },
}

impl From<toml::de::Error> for RenderError {
    fn from(e: toml::de::Error) -> Self {
        RenderError::Toml(e.to_string())
    }
}

/// Render the startup script for a test case.
pub fn render_startup_script(
    template: &ScriptTemplate,
    config: &RunConfig,
) -> Result<String, RenderError> {
    let params = ScriptParams::from_run_config(config)?;
    template.render(config.scenario.template_section(), &params)
}
