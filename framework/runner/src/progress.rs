use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Shows one spinner per running case so the user can see which step each case is at.
#[derive(Clone)]
pub(crate) struct CaseProgress {
    multi: Option<MultiProgress>,
}

impl CaseProgress {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            multi: enabled.then(MultiProgress::new),
        }
    }

    /// Add a spinner for a case. Returns `None` if progress is disabled.
    pub(crate) fn add_case(&self, name: &str) -> Option<ProgressBar> {
        let multi = self.multi.as_ref()?;

        let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {prefix}: {msg}")
            .unwrap_or_else(|e| {
                log::debug!("Falling back to the default spinner style: {e}");
                ProgressStyle::default_spinner()
            });

        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(style);
        pb.set_prefix(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(250));
        Some(pb)
    }
}

/// Update the message of an optional spinner.
pub(crate) fn set_step(pb: Option<&ProgressBar>, step: &'static str) {
    if let Some(pb) = pb {
        pb.set_message(step);
    }
}
