/// Terminal outcome of waiting for a remote run to finish.
///
/// Every variant carries the last output that was read, because the run cannot be inspected
/// again once the instance has been deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// The finish sentinel was seen.
    Completed { output: String },
    /// The error sentinel was seen.
    Failed { output: String, sentinel: String },
    /// The deadline passed without either sentinel being seen.
    TimedOut { output: String },
}

impl PollResult {
    pub fn output(&self) -> &str {
        match self {
            PollResult::Completed { output }
            | PollResult::Failed { output, .. }
            | PollResult::TimedOut { output } => output,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PollResult::Completed { .. })
    }
}
