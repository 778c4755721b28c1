use crate::document::ProfileDocument;
use profiler_e2e_core::prelude::ExpectedProfile;

/// Line numbers are only available in the structured shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot check for {function} at line {line}: the {shape} profile has no line information")]
pub struct LineCheckError {
    pub function: String,
    pub line: u32,
    pub shape: &'static str,
}

/// An expected fact that was not found in a profile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssertionFailure {
    #[error("function {function} not found")]
    FunctionMissing { function: String },
    #[error("function {function} not found in source file {source_file}")]
    FunctionNotInFile {
        function: String,
        source_file: String,
    },
    #[error("function {function} not found at line {line}")]
    FunctionNotAtLine { function: String, line: u32 },
    #[error(transparent)]
    LineCheck(#[from] LineCheckError),
}

// Function names match by substring, file names and lines must match exactly.
impl ProfileDocument {
    /// Whether any function name in the profile contains `name`.
    pub fn has_function(&self, name: &str) -> bool {
        match self {
            ProfileDocument::Summarized(profile) => {
                profile.functions.names.iter().any(|f| f.contains(name))
            }
            ProfileDocument::Structured(profile) => {
                profile.frames().any(|f| f.function_name.contains(name))
            }
        }
    }

    /// Whether any function whose name contains `name` is attributed to exactly `file`.
    pub fn has_function_in_file(&self, name: &str, file: &str) -> bool {
        match self {
            ProfileDocument::Summarized(profile) => profile
                .functions()
                .any(|(f, source)| f.contains(name) && source == Some(file)),
            ProfileDocument::Structured(profile) => profile
                .frames()
                .any(|f| f.function_name.contains(name) && f.file_name == file),
        }
    }

    /// Whether any location has a frame of function `name` at `line`.
    ///
    /// Returns an error for summarized profiles, which carry no line numbers.
    pub fn has_function_at_line(&self, name: &str, line: u32) -> Result<bool, LineCheckError> {
        match self {
            ProfileDocument::Summarized(_) => Err(LineCheckError {
                function: name.to_string(),
                line,
                shape: self.shape(),
            }),
            ProfileDocument::Structured(profile) => Ok(profile
                .frames()
                .any(|f| f.function_name == name && f.line == i64::from(line))),
        }
    }
}

/// Check every fact of `expected` against `doc`, returning all that do not hold.
///
/// With a source file the presence check is done against that file, otherwise against the
/// whole profile. A line is checked independently of the file.
pub fn check_expected_profile(
    doc: &ProfileDocument,
    expected: &ExpectedProfile,
) -> Vec<AssertionFailure> {
    let mut failures = Vec::new();
    let function = &expected.function_name;

    match &expected.source_file {
        Some(source_file) => {
            if !doc.has_function_in_file(function, source_file) {
                failures.push(AssertionFailure::FunctionNotInFile {
                    function: function.clone(),
                    source_file: source_file.clone(),
                });
            }
        }
        None => {
            if !doc.has_function(function) {
                failures.push(AssertionFailure::FunctionMissing {
                    function: function.clone(),
                });
            }
        }
    }

    if let Some(line) = expected.line {
        match doc.has_function_at_line(function, line) {
            Ok(true) => {}
            Ok(false) => failures.push(AssertionFailure::FunctionNotAtLine {
                function: function.clone(),
                line,
            }),
            Err(e) => failures.push(e.into()),
        }
    }

    failures
}
