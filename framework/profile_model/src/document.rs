use crate::pprof;
use std::collections::HashMap;

/// Decoded profile data returned by a profile query.
///
/// The backend answers in one of two shapes depending on the protocol version and on whether
/// the raw profile was requested. Both support the same function lookups, see the assertions
/// module.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileDocument {
    Summarized(SummarizedProfile),
    Structured(StructuredProfile),
}

impl ProfileDocument {
    pub fn shape(&self) -> &'static str {
        match self {
            ProfileDocument::Summarized(_) => "summarized",
            ProfileDocument::Structured(_) => "structured",
        }
    }
}

/// Sample counts with a function table, aggregated by the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummarizedProfile {
    pub default_metric_type: String,
    pub samples: Vec<i64>,
    pub functions: FunctionTable,
    pub source_files: Vec<String>,
}

/// Parallel arrays of function names and indices into [SummarizedProfile::source_files].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionTable {
    pub names: Vec<String>,
    pub source_files: Vec<usize>,
}

impl SummarizedProfile {
    /// Iterate over `(function name, source file)` pairs.
    ///
    /// The source file is `None` if the function has no file entry.
    pub fn functions(&self) -> impl Iterator<Item = (&str, Option<&str>)> + '_ {
        self.functions.names.iter().enumerate().map(|(i, name)| {
            let file = self
                .functions
                .source_files
                .get(i)
                .and_then(|index| self.source_files.get(*index))
                .map(String::as_str);
            (name.as_str(), file)
        })
    }
}

/// A fully decoded profile with every location resolved to function names, files and lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredProfile {
    /// `(type, unit)` pairs, for example `("space", "bytes")`.
    pub sample_types: Vec<(String, String)>,
    pub sample_count: usize,
    pub locations: Vec<ResolvedLocation>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedLocation {
    pub id: u64,
    /// Inlined frames first, the outermost caller last.
    pub lines: Vec<FrameLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameLine {
    pub function_name: String,
    pub file_name: String,
    pub line: i64,
}

/// Reasons a decoded pprof profile cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidProfile {
    #[error("string table index {index} out of range")]
    StringIndexOutOfRange { index: i64 },
    #[error("location {location_id} refers to unknown function {function_id}")]
    UnknownFunction { location_id: u64, function_id: u64 },
}

impl StructuredProfile {
    /// Resolve string table and function references of a decoded pprof profile.
    pub fn from_pprof(profile: &pprof::Profile) -> Result<Self, InvalidProfile> {
        let string_at = |index: i64| -> Result<String, InvalidProfile> {
            usize::try_from(index)
                .ok()
                .and_then(|i| profile.string_table.get(i))
                .cloned()
                .ok_or(InvalidProfile::StringIndexOutOfRange { index })
        };

        let functions = profile
            .function
            .iter()
            .map(|f| Ok((f.id, (string_at(f.name)?, string_at(f.filename)?))))
            .collect::<Result<HashMap<u64, (String, String)>, InvalidProfile>>()?;

        let locations = profile
            .location
            .iter()
            .map(|location| {
                let lines = location
                    .line
                    .iter()
                    .map(|line| {
                        let (function_name, file_name) = functions.get(&line.function_id).ok_or(
                            InvalidProfile::UnknownFunction {
                                location_id: location.id,
                                function_id: line.function_id,
                            },
                        )?;
                        Ok(FrameLine {
                            function_name: function_name.clone(),
                            file_name: file_name.clone(),
                            line: line.line,
                        })
                    })
                    .collect::<Result<Vec<_>, InvalidProfile>>()?;

                Ok(ResolvedLocation {
                    id: location.id,
                    lines,
                })
            })
            .collect::<Result<Vec<_>, InvalidProfile>>()?;

        let sample_types = profile
            .sample_type
            .iter()
            .map(|vt| Ok((string_at(vt.r#type)?, string_at(vt.unit)?)))
            .collect::<Result<Vec<_>, InvalidProfile>>()?;

        Ok(Self {
            sample_types,
            sample_count: profile.sample.len(),
            locations,
        })
    }

    /// Iterate over every frame of every location.
    pub fn frames(&self) -> impl Iterator<Item = &FrameLine> + '_ {
        self.locations.iter().flat_map(|l| l.lines.iter())
    }
}
