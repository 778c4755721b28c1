use crate::params::{ScriptParams, KNOWN_PLACEHOLDERS};
use crate::RenderError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A startup script template made of named sections.
///
/// Templates are stored as TOML:
///
/// ```toml
/// [sections]
/// prologue = '''
/// #!/bin/bash
/// '''
/// integration = '''
/// {{> prologue }}
/// GAE_SERVICE={{ Service }} node busybench.js {{ DurationSec }}
/// echo "{{ FinishString }}"
/// '''
/// ```
///
/// `{{ Name }}` is replaced by the value of a placeholder and `{{> section }}` by the rendered
/// content of another section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScriptTemplate {
    sections: HashMap<String, String>,
}

impl ScriptTemplate {
    /// Parse a template from its TOML representation.
    pub fn from_toml(content: &str) -> Result<Self, RenderError> {
        let template: ScriptTemplate = toml::from_str(content)?;
        if template.sections.is_empty() {
            return Err(RenderError::NoSections);
        }
        Ok(template)
    }

    /// Load a template from a TOML file.
    pub fn load(path: &Path) -> Result<Self, RenderError> {
        let content = std::fs::read_to_string(path).map_err(|e| RenderError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Render `section` with `params`.
    ///
    /// Fails rather than leaving a placeholder empty: unknown placeholders, placeholders without a
    /// value, missing sections and include cycles are all errors.
    pub fn render(&self, section: &str, params: &ScriptParams) -> Result<String, RenderError> {
        let mut out = String::new();
        let mut stack = Vec::new();
        self.render_into(section, params, &mut stack, &mut out)?;
        log::trace!("Rendered section {section}:\n{out}");
        Ok(out)
    }

    fn render_into<'a>(
        &'a self,
        section: &'a str,
        params: &ScriptParams,
        stack: &mut Vec<&'a str>,
        out: &mut String,
    ) -> Result<(), RenderError> {
        if stack.contains(&section) {
            let mut chain = stack.iter().map(|s| s.to_string()).collect::<Vec<_>>();
            chain.push(section.to_string());
            return Err(RenderError::IncludeCycle { chain });
        }
        let body = self
            .sections
            .get(section)
            .ok_or_else(|| RenderError::MissingSection {
                section: section.to_string(),
            })?;

        stack.push(section);

        let mut rest = body.as_str();
        while let Some(start) = rest.find(OPEN) {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + OPEN.len()..];
            let end = after_open
                .find(CLOSE)
                .ok_or_else(|| RenderError::Unterminated {
                    section: section.to_string(),
                })?;
            let tag = after_open[..end].trim();

            if let Some(include) = tag.strip_prefix('>') {
                self.render_into(include.trim(), params, stack, out)?;
            } else if KNOWN_PLACEHOLDERS.contains(&tag) {
                let value = params.get(tag).ok_or_else(|| RenderError::MissingValue {
                    section: section.to_string(),
                    placeholder: tag.to_string(),
                })?;
                out.push_str(value);
            } else {
                return Err(RenderError::UnknownPlaceholder {
                    section: section.to_string(),
                    placeholder: tag.to_string(),
                });
            }

            rest = &after_open[end + CLOSE.len()..];
        }
        out.push_str(rest);

        stack.pop();
        Ok(())
    }
}
