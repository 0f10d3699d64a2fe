//! External delete command templates.
//!
//! A template holds at most one `%s` placeholder for the absolute path of the
//! entry being removed. Substitution is a literal string replacement: path
//! text is never interpreted (a `$` or `\` in a file name is copied as-is).

use crate::core::error::ConfigError;

pub const PATH_PLACEHOLDER: &str = "%s";

/// Validated command template.
///
/// The template is split into argv once, at configuration time, so a path
/// containing spaces or shell metacharacters always stays a single argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    template: String,
    argv: Vec<String>,
}

/// A template with the path substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    /// Command line as written in the build log.
    pub display: String,
    /// Arguments handed to the process launcher.
    pub argv: Vec<String>,
}

impl CommandTemplate {
    /// Parse a template. Without a placeholder, the path is appended as the last argument.
    pub fn parse(template: &str) -> Result<Self, ConfigError> {
        let trimmed = template.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::EmptyCommand);
        }
        let count = trimmed.matches(PATH_PLACEHOLDER).count();
        if count > 1 {
            return Err(ConfigError::TooManyPlaceholders {
                template: trimmed.to_string(),
                count,
            });
        }
        let mut argv =
            shell_words::split(trimmed).map_err(|err| ConfigError::MalformedCommand {
                template: trimmed.to_string(),
                message: err.to_string(),
            })?;
        if argv.first().is_none_or(|program| program.is_empty()) {
            return Err(ConfigError::EmptyCommand);
        }
        let template = if count == 0 {
            argv.push(PATH_PLACEHOLDER.to_string());
            format!("{trimmed} {PATH_PLACEHOLDER}")
        } else {
            trimmed.to_string()
        };
        Ok(Self { template, argv })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn resolve(&self, path: &str) -> ResolvedCommand {
        ResolvedCommand {
            display: self.template.replacen(PATH_PLACEHOLDER, path, 1),
            argv: self
                .argv
                .iter()
                .map(|arg| arg.replacen(PATH_PLACEHOLDER, path, 1))
                .collect(),
        }
    }
}
