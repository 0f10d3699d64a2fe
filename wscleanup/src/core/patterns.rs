//! Ordered include/exclude glob rules deciding which workspace entries are removed.

use glob::{MatchOptions, Pattern};

use crate::core::error::ConfigError;
use crate::core::types::{PatternKind, PatternRule};

/// `*` and `?` never cross `/`; `**` spans directories; hidden entries are eligible.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: Pattern,
    kind: PatternKind,
}

/// Compiled rule list.
///
/// The verdict for a path is the kind of the *last* matching rule. A path no
/// rule matches follows its nearest matched ancestor when that ancestor is
/// included, so an included directory takes its whole subtree with it.
/// Otherwise it is selected only if the list has no `Include` rules (an
/// implicit leading "include everything"). An empty list selects everything.
#[derive(Debug, Clone)]
pub struct PatternSet {
    rules: Vec<CompiledRule>,
    default_verdict: bool,
}

impl PatternSet {
    /// Select every entry (whole-tree wipe).
    pub fn everything() -> Self {
        Self {
            rules: Vec::new(),
            default_verdict: true,
        }
    }

    pub fn compile(rules: &[PatternRule]) -> Result<Self, ConfigError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let normalized = normalize(&rule.pattern);
            if normalized.is_empty() {
                return Err(ConfigError::InvalidPattern {
                    pattern: rule.pattern.clone(),
                    message: "pattern is empty".to_string(),
                });
            }
            let pattern = Pattern::new(&normalized).map_err(|err| ConfigError::InvalidPattern {
                pattern: rule.pattern.clone(),
                message: err.msg.to_string(),
            })?;
            compiled.push(CompiledRule {
                pattern,
                kind: rule.kind,
            });
        }
        let default_verdict = compiled
            .iter()
            .all(|rule| rule.kind == PatternKind::Exclude);
        Ok(Self {
            rules: compiled,
            default_verdict,
        })
    }

    /// True when no rules are configured and every entry is selected.
    pub fn is_full_wipe(&self) -> bool {
        self.rules.is_empty()
    }

    /// Verdict for a `/`-separated path relative to the workspace root.
    pub fn is_selected(&self, relative: &str) -> bool {
        if let Some(kind) = self.last_match(relative) {
            return kind == PatternKind::Include;
        }
        let mut path = relative;
        while let Some((parent, _)) = path.rsplit_once('/') {
            if let Some(kind) = self.last_match(parent) {
                return kind == PatternKind::Include || self.default_verdict;
            }
            path = parent;
        }
        self.default_verdict
    }

    fn last_match(&self, relative: &str) -> Option<PatternKind> {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.pattern.matches_with(relative, MATCH_OPTIONS))
            .map(|rule| rule.kind)
    }
}

/// Make a pattern root-relative and expand a trailing `/` to "everything beneath".
fn normalize(raw: &str) -> String {
    let mut pattern = raw.trim();
    loop {
        if let Some(rest) = pattern.strip_prefix("./") {
            pattern = rest;
        } else if let Some(rest) = pattern.strip_prefix('/') {
            pattern = rest;
        } else {
            break;
        }
    }
    if pattern.ends_with('/') {
        format!("{pattern}**")
    } else {
        pattern.to_string()
    }
}
