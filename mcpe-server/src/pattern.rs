//! Event-type pattern matching
//!
//! Subscriptions select event types with three pattern forms, split on `.`:
//!
//! - a literal type: `github.push` matches only `github.push`
//! - a prefix pattern: `github.*` matches everything that starts with
//!   `github.`; the trailing dot is required, so `github.*` does **not**
//!   match the bare type `github`
//! - the universal `*`, which matches every type
//!
//! Wildcards are only valid in these two positions; `git*.push` or
//! `github.*.opened` are rejected at subscription time rather than silently
//! matching nothing.

use std::fmt;

/// Error type for pattern parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// Empty pattern string
    EmptyPattern,
    /// Empty token (e.g. `github..push` or a trailing dot)
    EmptyToken,
    /// `*` used anywhere other than alone or as the final `.*` segment
    MisplacedWildcard,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::EmptyPattern => write!(f, "pattern cannot be empty"),
            PatternError::EmptyToken => {
                write!(f, "pattern contains an empty segment (consecutive dots)")
            }
            PatternError::MisplacedWildcard => write!(
                f,
                "'*' is only valid alone or as the final '.*' segment"
            ),
        }
    }
}

impl std::error::Error for PatternError {}

/// A parsed event-type pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypePattern {
    /// Matches exactly one type
    Exact(String),
    /// `prefix.*`; stores the prefix without the trailing `.*`
    Prefix(String),
    /// `*`; matches every type
    Wildcard,
}

impl TypePattern {
    /// Parse a pattern string
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::EmptyPattern);
        }
        if pattern == "*" {
            return Ok(TypePattern::Wildcard);
        }

        if let Some(prefix) = pattern.strip_suffix(".*") {
            if prefix.is_empty() {
                return Err(PatternError::EmptyToken);
            }
            if prefix.contains('*') {
                return Err(PatternError::MisplacedWildcard);
            }
            validate_segments(prefix)?;
            return Ok(TypePattern::Prefix(prefix.to_string()));
        }

        if pattern.contains('*') {
            return Err(PatternError::MisplacedWildcard);
        }
        validate_segments(pattern)?;
        Ok(TypePattern::Exact(pattern.to_string()))
    }

    /// Check whether an event type matches this pattern
    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            TypePattern::Exact(literal) => literal == event_type,
            TypePattern::Prefix(prefix) => {
                event_type.len() > prefix.len() + 1
                    && event_type.starts_with(prefix.as_str())
                    && event_type.as_bytes()[prefix.len()] == b'.'
            }
            TypePattern::Wildcard => true,
        }
    }

    /// The original pattern text
    pub fn to_pattern_string(&self) -> String {
        match self {
            TypePattern::Exact(literal) => literal.clone(),
            TypePattern::Prefix(prefix) => format!("{prefix}.*"),
            TypePattern::Wildcard => "*".to_string(),
        }
    }
}

fn validate_segments(pattern: &str) -> Result<(), PatternError> {
    if pattern.split('.').any(str::is_empty) {
        return Err(PatternError::EmptyToken);
    }
    Ok(())
}
