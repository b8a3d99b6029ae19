//! Reference expressions: `${kind:path[, 'default']}`

use crate::error::{ConfigError, Result};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static REFERENCE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\$\{\s*([^}:,\s]*)\s*(?::\s*([^},]*?))?\s*(?:,\s*'([^']*)')?\s*\}").ok()
});

/// Whether `raw` is a reference expression
///
/// A value is a reference iff it is non-empty and the grammar matches its
/// leading `${...}` block.
pub fn is_reference(raw: &str) -> bool {
    !raw.is_empty()
        && raw.starts_with("${")
        && REFERENCE.as_ref().is_some_and(|re| re.is_match(raw))
}

/// Resolution strategy selected by the expression's `kind`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Lookup of another configuration key
    Config,
    /// Lookup of a process environment variable
    Env,
}

impl ReferenceKind {
    fn parse(kind: &str, expression: &str) -> Result<Self> {
        match kind.to_ascii_lowercase().as_str() {
            "config" => Ok(Self::Config),
            "env" => Ok(Self::Env),
            _ => Err(ConfigError::UnknownReferenceKind {
                kind: kind.to_string(),
                expression: expression.to_string(),
            }),
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => write!(f, "config"),
            Self::Env => write!(f, "env"),
        }
    }
}

/// A parsed reference expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceExpression {
    pub kind: ReferenceKind,
    pub path: String,
    /// Returned when the looked-up value is empty
    pub default: String,
}

impl ReferenceExpression {
    /// Parse `raw`
    ///
    /// Fails when the grammar has no match or the `kind:path` pair is
    /// incomplete; both are configuration errors, not retried.
    pub fn parse(raw: &str) -> Result<Self> {
        let captures = REFERENCE
            .as_ref()
            .and_then(|re| re.captures(raw))
            .ok_or_else(|| ConfigError::MalformedReference(raw.to_string()))?;

        let kind = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let path = captures.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
        if kind.is_empty() || path.is_empty() {
            return Err(ConfigError::MalformedReference(raw.to_string()));
        }

        Ok(Self {
            kind: ReferenceKind::parse(kind, raw)?,
            path: path.to_string(),
            default: captures
                .get(3)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        })
    }
}

impl fmt::Display for ReferenceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.default.is_empty() {
            write!(f, "${{{}:{}}}", self.kind, self.path)
        } else {
            write!(f, "${{{}:{}, '{}'}}", self.kind, self.path, self.default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection() {
        assert!(is_reference("${config:roles.lambda}"));
        assert!(is_reference("${config:a.b, 'fallback'}"));
        assert!(is_reference("${env:HOME}"));
        assert!(!is_reference(""));
        assert!(!is_reference("plain"));
        assert!(!is_reference("prefix ${config:a}"));
        assert!(!is_reference("${unterminated"));
    }

    #[test]
    fn test_parse_with_default() {
        let expr = ReferenceExpression::parse("${config:missing.path, 'fallback'}").unwrap();
        assert_eq!(expr.kind, ReferenceKind::Config);
        assert_eq!(expr.path, "missing.path");
        assert_eq!(expr.default, "fallback");
        assert_eq!(expr.to_string(), "${config:missing.path, 'fallback'}");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            ReferenceExpression::parse("${config}"),
            Err(ConfigError::MalformedReference(_))
        ));
        assert!(matches!(
            ReferenceExpression::parse("${vault:secret}"),
            Err(ConfigError::UnknownReferenceKind { .. })
        ));
        assert!(matches!(
            ReferenceExpression::parse("not a reference"),
            Err(ConfigError::MalformedReference(_))
        ));
    }
}
