//! Qualified definition names
//!
//! Names look like `App`, `Api::V1::Users` or `::Array::App`. The leading
//! `::` is accepted and dropped, so `::App` and `App` are the same name.

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ReloadError;

lazy_static! {
    static ref NAME_PATTERN: Regex =
        Regex::new(r"\A(?:::)?([A-Z]\w*(?:::[A-Z]\w*)*)\z").expect("name pattern is valid");
}

/// Separator between nested segments
pub const SEPARATOR: &str = "::";

/// Fully qualified name of a definition
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedName(String);

impl QualifiedName {
    /// Validate and normalize a raw name
    pub fn parse(raw: &str) -> Result<Self, ReloadError> {
        NAME_PATTERN
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .map(|m| QualifiedName(m.as_str().to_string()))
            .ok_or_else(|| ReloadError::InvalidName(raw.to_string()))
    }

    /// Wrap a string known to be a valid name (or a range bound)
    pub(crate) fn new_unchecked(raw: String) -> Self {
        QualifiedName(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment
    pub fn simple_name(&self) -> &str {
        self.0.rsplit(SEPARATOR).next().unwrap_or(&self.0)
    }

    /// Enclosing namespace, `None` for top-level names
    pub fn parent(&self) -> Option<QualifiedName> {
        self.0
            .rfind(SEPARATOR)
            .map(|idx| QualifiedName(self.0[..idx].to_string()))
    }

    /// Whether `self` is nested somewhere under `outer` (`A::B::C` is nested
    /// in `A` and `A::B`, not in `A::B::C` itself)
    pub fn is_nested_in(&self, outer: &QualifiedName) -> bool {
        self.0.len() > outer.0.len() + SEPARATOR.len()
            && self.0.starts_with(outer.as_str())
            && self.0[outer.0.len()..].starts_with(SEPARATOR)
    }

    /// Prefix every name nested under `self` starts with
    pub(crate) fn nested_prefix(&self) -> String {
        format!("{}{}", self.0, SEPARATOR)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for QualifiedName {
    type Err = ReloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QualifiedName::parse(s)
    }
}

impl AsRef<str> for QualifiedName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
