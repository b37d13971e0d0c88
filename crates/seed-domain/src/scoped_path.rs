use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Private,
    Shared,
    Public,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Private => "private",
            Scope::Shared => "shared",
            Scope::Public => "public",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logical `scope:/rel` path as used by tools, before resolution against
/// a task's concrete scope roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedPath {
    pub scope: Scope,
    pub rel: String,
}

impl ScopedPath {
    /// Parses `scope:/rel`. A string with no recognized `scope:/` prefix is
    /// treated as a bare relative path under the default scope (`private`).
    /// A prefix that looks like a scope but isn't one of the three known
    /// names is rejected outright — silently falling back would defeat the
    /// purpose of having named scopes at all.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.contains('\0') {
            return Err(Error::InvalidPath(raw.to_string()));
        }
        match raw.split_once(":/") {
            Some((scope_str, rel)) => {
                let scope = match scope_str {
                    "private" => Scope::Private,
                    "shared" => Scope::Shared,
                    "public" => Scope::Public,
                    other => {
                        return Err(Error::Validation(format!("unknown scope: {other}")));
                    }
                };
                Ok(Self {
                    scope,
                    rel: rel.to_string(),
                })
            }
            None => Ok(Self {
                scope: Scope::Private,
                rel: raw.to_string(),
            }),
        }
    }

    pub fn to_logical(&self) -> String {
        format!("{}:/{}", self.scope, self.rel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explicit_scope() {
        let p = ScopedPath::parse("shared:/handoff.txt").unwrap();
        assert_eq!(p.scope, Scope::Shared);
        assert_eq!(p.rel, "handoff.txt");
    }

    #[test]
    fn bare_path_defaults_to_private() {
        let p = ScopedPath::parse("notes.md").unwrap();
        assert_eq!(p.scope, Scope::Private);
        assert_eq!(p.rel, "notes.md");
    }

    #[test]
    fn unknown_scope_is_rejected() {
        assert!(ScopedPath::parse("privat:/x").is_err());
    }

    #[test]
    fn nul_byte_is_rejected() {
        assert!(ScopedPath::parse("private:/a\0b").is_err());
    }

    #[test]
    fn round_trips_to_logical() {
        let p = ScopedPath::parse("public:/readme.txt").unwrap();
        assert_eq!(p.to_logical(), "public:/readme.txt");
    }
}
