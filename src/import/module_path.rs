//! Logical (dotted) and physical (slash separated) module names.
//!
//! `a.b.c` and `a/b/c` name the same module. A package is marked by the
//! `__init__` unit underneath its directory, so the package `a.b` has its
//! source at `a/b/__init__`.

use std::fmt::{Display, Formatter};

use uuid::Uuid;

use crate::error::{HostError, Result};

/// Name of the source unit that turns a directory into a package.
pub const PACKAGE_INIT: &str = "__init__";

/// Separator between the resolver id and the path inside a routing token.
pub const TOKEN_SEPARATOR: char = '|';

/// An absolute module name, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModulePath(Vec<String>);

impl ModulePath {
    /// Parse a dotted (`a.b`) or slash separated (`a/b`) name.
    pub fn parse(path: &str) -> Result<Self> {
        HostError::require("path", path)?;

        let segments: Vec<String> = path
            .trim()
            .split(|c| c == '.' || c == '/' || c == '\\')
            .map(|s| s.trim().to_string())
            .collect();

        if segments.iter().any(|s| s.is_empty()) {
            return Err(HostError::InvalidArgument {
                name: "path",
                reason: format!("'{}' contains an empty segment", path),
            });
        }

        Ok(ModulePath(segments))
    }

    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Option<Self> {
        if segments.is_empty() {
            return None;
        }
        Some(ModulePath(
            segments.iter().map(|s| s.as_ref().to_string()).collect(),
        ))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// `a.b.c`
    pub fn dotted(&self) -> String {
        self.0.join(".")
    }

    /// `a/b/c`
    pub fn physical(&self) -> String {
        self.0.join("/")
    }

    /// `a/b/c/__init__`, the source unit of the package `a.b.c`.
    pub fn init_path(&self) -> String {
        format!("{}/{}", self.physical(), PACKAGE_INIT)
    }

    pub fn last(&self) -> &str {
        // Never empty by construction.
        self.0.last().map(|s| s.as_str()).unwrap_or_default()
    }

    pub fn parent(&self) -> Option<ModulePath> {
        self.strip_last(1)
    }

    /// Dotted parent name, or an empty string for a top level module.
    pub fn parent_dotted(&self) -> String {
        self.parent().map(|p| p.dotted()).unwrap_or_default()
    }

    /// Remove `n` trailing segments. `None` if nothing would be left.
    pub fn strip_last(&self, n: usize) -> Option<ModulePath> {
        if n >= self.0.len() {
            return None;
        }
        Some(ModulePath(self.0[..self.0.len() - n].to_vec()))
    }

    pub fn join<I>(&self, tail: I) -> ModulePath
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut segments = self.0.clone();
        segments.extend(tail.into_iter().map(|s| s.as_ref().to_string()));
        ModulePath(segments)
    }

    /// Accumulated prefixes, shortest first: `a.b.c` yields `a`, `a.b`, `a.b.c`.
    pub fn prefixes(&self) -> impl Iterator<Item = ModulePath> + '_ {
        (1..=self.0.len()).map(move |n| ModulePath(self.0[..n].to_vec()))
    }

    pub fn starts_with(&self, other: &ModulePath) -> bool {
        self.0.starts_with(&other.0)
    }
}

impl Display for ModulePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dotted())
    }
}

/// An import as written in guest code, before it is made absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportRequest {
    Absolute(ModulePath),
    /// Leading dot count and the remainder, if any (`..util` is `(2, util)`).
    Relative(usize, Option<ModulePath>),
}

impl ImportRequest {
    pub fn parse(path: &str) -> Result<Self> {
        HostError::require("path", path)?;

        let trimmed = path.trim();
        let levels = trimmed.chars().take_while(|c| *c == '.').count();
        if levels == 0 {
            return Ok(ImportRequest::Absolute(ModulePath::parse(trimmed)?));
        }

        let tail = &trimmed[levels..];
        let tail = if tail.is_empty() {
            None
        } else {
            Some(ModulePath::parse(tail)?)
        };
        Ok(ImportRequest::Relative(levels, tail))
    }

    /// Make the request absolute against the package of the importing module.
    ///
    /// One leading dot names the current package, every further dot walks
    /// one level up.
    pub fn resolve(&self, current_package: Option<&ModulePath>) -> Result<ModulePath> {
        match self {
            ImportRequest::Absolute(path) => Ok(path.clone()),
            ImportRequest::Relative(levels, tail) => {
                let package = current_package.ok_or_else(|| HostError::Runtime {
                    kind: "ImportError".to_string(),
                    message: "attempted relative import with no known parent package".to_string(),
                })?;
                let base = package
                    .strip_last(levels - 1)
                    .ok_or_else(|| HostError::Runtime {
                        kind: "ImportError".to_string(),
                        message: "attempted relative import beyond top-level package".to_string(),
                    })?;
                Ok(match tail {
                    Some(tail) => base.join(tail.segments()),
                    None => base,
                })
            }
        }
    }
}

/// `<resolver-id>|<physical path>`.
///
/// Used both as the single entry of a package's `__path__` and as the
/// synthetic file identity of every module a resolver supplied, so nested
/// imports can be routed back to the resolver that owns the subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingToken {
    pub resolver_id: Uuid,
    pub path: String,
}

impl RoutingToken {
    pub fn new(resolver_id: Uuid, path: impl Into<String>) -> Self {
        RoutingToken {
            resolver_id,
            path: path.into(),
        }
    }

    /// `None` for strings that are not routing tokens (plain file names).
    pub fn parse(token: &str) -> Option<Self> {
        let (id, path) = token.split_once(TOKEN_SEPARATOR)?;
        let resolver_id = Uuid::parse_str(id.trim()).ok()?;
        Some(RoutingToken::new(resolver_id, path))
    }

    /// Package that a unit with this identity belongs to.
    ///
    /// `pkg/__init__` and `pkg/util` both belong to `pkg`; a top level unit
    /// has no package.
    pub fn owning_package(&self) -> Option<ModulePath> {
        ModulePath::parse(&self.path).ok()?.parent()
    }
}

impl Display for RoutingToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.resolver_id, TOKEN_SEPARATOR, self.path)
    }
}
