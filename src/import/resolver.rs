//! Resolver trait for pluggable sources of module and script text.
//!
//! A resolver answers two questions for a path: does a module or package
//! live there, and what is the source text of a given unit. Resolvers may
//! be backed by a directory, an embedded table, a database or anything else
//! that can hand out text.

use uuid::Uuid;

use crate::import::module_path::ModulePath;

/// What a resolver found at a module path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedType {
    /// Nothing here.
    None,
    /// A single leaf source unit.
    Module,
    /// A directory with an `__init__` unit.
    Package,
}

impl ResolvedType {
    pub fn is_found(self) -> bool {
        self != ResolvedType::None
    }
}

/// A pluggable source of guest source text.
///
/// Resolvers are queried in registration order; the first one reporting
/// something other than [`ResolvedType::None`] owns the path. Queries must be
/// read-only and idempotent, they can be repeated for the same path at any
/// time.
pub trait ImportResolver {
    /// Stable identity for the lifetime of the host.
    ///
    /// Package routing tokens embed this id, so it must not change once the
    /// resolver is registered.
    fn id(&self) -> Uuid;

    /// Is there a package or a module at `path`?
    ///
    /// A package must win over a module of the same name.
    fn module_information(&self, path: &ModulePath) -> ResolvedType;

    /// Source text of the unit at `path`, or `None` when there is none.
    ///
    /// `path` is physical: `pkg/__init__` for a package body, `pkg/util` for
    /// a module, or an arbitrary script path passed to `execute_script`.
    fn script_source(&self, path: &str) -> Option<String>;

    /// Human-readable name for this resolver (for debugging/logging).
    fn name(&self) -> &str {
        "resolver"
    }
}
