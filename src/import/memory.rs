//! In-memory resolver backed by a table of embedded sources.
//!
//! Useful for scripts compiled into the host binary (`include_str!`) or
//! loaded from a database up front.

use std::collections::HashMap;

use uuid::Uuid;

use crate::import::module_path::ModulePath;
use crate::import::resolver::{ImportResolver, ResolvedType};

/// Serves sources out of a `path -> source` table.
///
/// Keys are physical paths: `mathlib` is a module, `pkg/__init__` makes `pkg`
/// a package and `pkg/util` is a module inside it.
pub struct MemoryResolver {
    id: Uuid,
    name: String,
    sources: HashMap<String, String>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(id: Uuid) -> Self {
        MemoryResolver {
            id,
            name: "memory".to_string(),
            sources: HashMap::new(),
        }
    }

    pub fn from_map<K, V>(sources: HashMap<K, V>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut resolver = Self::new();
        for (path, source) in sources {
            resolver.insert(path.as_ref(), source);
        }
        resolver
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add or replace the source at a physical path.
    pub fn insert(&mut self, path: &str, source: impl Into<String>) {
        self.sources.insert(normalize_key(path), source.into());
    }

    /// Add the `__init__` unit of the package `name`.
    pub fn insert_package(&mut self, name: &str, source: impl Into<String>) {
        match ModulePath::parse(name) {
            Ok(path) => self.insert(&path.init_path(), source),
            Err(_) => self.insert(name, source),
        }
    }

    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.sources.remove(&normalize_key(path))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for MemoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Table keys always use forward slashes.
fn normalize_key(path: &str) -> String {
    path.trim().replace('\\', "/")
}

impl ImportResolver for MemoryResolver {
    fn id(&self) -> Uuid {
        self.id
    }

    fn module_information(&self, path: &ModulePath) -> ResolvedType {
        if self.sources.contains_key(&path.init_path()) {
            ResolvedType::Package
        } else if self.sources.contains_key(&path.physical()) {
            ResolvedType::Module
        } else {
            ResolvedType::None
        }
    }

    fn script_source(&self, path: &str) -> Option<String> {
        self.sources.get(&normalize_key(path)).cloned()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
