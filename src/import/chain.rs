//! The resolver chain, consulted by imports and by script execution.
//!
//! ## Resolution Order
//!
//! When a module path is looked up:
//! 1. Ask each resolver's `module_information()` in registration order
//! 2. First resolver that reports a package or a module wins
//! 3. Nobody claims it → the caller falls back to native resolution
//!
//! Order therefore encodes priority: when two resolvers can serve the same
//! path, the one registered first is always used.
//!
//! ## Routing Tokens
//!
//! A package loaded through the chain remembers its resolver in a
//! `<resolver-id>|<path>` token. [`ResolverChain::resolve_token`] turns such a
//! token back into the resolver, so a whole package subtree is served by the
//! resolver that owns its root.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{HostError, Result};
use crate::import::module_path::{ModulePath, RoutingToken};
use crate::import::resolver::{ImportResolver, ResolvedType};

/// Synthetic search path entry that hooks the import interceptor into the
/// engine's native search path list.
pub const RESOLVER_PATH_MARKER: &str = "<just-host-resolver>";

/// Chain shared between the host and the installed import interceptor.
pub type SharedResolverChain = Rc<RefCell<ResolverChain>>;

/// Ordered list of registered resolvers.
#[derive(Default)]
pub struct ResolverChain {
    resolvers: Vec<Rc<dyn ImportResolver>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        ResolverChain {
            resolvers: Vec::new(),
        }
    }

    pub fn shared() -> SharedResolverChain {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Register a resolver behind all existing ones.
    pub fn add(&mut self, resolver: Rc<dyn ImportResolver>) -> Result<()> {
        let id = resolver.id();
        if self.find(id).is_some() {
            return Err(HostError::DuplicateResolver(id));
        }
        debug!(resolver = %id, name = resolver.name(), "registered import resolver");
        self.resolvers.push(resolver);
        Ok(())
    }

    /// Remove a resolver by id. Returns whether it was registered.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.resolvers.len();
        self.resolvers.retain(|r| r.id() != id);
        let removed = self.resolvers.len() != before;
        if removed {
            debug!(resolver = %id, "removed import resolver");
        }
        removed
    }

    pub fn find(&self, id: Uuid) -> Option<Rc<dyn ImportResolver>> {
        self.resolvers.iter().find(|r| r.id() == id).cloned()
    }

    /// First resolver that knows `path`, with what it found there.
    pub fn resolve_module(
        &self,
        path: &ModulePath,
    ) -> Option<(Rc<dyn ImportResolver>, ResolvedType)> {
        for resolver in &self.resolvers {
            let kind = resolver.module_information(path);
            trace!(resolver = %resolver.id(), path = %path, ?kind, "probed resolver");
            if kind.is_found() {
                return Some((resolver.clone(), kind));
            }
        }
        None
    }

    /// First non-empty script source for `path`, in chain order.
    pub fn script_source(&self, path: &str) -> Option<(Uuid, String)> {
        self.resolvers.iter().find_map(|resolver| {
            resolver
                .script_source(path)
                .filter(|source| !source.trim().is_empty())
                .map(|source| (resolver.id(), source))
        })
    }

    /// Resolver and path named by a `<resolver-id>|<path>` token.
    ///
    /// A token naming a resolver that is no longer registered is a
    /// configuration error rather than a silent miss.
    pub fn resolve_token(&self, token: &str) -> Result<(Rc<dyn ImportResolver>, ModulePath)> {
        let token = RoutingToken::parse(token).ok_or_else(|| {
            HostError::Configuration(format!("'{}' is not a resolver routing token", token))
        })?;
        let resolver = self.find(token.resolver_id).ok_or_else(|| {
            HostError::Configuration(format!(
                "resolver {} named by routing token is not registered",
                token.resolver_id
            ))
        })?;
        Ok((resolver, ModulePath::parse(&token.path)?))
    }

    pub fn resolvers(&self) -> &[Rc<dyn ImportResolver>] {
        &self.resolvers
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}
