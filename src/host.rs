//! The host: owns the engine, the resolver chain and the default scope.

use std::collections::HashSet;
use std::rc::Rc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::config::HostConfig;
use crate::engine::{Engine, Language, RuntimeSettings};
use crate::error::{HostError, Result};
use crate::import::chain::{ResolverChain, SharedResolverChain, RESOLVER_PATH_MARKER};
use crate::import::filesystem::FileSystemResolver;
use crate::import::resolver::ImportResolver;
use crate::scope::ScriptScope;

/// Embeds one guest language.
///
/// Construction runs in a fixed order: the engine is created with the
/// import interceptor installed, then configured search paths and resolvers
/// are applied, then the default scope is created. Everything a `Host`
/// exposes therefore already has a live engine behind it.
pub struct Host<L: Language> {
    language: L,
    settings: RuntimeSettings,
    engine: Rc<L::Engine>,
    resolvers: SharedResolverChain,
    native_modules: HashSet<String>,
    default_scope: ScriptScope<L::Engine>,
}

impl<L: Language> Host<L> {
    pub fn new(language: L) -> Result<Self> {
        Self::with_config(language, &HostConfig::default())
    }

    pub fn with_config(mut language: L, config: &HostConfig) -> Result<Self> {
        let settings = language.create_runtime(config);
        let resolvers = ResolverChain::shared();
        let engine = Rc::new(language.create_engine(&settings, resolvers.clone())?);

        for name in &settings.builtin_modules {
            HostError::require("builtin_modules", name)?;
            engine.add_builtin_module(name);
        }

        let mut search_paths = Vec::with_capacity(settings.search_paths.len());
        for path in &settings.search_paths {
            HostError::require("search_paths", path)?;
            search_paths.push(path.clone());
        }
        engine.set_search_paths(search_paths);

        for (root, extension) in &settings.resolver_roots {
            let resolver = FileSystemResolver::new(root.clone()).with_extension(extension);
            attach_resolver(engine.as_ref(), &resolvers, Rc::new(resolver))?;
        }

        let default_scope = ScriptScope::new(engine.clone(), resolvers.clone());
        info!(
            language = language.name(),
            resolvers = resolvers.borrow().len(),
            "script host ready"
        );

        Ok(Host {
            language,
            settings,
            engine,
            resolvers,
            native_modules: HashSet::new(),
            default_scope,
        })
    }

    pub fn language(&self) -> &L {
        &self.language
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn engine(&self) -> &Rc<L::Engine> {
        &self.engine
    }

    pub fn resolvers(&self) -> SharedResolverChain {
        self.resolvers.clone()
    }

    /// Append a resolver to the chain and make sure imports reach it.
    pub fn add_import_resolver(&mut self, resolver: Rc<dyn ImportResolver>) -> Result<()> {
        attach_resolver(self.engine.as_ref(), &self.resolvers, resolver)
    }

    /// Remove a resolver. With the chain empty, imports stop being intercepted.
    pub fn remove_import_resolver(&mut self, id: Uuid) -> bool {
        let removed = self.resolvers.borrow_mut().remove(id);
        if removed && self.resolvers.borrow().is_empty() {
            let mut paths = self.engine.search_paths();
            paths.retain(|p| p != RESOLVER_PATH_MARKER);
            self.engine.set_search_paths(paths);
            debug!("last resolver removed, import interception off");
        }
        removed
    }

    pub fn add_search_path(&mut self, path: &str) -> Result<()> {
        HostError::require("path", path)?;
        let mut paths = self.engine.search_paths();
        paths.push(path.to_string());
        self.engine.set_search_paths(paths);
        Ok(())
    }

    /// Remove the first search path equal to `path`, ignoring case.
    pub fn remove_search_path(&mut self, path: &str) -> Result<bool> {
        HostError::require("path", path)?;
        let mut paths = self.engine.search_paths();
        let position = paths.iter().position(|p| p.eq_ignore_ascii_case(path));
        if let Some(index) = position {
            paths.remove(index);
            self.engine.set_search_paths(paths);
        }
        Ok(position.is_some())
    }

    pub fn search_paths(&self) -> Vec<String> {
        self.engine.search_paths()
    }

    /// Make a native module importable. A name is loaded at most once;
    /// `Ok(false)` means it was already there.
    pub fn load_native_module(
        &mut self,
        name: &str,
        module: <L::Engine as Engine>::NativeModule,
    ) -> Result<bool> {
        HostError::require("name", name)?;
        let name = name.trim();
        if self.native_modules.contains(name) {
            return Ok(false);
        }

        self.engine.load_native_module(name, module);
        self.engine.add_builtin_module(name);
        self.native_modules.insert(name.to_string());
        debug!(module = name, "loaded native module");
        Ok(true)
    }

    /// Hand every import of `name` to the engine's native import.
    pub fn add_builtin_module(&mut self, name: &str) -> Result<()> {
        HostError::require("name", name)?;
        self.engine.add_builtin_module(name);
        Ok(())
    }

    pub fn default_scope(&self) -> &ScriptScope<L::Engine> {
        &self.default_scope
    }

    pub fn default_scope_mut(&mut self) -> &mut ScriptScope<L::Engine> {
        &mut self.default_scope
    }

    /// Replace the default scope with a fresh one and return it.
    pub fn create_new_default_scope(&mut self) -> &mut ScriptScope<L::Engine> {
        self.default_scope = self.new_scope();
        &mut self.default_scope
    }

    /// A new isolated scope sharing this host's engine and resolvers.
    pub fn new_scope(&self) -> ScriptScope<L::Engine> {
        ScriptScope::new(self.engine.clone(), self.resolvers.clone())
    }
}

/// Register `resolver` and move the interceptor marker to the end of the
/// search path list, keeping exactly one.
fn attach_resolver<E: Engine>(
    engine: &E,
    resolvers: &SharedResolverChain,
    resolver: Rc<dyn ImportResolver>,
) -> Result<()> {
    resolvers.borrow_mut().add(resolver)?;

    let mut paths = engine.search_paths();
    paths.retain(|p| p != RESOLVER_PATH_MARKER);
    paths.push(RESOLVER_PATH_MARKER.to_string());
    engine.set_search_paths(paths);
    Ok(())
}
