//! Import interception for the rhai engine.
//!
//! Every `import` statement reaches [`ImportInterceptor::resolve`]. Built-in
//! and native module names go straight to native import; everything else is
//! offered to the resolver chain first, one accumulated segment at a time,
//! and only falls back to native import when no resolver claims it.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use rhai::module_resolvers::FileModuleResolver;
use rhai::{Engine, EvalAltResult, Module, ModuleResolver, Position, Shared};
use tracing::{debug, trace};

use super::host_error;
use super::loader::{ModuleLoader, PATH_FIELD};
use crate::engine::RuntimeSettings;
use crate::error::{HostError, Result};
use crate::import::chain::{SharedResolverChain, RESOLVER_PATH_MARKER};
use crate::import::module_path::{ImportRequest, ModulePath, RoutingToken};
use crate::import::resolver::{ImportResolver, ResolvedType};

lazy_static! {
    /// Names reserved for the runtime. Resolvers are never asked for these.
    pub static ref DEFAULT_BUILTIN_MODULES: HashSet<&'static str> =
        ["sys", "std", "global"].iter().copied().collect();
}

type Resolution = Option<(Rc<dyn ImportResolver>, ResolvedType)>;

/// State shared between the engine handle and its interceptor.
pub(crate) struct ImportState {
    pub resolvers: SharedResolverChain,
    pub search_paths: RefCell<Vec<String>>,
    /// One file resolver per real search path. Each keeps its own module cache.
    file_resolvers: RefCell<Vec<(String, Rc<FileModuleResolver>)>>,
    pub builtin_modules: RefCell<HashSet<String>>,
    pub native_modules: RefCell<HashMap<String, Shared<Module>>>,
    /// Modules loaded through resolvers, by dotted name.
    pub modules: RefCell<HashMap<String, Shared<Module>>>,
    /// Modules whose body is running right now.
    pub loading: RefCell<HashSet<String>>,
    pub extension: String,
}

impl ImportState {
    pub fn new(resolvers: SharedResolverChain, settings: &RuntimeSettings) -> Self {
        let mut builtin: HashSet<String> = DEFAULT_BUILTIN_MODULES
            .iter()
            .map(|s| s.to_string())
            .collect();
        builtin.extend(settings.builtin_modules.iter().cloned());

        ImportState {
            resolvers,
            search_paths: RefCell::new(Vec::new()),
            file_resolvers: RefCell::new(Vec::new()),
            builtin_modules: RefCell::new(builtin),
            native_modules: RefCell::new(HashMap::new()),
            modules: RefCell::new(HashMap::new()),
            loading: RefCell::new(HashSet::new()),
            extension: settings.script_extension.clone(),
        }
    }

    /// Replace the search path list. File resolvers of roots that stay on
    /// the list are kept along with the modules they have cached.
    pub fn set_search_paths(&self, paths: Vec<String>) {
        let mut previous = self.file_resolvers.take();
        let roots: Vec<(String, Rc<FileModuleResolver>)> = paths
            .iter()
            .filter(|p| p.as_str() != RESOLVER_PATH_MARKER)
            .map(|root| {
                let files = match previous.iter().position(|(r, _)| r == root) {
                    Some(index) => previous.swap_remove(index).1,
                    None => Rc::new(FileModuleResolver::new_with_path_and_extension(
                        root.as_str(),
                        self.extension.as_str(),
                    )),
                };
                (root.clone(), files)
            })
            .collect();

        *self.file_resolvers.borrow_mut() = roots;
        *self.search_paths.borrow_mut() = paths;
    }

    fn is_builtin(&self, name: &str) -> bool {
        self.builtin_modules.borrow().contains(name) || self.native_modules.borrow().contains_key(name)
    }

    /// The interceptor only consults resolvers while its marker is on the search path.
    fn is_hooked(&self) -> bool {
        self.search_paths
            .borrow()
            .iter()
            .any(|p| p == RESOLVER_PATH_MARKER)
    }
}

/// Module resolver that routes imports through the host's resolver chain.
pub struct ImportInterceptor {
    state: Rc<ImportState>,
    loader: ModuleLoader,
}

impl ImportInterceptor {
    pub(crate) fn new(state: Rc<ImportState>) -> Self {
        ImportInterceptor {
            state,
            loader: ModuleLoader::new(),
        }
    }

    /// First resolver in the chain that can serve `path`.
    pub fn find_module(&self, path: &str) -> Result<Option<(Rc<dyn ImportResolver>, ResolvedType)>> {
        let chain = self.state.resolvers.borrow();
        if chain.is_empty() {
            return Err(HostError::Configuration(
                "no import resolvers are registered".to_string(),
            ));
        }
        Ok(chain.resolve_module(&ModulePath::parse(path)?))
    }

    /// Whether any registered resolver reports `path` as a package.
    pub fn is_package(&self, path: &str) -> Result<bool> {
        let path = ModulePath::parse(path)?;
        Ok(self
            .state
            .resolvers
            .borrow()
            .resolvers()
            .iter()
            .any(|r| r.module_information(&path) == ResolvedType::Package))
    }

    /// Source text the first matching resolver has for `path`.
    ///
    /// For a package this is the text of its `__init__` unit.
    pub fn get_source(&self, path: &str) -> Result<Option<String>> {
        let path = ModulePath::parse(path)?;
        let found = self.state.resolvers.borrow().resolve_module(&path);
        Ok(match found {
            Some((resolver, ResolvedType::Package)) => resolver.script_source(&path.init_path()),
            Some((resolver, _)) => resolver.script_source(&path.physical()),
            None => None,
        })
    }

    fn import(
        &self,
        engine: &Engine,
        source: Option<&str>,
        path: &str,
        pos: Position,
    ) -> std::result::Result<Shared<Module>, Box<EvalAltResult>> {
        let request = ImportRequest::parse(path).map_err(host_error)?;

        if let ImportRequest::Absolute(name) = &request {
            if self.state.is_builtin(&name.dotted()) {
                trace!(module = %name, "built-in module, using native import");
                return self.native_import(engine, path, pos);
            }
        }
        if !self.state.is_hooked() {
            return self.native_import(engine, path, pos);
        }

        // Units served by a resolver carry a `<resolver-id>|<path>` source.
        let importer = source.and_then(RoutingToken::parse);
        let current_package = importer.as_ref().and_then(|t| t.owning_package());
        let name = request
            .resolve(current_package.as_ref())
            .map_err(host_error)?;

        if let Some(module) = self.state.modules.borrow().get(&name.dotted()).cloned() {
            trace!(module = %name, "module already loaded");
            return Ok(module);
        }

        // A relative import stays inside the resolver that served the importer.
        let mut owner = match (&request, &importer) {
            (ImportRequest::Relative(..), Some(token)) => Some(self.owner(token).map_err(host_error)?),
            _ => None,
        };

        let depth = name.segments().len();
        let mut found: Resolution = None;
        for (index, prefix) in name.prefixes().enumerate() {
            let resolution = match &owner {
                Some(resolver) => {
                    let kind = resolver.module_information(&prefix);
                    if kind.is_found() {
                        Some((resolver.clone(), kind))
                    } else {
                        None
                    }
                }
                None => self.state.resolvers.borrow().resolve_module(&prefix),
            };
            trace!(prefix = %prefix, found = resolution.is_some(), "resolved import segment");

            if index + 1 == depth {
                found = resolution;
                break;
            }

            if let Some((resolver, ResolvedType::Package)) = resolution {
                // A package `__init__` importing its own submodules.
                if self.state.loading.borrow().contains(&prefix.dotted()) {
                    owner = Some(resolver);
                    continue;
                }
                if let Some(package) = self.load(engine, &resolver, &prefix, ResolvedType::Package)? {
                    owner = Some(self.package_owner(&package).map_err(host_error)?);
                }
            }
        }

        if let Some((resolver, kind)) = found {
            if let Some(module) = self.load(engine, &resolver, &name, kind)? {
                return Ok(module);
            }
        }

        debug!(module = %name, "no resolver matched, falling back to native import");
        self.native_import(engine, path, pos)
    }

    /// Load through the module loader once, then serve from the registry.
    fn load(
        &self,
        engine: &Engine,
        resolver: &Rc<dyn ImportResolver>,
        path: &ModulePath,
        kind: ResolvedType,
    ) -> std::result::Result<Option<Shared<Module>>, Box<EvalAltResult>> {
        let key = path.dotted();
        if let Some(module) = self.state.modules.borrow().get(&key).cloned() {
            return Ok(Some(module));
        }
        if !self.state.loading.borrow_mut().insert(key.clone()) {
            return Err(host_error(HostError::Runtime {
                kind: "ImportError".to_string(),
                message: format!("circular import of '{}'", key),
            }));
        }

        let loaded = self.loader.load(engine, resolver, path, kind);
        self.state.loading.borrow_mut().remove(&key);

        match loaded? {
            Some(module) => {
                let module: Shared<Module> = module.into();
                debug!(module = %key, resolver = %resolver.id(), "module loaded");
                self.state.modules.borrow_mut().insert(key, module.clone());
                Ok(Some(module))
            }
            None => Ok(None),
        }
    }

    fn owner(&self, token: &RoutingToken) -> Result<Rc<dyn ImportResolver>> {
        self.state.resolvers.borrow().find(token.resolver_id).ok_or_else(|| {
            HostError::Configuration(format!(
                "resolver {} that served the importing module is not registered",
                token.resolver_id
            ))
        })
    }

    /// The resolver named by a package's `__path__` token.
    fn package_owner(&self, package: &Module) -> Result<Rc<dyn ImportResolver>> {
        let token = package
            .get_var(PATH_FIELD)
            .and_then(|path| path.into_array().ok())
            .and_then(|tokens| tokens.into_iter().next())
            .and_then(|token| token.into_string().ok())
            .ok_or_else(|| {
                HostError::Configuration(format!(
                    "package '{}' has no resolver routing token",
                    package.id().unwrap_or_default()
                ))
            })?;
        let (resolver, _) = self.state.resolvers.borrow().resolve_token(&token)?;
        Ok(resolver)
    }

    /// The engine's own import: registered native modules, then script
    /// files under every real search path. A file module runs once per
    /// search path root.
    fn native_import(
        &self,
        engine: &Engine,
        path: &str,
        pos: Position,
    ) -> std::result::Result<Shared<Module>, Box<EvalAltResult>> {
        let name = path.trim();
        if let Some(module) = self.state.native_modules.borrow().get(name).cloned() {
            return Ok(module);
        }

        let relative = ModulePath::parse(name)
            .map(|p| p.physical())
            .unwrap_or_else(|_| name.to_string());
        let roots = self.state.file_resolvers.borrow().clone();

        for (root, files) in roots {
            match files.resolve(engine, None, &relative, pos) {
                Ok(module) => {
                    debug!(module = %name, root = %root, "native import");
                    return Ok(module);
                }
                Err(err) if matches!(*err, EvalAltResult::ErrorModuleNotFound(..)) => continue,
                Err(err) => return Err(err),
            }
        }

        Err(Box::new(EvalAltResult::ErrorModuleNotFound(
            name.to_string(),
            pos,
        )))
    }
}

impl ModuleResolver for ImportInterceptor {
    fn resolve(
        &self,
        engine: &Engine,
        source: Option<&str>,
        path: &str,
        pos: Position,
    ) -> std::result::Result<Shared<Module>, Box<EvalAltResult>> {
        self.import(engine, source, path, pos)
    }
}
