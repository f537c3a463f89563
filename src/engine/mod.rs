//! Capabilities the host needs from a guest language.
//!
//! The host never parses or runs guest code itself. A language adapter
//! supplies an [`Engine`] that compiles and executes source against scopes
//! and gives dynamic access to guest objects, and a [`Language`] that
//! creates that engine and installs the import interceptor into it.
//!
//! ```text
//! Host::new(language)
//!   1. language.create_runtime()               → RuntimeSettings
//!   2. language.create_engine(settings, chain) → Engine, interceptor installed
//!   3. configured search paths and resolvers are applied
//!   4. default ScriptScope is created
//! ```
//!
//! The adapter shipped with this crate is [`rhai::RhaiLanguage`].

pub mod rhai;

use std::path::PathBuf;

use crate::config::HostConfig;
use crate::error::Result;
use crate::import::chain::SharedResolverChain;

/// Settings an engine is created with.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub max_call_levels: usize,
    pub max_operations: u64,
    pub max_expr_depth: usize,
    pub search_paths: Vec<String>,
    pub builtin_modules: Vec<String>,
    pub script_extension: String,
    pub resolver_roots: Vec<(PathBuf, String)>,
}

impl RuntimeSettings {
    pub fn from_config(config: &HostConfig) -> Self {
        let extension = &config.imports.script_extension;
        RuntimeSettings {
            max_call_levels: config.runtime.max_call_levels,
            max_operations: config.runtime.max_operations,
            max_expr_depth: config.runtime.max_expr_depth,
            search_paths: config.imports.search_paths.clone(),
            builtin_modules: config.imports.builtin_modules.clone(),
            script_extension: extension.clone(),
            resolver_roots: config
                .resolvers
                .iter()
                .map(|r| {
                    let ext = r.extension.clone().unwrap_or_else(|| extension.clone());
                    (r.root.clone(), ext)
                })
                .collect(),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&HostConfig::default())
    }
}

/// Guest execution engine.
///
/// All methods take `&self`; an engine is shared by the host and every scope
/// it creates, and is used from one thread only.
pub trait Engine {
    /// A compiled, reusable unit of guest code.
    type Code: Clone;
    /// One guest execution scope.
    type Scope;
    /// Any guest value.
    type Value: Clone;
    /// A natively implemented module that can be made importable.
    type NativeModule;

    fn create_scope(&self) -> Self::Scope;

    /// Compile `source`. `origin` names the code in diagnostics.
    fn compile(&self, source: &str, origin: &str) -> Result<Self::Code>;

    /// Run compiled code against a scope and return its value.
    fn execute(&self, code: &Self::Code, scope: &mut Self::Scope) -> Result<Self::Value>;

    fn get_variable(&self, scope: &Self::Scope, name: &str) -> Option<Self::Value>;

    /// Create or overwrite a variable. Fails for guest constants.
    fn set_variable(&self, scope: &mut Self::Scope, name: &str, value: Self::Value) -> Result<()>;

    fn get_member(&self, target: &Self::Value, name: &str) -> Result<Self::Value>;

    fn set_member(&self, target: &mut Self::Value, name: &str, value: Self::Value) -> Result<()>;

    fn invoke_member(
        &self,
        scope: &mut Self::Scope,
        target: &mut Self::Value,
        name: &str,
        args: Vec<Self::Value>,
    ) -> Result<Self::Value>;

    /// Call a function value, or a function defined in the scope by name.
    fn call_function(
        &self,
        scope: &mut Self::Scope,
        name: &str,
        args: Vec<Self::Value>,
    ) -> Result<Self::Value>;

    /// Instantiate a guest type held in a variable named `class_name`.
    fn create_instance(
        &self,
        scope: &mut Self::Scope,
        class_name: &str,
        class: &Self::Value,
        args: Vec<Self::Value>,
    ) -> Result<Self::Value>;

    /// The ordered native import search path list.
    fn search_paths(&self) -> Vec<String>;

    fn set_search_paths(&self, paths: Vec<String>);

    /// Names that are always handed to native import.
    fn add_builtin_module(&self, name: &str);

    /// Make a native module importable under `name`.
    fn load_native_module(&self, name: &str, module: Self::NativeModule);
}

/// A guest language: creates the runtime settings and the engine.
pub trait Language {
    type Engine: Engine;

    fn create_runtime(&self, config: &HostConfig) -> RuntimeSettings {
        RuntimeSettings::from_config(config)
    }

    /// Create an engine whose imports are routed through `resolvers`.
    fn create_engine(
        &mut self,
        settings: &RuntimeSettings,
        resolvers: SharedResolverChain,
    ) -> Result<Self::Engine>;

    fn name(&self) -> &str;
}
