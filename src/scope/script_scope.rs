use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::engine::Engine;
use crate::error::{HostError, Result};
use crate::import::chain::SharedResolverChain;
use crate::scope::guest_object::GuestObject;
use crate::util::{content_hash, normalize_line_endings};

const EXPRESSION_ORIGIN: &str = "<expression>";

/// An isolated guest execution context.
///
/// Owns one guest scope plus three caches: compiled expressions keyed by a
/// hash of their text, named precompiled scripts, and the set of script
/// paths already run here.
pub struct ScriptScope<E: Engine> {
    engine: Rc<E>,
    resolvers: SharedResolverChain,
    scope: Rc<RefCell<E::Scope>>,
    cached_expressions: HashMap<String, E::Code>,
    compiled_scripts: HashMap<String, E::Code>,
    executed_scripts: HashSet<String>,
}

impl<E: Engine> ScriptScope<E> {
    pub fn new(engine: Rc<E>, resolvers: SharedResolverChain) -> Self {
        let scope = engine.create_scope();
        ScriptScope {
            engine,
            resolvers,
            scope: Rc::new(RefCell::new(scope)),
            cached_expressions: HashMap::new(),
            compiled_scripts: HashMap::new(),
            executed_scripts: HashSet::new(),
        }
    }

    pub fn engine(&self) -> &Rc<E> {
        &self.engine
    }

    /// The guest scope itself, shared with every object created from it.
    pub fn guest_scope(&self) -> Rc<RefCell<E::Scope>> {
        self.scope.clone()
    }

    /// Compile (or reuse) and run `expression` in this scope.
    ///
    /// With `use_cache` the compiled form is kept under a hash of the
    /// normalized text, so the same text is compiled once per scope.
    pub fn execute_expression(&mut self, expression: &str, use_cache: bool) -> Result<E::Value> {
        let code = if use_cache {
            self.cached_code(expression)?
        } else {
            self.engine
                .compile(&normalize_line_endings(expression), EXPRESSION_ORIGIN)?
        };
        self.run(&code)
    }

    /// [`execute_expression`](Self::execute_expression) with the cache on.
    pub fn execute(&mut self, expression: &str) -> Result<E::Value> {
        self.execute_expression(expression, true)
    }

    fn cached_code(&mut self, expression: &str) -> Result<E::Code> {
        let normalized = normalize_line_endings(expression);
        let key = content_hash(&normalized);
        if let Some(code) = self.cached_expressions.get(&key) {
            trace!(hash = %key, "expression cache hit");
            return Ok(code.clone());
        }

        let code = self.engine.compile(&normalized, EXPRESSION_ORIGIN)?;
        self.cached_expressions.insert(key, code.clone());
        Ok(code)
    }

    fn run(&self, code: &E::Code) -> Result<E::Value> {
        let mut scope = self.scope.borrow_mut();
        self.engine.execute(code, &mut scope)
    }

    /// Drop every cached expression. Later executions recompile.
    pub fn clear_cache(&mut self) {
        debug!(count = self.cached_expressions.len(), "cleared expression cache");
        self.cached_expressions.clear();
    }

    pub fn cached_expression_count(&self) -> usize {
        self.cached_expressions.len()
    }

    /// Run the script at `path` in this scope.
    ///
    /// Source comes from the first resolver with non-empty text for `path`,
    /// then from the file system. A path that already ran here (compared
    /// case-insensitively) is skipped with `Ok(None)` unless
    /// `always_execute` is set. A failed run is forgotten, so it can be
    /// retried.
    pub fn execute_script(&mut self, path: &str, always_execute: bool) -> Result<Option<E::Value>> {
        HostError::require("path", path)?;

        let key = script_key(path);
        if !always_execute && self.executed_scripts.contains(&key) {
            trace!(script = path, "script already executed in this scope");
            return Ok(None);
        }

        self.executed_scripts.insert(key.clone());
        let result = self.run_script(path);
        if result.is_err() {
            self.executed_scripts.remove(&key);
        }
        result.map(Some)
    }

    fn run_script(&mut self, path: &str) -> Result<E::Value> {
        let found = self.resolvers.borrow().script_source(path);
        match found {
            Some((resolver, source)) => {
                debug!(script = path, resolver = %resolver, "executing script from resolver");
                self.execute_expression(&source, true)
            }
            None => {
                debug!(script = path, "no resolver has the script, reading file");
                let file = Path::new(path.trim());
                let source = fs::read_to_string(file).map_err(|source| HostError::Io {
                    path: file.to_path_buf(),
                    source,
                })?;
                let code = self
                    .engine
                    .compile(&normalize_line_endings(&source), path.trim())?;
                self.run(&code)
            }
        }
    }

    pub fn is_script_cached(&self, path: &str) -> bool {
        self.executed_scripts.contains(&script_key(path))
    }

    /// Forget that `path` ran here. Returns whether it was recorded.
    pub fn remove_cached_script_path(&mut self, path: &str) -> bool {
        self.executed_scripts.remove(&script_key(path))
    }

    /// Instantiate the guest type held in the variable `class_name`.
    pub fn create_class_instance(&self, class_name: &str, args: Vec<E::Value>) -> Result<GuestObject<E>> {
        HostError::require("class_name", class_name)?;

        let instance = {
            let mut scope = self.scope.borrow_mut();
            let class = self
                .engine
                .get_variable(&scope, class_name)
                .ok_or_else(|| HostError::VariableNotFound(class_name.to_string()))?;
            self.engine
                .create_instance(&mut scope, class_name, &class, args)?
        };

        Ok(GuestObject::new(
            self.engine.clone(),
            self.scope.clone(),
            Some(class_name.to_string()),
            instance,
        ))
    }

    /// Wrap any guest value so its members can be reached from the host.
    pub fn wrap(&self, value: E::Value) -> GuestObject<E> {
        GuestObject::new(self.engine.clone(), self.scope.clone(), None, value)
    }

    pub fn set_variable(&self, name: &str, value: E::Value) -> Result<()> {
        HostError::require("name", name)?;
        let mut scope = self.scope.borrow_mut();
        self.engine.set_variable(&mut scope, name, value)
    }

    pub fn get_variable(&self, name: &str) -> Result<E::Value> {
        HostError::require("name", name)?;
        self.engine
            .get_variable(&self.scope.borrow(), name)
            .ok_or_else(|| HostError::VariableNotFound(name.to_string()))
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.engine.get_variable(&self.scope.borrow(), name).is_some()
    }

    /// Call a guest function defined in this scope.
    pub fn call_function(&self, name: &str, args: Vec<E::Value>) -> Result<E::Value> {
        HostError::require("name", name)?;
        let mut scope = self.scope.borrow_mut();
        self.engine.call_function(&mut scope, name, args)
    }

    /// Compile `code` and keep it under `name` for later runs.
    ///
    /// An existing entry is replaced only with `override_existing`;
    /// otherwise it stays untouched and `DuplicateScript` is returned.
    pub fn precompile_code(&mut self, name: &str, code: &str, override_existing: bool) -> Result<()> {
        HostError::require("name", name)?;
        HostError::require("code", code)?;

        if !override_existing && self.compiled_scripts.contains_key(name) {
            return Err(HostError::DuplicateScript(name.to_string()));
        }

        let compiled = self.engine.compile(&normalize_line_endings(code), name)?;
        debug!(script = name, override_existing, "precompiled script");
        self.compiled_scripts.insert(name.to_string(), compiled);
        Ok(())
    }

    /// Run a script stored with [`precompile_code`](Self::precompile_code).
    pub fn execute_precompiled(&self, name: &str) -> Result<E::Value> {
        HostError::require("name", name)?;
        let code = self
            .compiled_scripts
            .get(name)
            .ok_or_else(|| HostError::ScriptNotFound(name.to_string()))?;
        self.run(code)
    }

    /// Run a script precompiled in this scope against another scope.
    pub fn execute_precompiled_in(&self, name: &str, target: &ScriptScope<E>) -> Result<E::Value> {
        HostError::require("name", name)?;
        let code = self
            .compiled_scripts
            .get(name)
            .ok_or_else(|| HostError::ScriptNotFound(name.to_string()))?;
        target.run(code)
    }

    pub fn is_precompiled(&self, name: &str) -> bool {
        self.compiled_scripts.contains_key(name)
    }

    pub fn remove_precompiled(&mut self, name: &str) -> bool {
        self.compiled_scripts.remove(name).is_some()
    }
}

fn script_key(path: &str) -> String {
    path.trim().to_lowercase()
}
