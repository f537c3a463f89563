//! Rhai language adapter.
//!
//! Maps the host's abstract engine onto [`rhai`]:
//!
//! | Host            | rhai                                              |
//! |-----------------|---------------------------------------------------|
//! | Code            | `AST`                                             |
//! | Scope           | [`RhaiScope`]: variables plus accumulated functions |
//! | Value           | `Dynamic`                                         |
//! | Guest object    | object map (`#{ ... }`)                           |
//! | Guest type      | object map prototype or constructor `Fn`          |
//! | Native module   | `rhai::Module`                                    |
//!
//! Imports are answered by an [`ImportInterceptor`] installed as the
//! engine's module resolver.

pub mod interceptor;
pub mod loader;

use std::rc::Rc;

use rhai::{CallFnOptions, Dynamic, EvalAltResult, FnPtr, Map, Module, Position, Scope, Shared, AST};
use tracing::debug;

use crate::engine::{Engine, Language, RuntimeSettings};
use crate::error::{HostError, Result};
use crate::import::chain::SharedResolverChain;
use crate::scope::guest_object::{GuestObject, MemberAccess};

pub use interceptor::{ImportInterceptor, DEFAULT_BUILTIN_MODULES};
pub use loader::{LoaderRef, ModuleLoader};

use loader::register_export_syntax;

use interceptor::ImportState;

/// Member of a prototype map run when an instance is created from it.
pub const INIT_MEMBER: &str = "init";

/// Hook run against a freshly created rhai engine, before the interceptor
/// is installed. Register native functions and types here.
pub type EngineSetup = Box<dyn Fn(&mut rhai::Engine)>;

/// The rhai guest language.
#[derive(Default)]
pub struct RhaiLanguage {
    setup: Option<EngineSetup>,
}

impl RhaiLanguage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_setup(setup: impl Fn(&mut rhai::Engine) + 'static) -> Self {
        RhaiLanguage {
            setup: Some(Box::new(setup)),
        }
    }
}

impl Language for RhaiLanguage {
    type Engine = RhaiEngine;

    fn create_engine(
        &mut self,
        settings: &RuntimeSettings,
        resolvers: SharedResolverChain,
    ) -> Result<RhaiEngine> {
        let mut engine = rhai::Engine::new();
        engine.set_max_call_levels(settings.max_call_levels);
        engine.set_max_operations(settings.max_operations);
        engine.set_max_expr_depths(settings.max_expr_depth, settings.max_expr_depth);

        if let Some(setup) = &self.setup {
            setup(&mut engine);
        }

        register_export_syntax(&mut engine)
            .map_err(|e| HostError::Configuration(format!("cannot prepare engine: {}", e)))?;
        let imports = Rc::new(ImportState::new(resolvers, settings));
        engine.set_module_resolver(ImportInterceptor::new(imports.clone()));
        debug!(language = self.name(), "created engine with import interceptor");

        Ok(RhaiEngine { engine, imports })
    }

    fn name(&self) -> &str {
        "rhai"
    }
}

/// A guest scope: top level variables, and every function the code run in
/// this scope has defined so far.
#[derive(Debug, Clone)]
pub struct RhaiScope {
    variables: Scope<'static>,
    library: AST,
}

impl RhaiScope {
    pub fn new() -> Self {
        RhaiScope {
            variables: Scope::new(),
            library: AST::empty(),
        }
    }

    pub fn variables(&self) -> &Scope<'static> {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut Scope<'static> {
        &mut self.variables
    }

    /// Names of the script functions defined in this scope.
    pub fn functions(&self) -> Vec<String> {
        self.library
            .iter_functions()
            .map(|f| f.name.to_string())
            .collect()
    }

    fn has_function(&self, name: &str, arity: usize) -> bool {
        self.library
            .iter_functions()
            .any(|f| f.name == name && f.params.len() == arity)
    }
}

impl Default for RhaiScope {
    fn default() -> Self {
        Self::new()
    }
}

/// The rhai engine with its import state.
pub struct RhaiEngine {
    engine: rhai::Engine,
    imports: Rc<ImportState>,
}

impl RhaiEngine {
    /// The underlying rhai engine.
    pub fn raw(&self) -> &rhai::Engine {
        &self.engine
    }

    /// A handle on the interceptor installed in this engine.
    pub fn interceptor(&self) -> ImportInterceptor {
        ImportInterceptor::new(self.imports.clone())
    }

    /// Import a module the way a guest `import` statement outside any
    /// package would.
    pub fn import_module(&self, path: &str) -> Result<Shared<Module>> {
        HostError::require("path", path)?;
        use rhai::ModuleResolver;
        self.interceptor()
            .resolve(&self.engine, None, path, Position::NONE)
            .map_err(guest_error)
    }

    /// Dotted names of the modules loaded through resolvers, sorted.
    pub fn loaded_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.imports.modules.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn module(&self, name: &str) -> Option<Shared<Module>> {
        self.imports.modules.borrow().get(name).cloned()
    }

    /// Forget a loaded module so the next import loads it again.
    pub fn unload_module(&self, name: &str) -> bool {
        let removed = self.imports.modules.borrow_mut().remove(name).is_some();
        if removed {
            debug!(module = name, "unloaded module");
        }
        removed
    }

    pub fn builtin_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.imports.builtin_modules.borrow().iter().cloned().collect();
        names.sort();
        names
    }

    fn call_with_this(
        &self,
        scope: &mut RhaiScope,
        this: &mut Dynamic,
        name: &str,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic> {
        let options = CallFnOptions::new()
            .eval_ast(false)
            .rewind_scope(true)
            .bind_this_ptr(this);
        self.engine
            .call_fn_with_options::<Dynamic>(options, &mut scope.variables, &scope.library, name, args)
            .map_err(guest_error)
    }
}

impl Engine for RhaiEngine {
    type Code = AST;
    type Scope = RhaiScope;
    type Value = Dynamic;
    type NativeModule = Module;

    fn create_scope(&self) -> RhaiScope {
        RhaiScope::new()
    }

    fn compile(&self, source: &str, origin: &str) -> Result<AST> {
        let mut ast = self.engine.compile(source).map_err(|e| HostError::Compile {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;
        ast.set_source(origin);
        Ok(ast)
    }

    fn execute(&self, code: &AST, scope: &mut RhaiScope) -> Result<Dynamic> {
        // Earlier definitions stay callable; the new code's functions win.
        let program = scope.library.merge(code);
        let value = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope.variables, &program)
            .map_err(guest_error)?;
        scope.library.combine(code.clone_functions_only());
        Ok(value)
    }

    fn get_variable(&self, scope: &RhaiScope, name: &str) -> Option<Dynamic> {
        scope.variables.get_value::<Dynamic>(name)
    }

    fn set_variable(&self, scope: &mut RhaiScope, name: &str, value: Dynamic) -> Result<()> {
        if scope.variables.is_constant(name) == Some(true) {
            return Err(HostError::Runtime {
                kind: "TypeError".to_string(),
                message: format!("cannot assign to constant '{}'", name),
            });
        }
        scope.variables.set_or_push(name, value);
        Ok(())
    }

    fn get_member(&self, target: &Dynamic, name: &str) -> Result<Dynamic> {
        target
            .read_lock::<Map>()
            .and_then(|map| map.get(name).cloned())
            .ok_or_else(|| HostError::MemberNotFound {
                member: name.to_string(),
            })
    }

    fn set_member(&self, target: &mut Dynamic, name: &str, value: Dynamic) -> Result<()> {
        let type_name = target.type_name();
        match target.write_lock::<Map>() {
            Some(mut map) => {
                map.insert(name.into(), value);
                Ok(())
            }
            None => Err(HostError::Runtime {
                kind: "TypeError".to_string(),
                message: format!("cannot set member '{}' on {}", name, type_name),
            }),
        }
    }

    fn invoke_member(
        &self,
        scope: &mut RhaiScope,
        target: &mut Dynamic,
        name: &str,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic> {
        let member = target
            .read_lock::<Map>()
            .and_then(|map| map.get(name).cloned());

        match member {
            Some(value) if value.is::<FnPtr>() => {
                let method = value.cast::<FnPtr>();
                let mut call_args: Vec<Dynamic> = method.curry().to_vec();
                call_args.extend(args);
                self.call_with_this(scope, target, method.fn_name(), call_args)
            }
            Some(value) => Err(HostError::Runtime {
                kind: "TypeError".to_string(),
                message: format!("member '{}' is a {}, not a function", name, value.type_name()),
            }),
            // A script function taking the object as `this`.
            None if scope.has_function(name, args.len()) => {
                self.call_with_this(scope, target, name, args)
            }
            None => Err(HostError::MemberNotFound {
                member: name.to_string(),
            }),
        }
    }

    fn call_function(
        &self,
        scope: &mut RhaiScope,
        name: &str,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic> {
        if let Some(function) = scope
            .variables
            .get_value::<Dynamic>(name)
            .and_then(|value| value.try_cast::<FnPtr>())
        {
            return function
                .call::<Dynamic>(&self.engine, &scope.library, args)
                .map_err(guest_error);
        }

        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        self.engine
            .call_fn_with_options::<Dynamic>(options, &mut scope.variables, &scope.library, name, args)
            .map_err(guest_error)
    }

    fn create_instance(
        &self,
        scope: &mut RhaiScope,
        class_name: &str,
        class: &Dynamic,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic> {
        if let Some(constructor) = class.clone().try_cast::<FnPtr>() {
            return constructor
                .call::<Dynamic>(&self.engine, &scope.library, args)
                .map_err(guest_error);
        }

        if class.is::<Map>() {
            let mut instance = class.flatten_clone();
            let has_init = instance
                .read_lock::<Map>()
                .map_or(false, |map| map.contains_key(INIT_MEMBER));
            if has_init {
                self.invoke_member(scope, &mut instance, INIT_MEMBER, args)?;
            } else if !args.is_empty() {
                return Err(HostError::Runtime {
                    kind: "TypeError".to_string(),
                    message: format!("{}() takes no arguments", class_name),
                });
            }
            return Ok(instance);
        }

        Err(HostError::NotInstantiable(class_name.to_string()))
    }

    fn search_paths(&self) -> Vec<String> {
        self.imports.search_paths.borrow().clone()
    }

    fn set_search_paths(&self, paths: Vec<String>) {
        self.imports.set_search_paths(paths);
    }

    fn add_builtin_module(&self, name: &str) {
        self.imports
            .builtin_modules
            .borrow_mut()
            .insert(name.trim().to_string());
    }

    fn load_native_module(&self, name: &str, module: Module) {
        let mut module = module;
        module.build_index();
        self.imports
            .native_modules
            .borrow_mut()
            .insert(name.trim().to_string(), module.into());
    }
}

/// Typed access for rhai guest objects.
impl GuestObject<RhaiEngine> {
    pub fn get_as<T: Clone + 'static>(&self, name: &str) -> Result<T> {
        cast(self.get_member(name)?)
    }

    pub fn invoke_as<T: Clone + 'static>(&mut self, name: &str, args: Vec<Dynamic>) -> Result<T> {
        cast(self.invoke_member(name, args)?)
    }

    /// [`MemberAccess::invoke_member`] without regard to ASCII case. An exact
    /// match still wins over one that differs only in case.
    pub fn invoke_member_ignore_case(&mut self, name: &str, args: Vec<Dynamic>) -> Result<Dynamic> {
        let member = self
            .member_ignoring_case(name, args.len())
            .unwrap_or_else(|| name.to_string());
        self.invoke_member(&member, args)
    }

    fn member_ignoring_case(&self, name: &str, arity: usize) -> Option<String> {
        let keys: Vec<String> = self
            .instance()
            .read_lock::<Map>()
            .map(|map| map.keys().map(|k| k.to_string()).collect())
            .unwrap_or_default();
        let scope = self.scope().borrow();
        if keys.iter().any(|k| k == name) || scope.has_function(name, arity) {
            return None;
        }

        let found = keys.into_iter().find(|k| k.eq_ignore_ascii_case(name)).or_else(|| {
            scope
                .library
                .iter_functions()
                .find(|f| f.params.len() == arity && f.name.eq_ignore_ascii_case(name))
                .map(|f| f.name.to_string())
        });
        found
    }
}

/// Convert a guest value into a Rust type.
pub fn cast<T: Clone + 'static>(value: Dynamic) -> Result<T> {
    let type_name = value.type_name();
    value.try_cast::<T>().ok_or_else(|| HostError::Runtime {
        kind: "TypeError".to_string(),
        message: format!(
            "cannot convert {} to {}",
            type_name,
            std::any::type_name::<T>()
        ),
    })
}

/// Carry a host error through rhai. [`guest_error`] recovers it.
pub(crate) fn host_error(err: HostError) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorSystem(err.to_string(), Box::new(err)))
}

/// Map a rhai error into the host's error type.
pub(crate) fn guest_error(err: Box<EvalAltResult>) -> HostError {
    let message = err.to_string();
    match *err {
        EvalAltResult::ErrorSystem(_, inner) => match inner.downcast::<HostError>() {
            Ok(host) => *host,
            Err(other) => HostError::Runtime {
                kind: "SystemError".to_string(),
                message: other.to_string(),
            },
        },
        EvalAltResult::ErrorParsing(..) => HostError::Compile {
            origin: "<guest>".to_string(),
            message,
        },
        EvalAltResult::ErrorInModule(module, inner, _) => match guest_error(inner) {
            HostError::Compile { message, .. } => HostError::Compile {
                origin: module,
                message,
            },
            HostError::Runtime { kind, .. } => HostError::Runtime { kind, message },
            other => other,
        },
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => match guest_error(inner) {
            HostError::Runtime { kind, .. } => HostError::Runtime { kind, message },
            other => other,
        },
        other => HostError::Runtime {
            kind: guest_kind(&other).to_string(),
            message,
        },
    }
}

fn guest_kind(err: &EvalAltResult) -> &'static str {
    match err {
        EvalAltResult::ErrorArithmetic(..) => "ArithmeticError",
        EvalAltResult::ErrorModuleNotFound(..) => "ModuleNotFound",
        EvalAltResult::ErrorFunctionNotFound(..) => "FunctionNotFound",
        EvalAltResult::ErrorVariableNotFound(..) => "VariableNotFound",
        EvalAltResult::ErrorPropertyNotFound(..) => "PropertyNotFound",
        EvalAltResult::ErrorMismatchDataType(..) | EvalAltResult::ErrorMismatchOutputType(..) => {
            "TypeError"
        }
        EvalAltResult::ErrorIndexNotFound(..)
        | EvalAltResult::ErrorArrayBounds(..)
        | EvalAltResult::ErrorStringBounds(..) => "IndexError",
        EvalAltResult::ErrorTooManyOperations(..)
        | EvalAltResult::ErrorStackOverflow(..)
        | EvalAltResult::ErrorDataTooLarge(..) => "LimitError",
        _ => "RuntimeError",
    }
}
