//! Turns resolver source text into a guest module.

use std::rc::Rc;

use std::collections::HashSet;

use rhai::{Array, Dynamic, Engine, EvalAltResult, Module, ParseError, Position, Scope};
use tracing::debug;
use uuid::Uuid;

use crate::import::module_path::{ModulePath, RoutingToken};
use crate::import::resolver::{ImportResolver, ResolvedType};
use crate::util::normalize_line_endings;

pub const NAME_FIELD: &str = "__name__";
pub const LOADER_FIELD: &str = "__loader__";
pub const PACKAGE_FIELD: &str = "__package__";
pub const PATH_FIELD: &str = "__path__";

/// Statement appended to every module body. Marks each variable left in the
/// module scope for export.
pub const EXPORT_SCOPE_KEYWORD: &str = "__export_module_scope__";

/// Teach `engine` the statement the loader appends to module bodies.
pub fn register_export_syntax(engine: &mut Engine) -> Result<(), ParseError> {
    engine.register_custom_syntax([EXPORT_SCOPE_KEYWORD], false, |context, _| {
        let names: HashSet<String> = context
            .scope()
            .iter()
            .map(|(name, _, _)| name.to_string())
            .collect();
        for name in names {
            context.scope_mut().set_alias(name, "");
        }
        Ok(Dynamic::UNIT)
    })?;
    Ok(())
}

/// Value of a module's `__loader__`: which resolver supplied which unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderRef {
    pub resolver_id: Uuid,
    pub path: String,
}

/// Compiles and initializes modules out of resolver source text.
///
/// The module body runs once against a fresh scope that already holds the
/// metadata fields. Every top-level variable left in that scope becomes a
/// module variable, every script function a module function, and every
/// module the body imported a sub-module that its functions keep seeing.
///
/// The engine must have gone through [`register_export_syntax`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ModuleLoader;

impl ModuleLoader {
    pub fn new() -> Self {
        ModuleLoader
    }

    /// Load `path` from `resolver`.
    ///
    /// `Ok(None)` means the resolver had no source after all; the caller
    /// falls through as if nothing matched. Compile and runtime failures of
    /// the module body propagate.
    pub fn load(
        &self,
        engine: &Engine,
        resolver: &Rc<dyn ImportResolver>,
        path: &ModulePath,
        kind: ResolvedType,
    ) -> Result<Option<Module>, Box<EvalAltResult>> {
        let unit = match kind {
            ResolvedType::Package => path.init_path(),
            ResolvedType::Module => path.physical(),
            ResolvedType::None => return Ok(None),
        };

        // An empty `__init__` is still a package; an empty module is not a module.
        let source = match resolver.script_source(&unit) {
            Some(source) if kind == ResolvedType::Package || !source.trim().is_empty() => source,
            _ => {
                debug!(resolver = %resolver.id(), unit = %unit, "resolver returned no source");
                return Ok(None);
            }
        };

        let dotted = path.dotted();
        let identity = RoutingToken::new(resolver.id(), unit.clone());

        let body = engine
            .compile(&normalize_line_endings(&source))
            .map_err(|e| in_module(&dotted, parse_error(e)))?;
        let trailer = engine
            .compile(format!("{};", EXPORT_SCOPE_KEYWORD))
            .map_err(|e| in_module(&dotted, parse_error(e)))?;
        let mut ast = body.merge(&trailer);
        ast.set_source(identity.to_string());

        let mut scope = Scope::new();
        scope.push_constant(NAME_FIELD, path.last().to_string());
        scope.push_constant(
            LOADER_FIELD,
            LoaderRef {
                resolver_id: resolver.id(),
                path: unit,
            },
        );
        if kind == ResolvedType::Package {
            let token = RoutingToken::new(resolver.id(), path.physical()).to_string();
            let search_path: Array = vec![Dynamic::from(token)];
            scope.push_constant(PACKAGE_FIELD, dotted.clone());
            scope.push_constant(PATH_FIELD, search_path);
        } else {
            scope.push_constant(PACKAGE_FIELD, path.parent_dotted());
        }

        debug!(resolver = %resolver.id(), module = %dotted, ?kind, "executing module body");
        let mut module =
            Module::eval_ast_as_new(scope, &ast, engine).map_err(|e| in_module(&dotted, e))?;
        module.set_id(dotted.as_str());
        module.build_index();

        Ok(Some(module))
    }
}

fn parse_error(err: ParseError) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorParsing(*err.0, err.1))
}

fn in_module(name: &str, err: Box<EvalAltResult>) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorInModule(
        name.to_string(),
        err,
        Position::NONE,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::memory::MemoryResolver;

    fn resolver(entries: &[(&str, &str)]) -> Rc<dyn ImportResolver> {
        let mut resolver = MemoryResolver::new();
        for (path, source) in entries {
            resolver.insert(path, *source);
        }
        Rc::new(resolver)
    }

    fn engine() -> Engine {
        let mut engine = Engine::new();
        register_export_syntax(&mut engine).unwrap();
        engine
    }

    #[test]
    fn module_metadata_is_set() {
        let engine = engine();
        let resolver = resolver(&[("pkg/tools", "let answer = 42;")]);
        let path = ModulePath::parse("pkg.tools").unwrap();

        let module = ModuleLoader::new()
            .load(&engine, &resolver, &path, ResolvedType::Module)
            .unwrap()
            .unwrap();

        assert_eq!(module.get_var_value::<String>(NAME_FIELD).unwrap(), "tools");
        assert_eq!(module.get_var_value::<String>(PACKAGE_FIELD).unwrap(), "pkg");
        assert_eq!(module.get_var_value::<rhai::INT>("answer").unwrap(), 42);
        assert!(module.get_var(PATH_FIELD).is_none());

        let loader = module.get_var_value::<LoaderRef>(LOADER_FIELD).unwrap();
        assert_eq!(loader.resolver_id, resolver.id());
        assert_eq!(loader.path, "pkg/tools");
    }

    #[test]
    fn package_gets_routing_token() {
        let engine = engine();
        let resolver = resolver(&[("pkg/__init__", "let ready = true;")]);
        let path = ModulePath::parse("pkg").unwrap();

        let module = ModuleLoader::new()
            .load(&engine, &resolver, &path, ResolvedType::Package)
            .unwrap()
            .unwrap();

        let search_path = module.get_var_value::<Array>(PATH_FIELD).unwrap();
        assert_eq!(search_path.len(), 1);
        let token = search_path[0].clone().into_string().unwrap();
        assert_eq!(token, format!("{}|pkg", resolver.id()));
        assert_eq!(module.get_var_value::<String>(PACKAGE_FIELD).unwrap(), "pkg");
    }

    #[test]
    fn missing_source_is_not_an_error() {
        let engine = engine();
        let resolver = resolver(&[]);
        let path = ModulePath::parse("ghost").unwrap();

        let loaded = ModuleLoader::new()
            .load(&engine, &resolver, &path, ResolvedType::Module)
            .unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn body_sees_metadata_while_running() {
        let engine = engine();
        let resolver = resolver(&[("greeting", "let me = __name__;")]);
        let path = ModulePath::parse("greeting").unwrap();

        let module = ModuleLoader::new()
            .load(&engine, &resolver, &path, ResolvedType::Module)
            .unwrap()
            .unwrap();
        assert_eq!(module.get_var_value::<String>("me").unwrap(), "greeting");
    }

    #[test]
    fn runtime_error_in_body_propagates() {
        let engine = engine();
        let resolver = resolver(&[("broken", "let x = 1 / 0;")]);
        let path = ModulePath::parse("broken").unwrap();

        let err = ModuleLoader::new()
            .load(&engine, &resolver, &path, ResolvedType::Module)
            .unwrap_err();
        assert!(matches!(*err, EvalAltResult::ErrorInModule(..)));
    }
}
