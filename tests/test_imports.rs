extern crate just_host;

use std::cell::Cell;
use std::fs;
use std::rc::Rc;

use just_host::engine::rhai::{LoaderRef, RhaiLanguage};
use just_host::import::RESOLVER_PATH_MARKER;
use just_host::{Host, HostError, ImportResolver, MemoryResolver, ModulePath, ResolvedType};
use rhai::{Array, Dynamic, INT};
use tempfile::TempDir;
use uuid::Uuid;

/// Helper to build a host with resolvers registered in the given order
fn host_with(resolvers: Vec<MemoryResolver>) -> Host<RhaiLanguage> {
    let mut host = Host::new(RhaiLanguage::new()).unwrap();
    for resolver in resolvers {
        host.add_import_resolver(Rc::new(resolver)).unwrap();
    }
    host
}

/// Helper to build a host around a single custom resolver
fn host_with_resolver(resolver: Rc<dyn ImportResolver>) -> Host<RhaiLanguage> {
    let mut host = Host::new(RhaiLanguage::new()).unwrap();
    host.add_import_resolver(resolver).unwrap();
    host
}

fn memory(entries: &[(&str, &str)]) -> MemoryResolver {
    let mut resolver = MemoryResolver::new();
    for (path, source) in entries {
        resolver.insert(path, *source);
    }
    resolver
}

fn run(host: &mut Host<RhaiLanguage>, code: &str) -> Result<Dynamic, HostError> {
    host.default_scope_mut().execute(code)
}

fn int(value: Dynamic) -> INT {
    value.as_int().unwrap()
}

fn string(value: Dynamic) -> String {
    value.into_string().unwrap()
}

/// Resolver that counts how often it hands out source text
struct CountingResolver {
    inner: MemoryResolver,
    reads: Cell<usize>,
}

impl ImportResolver for CountingResolver {
    fn id(&self) -> Uuid {
        self.inner.id()
    }

    fn module_information(&self, path: &ModulePath) -> ResolvedType {
        self.inner.module_information(path)
    }

    fn script_source(&self, path: &str) -> Option<String> {
        self.reads.set(self.reads.get() + 1);
        self.inner.script_source(path)
    }
}

/// Resolver that claims every module but never has source for it
struct EmptyResolver {
    id: Uuid,
}

impl ImportResolver for EmptyResolver {
    fn id(&self) -> Uuid {
        self.id
    }

    fn module_information(&self, _path: &ModulePath) -> ResolvedType {
        ResolvedType::Module
    }

    fn script_source(&self, _path: &str) -> Option<String> {
        None
    }
}

// ── Basic resolution ─────────────────────────────────────────────────

#[test]
fn test_import_function_from_resolver() {
    let mut host = host_with(vec![memory(&[("mathlib", "fn add(x, y) { x + y }")])]);

    let result = run(&mut host, r#"import "mathlib" as mathlib; mathlib::add(2, 3)"#).unwrap();
    assert_eq!(int(result), 5);
}

#[test]
fn test_module_variable_is_exported() {
    let mut host = host_with(vec![memory(&[("mod_b", "let x = 42;")])]);

    let result = run(&mut host, r#"import "mod_b" as b; b::x"#).unwrap();
    assert_eq!(int(result), 42);
}

#[test]
fn test_first_registered_resolver_wins() {
    let mut host = host_with(vec![
        memory(&[("shared", r#"let origin = "first";"#)]),
        memory(&[("shared", r#"let origin = "second";"#)]),
    ]);

    let result = run(&mut host, r#"import "shared" as s; s::origin"#).unwrap();
    assert_eq!(string(result), "first");
}

#[test]
fn test_package_wins_over_module_of_same_name() {
    let mut host = host_with(vec![memory(&[
        ("pkg/__init__", r#"let kind = "package";"#),
        ("pkg", r#"let kind = "module";"#),
    ])]);

    let result = run(&mut host, r#"import "pkg" as p; p::kind"#).unwrap();
    assert_eq!(string(result), "package");
}

#[test]
fn test_dotted_and_slashed_names_are_the_same_module() {
    let mut host = host_with(vec![memory(&[
        ("tools/__init__", ""),
        ("tools/text", r#"fn shout(s) { s.to_upper() }"#),
    ])]);

    let dotted = run(&mut host, r#"import "tools.text" as t; t::shout("hi")"#).unwrap();
    let slashed = run(&mut host, r#"import "tools/text" as t; t::shout("yo")"#).unwrap();
    assert_eq!(string(dotted), "HI");
    assert_eq!(string(slashed), "YO");
    assert_eq!(
        host.engine().loaded_modules(),
        vec!["tools".to_string(), "tools.text".to_string()]
    );
}

// ── Package ownership ────────────────────────────────────────────────

#[test]
fn test_package_subtree_stays_with_its_resolver() {
    // Registered first, but only knows a module that happens to share the path.
    let stray = memory(&[("pkg/util", r#"let origin = "stray";"#)]);
    let owner = memory(&[
        ("pkg/__init__", r#"let origin = "owner";"#),
        ("pkg/util", r#"let origin = "owner";"#),
    ]);
    let mut host = host_with(vec![stray, owner]);

    let result = run(&mut host, r#"import "pkg.util" as u; u::origin"#).unwrap();
    assert_eq!(string(result), "owner");
}

#[test]
fn test_package_path_is_a_routing_token() {
    let resolver = memory(&[("pkg/__init__", "let ready = true;")]);
    let id = resolver.id();
    let host = host_with(vec![resolver]);

    host.engine().import_module("pkg").unwrap();
    let package = host.engine().module("pkg").unwrap();

    let search_path = package.get_var_value::<Array>("__path__").unwrap();
    assert_eq!(search_path.len(), 1);
    let token = search_path[0].clone().into_string().unwrap();
    assert_eq!(token, format!("{}|pkg", id));

    let (routed, path) = host.resolvers().borrow().resolve_token(&token).unwrap();
    assert_eq!(routed.id(), id);
    assert_eq!(path.dotted(), "pkg");
}

#[test]
fn test_module_metadata() {
    let resolver = memory(&[
        ("pkg/__init__", ""),
        ("pkg/tools", "let answer = 42;"),
    ]);
    let id = resolver.id();
    let host = host_with(vec![resolver]);

    let module = host.engine().import_module("pkg.tools").unwrap();
    assert_eq!(module.get_var_value::<String>("__name__").unwrap(), "tools");
    assert_eq!(module.get_var_value::<String>("__package__").unwrap(), "pkg");
    assert!(module.get_var("__path__").is_none());

    let loader = module.get_var_value::<LoaderRef>("__loader__").unwrap();
    assert_eq!(loader.resolver_id, id);
    assert_eq!(loader.path, "pkg/tools");

    let package = host.engine().module("pkg").unwrap();
    assert_eq!(package.get_var_value::<String>("__name__").unwrap(), "pkg");
    assert_eq!(package.get_var_value::<String>("__package__").unwrap(), "pkg");
}

// ── Relative imports ─────────────────────────────────────────────────

#[test]
fn test_relative_import_inside_package() {
    let mut host = host_with(vec![memory(&[
        ("pkg/__init__", ""),
        ("pkg/helpers", "fn triple(x) { x * 3 }"),
        ("pkg/calc", r#"import ".helpers" as h; let nine = h::triple(3);"#),
        ("pkg/sub/__init__", ""),
        ("pkg/sub/deep", r#"import "..helpers" as h; let six = h::triple(2);"#),
    ])]);

    let nine = run(&mut host, r#"import "pkg.calc" as c; c::nine"#).unwrap();
    assert_eq!(int(nine), 9);

    let six = run(&mut host, r#"import "pkg.sub.deep" as d; d::six"#).unwrap();
    assert_eq!(int(six), 6);
}

#[test]
fn test_relative_import_outside_package_fails() {
    let mut host = host_with(vec![memory(&[("helpers", "let a = 1;")])]);

    let err = run(&mut host, r#"import ".helpers" as h; h::a"#).unwrap_err();
    assert_eq!(err.guest_kind(), Some("ImportError"));
    assert!(err.to_string().contains("no known parent package"));
}

#[test]
fn test_relative_import_beyond_top_level_fails() {
    let mut host = host_with(vec![memory(&[
        ("pkg/__init__", ""),
        ("pkg/escape", r#"import "...elsewhere" as e;"#),
    ])]);

    let err = run(&mut host, r#"import "pkg.escape" as e;"#).unwrap_err();
    assert_eq!(err.guest_kind(), Some("ImportError"));
    assert!(err.to_string().contains("beyond top-level package"));
}

#[test]
fn test_module_functions_keep_module_imports() {
    let mut host = host_with(vec![memory(&[
        ("helper", "fn two() { 2 }"),
        ("lib", r#"import "helper" as h; fn four() { h::two() * 2 }"#),
    ])]);

    let four = run(&mut host, r#"import "lib" as lib; lib::four()"#).unwrap();
    assert_eq!(int(four), 4);
}

#[test]
fn test_package_init_calls_submodules_from_functions() {
    let mut host = host_with(vec![memory(&[
        (
            "shapes/__init__",
            r#"
            import ".square" as square;
            import ".circle" as circle;
            fn total(side, radius) { square::area(side) + circle::area(radius) }
            let kinds = 2;
            "#,
        ),
        ("shapes/square", "fn area(side) { side * side }"),
        ("shapes/circle", "fn area(r) { 3 * r * r }"),
    ])]);

    let total = run(&mut host, r#"import "shapes" as s; s::total(2, 1)"#).unwrap();
    assert_eq!(int(total), 7);

    let kinds = run(&mut host, r#"import "shapes" as s; s::kinds"#).unwrap();
    assert_eq!(int(kinds), 2);
}

// ── Fallback to native import ────────────────────────────────────────

#[test]
fn test_unmatched_import_uses_native_import() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("native_only.rhai"), r#"export const origin = "disk";"#).unwrap();

    let mut host = host_with(vec![memory(&[("other", "let a = 1;")])]);
    host.add_search_path(dir.path().to_str().unwrap()).unwrap();

    let result = run(&mut host, r#"import "native_only" as n; n::origin"#).unwrap();
    assert_eq!(string(result), "disk");
}

#[test]
fn test_native_failure_propagates() {
    let mut host = host_with(vec![memory(&[("other", "let a = 1;")])]);

    let err = run(&mut host, r#"import "missing" as m;"#).unwrap_err();
    assert_eq!(err.guest_kind(), Some("ModuleNotFound"));
}

#[test]
fn test_resolver_without_source_falls_through() {
    let mut host = host_with_resolver(Rc::new(EmptyResolver { id: Uuid::new_v4() }));

    let err = run(&mut host, r#"import "anything" as a;"#).unwrap_err();
    assert_eq!(err.guest_kind(), Some("ModuleNotFound"));
    assert!(host.engine().loaded_modules().is_empty());
}

#[test]
fn test_builtin_names_bypass_resolvers() {
    let mut host = host_with(vec![memory(&[("reserved", "let a = 1;")])]);
    host.add_builtin_module("reserved").unwrap();

    let err = run(&mut host, r#"import "reserved" as r;"#).unwrap_err();
    assert_eq!(err.guest_kind(), Some("ModuleNotFound"));
}

#[test]
fn test_native_module_loaded_once() {
    let mut host = host_with(vec![memory(&[("clock", "let ticks = 0;")])]);

    let mut native = rhai::Module::new();
    native.set_var("ticks", 99 as INT);
    assert!(host.load_native_module("clock", native).unwrap());
    assert!(!host.load_native_module("clock", rhai::Module::new()).unwrap());

    // The native module shadows the resolver's module of the same name.
    let result = run(&mut host, r#"import "clock" as c; c::ticks"#).unwrap();
    assert_eq!(int(result), 99);
}

#[test]
fn test_removing_last_resolver_stops_interception() {
    let resolver = memory(&[("mathlib", "fn add(x, y) { x + y }")]);
    let id = resolver.id();
    let mut host = host_with(vec![resolver]);
    assert!(host.search_paths().iter().any(|p| p == RESOLVER_PATH_MARKER));

    assert!(host.remove_import_resolver(id));
    assert!(!host.search_paths().iter().any(|p| p == RESOLVER_PATH_MARKER));

    let err = run(&mut host, r#"import "mathlib" as m;"#).unwrap_err();
    assert_eq!(err.guest_kind(), Some("ModuleNotFound"));
}

// ── Module registry ──────────────────────────────────────────────────

#[test]
fn test_module_body_runs_once() {
    let resolver = Rc::new(CountingResolver {
        inner: memory(&[("counter", "let value = 1;")]),
        reads: Cell::new(0),
    });
    let mut host = host_with_resolver(resolver.clone());

    run(&mut host, r#"import "counter" as c; c::value"#).unwrap();
    run(&mut host, r#"import "counter" as c; c::value"#).unwrap();
    host.new_scope().execute(r#"import "counter" as c;"#).unwrap();
    assert_eq!(resolver.reads.get(), 1);
    assert_eq!(host.engine().loaded_modules(), vec!["counter".to_string()]);

    assert!(host.engine().unload_module("counter"));
    run(&mut host, r#"import "counter" as c;"#).unwrap();
    assert_eq!(resolver.reads.get(), 2);
}

#[test]
fn test_native_file_module_body_runs_once() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("counter.rhai"), "bump(); export const v = 1;").unwrap();

    let runs = Rc::new(Cell::new(0));
    let counted = runs.clone();
    let language = RhaiLanguage::with_setup(move |engine| {
        let counted = counted.clone();
        engine.register_fn("bump", move || counted.set(counted.get() + 1));
    });
    let mut host = Host::new(language).unwrap();
    host.add_import_resolver(Rc::new(memory(&[("other", "let a = 1;")])))
        .unwrap();
    host.add_search_path(dir.path().to_str().unwrap()).unwrap();

    run(&mut host, r#"import "counter" as c; c::v"#).unwrap();
    run(&mut host, r#"import "counter" as c; c::v"#).unwrap();
    assert_eq!(runs.get(), 1);

    // Adding another root keeps what the first one has cached.
    let other = TempDir::new().unwrap();
    host.add_search_path(other.path().to_str().unwrap()).unwrap();
    run(&mut host, r#"import "counter" as c; c::v"#).unwrap();
    assert_eq!(runs.get(), 1);
}

#[test]
fn test_failed_module_is_not_registered() {
    let mut host = host_with(vec![memory(&[("broken", "let x = 1 / 0;")])]);

    let err = run(&mut host, r#"import "broken" as b;"#).unwrap_err();
    assert_eq!(err.guest_kind(), Some("ArithmeticError"));
    assert!(host.engine().loaded_modules().is_empty());

    // Still broken the second time, so the body ran again.
    let again = run(&mut host, r#"import "broken" as b;"#).unwrap_err();
    assert_eq!(again.guest_kind(), Some("ArithmeticError"));
}

#[test]
fn test_syntax_error_in_module() {
    let mut host = host_with(vec![memory(&[("bad", "let = ;")])]);

    match run(&mut host, r#"import "bad" as b;"#).unwrap_err() {
        HostError::Compile { origin, .. } => assert_eq!(origin, "bad"),
        other => panic!("expected a compile error, got {:?}", other),
    }
}

#[test]
fn test_circular_import_is_reported() {
    let mut host = host_with(vec![memory(&[
        ("ping", r#"import "pong" as p;"#),
        ("pong", r#"import "ping" as p;"#),
    ])]);

    let err = run(&mut host, r#"import "ping" as p;"#).unwrap_err();
    assert_eq!(err.guest_kind(), Some("ImportError"));
    assert!(host.engine().loaded_modules().is_empty());
}

// ── Interceptor queries ──────────────────────────────────────────────

#[test]
fn test_find_module_requires_resolvers() {
    let host = Host::new(RhaiLanguage::new()).unwrap();
    assert!(matches!(
        host.engine().interceptor().find_module("anything"),
        Err(HostError::Configuration(_))
    ));
}

#[test]
fn test_interceptor_queries() {
    let host = host_with(vec![memory(&[
        ("pkg/__init__", "let a = 1;"),
        ("pkg/leaf", "let b = 2;"),
    ])]);
    let interceptor = host.engine().interceptor();

    let (_, kind) = interceptor.find_module("pkg.leaf").unwrap().unwrap();
    assert_eq!(kind, ResolvedType::Module);
    assert!(interceptor.find_module("nowhere").unwrap().is_none());

    assert!(interceptor.is_package("pkg").unwrap());
    assert!(!interceptor.is_package("pkg.leaf").unwrap());

    assert_eq!(interceptor.get_source("pkg").unwrap().unwrap(), "let a = 1;");
    assert_eq!(interceptor.get_source("pkg/leaf").unwrap().unwrap(), "let b = 2;");
    assert!(interceptor.get_source("nowhere").unwrap().is_none());
}
