//! # just-host - Embedded Script Host
//!
//! Embeds a guest scripting language in a Rust application and takes over
//! its module imports:
//! - Pluggable import resolvers queried in registration order
//! - Packages whose whole subtree is served by the resolver that owns them
//! - Isolated execution scopes with compiled-expression caching
//! - Execute-once script bookkeeping and named precompiled scripts
//! - Checked and lenient member access on guest objects
//!
//! ## Quick Start
//!
//! ```
//! use std::rc::Rc;
//! use just_host::engine::rhai::RhaiLanguage;
//! use just_host::{Host, MemoryResolver};
//!
//! let mut host = Host::new(RhaiLanguage::new())?;
//!
//! let mut resolver = MemoryResolver::new();
//! resolver.insert("mathlib", "fn add(x, y) { x + y }");
//! host.add_import_resolver(Rc::new(resolver))?;
//!
//! let sum = host
//!     .default_scope_mut()
//!     .execute(r#"import "mathlib" as mathlib; mathlib::add(2, 3)"#)?;
//! assert_eq!(sum.as_int().unwrap(), 5);
//! # Ok::<(), just_host::HostError>(())
//! ```
//!
//! ## Import Interception
//!
//! Guest code never reads modules from disk on its own while a resolver is
//! registered. The host puts a marker entry on the engine's search path list
//! when the first resolver is added; while the marker is there, every
//! import is offered to the [`ResolverChain`] before native import runs.
//!
//! 1. **Built-in names** go straight to native import.
//! 2. **Segments** are resolved left to right. A package found on the way is
//!    loaded and from then on its resolver serves the rest of the path.
//! 3. **First match wins.** Resolvers are asked in registration order.
//! 4. **Fallback.** Nobody matched, or the resolver had no source after all:
//!    native import runs and its result, or failure, is returned as is.
//!
//! Loaded modules are kept in a registry by dotted name, so a module body
//! runs once per host.
//!
//! ## Architecture
//!
//! - **[`host`]** - The host object and its construction order
//! - **[`import`]** - Resolver trait, chain, module paths, built-in resolvers
//! - **[`engine`]** - What a guest language must provide
//!   - **[`engine::rhai`]** - The rhai adapter, interceptor and module loader
//! - **[`scope`]** - Script scopes and guest object handles
//! - **[`config`]** - TOML host configuration

#[macro_use]
extern crate lazy_static;

pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod import;
pub mod scope;
pub mod util;

pub use config::HostConfig;
pub use engine::{Engine, Language, RuntimeSettings};
pub use error::{HostError, Result};
pub use host::Host;
pub use import::{
    FileSystemResolver, ImportResolver, MemoryResolver, ModulePath, ResolvedType, ResolverChain,
};
pub use scope::{DynamicMembers, GuestObject, MemberAccess, ScriptScope};
