//! Pluggable module resolution.
//!
//! Guest `import` statements are answered by an ordered chain of resolvers
//! before the guest language's own import mechanism gets a chance:
//!
//! ```text
//! import "pkg.util" as util;
//!      ↓
//! 1. Built-in / native module?   → native import
//! 2. Walk segments: pkg, pkg/util (package before module at each step)
//! 3. Resolver chain, first match → module loader compiles and runs it
//! 4. Nobody matched              → native import (its failure propagates)
//! ```
//!
//! ### Key Components
//!
//! - **[`ImportResolver`]**: Trait for a source of module and script text
//! - **[`ResolverChain`]**: Ordered resolvers, first match wins
//! - **[`ModulePath`]**: Dotted/physical module names and package units
//! - **[`RoutingToken`]**: `<resolver-id>|<path>`, keeps a package subtree
//!   inside the resolver that served its root
//! - **[`MemoryResolver`]** / **[`FileSystemResolver`]**: Ready-made resolvers
//!
//! The interceptor and the module loader themselves belong to the language
//! adapter, see [`crate::engine::rhai`].

pub mod chain;
pub mod filesystem;
pub mod memory;
pub mod module_path;
pub mod resolver;

pub use chain::{ResolverChain, SharedResolverChain, RESOLVER_PATH_MARKER};
pub use filesystem::FileSystemResolver;
pub use memory::MemoryResolver;
pub use module_path::{ImportRequest, ModulePath, RoutingToken, PACKAGE_INIT};
pub use resolver::{ImportResolver, ResolvedType};
