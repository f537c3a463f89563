//! Execution scopes and guest object handles.
//!
//! A [`ScriptScope`] is one isolated guest context created by the host. Every
//! scope shares the host's engine and resolver chain but has its own
//! variables and caches. Objects instantiated from a scope are handed out as
//! [`GuestObject`]s that keep calling back into that scope.

pub mod guest_object;
pub mod script_scope;

pub use guest_object::{DynamicMembers, GuestObject, MemberAccess};
pub use script_scope::ScriptScope;
