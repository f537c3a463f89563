//! Host-side handles on guest objects.

use std::cell::RefCell;
use std::rc::Rc;

use crate::engine::Engine;
use crate::error::{HostError, Result};

/// Checked member access on a guest object.
pub trait MemberAccess {
    type Value;

    fn get_member(&self, name: &str) -> Result<Self::Value>;

    fn set_member(&mut self, name: &str, value: Self::Value) -> Result<()>;

    /// Call a method. A missing member or a guest-side failure comes back as
    /// [`HostError::Invocation`].
    fn invoke_member(&mut self, name: &str, args: Vec<Self::Value>) -> Result<Self::Value>;
}

/// Lenient member access for call sites that only care whether it worked.
///
/// Every method goes through [`MemberAccess`] on the same object, so both
/// styles see and cause the same effects.
pub trait DynamicMembers: MemberAccess {
    fn try_get_member(&self, name: &str) -> Option<Self::Value> {
        self.get_member(name).ok()
    }

    fn try_set_member(&mut self, name: &str, value: Self::Value) -> bool {
        self.set_member(name, value).is_ok()
    }

    fn try_invoke_member(&mut self, name: &str, args: Vec<Self::Value>) -> Option<Self::Value> {
        self.invoke_member(name, args).ok()
    }
}

impl<T: MemberAccess + ?Sized> DynamicMembers for T {}

/// A guest object bound to the scope it was created in.
///
/// Methods run against that scope, so functions and variables defined there
/// stay visible to them.
pub struct GuestObject<E: Engine> {
    engine: Rc<E>,
    scope: Rc<RefCell<E::Scope>>,
    class_name: Option<String>,
    instance: E::Value,
}

impl<E: Engine> GuestObject<E> {
    pub fn new(
        engine: Rc<E>,
        scope: Rc<RefCell<E::Scope>>,
        class_name: Option<String>,
        instance: E::Value,
    ) -> Self {
        GuestObject {
            engine,
            scope,
            class_name,
            instance,
        }
    }

    /// Name of the guest type this object was instantiated from.
    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    pub fn instance(&self) -> &E::Value {
        &self.instance
    }

    pub(crate) fn scope(&self) -> &Rc<RefCell<E::Scope>> {
        &self.scope
    }

    pub fn into_instance(self) -> E::Value {
        self.instance
    }
}

impl<E: Engine> Clone for GuestObject<E> {
    fn clone(&self) -> Self {
        GuestObject {
            engine: self.engine.clone(),
            scope: self.scope.clone(),
            class_name: self.class_name.clone(),
            instance: self.instance.clone(),
        }
    }
}

impl<E: Engine> MemberAccess for GuestObject<E> {
    type Value = E::Value;

    fn get_member(&self, name: &str) -> Result<E::Value> {
        HostError::require("name", name)?;
        self.engine.get_member(&self.instance, name)
    }

    fn set_member(&mut self, name: &str, value: E::Value) -> Result<()> {
        HostError::require("name", name)?;
        self.engine.set_member(&mut self.instance, name, value)
    }

    fn invoke_member(&mut self, name: &str, args: Vec<E::Value>) -> Result<E::Value> {
        HostError::require("name", name)?;
        let mut scope = self.scope.borrow_mut();
        self.engine
            .invoke_member(&mut scope, &mut self.instance, name, args)
            .map_err(|source| HostError::Invocation {
                member: name.to_string(),
                source: Box::new(source),
            })
    }
}
