//! Typed extra context handed to every mounted component.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Type-keyed resource container (TypeMap pattern).
///
/// The router passes one shared `MountContext` to every [`Outlet::mount`](crate::outlet::Outlet::mount)
/// call, so components can reach application services without string lookups.
#[derive(Default)]
pub struct MountContext {
    resources: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MountContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource, replacing any previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, resource: T) {
        self.resources.insert(TypeId::of::<T>(), Box::new(resource));
    }

    pub fn with<T: Send + Sync + 'static>(mut self, resource: T) -> Self {
        self.insert(resource);
        self
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.resources
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.resources.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl fmt::Debug for MountContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountContext")
            .field("resource_count", &self.resources.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct ApiBase(&'static str);

    #[test]
    fn typed_lookup() {
        let ctx = MountContext::new().with(ApiBase("https://api")).with(42u32);

        assert_eq!(ctx.get::<ApiBase>(), Some(&ApiBase("https://api")));
        assert_eq!(ctx.get::<u32>(), Some(&42));
        assert!(!ctx.contains::<String>());
        assert_eq!(ctx.len(), 2);
    }
}
