use crate::context::MountContext;
use crate::route::ActivatedRoute;
use crate::slot::SlotScope;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A mounted component instance as seen by the router.
#[derive(Clone)]
pub struct ComponentHandle {
    id: Uuid,
    component: String,
    instance: Arc<dyn Any + Send + Sync>,
}

impl ComponentHandle {
    pub fn new(component: impl Into<String>, instance: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            id: Uuid::new_v4(),
            component: component.into(),
            instance,
        }
    }

    /// A handle with no instance state.
    pub fn bare(component: impl Into<String>) -> Self {
        Self::new(component, Arc::new(()))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn instance(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.instance
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.instance.downcast_ref()
    }
}

impl PartialEq for ComponentHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentHandle {}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("id", &self.id)
            .field("component", &self.component)
            .finish()
    }
}

/// Everything a component needs when it is mounted.
pub struct MountRequest {
    pub component: String,
    pub route: ActivatedRoute,
    /// The component's own slots. Register child outlets here.
    pub slots: SlotScope,
    pub context: Arc<MountContext>,
}

impl fmt::Debug for MountRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountRequest")
            .field("component", &self.component)
            .field("route", &self.route)
            .field("slots", &self.slots)
            .finish()
    }
}

/// The UI-mount primitive behind a named slot.
///
/// Implementations must not call back into the router synchronously from `mount`/`unmount`.
pub trait Outlet: Send + Sync {
    fn mount(&self, request: MountRequest) -> anyhow::Result<ComponentHandle>;

    fn unmount(&self, component: &ComponentHandle);
}
