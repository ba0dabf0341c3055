//! Outlets that mount nothing and print what they would do.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use waypost::outlet::{ComponentHandle, MountRequest, Outlet};

/// Mount/unmount log shared by every outlet of one simulation.
#[derive(Debug, Clone, Default)]
pub struct Operations(Arc<Mutex<Vec<String>>>);

impl Operations {
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }
}

pub struct HeadlessOutlet {
    slot: String,
    templates: Arc<BTreeMap<String, Vec<String>>>,
    ops: Operations,
}

impl HeadlessOutlet {
    pub fn new(slot: impl Into<String>, templates: Arc<BTreeMap<String, Vec<String>>>, ops: Operations) -> Self {
        Self {
            slot: slot.into(),
            templates,
            ops,
        }
    }
}

impl Outlet for HeadlessOutlet {
    fn mount(&self, request: MountRequest) -> anyhow::Result<ComponentHandle> {
        let route = request.route.snapshot();
        self.ops.0.lock().push(format!(
            "mount   {} into '{}' (params {:?})",
            request.component, self.slot, route.params
        ));
        if let Some(slots) = self.templates.get(&request.component) {
            for slot in slots {
                request.slots.register_outlet(
                    slot.clone(),
                    Arc::new(HeadlessOutlet::new(slot.clone(), self.templates.clone(), self.ops.clone())),
                )?;
            }
        }
        Ok(ComponentHandle::bare(request.component))
    }

    fn unmount(&self, component: &ComponentHandle) {
        self.ops
            .0
            .lock()
            .push(format!("unmount {} from '{}'", component.component(), self.slot));
    }
}
