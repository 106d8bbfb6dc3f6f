//! Non-owning plugin handles

use std::sync::{Arc, Weak};

use tether_plugin_api::Info;

use crate::plugin::{PluginInstance, PluginPtr};

/// Observes a plugin instance without keeping it alive
#[derive(Clone, Default)]
pub struct WeakPluginPtr {
    instance: Weak<PluginInstance>,
    info: Weak<Info>,
}

impl WeakPluginPtr {
    pub fn new(plugin: &PluginPtr) -> Self {
        match plugin.instance() {
            Some(instance) => Self {
                instance: Arc::downgrade(instance),
                info: Arc::downgrade(&instance.info),
            },
            None => Self::default(),
        }
    }

    /// Recover a shared handle, or an empty one once the instance is gone
    pub fn lock(&self) -> PluginPtr {
        // The instance is checked first; it holds the record alive.
        let Some(instance) = self.instance.upgrade() else {
            return PluginPtr::default();
        };
        if self.info.strong_count() == 0 {
            return PluginPtr::default();
        }
        PluginPtr::from_instance(instance)
    }

    pub fn is_expired(&self) -> bool {
        self.instance.strong_count() == 0 || self.info.strong_count() == 0
    }
}

impl std::fmt::Debug for WeakPluginPtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakPluginPtr")
            .field("expired", &self.is_expired())
            .finish()
    }
}
