//! Registro de instancias remotas creadas por este host.
//!
//! Sólo anota handles; no cuenta referencias ni libera nada en el hijo.
//! Sirve para diagnóstico y para vaciarse en `shutdown`.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

use bridge_core::RemoteHandle;

#[derive(Debug, Clone, Default)]
pub struct InstanceRegistry {
    entries: Arc<DashMap<RemoteHandle, Instant>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `false` si el handle ya estaba registrado.
    pub fn record(&self, handle: RemoteHandle) -> bool {
        self.entries.insert(handle, Instant::now()).is_none()
    }

    pub fn contains(&self, handle: &RemoteHandle) -> bool {
        self.entries.contains_key(handle)
    }

    pub fn forget(&self, handle: &RemoteHandle) -> bool {
        self.entries.remove(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handles ordenados por clase e id.
    pub fn handles(&self) -> Vec<RemoteHandle> {
        let mut out: Vec<RemoteHandle> = self.entries.iter().map(|e| e.key().clone()).collect();
        out.sort();
        out
    }

    pub fn by_class(&self, class_name: &str) -> Vec<RemoteHandle> {
        self.handles().into_iter().filter(|h| h.class_name == class_name).collect()
    }

    /// Vacía el registro y devuelve cuántos handles tenía.
    pub fn clear(&self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_shared_between_clones() {
        let reg = InstanceRegistry::new();
        let view = reg.clone();
        assert!(reg.record(RemoteHandle::new("Bar", "i-2")));
        assert!(reg.record(RemoteHandle::new("Bar", "i-1")));
        assert!(!reg.record(RemoteHandle::new("Bar", "i-1")));
        reg.record(RemoteHandle::new("Alpha", "i-9"));

        assert_eq!(view.len(), 3);
        assert_eq!(view.by_class("Bar"),
                   vec![RemoteHandle::new("Bar", "i-1"), RemoteHandle::new("Bar", "i-2")]);
        assert_eq!(view.handles()[0].class_name, "Alpha");
        assert_eq!(view.clear(), 3);
        assert!(reg.is_empty());
    }
}
