//! Change notifications for front ends and the macro recorder.

use std::sync::{Arc, Mutex, Weak};

use core_types::ChangeFlags;

use crate::ops::Operation;

#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// An image was opened (`open == true`) or closed.
    ImageStatusChanged { open: bool },
    /// Displayed pixels changed, committed or preview.
    ImageContentChanged,
    HistoryChanged { can_undo: bool, can_redo: bool },
    OperationApplied(Operation),
    /// The most recent committed operation was undone.
    OperationRemoved(Operation),
    MacroStateChanged { recording: bool, recorded: usize },
}

impl EditorEvent {
    pub fn flag(&self) -> ChangeFlags {
        match self {
            EditorEvent::ImageStatusChanged { .. } => ChangeFlags::IMAGE_STATUS,
            EditorEvent::ImageContentChanged => ChangeFlags::IMAGE_CONTENT,
            EditorEvent::HistoryChanged { .. } => ChangeFlags::HISTORY,
            EditorEvent::OperationApplied(_) | EditorEvent::OperationRemoved(_) => {
                ChangeFlags::OPERATIONS
            }
            EditorEvent::MacroStateChanged { .. } => ChangeFlags::MACRO,
        }
    }
}

type Callback = Arc<Mutex<dyn FnMut(&EditorEvent) + Send>>;

struct Listener {
    id: u64,
    mask: ChangeFlags,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<Listener>,
}

/// Cloneable handle to one set of listeners.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for every event whose kind is in `mask`. The
    /// callback stays registered until the returned handle is dropped.
    pub fn subscribe<F>(&self, mask: ChangeFlags, callback: F) -> Subscription
    where
        F: FnMut(&EditorEvent) + Send + 'static,
    {
        let mut registry = self.registry.lock().expect("event registry poisoned");
        registry.next_id += 1;
        let id = registry.next_id;
        registry.listeners.push(Listener {
            id,
            mask,
            callback: Arc::new(Mutex::new(callback)),
        });
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver synchronously on the calling thread. The registry lock is
    /// released before callbacks run, so a callback may emit or subscribe.
    pub fn emit(&self, event: EditorEvent) {
        let flag = event.flag();
        let targets: Vec<Callback> = {
            let registry = self.registry.lock().expect("event registry poisoned");
            registry
                .listeners
                .iter()
                .filter(|listener| listener.mask.contains(flag))
                .map(|listener| listener.callback.clone())
                .collect()
        };
        for callback in targets {
            let mut callback = callback.lock().expect("event callback poisoned");
            (*callback)(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry
            .lock()
            .expect("event registry poisoned")
            .listeners
            .len()
    }
}

/// Revokes its callback when dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn revoke(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Ok(mut registry) = registry.lock() {
                registry.listeners.retain(|listener| listener.id != self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector(bus: &EventBus, mask: ChangeFlags) -> (Arc<Mutex<Vec<EditorEvent>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = bus.subscribe(mask, move |event| sink.lock().unwrap().push(event.clone()));
        (seen, sub)
    }

    #[test]
    fn delivers_only_masked_kinds() {
        let bus = EventBus::new();
        let (seen, _sub) = collector(&bus, ChangeFlags::HISTORY);
        bus.emit(EditorEvent::ImageContentChanged);
        bus.emit(EditorEvent::HistoryChanged {
            can_undo: true,
            can_redo: false,
        });
        assert_eq!(
            *seen.lock().unwrap(),
            vec![EditorEvent::HistoryChanged {
                can_undo: true,
                can_redo: false
            }]
        );
    }

    #[test]
    fn dropping_subscription_revokes_callback() {
        let bus = EventBus::new();
        let (seen, sub) = collector(&bus, ChangeFlags::all());
        assert_eq!(bus.listener_count(), 1);
        sub.revoke();
        assert_eq!(bus.listener_count(), 0);
        bus.emit(EditorEvent::ImageContentChanged);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn callbacks_may_emit_reentrantly() {
        let bus = EventBus::new();
        let inner = bus.clone();
        let _relay = bus.subscribe(ChangeFlags::OPERATIONS, move |_| {
            inner.emit(EditorEvent::ImageContentChanged)
        });
        let (seen, _sub) = collector(&bus, ChangeFlags::IMAGE_CONTENT);
        bus.emit(EditorEvent::OperationApplied(Operation::Invert));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
