//! Records committed operations into a macro while recording is on.

use std::sync::{Arc, Mutex};

use core_types::ChangeFlags;
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::{EngineError, Result};
use crate::events::{EditorEvent, EventBus, Subscription};
use crate::history::EditableImage;
use crate::ops::Operation;

pub struct MacroRecorder {
    events: EventBus,
    recorded: Arc<Mutex<Vec<Operation>>>,
    subscription: Option<Subscription>,
}

impl MacroRecorder {
    /// `events` receives the recorder's own `MacroStateChanged` notifications.
    pub fn new(events: EventBus) -> Self {
        Self {
            events,
            recorded: Arc::new(Mutex::new(Vec::new())),
            subscription: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.subscription.is_some()
    }

    /// Begin following `image`'s committed history from an empty macro.
    /// Undos while recording drop the most recently recorded operation.
    pub fn start_recording(&mut self, image: &EditableImage) -> Result<()> {
        if image.is_closed() {
            return Err(EngineError::Closed);
        }
        self.subscription = None;
        self.lock().clear();

        let recorded = self.recorded.clone();
        let events = self.events.clone();
        let subscription = image
            .events()
            .subscribe(ChangeFlags::OPERATIONS, move |event| {
                let len = {
                    let mut ops = recorded.lock().expect("macro recording poisoned");
                    match event {
                        EditorEvent::OperationApplied(op) => ops.push(op.clone()),
                        EditorEvent::OperationRemoved(_) => {
                            ops.pop();
                        }
                        _ => return,
                    }
                    ops.len()
                };
                events.emit(EditorEvent::MacroStateChanged {
                    recording: true,
                    recorded: len,
                });
            });

        self.subscription = Some(subscription);
        info!("macro recording started");
        self.emit_state();
        Ok(())
    }

    /// Stop recording. Returns the captured operations, or `None` when
    /// nothing was recorded.
    pub fn stop_recording(&mut self) -> Option<Vec<Operation>> {
        if self.subscription.take().is_none() {
            return None;
        }
        let ops = std::mem::take(&mut *self.lock());
        info!("macro recording stopped with {} operation(s)", ops.len());
        self.emit_state();
        if ops.is_empty() {
            None
        } else {
            Some(ops)
        }
    }

    /// The image went away: recording cannot continue on another image.
    pub fn image_closed(&mut self) {
        let was_recording = self.subscription.take().is_some();
        self.lock().clear();
        if was_recording {
            debug!("image closed, discarding macro in progress");
            self.emit_state();
        }
    }

    pub fn recorded(&self) -> Vec<Operation> {
        self.lock().clone()
    }

    pub fn ops_string(&self) -> String {
        codec::encode(&self.lock())
    }

    /// Decode `raw` and commit each operation in order. Stops at the first
    /// failure and returns `false`; operations committed before it stay.
    /// Undecodable input applies nothing and returns `false`.
    pub fn apply_macro_string(&self, image: &mut EditableImage, raw: &str) -> bool {
        match codec::try_decode(raw) {
            Ok(ops) => replay(image, &ops),
            Err(err) => {
                warn!("cannot apply macro: {err}");
                false
            }
        }
    }

    fn emit_state(&self) {
        let recorded = self.lock().len();
        self.events.emit(EditorEvent::MacroStateChanged {
            recording: self.is_recording(),
            recorded,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Operation>> {
        self.recorded.lock().expect("macro recording poisoned")
    }
}

/// Commit `ops` in order, stopping at the first failure.
pub fn replay(image: &mut EditableImage, ops: &[Operation]) -> bool {
    for (idx, op) in ops.iter().enumerate() {
        if let Err(err) = image.apply(op.clone()) {
            warn!(
                "macro stopped at step {} of {} ({}): {err}",
                idx + 1,
                ops.len(),
                op.describe()
            );
            return false;
        }
    }
    true
}
