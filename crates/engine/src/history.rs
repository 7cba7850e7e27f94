//! Undo/redo history for one open image.
//!
//! Committed operations live in a single arena with a cursor: everything
//! before the cursor is applied, everything from the cursor on has been
//! undone and is available to redo (`ops[cursor]` first). The current buffer
//! is always `fold(original, applied)`; undo recomputes it from scratch
//! instead of inverting anything.

use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, warn};

use crate::codec;
use crate::error::{EngineError, Result};
use crate::events::{EditorEvent, EventBus};
use crate::ops::Operation;

pub struct EditableImage {
    original: Arc<RgbaImage>,
    current: Arc<RgbaImage>,
    ops: Vec<Operation>,
    cursor: usize,
    saved_marker: String,
    events: EventBus,
    closed: bool,
}

impl EditableImage {
    /// Open a freshly loaded buffer with an empty history.
    pub fn new(original: RgbaImage, events: EventBus) -> Self {
        Self::with_history(original, Vec::new(), events)
    }

    /// Open a buffer and replay a persisted history over it. Replay stops at
    /// the first operation that fails; the prefix before it is kept. The
    /// restored state counts as saved.
    pub fn with_history(original: RgbaImage, history: Vec<Operation>, events: EventBus) -> Self {
        let original = Arc::new(original);
        let mut current = original.clone();
        let mut ops = Vec::with_capacity(history.len());

        for op in history {
            match op.apply(&current) {
                Ok(next) => {
                    current = Arc::new(next);
                    ops.push(op);
                }
                Err(err) => {
                    warn!(
                        "stopping history replay at '{}': {err}; keeping {} operation(s)",
                        op.describe(),
                        ops.len()
                    );
                    break;
                }
            }
        }

        let cursor = ops.len();
        let image = Self {
            original,
            current,
            saved_marker: codec::encode(&ops),
            ops,
            cursor,
            events,
            closed: false,
        };
        image.events.emit(EditorEvent::ImageStatusChanged { open: true });
        image.emit_history();
        image
    }

    /// Commit `op`. On failure nothing changes and the error is returned for
    /// display. Any redo history is discarded on success.
    pub fn apply(&mut self, op: Operation) -> Result<()> {
        if self.closed {
            return Err(EngineError::Closed);
        }

        let next = op.apply(&self.current).map_err(|err| {
            warn!("{} failed: {err}", op.describe());
            err
        })?;

        debug!("applied {}", op.describe());
        self.ops.truncate(self.cursor);
        self.ops.push(op.clone());
        self.cursor = self.ops.len();
        self.current = Arc::new(next);

        self.events.emit(EditorEvent::ImageContentChanged);
        self.events.emit(EditorEvent::OperationApplied(op));
        self.emit_history();
        Ok(())
    }

    /// Returns `false` when there was nothing to undo.
    pub fn undo(&mut self) -> bool {
        if self.closed || self.cursor == 0 {
            return false;
        }

        self.cursor -= 1;
        let removed = self.ops[self.cursor].clone();
        self.recompute();
        debug!("undid {}", removed.describe());

        self.events.emit(EditorEvent::ImageContentChanged);
        self.events.emit(EditorEvent::OperationRemoved(removed));
        self.emit_history();
        true
    }

    /// Re-applies the most recently undone operation. A failure here means the
    /// operation stopped succeeding on an equivalent buffer; the redo is
    /// abandoned without touching history and only logged.
    pub fn redo(&mut self) -> bool {
        if self.closed || self.cursor == self.ops.len() {
            return false;
        }

        let op = self.ops[self.cursor].clone();
        match op.apply(&self.current) {
            Ok(next) => {
                self.current = Arc::new(next);
                self.cursor += 1;
                debug!("redid {}", op.describe());

                self.events.emit(EditorEvent::ImageContentChanged);
                self.events.emit(EditorEvent::OperationApplied(op));
                self.emit_history();
                true
            }
            Err(err) => {
                warn!("redo of '{}' failed unexpectedly: {err}", op.describe());
                false
            }
        }
    }

    pub fn is_modified(&self) -> bool {
        codec::encode(self.applied()) != self.saved_marker
    }

    pub fn mark_saved(&mut self) {
        self.saved_marker = codec::encode(self.applied());
    }

    /// Transition to the terminal state. Further edits fail with
    /// [`EngineError::Closed`]; undo and redo become no-ops.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.events.emit(EditorEvent::ImageStatusChanged { open: false });
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn original(&self) -> &RgbaImage {
        &self.original
    }

    /// Cheap shared snapshot of the committed buffer.
    pub fn current(&self) -> Arc<RgbaImage> {
        self.current.clone()
    }

    pub fn applied(&self) -> &[Operation] {
        &self.ops[..self.cursor]
    }

    /// Undone operations, next redo first.
    pub fn undone(&self) -> &[Operation] {
        &self.ops[self.cursor..]
    }

    pub fn can_undo(&self) -> bool {
        !self.closed && self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        !self.closed && self.cursor < self.ops.len()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.applied().last().map(Operation::describe)
    }

    pub fn redo_description(&self) -> Option<String> {
        self.undone().first().map(Operation::describe)
    }

    pub fn history(&self) -> Vec<String> {
        self.applied().iter().map(Operation::describe).collect()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Rebuild `current` by folding the applied prefix over the original.
    fn recompute(&mut self) {
        let mut current = self.original.clone();
        for (idx, op) in self.ops[..self.cursor].iter().enumerate() {
            match op.apply(&current) {
                Ok(next) => current = Arc::new(next),
                Err(err) => {
                    warn!(
                        "recompute stopped at '{}': {err}; {idx} operation(s) remain applied",
                        op.describe()
                    );
                    self.cursor = idx;
                    break;
                }
            }
        }
        self.current = current;
    }

    fn emit_history(&self) {
        self.events.emit(EditorEvent::HistoryChanged {
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{fold, FlipAxis};
    use core_types::ChangeFlags;
    use image::Rgba;
    use std::sync::Mutex;

    fn test_image() -> RgbaImage {
        RgbaImage::from_fn(12, 9, |x, y| Rgba([(x * 21) as u8, (y * 28) as u8, 50, 255]))
    }

    fn edit_sequence() -> Vec<Operation> {
        vec![
            Operation::BrightnessContrast {
                brightness: 10,
                contrast: 25,
            },
            Operation::Crop {
                x: 2,
                y: 1,
                width: 8,
                height: 6,
            },
            Operation::Blur { radius: 1 },
            Operation::Flip {
                axis: FlipAxis::Vertical,
            },
        ]
    }

    fn open() -> EditableImage {
        EditableImage::new(test_image(), EventBus::new())
    }

    #[test]
    fn current_is_rederivable_from_original() {
        let mut image = open();
        for op in edit_sequence() {
            image.apply(op).unwrap();
        }
        let refolded = fold(image.original(), image.applied()).unwrap();
        assert_eq!(*image.current(), refolded);
    }

    #[test]
    fn undo_then_redo_restores_current() {
        let mut image = open();
        for op in edit_sequence() {
            image.apply(op).unwrap();
        }
        let before = image.current();
        assert!(image.undo());
        assert_ne!(*image.current(), *before);
        assert!(image.redo());
        assert_eq!(*image.current(), *before);
        assert_eq!(image.applied(), edit_sequence().as_slice());
    }

    #[test]
    fn undo_recomputes_from_scratch() {
        let mut image = open();
        for op in edit_sequence() {
            image.apply(op).unwrap();
        }
        image.undo();
        image.undo();
        let expected = fold(&test_image(), &edit_sequence()[..2]).unwrap();
        assert_eq!(*image.current(), expected);
        assert_eq!(image.undone().len(), 2);
        assert_eq!(image.redo_description(), Some("Blur (radius 1)".to_string()));
    }

    #[test]
    fn undo_and_redo_are_noops_on_empty_stacks() {
        let mut image = open();
        assert!(!image.undo());
        assert!(!image.redo());
        assert_eq!(*image.current(), test_image());
    }

    #[test]
    fn new_edit_after_undo_invalidates_redo() {
        let mut image = open();
        image.apply(Operation::Invert).unwrap();
        image.undo();
        assert!(image.can_redo());
        image.apply(Operation::Grayscale).unwrap();
        assert!(!image.can_redo());
        assert!(!image.redo());
        assert_eq!(image.applied(), &[Operation::Grayscale]);
    }

    #[test]
    fn failed_apply_leaves_state_untouched() {
        let mut image = open();
        image.apply(Operation::Invert).unwrap();
        image.undo();
        let before = image.current();
        let err = image
            .apply(Operation::Crop {
                x: 0,
                y: 0,
                width: 100,
                height: 100,
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Operation(_)));
        assert_eq!(*image.current(), *before);
        assert!(image.can_redo());
        assert!(image.applied().is_empty());
    }

    #[test]
    fn modified_tracks_saved_marker() {
        let mut image = open();
        assert!(!image.is_modified());
        image.apply(Operation::Invert).unwrap();
        assert!(image.is_modified());
        image.mark_saved();
        assert!(!image.is_modified());
        image.undo();
        assert!(image.is_modified());
        image.redo();
        assert!(!image.is_modified());
    }

    #[test]
    fn restored_history_stops_at_first_failure() {
        let history = vec![
            Operation::Crop {
                x: 0,
                y: 0,
                width: 4,
                height: 4,
            },
            Operation::Crop {
                x: 0,
                y: 0,
                width: 8,
                height: 8,
            },
            Operation::Invert,
        ];
        let image = EditableImage::with_history(test_image(), history, EventBus::new());
        assert_eq!(image.applied().len(), 1);
        assert_eq!(image.current().dimensions(), (4, 4));
        assert!(!image.is_modified());
    }

    #[test]
    fn notifications_follow_each_mutation() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = bus.subscribe(ChangeFlags::OPERATIONS, move |event| {
            sink.lock().unwrap().push(event.clone())
        });

        let mut image = EditableImage::new(test_image(), bus);
        image.apply(Operation::Invert).unwrap();
        image.undo();
        image.redo();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                EditorEvent::OperationApplied(Operation::Invert),
                EditorEvent::OperationRemoved(Operation::Invert),
                EditorEvent::OperationApplied(Operation::Invert),
            ]
        );
    }

    #[test]
    fn closed_image_rejects_edits() {
        let mut image = open();
        image.apply(Operation::Invert).unwrap();
        image.close();
        assert!(matches!(
            image.apply(Operation::Grayscale),
            Err(EngineError::Closed)
        ));
        assert!(!image.undo());
        assert!(!image.can_undo());
    }
}
