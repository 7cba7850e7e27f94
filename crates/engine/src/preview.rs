//! Live preview of tentative operations.
//!
//! Interactive controls call [`PreviewController::update`] repeatedly with
//! tentative operations. Each preview is computed against a snapshot of the
//! committed buffer, either inline or on a single background worker, and is
//! shown without touching history until [`PreviewController::apply`] commits
//! it or [`PreviewController::cancel`] drops it.
//!
//! Ordering: every worker is tagged with a generation. Superseding or
//! cancelling a worker raises its flag, joins it, and drains whatever it may
//! already have sent, so a stale result can never be published after the
//! call returns.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use image::RgbaImage;
use tracing::{debug, warn};

use crate::cancel::CancellationFlag;
use crate::error::{EngineError, OpResult, Result};
use crate::events::{EditorEvent, EventBus};
use crate::history::EditableImage;
use crate::ops::{Operation, OperationKind};

struct Worker {
    generation: u64,
    kind: OperationKind,
    cancel: CancellationFlag,
    handle: JoinHandle<()>,
}

struct PreviewResult {
    generation: u64,
    result: OpResult<RgbaImage>,
}

pub struct PreviewController {
    events: EventBus,
    pending: Option<Operation>,
    displayed: Option<Arc<RgbaImage>>,
    worker: Option<Worker>,
    generation: u64,
    tx: Sender<PreviewResult>,
    rx: Receiver<PreviewResult>,
}

impl PreviewController {
    pub fn new(events: EventBus) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            events,
            pending: None,
            displayed: None,
            worker: None,
            generation: 0,
            tx,
            rx,
        }
    }

    /// Propose `op` as the tentative edit. With `background == false` the
    /// preview is computed and published before returning; otherwise a worker
    /// is started and the result arrives through [`poll`](Self::poll).
    ///
    /// A running worker for the same kind of operation is superseded. A
    /// running worker for a different kind is cancelled together with its
    /// tentative edit.
    pub fn update(&mut self, image: &EditableImage, op: Operation, background: bool) -> Result<()> {
        if image.is_closed() {
            return Err(EngineError::Closed);
        }

        let superseded = self.worker.as_ref().map(|worker| worker.kind);
        match superseded {
            Some(kind) if kind != op.kind() => {
                debug!("abandoning pending {kind} preview for {}", op.kind());
                self.cancel();
            }
            Some(_) => self.stop_worker(),
            None => {}
        }

        let snapshot = image.current();
        self.pending = Some(op.clone());

        if !background {
            return match op.preview(&snapshot, &CancellationFlag::new()) {
                Ok(preview) => {
                    self.displayed = Some(Arc::new(preview));
                    self.events.emit(EditorEvent::ImageContentChanged);
                    Ok(())
                }
                Err(err) => {
                    warn!("preview of {} failed: {err}", op.describe());
                    self.pending = None;
                    if self.displayed.take().is_some() {
                        self.events.emit(EditorEvent::ImageContentChanged);
                    }
                    Err(err.into())
                }
            };
        }

        self.generation += 1;
        let generation = self.generation;
        let kind = op.kind();
        let cancel = CancellationFlag::new();
        let flag = cancel.clone();
        let tx = self.tx.clone();

        let handle = thread::Builder::new()
            .name("preview-worker".into())
            .spawn(move || {
                let result = op.preview(&snapshot, &flag);
                if flag.is_canceled() {
                    return;
                }
                // The controller may already be gone; nothing to deliver to.
                let _ = tx.send(PreviewResult { generation, result });
            })?;

        debug!("started {kind} preview worker (generation {generation})");
        self.worker = Some(Worker {
            generation,
            kind,
            cancel,
            handle,
        });
        Ok(())
    }

    /// Deliver a finished background result, if any. Call from the thread
    /// that owns the controller; returns `true` when the displayed buffer
    /// changed.
    pub fn poll(&mut self) -> bool {
        let mut published = false;
        while let Ok(message) = self.rx.try_recv() {
            let current = self.worker.as_ref().map(|worker| worker.generation);
            if current != Some(message.generation) {
                debug!("dropping stale preview (generation {})", message.generation);
                continue;
            }
            if let Some(worker) = self.worker.take() {
                if worker.handle.join().is_err() {
                    warn!("preview worker panicked after delivering");
                }
            }
            published |= self.publish(message.result);
        }
        published
    }

    /// Block until the in-flight worker finishes, then deliver its result.
    /// Meant for headless callers; interactive front ends use `poll`.
    pub fn wait(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return self.poll();
        };
        let generation = worker.generation;
        if worker.handle.join().is_err() {
            warn!("preview worker panicked");
            return false;
        }

        let mut published = false;
        while let Ok(message) = self.rx.try_recv() {
            if message.generation == generation {
                published |= self.publish(message.result);
            }
        }
        published
    }

    /// Commit the most recently proposed operation. Returns `Ok(false)` when
    /// nothing was pending. A failed commit discards the tentative edit.
    pub fn apply(&mut self, image: &mut EditableImage) -> Result<bool> {
        self.stop_worker();
        let Some(op) = self.pending.take() else {
            return Ok(false);
        };
        let had_preview = self.displayed.take().is_some();

        match image.apply(op) {
            Ok(()) => Ok(true),
            Err(err) => {
                if had_preview {
                    self.events.emit(EditorEvent::ImageContentChanged);
                }
                Err(err)
            }
        }
    }

    /// Commit `op` directly, for edits with no interactive preview. Any
    /// tentative edit is discarded first.
    pub fn apply_operation(&mut self, image: &mut EditableImage, op: Operation) -> Result<()> {
        self.cancel();
        image.apply(op)
    }

    /// Drop the tentative edit and show the committed buffer again.
    pub fn cancel(&mut self) {
        self.stop_worker();
        let had_pending = self.pending.take().is_some();
        let had_preview = self.displayed.take().is_some();
        if had_pending || had_preview {
            self.events.emit(EditorEvent::ImageContentChanged);
        }
    }

    /// The buffer to show: the current preview, or the committed buffer.
    pub fn displayed(&self, image: &EditableImage) -> Arc<RgbaImage> {
        self.displayed.clone().unwrap_or_else(|| image.current())
    }

    pub fn pending(&self) -> Option<&Operation> {
        self.pending.as_ref()
    }

    pub fn has_preview(&self) -> bool {
        self.displayed.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.worker.is_some()
    }

    fn publish(&mut self, result: OpResult<RgbaImage>) -> bool {
        match result {
            Ok(preview) => {
                self.displayed = Some(Arc::new(preview));
                self.events.emit(EditorEvent::ImageContentChanged);
                true
            }
            Err(err) if err.is_cancelled() => false,
            Err(err) => {
                warn!("background preview failed: {err}");
                false
            }
        }
    }

    /// Cancel and join the in-flight worker, then discard anything it sent.
    fn stop_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.cancel.cancel();
        if worker.handle.join().is_err() {
            warn!("preview worker panicked while cancelling");
        }
        while self.rx.try_recv().is_ok() {}
        debug!("cancelled preview worker (generation {})", worker.generation);
    }
}

impl Drop for PreviewController {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::ChangeFlags;
    use image::Rgba;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn small_image() -> EditableImage {
        let img = RgbaImage::from_fn(16, 12, |x, y| Rgba([(x * 16) as u8, (y * 20) as u8, 90, 255]));
        EditableImage::new(img, EventBus::new())
    }

    fn large_image() -> EditableImage {
        let img = RgbaImage::from_fn(1200, 1200, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
        });
        EditableImage::new(img, EventBus::new())
    }

    #[test]
    fn synchronous_update_publishes_without_committing() {
        let image = small_image();
        let mut preview = PreviewController::new(image.events().clone());
        preview.update(&image, Operation::Invert, false).unwrap();

        assert!(preview.has_preview());
        assert_ne!(*preview.displayed(&image), *image.current());
        assert!(image.applied().is_empty());
    }

    #[test]
    fn background_update_publishes_on_wait() {
        let image = small_image();
        let mut preview = PreviewController::new(image.events().clone());
        let op = Operation::Blur { radius: 2 };
        preview.update(&image, op.clone(), true).unwrap();
        assert!(preview.wait());

        let expected = op.preview(&image.current(), &CancellationFlag::new()).unwrap();
        assert_eq!(*preview.displayed(&image), expected);
        assert!(!preview.is_busy());
    }

    #[test]
    fn same_kind_update_supersedes_running_worker() {
        let image = large_image();
        let mut preview = PreviewController::new(image.events().clone());
        preview.update(&image, Operation::Blur { radius: 40 }, true).unwrap();
        preview.update(&image, Operation::Blur { radius: 1 }, true).unwrap();
        preview.wait();

        let expected = Operation::Blur { radius: 1 }
            .preview(&image.current(), &CancellationFlag::new())
            .unwrap();
        assert_eq!(*preview.displayed(&image), expected);
        assert_eq!(preview.pending(), Some(&Operation::Blur { radius: 1 }));
    }

    #[test]
    fn different_kind_update_discards_previous_edit() {
        let image = large_image();
        let mut preview = PreviewController::new(image.events().clone());
        preview.update(&image, Operation::Blur { radius: 40 }, true).unwrap();
        preview.update(&image, Operation::Invert, false).unwrap();

        assert!(!preview.is_busy());
        assert_eq!(preview.pending(), Some(&Operation::Invert));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!preview.poll());
    }

    #[test]
    fn cancel_never_lets_a_late_result_land() {
        let image = large_image();
        let mut preview = PreviewController::new(image.events().clone());
        let published = Arc::new(AtomicUsize::new(0));
        let counter = published.clone();
        let _sub = image
            .events()
            .subscribe(ChangeFlags::IMAGE_CONTENT, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        preview.update(&image, Operation::Blur { radius: 64 }, true).unwrap();
        preview.cancel();
        let after_cancel = published.load(Ordering::SeqCst);

        std::thread::sleep(Duration::from_millis(50));
        assert!(!preview.poll());
        assert!(!preview.has_preview());
        assert_eq!(*preview.displayed(&image), *image.current());
        assert_eq!(published.load(Ordering::SeqCst), after_cancel);
    }

    #[test]
    fn apply_commits_full_quality_operation() {
        let mut image = small_image();
        let mut preview = PreviewController::new(image.events().clone());
        let op = Operation::Blur { radius: 2 };
        preview.update(&image, op.clone(), true).unwrap();

        assert!(preview.apply(&mut image).unwrap());
        assert_eq!(image.applied(), &[op.clone()]);
        assert_eq!(*image.current(), op.apply(image.original()).unwrap());
        assert!(!preview.has_preview());
        assert!(!preview.apply(&mut image).unwrap());
    }

    #[test]
    fn cancel_restores_committed_buffer() {
        let mut image = small_image();
        let mut preview = PreviewController::new(image.events().clone());
        preview
            .apply_operation(&mut image, Operation::Rotate { degrees: 180 })
            .unwrap();
        preview.update(&image, Operation::Grayscale, false).unwrap();
        preview.cancel();

        assert_eq!(*preview.displayed(&image), *image.current());
        assert_eq!(image.applied().len(), 1);
        assert!(preview.pending().is_none());
    }

    #[test]
    fn failed_inline_preview_clears_pending() {
        let image = small_image();
        let mut preview = PreviewController::new(image.events().clone());
        let bad = Operation::Crop {
            x: 10,
            y: 10,
            width: 50,
            height: 50,
        };
        assert!(preview.update(&image, bad, false).is_err());
        assert!(preview.pending().is_none());
    }
}
