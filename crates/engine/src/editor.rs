//! Front-end facade: one open image at a time, its live preview, and the
//! macro recorder, all publishing on one [`EventBus`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{ImageFormat, RgbaImage};
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::events::EventBus;
use crate::history::EditableImage;
use crate::macro_file::{self, Macro};
use crate::ops::Operation;
use crate::preview::PreviewController;
use crate::recorder::MacroRecorder;
use crate::sidecar::{self, temp_sibling};

struct Session {
    path: Option<PathBuf>,
    image: EditableImage,
    preview: PreviewController,
}

pub struct Editor {
    events: EventBus,
    session: Option<Session>,
    recorder: MacroRecorder,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

impl Editor {
    pub fn new() -> Self {
        let events = EventBus::new();
        Self {
            recorder: MacroRecorder::new(events.clone()),
            events,
            session: None,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Load `path` and restore its `.ops` sidecar history, if any. Any image
    /// already open is closed first.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let pixels = image::open(path)?.to_rgba8();
        let history = sidecar::read_history(path);
        info!(
            "opened {} ({}×{}, {} restored operation(s))",
            path.display(),
            pixels.width(),
            pixels.height(),
            history.len()
        );
        self.open_with_history(pixels, history, Some(path.to_path_buf()));
        Ok(())
    }

    /// Open an in-memory buffer with no backing file.
    pub fn open_buffer(&mut self, pixels: RgbaImage) {
        self.open_with_history(pixels, Vec::new(), None);
    }

    fn open_with_history(&mut self, pixels: RgbaImage, history: Vec<Operation>, path: Option<PathBuf>) {
        self.close();
        let image = EditableImage::with_history(pixels, history, self.events.clone());
        self.session = Some(Session {
            path,
            image,
            preview: PreviewController::new(self.events.clone()),
        });
    }

    /// Close the open image. Stops any recording and discards its macro.
    pub fn close(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        self.recorder.image_closed();
        session.preview.cancel();
        session.image.close();
        debug!("closed image");
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.session.as_ref().and_then(|s| s.path.as_deref())
    }

    pub fn image(&self) -> Result<&EditableImage> {
        Ok(&self.session()?.image)
    }

    /// The preview if one is showing, otherwise the committed buffer.
    pub fn displayed(&self) -> Result<Arc<RgbaImage>> {
        let session = self.session()?;
        Ok(session.preview.displayed(&session.image))
    }

    pub fn update_preview(&mut self, op: Operation, background: bool) -> Result<()> {
        let session = self.session_mut()?;
        session.preview.update(&session.image, op, background)
    }

    pub fn poll_preview(&mut self) -> bool {
        self.session
            .as_mut()
            .is_some_and(|session| session.preview.poll())
    }

    pub fn wait_preview(&mut self) -> bool {
        self.session
            .as_mut()
            .is_some_and(|session| session.preview.wait())
    }

    pub fn is_previewing(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.preview.pending().is_some())
    }

    /// Commit the pending preview.
    pub fn apply_preview(&mut self) -> Result<bool> {
        let session = self.session_mut()?;
        session.preview.apply(&mut session.image)
    }

    pub fn cancel_preview(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.preview.cancel();
        }
    }

    /// Commit `op` directly, discarding any pending preview.
    pub fn apply(&mut self, op: Operation) -> Result<()> {
        let session = self.session_mut()?;
        session.preview.apply_operation(&mut session.image, op)
    }

    pub fn undo(&mut self) -> bool {
        self.session.as_mut().is_some_and(|session| {
            session.preview.cancel();
            session.image.undo()
        })
    }

    pub fn redo(&mut self) -> bool {
        self.session.as_mut().is_some_and(|session| {
            session.preview.cancel();
            session.image.redo()
        })
    }

    pub fn is_modified(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.image.is_modified())
    }

    /// Persist the history next to the file the image was opened from.
    /// The source pixels are never rewritten; edits live in the sidecar.
    pub fn save(&mut self) -> Result<()> {
        let session = self.session_mut()?;
        let path = session.path.clone().ok_or(EngineError::NoPath)?;
        sidecar::write_history(&path, session.image.applied())?;
        session.image.mark_saved();
        info!("saved history for {}", path.display());
        Ok(())
    }

    /// Write the original pixels to `path` with the history beside them, and
    /// continue editing against `path`. The saved marker only moves once both
    /// writes succeed.
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let session = self.session_mut()?;
        write_pixels(session.image.original(), path)?;
        sidecar::write_history(path, session.image.applied())?;
        session.image.mark_saved();
        session.path = Some(path.to_path_buf());
        info!("saved {}", path.display());
        Ok(())
    }

    /// Render the committed pixels to `path`. No sidecar is written and the
    /// saved marker is left alone.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        write_pixels(&self.session()?.image.current(), path)?;
        info!("exported {}", path.display());
        Ok(())
    }

    pub fn start_recording(&mut self) -> Result<()> {
        let session = self.session.as_ref().ok_or(EngineError::NoImage)?;
        self.recorder.start_recording(&session.image)
    }

    /// Returns the recorded macro, or `None` when nothing was captured.
    pub fn stop_recording(&mut self, name: impl Into<String>) -> Option<Macro> {
        self.recorder
            .stop_recording()
            .map(|ops| Macro::new(name, ops))
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn recorded_ops_string(&self) -> String {
        self.recorder.ops_string()
    }

    /// Replay a codec string against the open image. See
    /// [`MacroRecorder::apply_macro_string`].
    pub fn apply_macro_string(&mut self, raw: &str) -> Result<bool> {
        let session = self.session.as_mut().ok_or(EngineError::NoImage)?;
        session.preview.cancel();
        Ok(self.recorder.apply_macro_string(&mut session.image, raw))
    }

    /// Replay a `.macro` file. Read errors are returned; undecodable contents
    /// apply nothing and yield `Ok(false)`.
    pub fn apply_macro_file(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        let raw = fs::read_to_string(path.as_ref())?;
        let ops = macro_file::ops_string_from_contents(&raw);
        self.apply_macro_string(&ops)
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(EngineError::NoImage)
    }

    fn session_mut(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or(EngineError::NoImage)
    }
}

impl Drop for Editor {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_pixels(pixels: &RgbaImage, path: &Path) -> Result<()> {
    let format = ImageFormat::from_path(path)?;
    let tmp = temp_sibling(path);
    let written = if format == ImageFormat::Jpeg {
        image::DynamicImage::ImageRgba8(pixels.clone())
            .to_rgb8()
            .save_with_format(&tmp, format)
    } else {
        pixels.save_with_format(&tmp, format)
    };
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }
    fs::rename(&tmp, path).map_err(|err| {
        let _ = fs::remove_file(&tmp);
        EngineError::Io(err)
    })
}
