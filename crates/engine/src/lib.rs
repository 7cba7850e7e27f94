pub mod cancel;
pub mod codec;
pub mod editor;
pub mod error;
pub mod events;
pub mod history;
pub mod macro_file;
pub mod ops;
pub mod preview;
pub mod recorder;
pub mod sidecar;

pub use cancel::CancellationFlag;
pub use editor::Editor;
pub use error::{EngineError, OpResult, OperationError, Result, SerializationError};
pub use events::{EditorEvent, EventBus, Subscription};
pub use history::EditableImage;
pub use macro_file::{list_macros, Macro, MacroEntry, MacroPath};
pub use ops::{FlipAxis, Operation, OperationKind, Shape};
pub use preview::PreviewController;
pub use recorder::MacroRecorder;
