use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::error::{OpResult, OperationError};

/// Shared cooperative cancellation flag. Clones observe the same state.
#[derive(Clone, Default, Debug)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Safe-point check for kernels: bails out with `Cancelled` once the flag is set.
    pub fn check(&self) -> OpResult<()> {
        if self.is_canceled() {
            Err(OperationError::Cancelled)
        } else {
            Ok(())
        }
    }
}
