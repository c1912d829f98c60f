use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::foundation::error::{EaselError, EaselResult};

/// Cooperative cancellation flag shared between a render pass and whoever may abort it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// `Err(EaselError::Cancelled)` once [`CancelToken::cancel`] has been called.
    pub fn check(&self) -> EaselResult<()> {
        if self.is_cancelled() {
            Err(EaselError::Cancelled)
        } else {
            Ok(())
        }
    }
}
