//! Progress reporting for optimization passes.

use std::fmt;
use std::sync::Arc;

/// "Advance by N" progress sink handed in by the orchestrator.
///
/// Cloning shares the callback; the default reports nowhere.
#[derive(Clone, Default)]
pub struct Progress {
    callback: Option<Arc<dyn Fn(usize) + Send + Sync>>,
}

impl Progress {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_some(&self) -> bool {
        self.callback.is_some()
    }

    /// Report `steps` completed units of work.
    #[inline]
    pub fn advance(&self, steps: usize) {
        if steps == 0 {
            return;
        }
        if let Some(f) = self.callback.as_ref() {
            f(steps);
        }
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.callback {
            None => write!(f, "Progress::None"),
            Some(_) => write!(f, "Progress::Some(...)"),
        }
    }
}
