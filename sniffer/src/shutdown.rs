use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// The capture loop is blocking, so rather than a channel it polls this between bulk reads.
#[derive(Debug, Default)]
pub struct Shutdown {
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::Relaxed);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub fn flag(&self) -> Arc<AtomicBool> {
        self.triggered.clone()
    }
}

impl Clone for Shutdown {
    fn clone(&self) -> Self {
        Self {
            triggered: self.triggered.clone(),
        }
    }
}
