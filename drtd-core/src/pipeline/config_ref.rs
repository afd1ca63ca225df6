//! Weak handles to stage parameter blocks
//!
//! Stages whose parameters can be changed from outside the processing
//! thread keep that state in an `Arc<Mutex<_>>` and hand out [`ConfigRef`]
//! handles wrapping a `Weak`. A handle stays valid while the stage lives;
//! after the stage is dropped every dereference fails cleanly.
//!
//! External mutation must happen under the pipeline mutation lock (the
//! decoder mutex); the processing thread holds that lock for a whole
//! sample block, so edits land at block boundaries.

use std::sync::{Arc, Mutex, Weak};

use crate::util::lock;

pub struct ConfigRef<T> {
    target: Weak<Mutex<T>>,
}

impl<T> ConfigRef<T> {
    pub(crate) fn new(target: &Arc<Mutex<T>>) -> Self {
        Self {
            target: Arc::downgrade(target),
        }
    }

    /// Handle that never resolves; useful as an initial value.
    pub fn unbound() -> Self {
        Self { target: Weak::new() }
    }

    pub fn valid(&self) -> bool {
        self.target.strong_count() > 0
    }

    /// Access the referenced state, or `None` if the stage is gone.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let target = self.target.upgrade()?;
        let mut state = lock(&target);
        Some(f(&mut state))
    }
}

impl<T> Clone for ConfigRef<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
        }
    }
}

impl<T> Default for ConfigRef<T> {
    fn default() -> Self {
        Self::unbound()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_invalidates_when_target_drops() {
        let target = Arc::new(Mutex::new(5u32));
        let handle = ConfigRef::new(&target);
        assert!(handle.valid());
        assert_eq!(handle.with(|v| *v), Some(5));
        handle.with(|v| *v = 7);
        assert_eq!(*lock(&target), 7);

        drop(target);
        assert!(!handle.valid());
        assert_eq!(handle.with(|v| *v), None);
    }
}
