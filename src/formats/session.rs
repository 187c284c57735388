//! Open/closed state shared by the format readers

use std::sync::Arc;

use parking_lot::RwLock;

use crate::reader::{RenderError, RenderResult};

enum Session<T> {
    Idle,
    Open(Arc<T>),
    Closed,
}

/// Holds the state of the currently open source
///
/// Renders clone the `Arc` and work without the lock, so `close` never
/// waits for them.
pub struct SessionSlot<T> {
    inner: RwLock<Session<T>>,
}

impl<T> Default for SessionSlot<T> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Session::Idle),
        }
    }
}

impl<T> SessionSlot<T> {
    /// State of the open source, or why there is none
    pub fn current(&self) -> RenderResult<Arc<T>> {
        match &*self.inner.read() {
            Session::Open(state) => Ok(Arc::clone(state)),
            Session::Idle => Err(RenderError::NotOpen),
            Session::Closed => Err(RenderError::Closed),
        }
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.current().ok()
    }

    /// Install a newly opened state, returning the one it replaces
    pub fn install(&self, state: Arc<T>) -> Option<Arc<T>> {
        match std::mem::replace(&mut *self.inner.write(), Session::Open(state)) {
            Session::Open(previous) => Some(previous),
            _ => None,
        }
    }

    /// Mark closed, returning the state that was open
    pub fn close(&self) -> Option<Arc<T>> {
        let mut inner = self.inner.write();
        match std::mem::replace(&mut *inner, Session::Closed) {
            Session::Open(previous) => Some(previous),
            Session::Idle => {
                *inner = Session::Idle;
                None
            }
            Session::Closed => None,
        }
    }
}
