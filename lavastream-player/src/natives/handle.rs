//! Single-owner native handles
//!
//! A [`NativeHandle`] owns one native codec or converter instance and frees
//! it when released or dropped. Release takes the handle by value, so a
//! released handle cannot be named again. Components that must keep a field
//! around after release hold a [`HandleSlot`], which turns access after
//! release into [`Error::ReleasedHandle`].

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::trace;

static LIVE_HANDLES: Lazy<Mutex<HashMap<&'static str, usize>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn adjust_live(kind: &'static str, delta: isize) {
    let mut counts = match LIVE_HANDLES.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let count = counts.entry(kind).or_insert(0);
    *count = count.saturating_add_signed(delta);
}

/// Number of handles of `kind` that are currently alive
pub fn live_handle_count(kind: &str) -> usize {
    let counts = match LIVE_HANDLES.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    counts.get(kind).copied().unwrap_or(0)
}

pub struct NativeHandle<T> {
    kind: &'static str,
    inner: T,
}

impl<T> NativeHandle<T> {
    pub fn new(kind: &'static str, inner: T) -> Self {
        adjust_live(kind, 1);
        trace!(kind, "Native handle created");
        Self { kind, inner }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn get(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Frees the native instance
    pub fn release(self) {
        drop(self);
    }
}

impl<T> Drop for NativeHandle<T> {
    fn drop(&mut self) {
        adjust_live(self.kind, -1);
        trace!(kind = self.kind, "Native handle released");
    }
}

/// Owner field for a handle that may already have been released
pub struct HandleSlot<T> {
    kind: &'static str,
    handle: Option<NativeHandle<T>>,
}

impl<T> HandleSlot<T> {
    pub fn new(handle: NativeHandle<T>) -> Self {
        Self {
            kind: handle.kind(),
            handle: Some(handle),
        }
    }

    pub fn get(&self) -> Result<&T> {
        self.handle
            .as_ref()
            .map(NativeHandle::get)
            .ok_or(Error::ReleasedHandle(self.kind))
    }

    pub fn get_mut(&mut self) -> Result<&mut T> {
        let kind = self.kind;
        self.handle
            .as_mut()
            .map(NativeHandle::get_mut)
            .ok_or(Error::ReleasedHandle(kind))
    }

    /// Releases the handle; returns false if it was already released
    pub fn release(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.release();
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }
}
