//! Reuse of reader and writer handles.

use std::sync::Mutex;

use crate::reader::CoverageReader;
use crate::writer::CoverageWriter;

/// A handle returned to its coverage with `recycle`.
#[derive(Debug)]
pub enum Handle {
    Reader(CoverageReader),
    Writer(CoverageWriter),
}

impl From<CoverageReader> for Handle {
    fn from(reader: CoverageReader) -> Self {
        Handle::Reader(reader)
    }
}

impl From<CoverageWriter> for Handle {
    fn from(writer: CoverageWriter) -> Self {
        Handle::Writer(writer)
    }
}

/// Bounded stack of idle handles.
#[derive(Debug)]
pub(crate) struct HandlePool<T> {
    idle: Mutex<Vec<T>>,
    capacity: usize,
}

impl<T> HandlePool<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    pub(crate) fn take(&self) -> Option<T> {
        let mut idle = match self.idle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        idle.pop()
    }

    /// Keep `handle` for reuse. Returns false, dropping it, when full.
    pub(crate) fn give_back(&self, handle: T) -> bool {
        let mut idle = match self.idle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if idle.len() >= self.capacity {
            return false;
        }
        idle.push(handle);
        true
    }

    pub(crate) fn idle(&self) -> usize {
        match self.idle.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
