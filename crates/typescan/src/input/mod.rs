// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Input emitters: streams of `(topic, type, optional typecode)` records.
//!
//! Producers (file reader threads, discovery callbacks) feed a shared queue;
//! one consumer drains it through [`InputEmitter::next`]. Per-producer FIFO
//! order is preserved; records from independent producers interleave in
//! arrival order.

mod discovery;
mod file;

pub use discovery::{DiscoveryInput, DiscoverySink, DiscoverySource};
pub use file::{FileInput, FileInputOptions};

use crate::typecode::TypeCode;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// A single detected endpoint or type.
///
/// `topic_name` may be empty (type-only record); `type_name` may be empty
/// when a typecode is supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub topic_name: String,
    pub type_name: String,
    pub typecode: Option<Arc<TypeCode>>,
}

/// Sentinel returned when a stream is definitively exhausted.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no more input available")]
pub struct NoInput;

/// Errors raised while opening an input emitter.
#[derive(Debug, Error)]
pub enum InputError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("discovery source failed: {0}")]
    Source(String),
}

/// A source of input records.
pub trait InputEmitter: Send + Sync {
    fn open(&self) -> Result<(), InputError>;

    /// Cooperative shutdown: wakes all waiters and joins producer threads.
    /// In-flight `next` calls return [`NoInput`].
    fn close(&self);

    fn is_active(&self) -> bool;

    /// Blocking wait for the next record.
    fn next(&self) -> Result<Record, NoInput>;

    /// Wait for the next record for at most `timeout`.
    fn next_timeout(&self, timeout: Duration) -> Result<Record, NoInput>;
}

struct QueueState {
    items: VecDeque<Record>,
    active: bool,
    reader_active: bool,
}

/// Shared producer/consumer queue guarded by one mutex and one condvar.
pub(crate) struct InputQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl InputQueue {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                active: true,
                reader_active: false,
            }),
            ready: Condvar::new(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, record: Record) {
        let mut state = self.lock();
        if !state.active {
            return;
        }
        state.items.push_back(record);
        trace!(queued = state.items.len(), "queued input");
        self.ready.notify_all();
    }

    /// Pop the next record, waiting (bounded by `timeout`, or indefinitely
    /// when `timeout` is `None`) while the stream is active and producers
    /// may still deliver.
    pub(crate) fn next(&self, timeout: Option<Duration>) -> Result<Record, NoInput> {
        let mut state = self.lock();
        if state.active && state.reader_active && state.items.is_empty() {
            let waiting =
                |state: &mut QueueState| state.active && state.reader_active && state.items.is_empty();
            match timeout {
                None => {
                    state = self
                        .ready
                        .wait_while(state, waiting)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(timeout) if !timeout.is_zero() => {
                    state = self
                        .ready
                        .wait_timeout_while(state, timeout, waiting)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                Some(_) => {}
            }
        }
        if state.active {
            if let Some(record) = state.items.pop_front() {
                trace!(queued = state.items.len(), "popped input");
                return Ok(record);
            }
        }
        Err(NoInput)
    }

    pub(crate) fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Producer-side liveness. A reader thread that finishes its streams
    /// hands back `keep_alive` so discovery-backed emitters stay open.
    pub(crate) fn set_reader_active(&self, reader_active: bool) {
        let mut state = self.lock();
        state.reader_active = reader_active;
        self.ready.notify_all();
    }

    pub(crate) fn shutdown(&self) {
        let mut state = self.lock();
        state.active = false;
        state.reader_active = false;
        self.ready.notify_all();
    }
}
