// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery-backed input.
//!
//! A [`DiscoverySource`] wraps a middleware's built-in subscription and
//! publication readers: once attached it pushes one record per discovered
//! endpoint through its [`DiscoverySink`], from whatever thread the
//! middleware dispatches on. [`DiscoveryInput`] bridges any number of
//! sources (plus the usual input files) into a single consumer stream that
//! stays open while a source is attached.

use super::{FileInput, FileInputOptions, InputEmitter, InputError, InputQueue, NoInput, Record};
use crate::typecode::TypeCode;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::info;

/// Producer-side handle used by discovery callbacks to queue endpoints.
#[derive(Clone)]
pub struct DiscoverySink {
    queue: Arc<InputQueue>,
}

impl DiscoverySink {
    /// Queue a discovered endpoint. `topic_name` may be empty for type-only
    /// announcements; `type_name` may be empty when a typecode is supplied.
    pub fn push(&self, topic_name: &str, type_name: &str, typecode: Option<Arc<TypeCode>>) {
        self.queue.push(Record {
            topic_name: topic_name.to_string(),
            type_name: type_name.to_string(),
            typecode,
        });
    }
}

/// A live endpoint feed, typically one per monitored domain.
pub trait DiscoverySource: Send {
    /// Human-readable identity for logging (e.g. `domain 0`).
    fn describe(&self) -> String;

    /// Start delivering endpoint records through `sink`.
    fn attach(&mut self, sink: DiscoverySink) -> Result<(), InputError>;

    /// Stop delivering records. Called once during shutdown.
    fn detach(&mut self);

    /// Whether the underlying domain is still up.
    fn is_up(&self) -> bool;
}

/// Input emitter combining discovery sources with file input.
///
/// With at least one source attached the stream stays active after all
/// files are drained; a blocking `next` then waits for live endpoints until
/// `close` is called.
pub struct DiscoveryInput {
    files: FileInput,
    sources: Mutex<Vec<Box<dyn DiscoverySource>>>,
}

impl DiscoveryInput {
    pub fn new(file_options: FileInputOptions, sources: Vec<Box<dyn DiscoverySource>>) -> Self {
        let keep_alive = !sources.is_empty();
        Self {
            files: FileInput::with_keep_alive(file_options, keep_alive),
            sources: Mutex::new(sources),
        }
    }
}

impl InputEmitter for DiscoveryInput {
    fn open(&self) -> Result<(), InputError> {
        let sink = DiscoverySink {
            queue: Arc::clone(self.files.queue()),
        };
        for source in self
            .sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter_mut()
        {
            info!("attaching discovery source: {}", source.describe());
            source.attach(sink.clone())?;
        }
        self.files.open()
    }

    fn close(&self) {
        for source in self
            .sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter_mut()
        {
            source.detach();
        }
        self.files.close();
    }

    fn is_active(&self) -> bool {
        self.files.is_active()
    }

    fn next(&self) -> Result<Record, NoInput> {
        self.files.next()
    }

    fn next_timeout(&self, timeout: Duration) -> Result<Record, NoInput> {
        self.files.next_timeout(timeout)
    }
}
