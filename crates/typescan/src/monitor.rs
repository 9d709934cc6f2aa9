// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type monitor: drains an input emitter, filters type names, asserts them
//! into the cache and forwards new descriptors to the output emitter.
//!
//! Records are independent: a malformed name or a conflicting assertion is
//! logged and the stream continues. Only output failures are fatal.

use crate::cache::{CacheError, CacheOptions, TypeAssertion, TypeCache};
use crate::input::{InputEmitter, InputError, Record};
use crate::names::{demangle_dds_type_name, normalize};
use crate::output::{OutputEmitter, OutputError};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, error, info, trace};

/// Monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Admit names that fail demangling (raw vendor types).
    pub include_non_ros: bool,
    /// Full-match filter applied to the demangled ROS name.
    pub type_filter: String,
    /// Full-match filter applied to the on-wire name first.
    pub raw_type_filter: String,
    pub cache: CacheOptions,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            include_non_ros: true,
            type_filter: ".*".to_string(),
            raw_type_filter: ".*".to_string(),
            cache: CacheOptions::default(),
        }
    }
}

/// Errors raised while constructing or running a monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid filter expression: {0}")]
    Filter(#[from] regex::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Pipeline stage connecting input emitters to the type cache and the
/// output emitter.
pub struct TypeMonitor {
    options: MonitorOptions,
    input: Box<dyn InputEmitter>,
    output: Box<dyn OutputEmitter>,
    cache: TypeCache,
    type_filter: Regex,
    raw_type_filter: Regex,
}

impl TypeMonitor {
    /// Monitor over a cache backed by the dynamic introspection loader.
    pub fn new(
        input: Box<dyn InputEmitter>,
        output: Box<dyn OutputEmitter>,
        options: MonitorOptions,
    ) -> Result<Self, MonitorError> {
        let cache = TypeCache::new(options.cache.clone())?;
        Self::with_cache(input, output, cache, options)
    }

    /// Monitor over an explicitly constructed cache.
    pub fn with_cache(
        input: Box<dyn InputEmitter>,
        output: Box<dyn OutputEmitter>,
        cache: TypeCache,
        options: MonitorOptions,
    ) -> Result<Self, MonitorError> {
        debug!(type_filter = %options.type_filter, raw_type_filter = %options.raw_type_filter, "monitor filters");
        let type_filter = Regex::new(&options.type_filter)?;
        let raw_type_filter = Regex::new(&options.raw_type_filter)?;
        Ok(Self {
            options,
            input,
            output,
            cache,
            type_filter,
            raw_type_filter,
        })
    }

    pub fn cache(&self) -> &TypeCache {
        &self.cache
    }

    /// Open the output, then the input.
    pub fn start(&self) -> Result<(), MonitorError> {
        self.output.open()?;
        self.input.open()?;
        Ok(())
    }

    /// Close the emitters in reverse construction order.
    pub fn stop(&self) {
        self.output.close();
        self.input.close();
    }

    /// Drain the input stream to quiescence.
    ///
    /// Returns when the input is exhausted or closed. Per-record failures
    /// are logged and skipped; output failures abort.
    pub fn consume_input(&self) -> Result<(), MonitorError> {
        info!("consuming input...");
        while self.input.is_active() {
            trace!("waiting for next input...");
            let record = match self.input.next() {
                Ok(record) => record,
                Err(_) => {
                    debug!("input stream exhausted");
                    break;
                }
            };
            debug!(
                topic = %record.topic_name,
                type_name = %record.type_name,
                has_typecode = record.typecode.is_some(),
                ">>> input"
            );
            match self.dispatch(&record) {
                Ok(()) => {}
                Err(MonitorError::Cache(CacheError::Name(err))) => {
                    debug!(
                        topic = %record.topic_name,
                        type_name = %record.type_name,
                        %err,
                        "xxx invalid"
                    );
                }
                Err(MonitorError::Output(err)) => {
                    error!(%err, "output failure");
                    return Err(MonitorError::Output(err));
                }
                Err(err) => {
                    error!(
                        topic = %record.topic_name,
                        type_name = %record.type_name,
                        %err,
                        "assertion failed"
                    );
                }
            }
        }
        debug!("consumed all input");
        Ok(())
    }

    fn full_match(filter: &Regex, name: &str) -> bool {
        filter
            .find(name)
            .is_some_and(|m| m.start() == 0 && m.end() == name.len())
    }

    /// Apply the raw filter to the on-wire name, then the ROS filter to the
    /// demangled form. Non-ROS names pass iff `include_non_ros` is set.
    fn filter_type_name(&self, type_fqname: &str) -> bool {
        let mut detected = Self::full_match(&self.raw_type_filter, type_fqname);
        let mut ros_name = type_fqname.to_string();
        if detected {
            match demangle_dds_type_name(type_fqname) {
                Ok(demangled) => {
                    ros_name = demangled;
                    detected = Self::full_match(&self.type_filter, &ros_name);
                }
                Err(_) => {
                    debug!(type_name = %type_fqname, "--- not ros");
                    detected = self.options.include_non_ros;
                }
            }
        }
        if detected {
            debug!(type_name = %ros_name, "vvv detected");
        } else {
            debug!(type_name = %ros_name, "xxx filtered");
        }
        detected
    }

    fn dispatch(&self, record: &Record) -> Result<(), MonitorError> {
        let has_topic = !record.topic_name.is_empty();
        let filter_name = if !record.type_name.is_empty() {
            record.type_name.clone()
        } else if let Some(tc) = &record.typecode {
            tc.name().unwrap_or_default().to_string()
        } else {
            if has_topic {
                error!(topic = %record.topic_name, "xxx no type");
            } else {
                debug!("xxx empty input received");
            }
            return Ok(());
        };
        if filter_name.is_empty() || !self.filter_type_name(&filter_name) {
            return Ok(());
        }

        let (new_topic, types) = match &record.typecode {
            Some(tc) => {
                // A typecode that fails demangling is asserted as a raw
                // (non-ROS) descriptor.
                let (ros_type, demangled) = match normalize(&filter_name)
                    .and_then(|normalized| demangle_dds_type_name(&normalized))
                {
                    Ok(demangled) => (true, demangled),
                    Err(_) => (false, String::new()),
                };
                if has_topic {
                    trace!(topic = %record.topic_name, type_name = %filter_name, ros_type, "+++ assert typecode topic");
                    let assertion = self.cache.assert_topic_from_typecode(
                        &record.topic_name,
                        tc,
                        ros_type,
                        &demangled,
                    )?;
                    (assertion.is_new_topic, assertion.types)
                } else {
                    trace!(type_name = %filter_name, ros_type, "+++ assert typecode");
                    (false, self.cache.assert_from_typecode(tc, ros_type, &demangled)?)
                }
            }
            None => {
                if has_topic {
                    trace!(topic = %record.topic_name, type_name = %filter_name, "+++ assert topic");
                    let assertion = self
                        .cache
                        .assert_topic_from_name(&record.topic_name, &filter_name)?;
                    (assertion.is_new_topic, assertion.types)
                } else {
                    trace!(type_name = %filter_name, "+++ assert type");
                    (false, self.cache.assert_from_name(&filter_name)?)
                }
            }
        };

        self.emit(record, has_topic, new_topic, &types)?;
        Ok(())
    }

    fn emit(
        &self,
        record: &Record,
        has_topic: bool,
        new_topic: bool,
        types: &TypeAssertion,
    ) -> Result<(), MonitorError> {
        for tc in &types.newly_added {
            info!(type_name = ?tc.name(), "+++ asserted");
            self.output.emit_type(tc)?;
        }
        for tc in &types.already_present {
            debug!(type_name = ?tc.name(), "--- cached");
        }
        if has_topic {
            if new_topic {
                info!(topic = %record.topic_name, type_name = ?types.root.name(), "+++ asserted topic");
                self.output.emit_topic(&record.topic_name, &types.root)?;
            } else {
                debug!(topic = %record.topic_name, type_name = ?types.root.name(), "--- cached topic");
            }
        }
        Ok(())
    }
}
