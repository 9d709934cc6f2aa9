// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # typescan - DDS/ROS 2 type scraper
//!
//! Observes a publish/subscribe system and reports the structural type
//! definitions (typecodes) and topic bindings in use, in a canonical
//! interchange form independent of the middleware vendor or the language
//! that generated them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use typescan::cache::{CacheOptions, TypeCache};
//!
//! fn main() -> Result<(), typescan::cache::CacheError> {
//!     let cache = TypeCache::new(CacheOptions::default())?;
//!     let assertion = cache.assert_from_name("std_msgs/msg/String")?;
//!     for tc in &assertion.newly_added {
//!         println!("{}", typescan::idl::to_idl(tc));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! input emitters ──> type monitor ──> type cache ──> output emitter
//! (files, discovery)  (filtering)     (assertions)    (JSON records)
//! ```
//!
//! The [`cache::TypeCache`] owns all state: descriptors keyed by canonical
//! name, topic bindings, and the loaded introspection libraries. Everything
//! else is a pipeline stage over its contract.

/// Content-addressed registry of type descriptors and topic bindings.
pub mod cache;
/// Synthetic request/reply header descriptors.
pub mod headers;
/// IDL rendering of type descriptors.
pub mod idl;
/// Input emitters (files, discovery sources).
pub mod input;
/// Type monitor: the input-to-cache-to-output pipeline stage.
pub mod monitor;
/// Type-name parsing, mangling and demangling.
pub mod names;
/// Output emitters (delimited JSON-lines records).
pub mod output;
/// Structural type descriptors.
pub mod typecode;
/// Introspection typesupport loading.
pub mod typesupport;

pub use cache::{CacheError, CacheOptions, RequestReplyMapping, TypeCache};
pub use input::{DiscoveryInput, DiscoverySink, DiscoverySource, FileInput, FileInputOptions};
pub use monitor::{MonitorError, MonitorOptions, TypeMonitor};
pub use output::{JsonOutput, OutputOptions};
pub use typecode::{Bound, Member, PrimitiveKind, TypeCode};
