// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Introspection typesupport: member descriptions for named ROS 2 types.
//!
//! The cache resolves a type name to an iterable member description through
//! an [`IntrospectionProvider`]. The default provider,
//! [`LibraryIntrospection`], loads the per-package
//! `rosidl_typesupport_introspection_{c,cpp}` shared libraries;
//! [`StaticIntrospection`] serves descriptions from an in-memory table
//! (offline catalogs, fixtures).

mod ffi;

pub use ffi::LibraryIntrospection;

use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

// Member type ids as emitted by the rosidl introspection libraries.
pub const ROS_TYPE_FLOAT: u8 = 1;
pub const ROS_TYPE_DOUBLE: u8 = 2;
pub const ROS_TYPE_LONG_DOUBLE: u8 = 3;
pub const ROS_TYPE_CHAR: u8 = 4;
pub const ROS_TYPE_WCHAR: u8 = 5;
pub const ROS_TYPE_BOOLEAN: u8 = 6;
pub const ROS_TYPE_OCTET: u8 = 7;
pub const ROS_TYPE_UINT8: u8 = 8;
pub const ROS_TYPE_INT8: u8 = 9;
pub const ROS_TYPE_UINT16: u8 = 10;
pub const ROS_TYPE_INT16: u8 = 11;
pub const ROS_TYPE_UINT32: u8 = 12;
pub const ROS_TYPE_INT32: u8 = 13;
pub const ROS_TYPE_UINT64: u8 = 14;
pub const ROS_TYPE_INT64: u8 = 15;
pub const ROS_TYPE_STRING: u8 = 16;
pub const ROS_TYPE_WSTRING: u8 = 17;
pub const ROS_TYPE_MESSAGE: u8 = 18;

/// Errors raised while resolving introspection data.
#[derive(Debug, Error)]
pub enum TypeSupportError {
    #[error("no introspection library found for package {0}")]
    LibraryNotFound(String),

    #[error("introspection symbol not found: {0}")]
    MissingSymbol(String),

    #[error("null type support handle")]
    NullTypeSupport,

    #[error("null introspection member table")]
    NullMembers,

    #[error("introspection string is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("type not registered: {0}")]
    NotRegistered(String),
}

/// Description of a single message member, as reported by introspection.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberDescription {
    pub name: String,
    /// One of the `ROS_TYPE_*` ids.
    pub type_id: u8,
    /// Upper bound for string/wstring members; 0 means unbounded.
    pub string_upper_bound: usize,
    pub is_array: bool,
    /// Array dimension or sequence bound, depending on `is_upper_bound`.
    pub array_size: usize,
    pub is_upper_bound: bool,
    /// Nested description for `ROS_TYPE_MESSAGE` members.
    pub nested: Option<Box<TypeDescription>>,
}

impl MemberDescription {
    /// Plain (non-array, non-message) member with the given type id.
    pub fn basic(name: impl Into<String>, type_id: u8) -> Self {
        Self {
            name: name.into(),
            type_id,
            string_upper_bound: 0,
            is_array: false,
            array_size: 0,
            is_upper_bound: false,
            nested: None,
        }
    }

    /// Nested message member.
    pub fn message(name: impl Into<String>, nested: TypeDescription) -> Self {
        Self {
            nested: Some(Box::new(nested)),
            ..Self::basic(name, ROS_TYPE_MESSAGE)
        }
    }
}

/// Full member description of a message type.
///
/// `namespace` keeps the `__`-separated spelling used by the introspection
/// libraries (e.g. `std_msgs__msg`).
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescription {
    pub namespace: String,
    pub name: String,
    pub members: Vec<MemberDescription>,
}

impl TypeDescription {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        members: Vec<MemberDescription>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            members,
        }
    }
}

/// Source of member descriptions for named types.
pub trait IntrospectionProvider: Send {
    /// Resolve `(package, middle, type)` to a member description. `middle`
    /// may be empty, in which case the `msg` module is assumed.
    fn load(
        &mut self,
        package: &str,
        middle: &str,
        type_name: &str,
    ) -> Result<TypeDescription, TypeSupportError>;
}

/// In-memory provider keyed by `package/middle/Type`.
#[derive(Debug, Default)]
pub struct StaticIntrospection {
    types: HashMap<String, TypeDescription>,
}

impl StaticIntrospection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a description under its `package/middle/Type` key.
    pub fn register(&mut self, key: impl Into<String>, description: TypeDescription) -> &mut Self {
        self.types.insert(key.into(), description);
        self
    }
}

impl IntrospectionProvider for StaticIntrospection {
    fn load(
        &mut self,
        package: &str,
        middle: &str,
        type_name: &str,
    ) -> Result<TypeDescription, TypeSupportError> {
        let middle = if middle.is_empty() { "msg" } else { middle };
        let key = format!("{package}/{middle}/{type_name}");
        self.types
            .get(&key)
            .cloned()
            .ok_or(TypeSupportError::NotRegistered(key))
    }
}

/// Platform library search path, from `LD_LIBRARY_PATH` (Linux),
/// `DYLD_LIBRARY_PATH` (macOS) or `PATH` (Windows).
pub fn library_search_path() -> Vec<PathBuf> {
    let (var, separator) = if cfg!(target_os = "windows") {
        ("PATH", ';')
    } else if cfg!(target_os = "macos") {
        ("DYLD_LIBRARY_PATH", ':')
    } else {
        ("LD_LIBRARY_PATH", ':')
    };
    match std::env::var(var) {
        Ok(value) => value
            .split(separator)
            .filter(|entry| !entry.is_empty())
            .map(PathBuf::from)
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_provider_round_trip() {
        let mut provider = StaticIntrospection::new();
        provider.register(
            "std_msgs/msg/String",
            TypeDescription::new(
                "std_msgs__msg",
                "String",
                vec![MemberDescription::basic("data", ROS_TYPE_STRING)],
            ),
        );
        let desc = provider.load("std_msgs", "msg", "String").unwrap();
        assert_eq!(desc.name, "String");
        assert_eq!(desc.members.len(), 1);
        // Empty middle module defaults to msg.
        assert!(provider.load("std_msgs", "", "String").is_ok());
        assert!(matches!(
            provider.load("std_msgs", "msg", "Missing"),
            Err(TypeSupportError::NotRegistered(_))
        ));
    }
}
