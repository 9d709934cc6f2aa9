// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type-name utilities.
//!
//! ROS 2 types appear on the wire under a "mangled" DDS name
//! (`pkg::msg::dds_::Type_`) and are referred to in ROS tooling under a
//! "demangled" slash form (`pkg/msg/Type`). The cache keys both through
//! [`normalize`], which produces the canonical `pkg::msg::Type` spelling.

use thiserror::Error;

/// Errors raised while parsing or transforming type names.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("empty type name")]
    Empty,

    #[error("invalid ROS 2 type name: {0}")]
    InvalidRosName(String),

    #[error("invalid ROS 2 DDS type name: {0}")]
    InvalidDdsName(String),
}

/// Canonicalize a DDS type name.
///
/// Collapses `__` into `::`, strips a single trailing `_`, rewrites the
/// `dds_` pseudo-namespace into `dds` and then removes it entirely:
/// `std_msgs::msg::dds_::String_` becomes `std_msgs::msg::String`.
pub fn normalize(type_fqname: &str) -> Result<String, NameError> {
    if type_fqname.is_empty() {
        return Err(NameError::Empty);
    }
    let mut name = type_fqname.replace("__", "::");
    if let Some(stripped) = name.strip_suffix('_') {
        name = stripped.to_string();
    }
    Ok(name.replace("::dds_::", "::dds::").replace("::dds::", "::"))
}

/// Split a ROS type name into `(package, middle, type)`.
///
/// Accepts both slash and `__` separated spellings; the middle module may be
/// empty (`pkg/Type`), but package and type must be present.
pub fn parse_ros_type_name(type_fqname: &str) -> Result<(String, String, String), NameError> {
    let mut name = type_fqname.replace("__", "/");
    if let Some(stripped) = name.strip_suffix('_') {
        name = stripped.to_string();
    }
    let first = name.find('/');
    let last = name.rfind('/');
    let (first, last) = match (first, last) {
        (Some(f), Some(l)) if l != 0 && l != name.len() - 1 => (f, l),
        _ => return Err(NameError::InvalidRosName(type_fqname.to_string())),
    };
    let package = name[..first].to_string();
    let middle = if last > first {
        name[first + 1..last].to_string()
    } else {
        String::new()
    };
    let type_name = name[last + 1..].to_string();
    Ok((package, middle, type_name))
}

fn count_separators(name: &str) -> (usize, usize) {
    let mut count = 0;
    let mut first = usize::MAX;
    let mut pos = 0;
    while let Some(found) = name[pos..].find("::") {
        let at = pos + found;
        if count == 0 {
            first = at;
        }
        count += 1;
        pos = at + 2;
    }
    (count, first)
}

/// Convert a DDS type name to the slash-separated ROS form.
///
/// A name already in slash form passes through (after validation), a name in
/// canonical `pkg::(msg|srv)::Type` shape maps directly, and otherwise the
/// rightmost `::dds_::`/`::dds::` marker is located and the surrounding
/// segments are reassembled. Names matching no convention are rejected so
/// callers can treat them as raw (non-ROS) types.
pub fn demangle_dds_type_name(dds_type_name: &str) -> Result<String, NameError> {
    if dds_type_name.contains('/') {
        parse_ros_type_name(dds_type_name)?;
        return Ok(dds_type_name.to_string());
    }

    let (sep_count, first_sep) = count_separators(dds_type_name);
    if sep_count == 2
        && (dds_type_name[first_sep..].starts_with("::msg::")
            || dds_type_name[first_sep..].starts_with("::srv::"))
    {
        return Ok(dds_type_name.replace("::", "/"));
    }

    let (prefix_pos, prefix_len) = match dds_type_name.rfind("::dds_::") {
        Some(pos) => (pos, "::dds_::".len()),
        None => match dds_type_name.rfind("::dds::") {
            Some(pos) => (pos, "::dds::".len()),
            None => return Err(NameError::InvalidDdsName(dds_type_name.to_string())),
        },
    };
    // No further namespace separators may follow the dds marker.
    if dds_type_name.rfind("::") != Some(prefix_pos + prefix_len - 2) {
        return Err(NameError::InvalidDdsName(dds_type_name.to_string()));
    }

    let mut type_name = &dds_type_name[prefix_pos + prefix_len..];
    if let Some(stripped) = type_name.strip_suffix('_') {
        type_name = stripped;
    }
    if type_name.is_empty() {
        return Err(NameError::InvalidDdsName(dds_type_name.to_string()));
    }

    let mut out = String::new();
    for segment in dds_type_name[..prefix_pos].split("::") {
        out.push_str(segment);
        out.push('/');
    }
    out.push_str(type_name);
    Ok(out)
}

/// Produce the mangled DDS spelling of a type name.
///
/// Canonical names (`pkg::msg::Type`) become `pkg::msg::dds_::Type_`; a name
/// that is not in canonical form is assumed to be mangled already and passes
/// through unchanged.
pub fn mangle_dds_type_name(type_fqname: &str) -> Result<String, NameError> {
    if normalize(type_fqname)? == type_fqname {
        let ros_name = demangle_dds_type_name(type_fqname)?;
        let (package, middle, type_name) = parse_ros_type_name(&ros_name)?;
        Ok(format!("{package}::{middle}::dds_::{type_name}_"))
    } else {
        Ok(type_fqname.to_string())
    }
}

/// Mangle a struct member name. Legacy RMW compatibility appends a trailing
/// underscore when one is not already present.
pub fn mangle_member_name(member_name: &str, legacy_rmw_compatible: bool) -> String {
    if legacy_rmw_compatible && !member_name.ends_with('_') {
        format!("{member_name}_")
    } else {
        member_name.to_string()
    }
}

/// Demangle a struct member name by stripping a single trailing underscore.
pub fn demangle_member_name(member_name: &str) -> String {
    member_name
        .strip_suffix('_')
        .unwrap_or(member_name)
        .to_string()
}

/// Build the DDS type name for an introspected message.
///
/// `namespace` uses the `__` separators produced by the introspection
/// libraries (e.g. `std_msgs__msg`).
pub fn create_dds_type_name(namespace: &str, name: &str, mangle: bool) -> String {
    let ns = namespace.replace("__", "::");
    let (dds_ns, suffix) = if mangle { ("dds_", "_") } else { ("dds", "") };
    if ns.is_empty() {
        format!("{dds_ns}::{name}{suffix}")
    } else {
        format!("{ns}::{dds_ns}::{name}{suffix}")
    }
}

/// Detect request/reply polarity from a type-name suffix.
///
/// Returns `(is_request_reply, is_request)`.
pub fn is_request_reply(type_fqname: &str) -> (bool, bool) {
    if type_fqname.ends_with("Request_") || type_fqname.ends_with("Request") {
        (true, true)
    } else if type_fqname.ends_with("Response_") || type_fqname.ends_with("Response") {
        (true, false)
    } else {
        (false, false)
    }
}
