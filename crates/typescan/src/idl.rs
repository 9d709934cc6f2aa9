// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! IDL rendering of type descriptors.
//!
//! Each cached descriptor is printed as a single top-level declaration with
//! its fully qualified name; nested complex types are referenced by name
//! (they are emitted as records of their own).

use crate::typecode::{Bound, TypeCode};
use std::fmt::Write;

const INDENT: &str = "    ";

/// Render a descriptor as an IDL declaration.
pub fn to_idl(tc: &TypeCode) -> String {
    let mut out = String::new();
    match tc {
        TypeCode::Struct { name, members } => {
            let _ = writeln!(out, "struct {name} {{");
            for member in members {
                let _ = writeln!(out, "{INDENT}{};", member_decl(&member.name, &member.ty));
            }
            out.push_str("};");
        }
        TypeCode::Enum { name, labels } => {
            let _ = writeln!(out, "enum {name} {{");
            for (i, label) in labels.iter().enumerate() {
                let separator = if i + 1 < labels.len() { "," } else { "" };
                let _ = writeln!(out, "{INDENT}{}{separator}", label.name);
            }
            out.push_str("};");
        }
        TypeCode::Union {
            name,
            discriminator,
            cases,
        } => {
            let _ = writeln!(out, "union {name} switch ({}) {{", type_spec(discriminator));
            for case in cases {
                if case.labels.is_empty() {
                    let _ = writeln!(out, "{INDENT}default:");
                } else {
                    for label in &case.labels {
                        let _ = writeln!(out, "{INDENT}case {label}:");
                    }
                }
                let _ = writeln!(out, "{INDENT}{INDENT}{};", member_decl(&case.name, &case.ty));
            }
            out.push_str("};");
        }
        TypeCode::Value {
            name,
            base,
            members,
        } => {
            match base.as_ref().and_then(|b| b.name()) {
                Some(base_name) => {
                    let _ = writeln!(out, "valuetype {name} : {base_name} {{");
                }
                None => {
                    let _ = writeln!(out, "valuetype {name} {{");
                }
            }
            for member in members {
                let _ = writeln!(
                    out,
                    "{INDENT}public {};",
                    member_decl(&member.name, &member.ty)
                );
            }
            out.push_str("};");
        }
        other => out.push_str(&type_spec(other)),
    }
    out
}

/// Member declaration: `<type> <name>` with array dimensions appended.
fn member_decl(name: &str, ty: &TypeCode) -> String {
    if let TypeCode::Array {
        dimensions,
        element,
    } = ty
    {
        let mut decl = format!("{} {name}", type_spec(element));
        for dimension in dimensions {
            let _ = write!(decl, "[{dimension}]");
        }
        decl
    } else {
        format!("{} {name}", type_spec(ty))
    }
}

fn type_spec(ty: &TypeCode) -> String {
    match ty {
        TypeCode::Primitive(kind) => kind.idl_name().to_string(),
        TypeCode::String { bound } => bounded("string", *bound),
        TypeCode::WString { bound } => bounded("wstring", *bound),
        TypeCode::Sequence { bound, element } => match bound {
            Bound::Unbounded => format!("sequence<{}>", type_spec(element)),
            Bound::Limit(limit) => format!("sequence<{}, {limit}>", type_spec(element)),
        },
        TypeCode::Array {
            dimensions,
            element,
        } => {
            // Anonymous array spelling, used when an array appears outside a
            // member declaration.
            let mut out = type_spec(element);
            for dimension in dimensions {
                let _ = write!(out, "[{dimension}]");
            }
            out
        }
        TypeCode::Struct { name, .. }
        | TypeCode::Enum { name, .. }
        | TypeCode::Union { name, .. }
        | TypeCode::Value { name, .. } => name.clone(),
    }
}

fn bounded(base: &str, bound: Bound) -> String {
    match bound {
        Bound::Unbounded => base.to_string(),
        Bound::Limit(limit) => format!("{base}<{limit}>"),
    }
}
