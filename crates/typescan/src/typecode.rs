// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory structural type descriptors.
//!
//! A [`TypeCode`] is an immutable tree describing a data type. Nodes are
//! shared through `Arc` handles; the cache owns the stored instances and
//! everything reachable from them. Structural equality (`PartialEq`) compares
//! kind, names, bounds and ordered members recursively.

use crate::names::{
    demangle_member_name, mangle_dds_type_name, mangle_member_name, normalize, NameError,
};
use std::sync::{Arc, OnceLock};

/// Primitive type kinds. One canonical instance exists per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum PrimitiveKind {
    Bool = 0,
    Octet,
    Char,
    Short,
    UShort,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Float,
    Double,
}

impl PrimitiveKind {
    const COUNT: usize = 11;

    const ALL: [PrimitiveKind; Self::COUNT] = [
        PrimitiveKind::Bool,
        PrimitiveKind::Octet,
        PrimitiveKind::Char,
        PrimitiveKind::Short,
        PrimitiveKind::UShort,
        PrimitiveKind::Long,
        PrimitiveKind::ULong,
        PrimitiveKind::LongLong,
        PrimitiveKind::ULongLong,
        PrimitiveKind::Float,
        PrimitiveKind::Double,
    ];

    /// IDL spelling of the primitive.
    pub fn idl_name(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "boolean",
            PrimitiveKind::Octet => "octet",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Short => "short",
            PrimitiveKind::UShort => "unsigned short",
            PrimitiveKind::Long => "long",
            PrimitiveKind::ULong => "unsigned long",
            PrimitiveKind::LongLong => "long long",
            PrimitiveKind::ULongLong => "unsigned long long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
        }
    }
}

/// Length bound of a string, wstring or sequence.
///
/// `Unbounded` is distinct from every finite bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bound {
    Unbounded,
    Limit(u32),
}

/// A named struct (or value type) member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub ty: Arc<TypeCode>,
}

impl Member {
    pub fn new(name: impl Into<String>, ty: Arc<TypeCode>) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A single enumeration label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumLabel {
    pub name: String,
    pub value: i32,
}

impl EnumLabel {
    pub fn new(name: impl Into<String>, value: i32) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A union case. A case with no labels is the default case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionCase {
    pub name: String,
    pub labels: Vec<i64>,
    pub ty: Arc<TypeCode>,
}

/// Structural type descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeCode {
    Primitive(PrimitiveKind),
    String {
        bound: Bound,
    },
    WString {
        bound: Bound,
    },
    Sequence {
        bound: Bound,
        element: Arc<TypeCode>,
    },
    Array {
        dimensions: Vec<u32>,
        element: Arc<TypeCode>,
    },
    Struct {
        name: String,
        members: Vec<Member>,
    },
    Enum {
        name: String,
        labels: Vec<EnumLabel>,
    },
    Union {
        name: String,
        discriminator: Arc<TypeCode>,
        cases: Vec<UnionCase>,
    },
    Value {
        name: String,
        base: Option<Arc<TypeCode>>,
        members: Vec<Member>,
    },
}

impl TypeCode {
    /// Canonical shared instance for a primitive kind.
    pub fn primitive(kind: PrimitiveKind) -> Arc<TypeCode> {
        static CANONICAL: OnceLock<Vec<Arc<TypeCode>>> = OnceLock::new();
        let table = CANONICAL.get_or_init(|| {
            PrimitiveKind::ALL
                .iter()
                .map(|&k| Arc::new(TypeCode::Primitive(k)))
                .collect()
        });
        Arc::clone(&table[kind as usize])
    }

    pub fn string(bound: Bound) -> Arc<TypeCode> {
        Arc::new(TypeCode::String { bound })
    }

    pub fn wstring(bound: Bound) -> Arc<TypeCode> {
        Arc::new(TypeCode::WString { bound })
    }

    pub fn sequence(bound: Bound, element: Arc<TypeCode>) -> Arc<TypeCode> {
        Arc::new(TypeCode::Sequence { bound, element })
    }

    pub fn array(dimensions: Vec<u32>, element: Arc<TypeCode>) -> Arc<TypeCode> {
        Arc::new(TypeCode::Array {
            dimensions,
            element,
        })
    }

    pub fn structure(name: impl Into<String>, members: Vec<Member>) -> Arc<TypeCode> {
        Arc::new(TypeCode::Struct {
            name: name.into(),
            members,
        })
    }

    pub fn enumeration(name: impl Into<String>, labels: Vec<EnumLabel>) -> Arc<TypeCode> {
        Arc::new(TypeCode::Enum {
            name: name.into(),
            labels,
        })
    }

    pub fn union_type(
        name: impl Into<String>,
        discriminator: Arc<TypeCode>,
        cases: Vec<UnionCase>,
    ) -> Arc<TypeCode> {
        Arc::new(TypeCode::Union {
            name: name.into(),
            discriminator,
            cases,
        })
    }

    pub fn value_type(
        name: impl Into<String>,
        base: Option<Arc<TypeCode>>,
        members: Vec<Member>,
    ) -> Arc<TypeCode> {
        Arc::new(TypeCode::Value {
            name: name.into(),
            base,
            members,
        })
    }

    /// Name of a named kind (struct, enum, union, value).
    pub fn name(&self) -> Option<&str> {
        match self {
            TypeCode::Struct { name, .. }
            | TypeCode::Enum { name, .. }
            | TypeCode::Union { name, .. }
            | TypeCode::Value { name, .. } => Some(name),
            _ => None,
        }
    }

    /// True for the complex kinds that are cached under their own name.
    pub fn is_complex(&self) -> bool {
        matches!(
            self,
            TypeCode::Struct { .. }
                | TypeCode::Enum { .. }
                | TypeCode::Union { .. }
                | TypeCode::Value { .. }
        )
    }

    /// Ordered members of a struct or value type (empty otherwise).
    pub fn members(&self) -> &[Member] {
        match self {
            TypeCode::Struct { members, .. } | TypeCode::Value { members, .. } => members,
            _ => &[],
        }
    }

    /// Iterate `(index, name, type)` over the members of a struct or value.
    pub fn walk_members(&self) -> impl Iterator<Item = (usize, &str, &Arc<TypeCode>)> {
        self.members()
            .iter()
            .enumerate()
            .map(|(i, m)| (i, m.name.as_str(), &m.ty))
    }

    /// Resolve the non-collection content type of a sequence or array,
    /// walking through nested collections. Returns `None` for
    /// non-collection kinds.
    pub fn collection_content(&self) -> Option<&Arc<TypeCode>> {
        let mut element = match self {
            TypeCode::Sequence { element, .. } | TypeCode::Array { element, .. } => element,
            _ => return None,
        };
        loop {
            match element.as_ref() {
                TypeCode::Sequence { element: inner, .. }
                | TypeCode::Array { element: inner, .. } => element = inner,
                _ => return Some(element),
            }
        }
    }

}

type MakeNameFn<'a> = &'a dyn Fn(&str) -> Result<String, NameError>;
type MakeMemberNameFn<'a> = &'a dyn Fn(&str) -> String;

/// Return a mangled copy of a struct descriptor.
///
/// Struct names are rewritten to the `pkg::middle::dds_::Type_` form, member
/// names gain a trailing underscore when `legacy_rmw_compatible` is set, and
/// nested structs (including the content types of collections) are rewritten
/// recursively. The input is not modified; the caller owns the result.
pub fn mangle_typecode(
    tc: &Arc<TypeCode>,
    legacy_rmw_compatible: bool,
) -> Result<Arc<TypeCode>, NameError> {
    transform_struct(
        tc,
        &|name| mangle_dds_type_name(name),
        &move |member| mangle_member_name(member, legacy_rmw_compatible),
    )
}

/// Exact dual of [`mangle_typecode`]: canonical struct names, member names
/// stripped of a single trailing underscore.
pub fn demangle_typecode(tc: &Arc<TypeCode>) -> Result<Arc<TypeCode>, NameError> {
    transform_struct(tc, &normalize, &demangle_member_name)
}

fn transform_struct(
    tc: &Arc<TypeCode>,
    make_name: MakeNameFn<'_>,
    make_member_name: MakeMemberNameFn<'_>,
) -> Result<Arc<TypeCode>, NameError> {
    let TypeCode::Struct { name, members } = tc.as_ref() else {
        // Only struct descriptors carry ROS names; everything else is reused.
        return Ok(Arc::clone(tc));
    };
    let new_name = make_name(name)?;
    let mut new_members = Vec::with_capacity(members.len());
    for member in members {
        let ty = transform_member_type(&member.ty, make_name, make_member_name)?;
        new_members.push(Member::new(make_member_name(&member.name), ty));
    }
    Ok(TypeCode::structure(new_name, new_members))
}

fn transform_member_type(
    ty: &Arc<TypeCode>,
    make_name: MakeNameFn<'_>,
    make_member_name: MakeMemberNameFn<'_>,
) -> Result<Arc<TypeCode>, NameError> {
    match ty.as_ref() {
        TypeCode::Struct { .. } => transform_struct(ty, make_name, make_member_name),
        TypeCode::Sequence { bound, element } => {
            let element = transform_member_type(element, make_name, make_member_name)?;
            Ok(TypeCode::sequence(*bound, element))
        }
        TypeCode::Array {
            dimensions,
            element,
        } => {
            let element = transform_member_type(element, make_name, make_member_name)?;
            Ok(TypeCode::array(dimensions.clone(), element))
        }
        // Primitives and strings are singletons or bound-only nodes.
        _ => Ok(Arc::clone(ty)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_struct(name: &str, member: &str) -> Arc<TypeCode> {
        TypeCode::structure(
            name,
            vec![
                Member::new(member, TypeCode::primitive(PrimitiveKind::Double)),
                Member::new("tags", TypeCode::string(Bound::Unbounded)),
            ],
        )
    }

    #[test]
    fn primitives_are_canonical() {
        let a = TypeCode::primitive(PrimitiveKind::Long);
        let b = TypeCode::primitive(PrimitiveKind::Long);
        assert!(Arc::ptr_eq(&a, &b));
        assert_ne!(a, TypeCode::primitive(PrimitiveKind::ULong));
    }

    #[test]
    fn structural_equality_is_deep() {
        let a = point_struct("geo::msg::Point", "x");
        let b = point_struct("geo::msg::Point", "x");
        let c = point_struct("geo::msg::Point", "y");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn member_order_is_identity() {
        let x = Member::new("x", TypeCode::primitive(PrimitiveKind::Long));
        let y = Member::new("y", TypeCode::primitive(PrimitiveKind::Long));
        let a = TypeCode::structure("ns::A", vec![x.clone(), y.clone()]);
        let b = TypeCode::structure("ns::A", vec![y, x]);
        assert_ne!(a, b);
    }

    #[test]
    fn bounds_are_distinct() {
        assert_ne!(
            TypeCode::string(Bound::Unbounded),
            TypeCode::string(Bound::Limit(255))
        );
        assert_ne!(
            TypeCode::string(Bound::Limit(255)),
            TypeCode::string(Bound::Limit(256))
        );
    }

    #[test]
    fn collection_content_resolves_nesting() {
        let leaf = point_struct("geo::msg::Point", "x");
        let seq = TypeCode::sequence(
            Bound::Unbounded,
            TypeCode::array(vec![4], Arc::clone(&leaf)),
        );
        let content = seq.collection_content().unwrap();
        assert!(Arc::ptr_eq(content, &leaf));
        assert!(leaf.collection_content().is_none());
    }

    #[test]
    fn mangle_renames_struct_and_members() {
        let tc = point_struct("geo::msg::Point", "x");
        let mangled = mangle_typecode(&tc, true).unwrap();
        assert_eq!(mangled.name(), Some("geo::msg::dds_::Point_"));
        let names: Vec<_> = mangled.walk_members().map(|(_, n, _)| n).collect();
        assert_eq!(names, vec!["x_", "tags_"]);
    }

    #[test]
    fn mangle_rewrites_collection_content() {
        let nested = point_struct("geo::msg::Point", "x");
        let tc = TypeCode::structure(
            "geo::msg::Path",
            vec![Member::new(
                "points",
                TypeCode::sequence(Bound::Limit(16), nested),
            )],
        );
        let mangled = mangle_typecode(&tc, false).unwrap();
        let member = &mangled.members()[0];
        let TypeCode::Sequence { bound, element } = member.ty.as_ref() else {
            panic!("expected sequence member");
        };
        assert_eq!(*bound, Bound::Limit(16));
        assert_eq!(element.name(), Some("geo::msg::dds_::Point_"));
    }

    #[test]
    fn transform_round_trip() {
        let mangled = TypeCode::structure(
            "geo::msg::dds_::Pose_",
            vec![
                Member::new("x_", TypeCode::primitive(PrimitiveKind::Double)),
                Member::new(
                    "history_",
                    TypeCode::sequence(
                        Bound::Unbounded,
                        TypeCode::structure(
                            "geo::msg::dds_::Point_",
                            vec![Member::new("x_", TypeCode::primitive(PrimitiveKind::Double))],
                        ),
                    ),
                ),
            ],
        );
        let demangled = demangle_typecode(&mangled).unwrap();
        assert_eq!(demangled.name(), Some("geo::msg::Pose"));
        let remangled = mangle_typecode(&demangled, true).unwrap();
        assert_eq!(remangled, mangled);
    }
}
