// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Content-addressed registry of type descriptors and topic bindings.
//!
//! The cache is the sole owner of every stored descriptor. Assertions intern
//! the incoming tree bottom-up: every nested complex node is looked up under
//! its canonical name and either re-used (structural equality required) or
//! inserted, so a stored tree always references the cache's own instances.
//! All state lives behind a single mutex.

use crate::headers;
use crate::names::{
    create_dds_type_name, demangle_dds_type_name, is_request_reply, mangle_dds_type_name,
    mangle_member_name, normalize, parse_ros_type_name, NameError,
};
use crate::typecode::{
    demangle_typecode, mangle_typecode, Bound, Member, PrimitiveKind, TypeCode, UnionCase,
};
use crate::typesupport::{
    IntrospectionProvider, LibraryIntrospection, MemberDescription, TypeDescription,
    TypeSupportError, ROS_TYPE_BOOLEAN, ROS_TYPE_CHAR, ROS_TYPE_DOUBLE, ROS_TYPE_FLOAT,
    ROS_TYPE_INT16, ROS_TYPE_INT32, ROS_TYPE_INT64, ROS_TYPE_INT8, ROS_TYPE_MESSAGE,
    ROS_TYPE_OCTET, ROS_TYPE_STRING, ROS_TYPE_UINT16, ROS_TYPE_UINT32, ROS_TYPE_UINT64,
    ROS_TYPE_UINT8, ROS_TYPE_WSTRING,
};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::trace;

/// How request and reply samples are correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestReplyMapping {
    /// Inline header member prepended to the payload.
    Basic,
    /// Correlation through sample metadata; no payload header.
    #[default]
    Extended,
}

impl FromStr for RequestReplyMapping {
    type Err = CacheError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "basic" | "b" => Ok(RequestReplyMapping::Basic),
            "extended" | "e" => Ok(RequestReplyMapping::Extended),
            _ => Err(CacheError::InvalidConfig(format!(
                "invalid request/reply mapping: {value}"
            ))),
        }
    }
}

impl fmt::Display for RequestReplyMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestReplyMapping::Basic => write!(f, "basic"),
            RequestReplyMapping::Extended => write!(f, "extended"),
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Store types under demangled names (strip wire mangling at ingress).
    pub demangle_ros_names: bool,
    /// Add the CycloneDDS inline header to request/reply types.
    pub cyclone_compatible: bool,
    /// Store member names with a trailing underscore.
    pub legacy_rmw_compatible: bool,
    pub request_reply_mapping: RequestReplyMapping,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            demangle_ros_names: true,
            cyclone_compatible: false,
            legacy_rmw_compatible: false,
            request_reply_mapping: RequestReplyMapping::default(),
        }
    }
}

/// Errors raised by cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),

    #[error("conflict detected for asserted typecode: {0}")]
    TypeConflict(String),

    #[error("topic already asserted with a different type: {0}")]
    TopicConflict(String),

    #[error(transparent)]
    Name(#[from] NameError),

    #[error(transparent)]
    TypeSupport(#[from] TypeSupportError),

    #[error("asserted typecode has no name")]
    UnnamedType,

    #[error("unexpected member name: {0:?}")]
    BadMemberName(String),

    #[error("unsupported member type id: {0}")]
    UnsupportedFieldType(u8),

    #[error("unrepresentable collection length: {0}")]
    LengthOverflow(usize),
}

/// Outcome of a type assertion.
#[derive(Debug, Clone)]
pub struct TypeAssertion {
    /// False when the root type was already cached.
    pub is_new: bool,
    /// The cache-owned root descriptor.
    pub root: Arc<TypeCode>,
    /// Descriptors inserted by this assertion, leaves first, root last.
    pub newly_added: Vec<Arc<TypeCode>>,
    /// Nested descriptors that matched an existing cache entry.
    pub already_present: Vec<Arc<TypeCode>>,
}

/// Outcome of a topic assertion.
#[derive(Debug, Clone)]
pub struct TopicAssertion {
    /// False when the topic was already bound (to the same type).
    pub is_new_topic: bool,
    pub types: TypeAssertion,
}

struct CacheInner {
    types_by_name: BTreeMap<String, Arc<TypeCode>>,
    all_types: Vec<Arc<TypeCode>>,
    topics: BTreeMap<String, String>,
    provider: Box<dyn IntrospectionProvider>,
}

/// Content-addressed type descriptor cache.
pub struct TypeCache {
    options: CacheOptions,
    inner: Mutex<CacheInner>,
}

impl TypeCache {
    /// Cache backed by the dynamic introspection loader.
    pub fn new(options: CacheOptions) -> Result<Self, CacheError> {
        Self::with_provider(options, Box::new(LibraryIntrospection::new()))
    }

    /// Cache with an explicit introspection provider.
    pub fn with_provider(
        options: CacheOptions,
        provider: Box<dyn IntrospectionProvider>,
    ) -> Result<Self, CacheError> {
        if options.cyclone_compatible && options.legacy_rmw_compatible {
            return Err(CacheError::InvalidConfig(
                "multiple compatibility modes enabled".to_string(),
            ));
        }
        if options.cyclone_compatible
            && options.request_reply_mapping != RequestReplyMapping::Basic
        {
            return Err(CacheError::InvalidConfig(
                "cyclonedds compatibility requires the basic request/reply mapping".to_string(),
            ));
        }
        if options.legacy_rmw_compatible
            && options.request_reply_mapping != RequestReplyMapping::Extended
        {
            return Err(CacheError::InvalidConfig(
                "legacy rmw compatibility requires the extended request/reply mapping".to_string(),
            ));
        }
        Ok(Self {
            options,
            inner: Mutex::new(CacheInner {
                types_by_name: BTreeMap::new(),
                all_types: Vec::new(),
                topics: BTreeMap::new(),
                provider,
            }),
        })
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assert an already-built descriptor.
    ///
    /// `demangled_ros_type` is the canonical spelling the caller derived for
    /// the type (empty when unknown); it decides whether the descriptor must
    /// be re-mangled or demangled to match the configured storage form.
    pub fn assert_from_typecode(
        &self,
        tc: &Arc<TypeCode>,
        ros_type: bool,
        demangled_ros_type: &str,
    ) -> Result<TypeAssertion, CacheError> {
        let mut inner = self.lock();
        self.assert_typecode(&mut inner, tc, ros_type, demangled_ros_type)
    }

    /// Resolve a ROS type name through introspection and assert the result.
    pub fn assert_from_name(&self, type_fqname: &str) -> Result<TypeAssertion, CacheError> {
        let mut inner = self.lock();
        self.assert_name(&mut inner, type_fqname)
    }

    /// Assert a descriptor and bind `topic_name` to it.
    pub fn assert_topic_from_typecode(
        &self,
        topic_name: &str,
        tc: &Arc<TypeCode>,
        ros_type: bool,
        demangled_ros_type: &str,
    ) -> Result<TopicAssertion, CacheError> {
        let mut inner = self.lock();
        let types = self.assert_typecode(&mut inner, tc, ros_type, demangled_ros_type)?;
        let type_name = types.root.name().ok_or(CacheError::UnnamedType)?.to_string();
        let is_new_topic = Self::insert_topic(&mut inner, topic_name, &type_name)?;
        Ok(TopicAssertion {
            is_new_topic,
            types,
        })
    }

    /// Resolve a ROS type name and bind `topic_name` to it.
    pub fn assert_topic_from_name(
        &self,
        topic_name: &str,
        type_fqname: &str,
    ) -> Result<TopicAssertion, CacheError> {
        let mut inner = self.lock();
        let types = self.assert_name(&mut inner, type_fqname)?;
        let type_name = types.root.name().ok_or(CacheError::UnnamedType)?.to_string();
        let is_new_topic = Self::insert_topic(&mut inner, topic_name, &type_name)?;
        Ok(TopicAssertion {
            is_new_topic,
            types,
        })
    }

    /// Look up a descriptor. ROS names are canonicalized first.
    pub fn find(&self, type_fqname: &str, ros_type: bool) -> Option<Arc<TypeCode>> {
        let key = if ros_type {
            normalize(type_fqname).ok()?
        } else {
            type_fqname.to_string()
        };
        self.lock().types_by_name.get(&key).cloned()
    }

    /// Snapshot of every stored descriptor, in insertion order.
    pub fn ordered_types(&self) -> Vec<Arc<TypeCode>> {
        self.lock().all_types.clone()
    }

    /// Snapshot of the topic bindings.
    pub fn topics(&self) -> Vec<(String, String)> {
        self.lock()
            .topics
            .iter()
            .map(|(topic, ty)| (topic.clone(), ty.clone()))
            .collect()
    }

    fn storage_key(&self, type_fqname: &str, ros_type: bool) -> Result<String, CacheError> {
        if ros_type {
            Ok(normalize(type_fqname)?)
        } else {
            Ok(type_fqname.to_string())
        }
    }

    fn insert(inner: &mut CacheInner, key: String, tc: Arc<TypeCode>) {
        inner.types_by_name.insert(key, Arc::clone(&tc));
        inner.all_types.push(tc);
    }

    fn insert_topic(
        inner: &mut CacheInner,
        topic_name: &str,
        type_fqname: &str,
    ) -> Result<bool, CacheError> {
        let norm_fqname = normalize(type_fqname)?;
        match inner.topics.get(topic_name) {
            Some(existing) if *existing != norm_fqname => {
                Err(CacheError::TopicConflict(topic_name.to_string()))
            }
            Some(_) => Ok(false),
            None => {
                inner
                    .topics
                    .insert(topic_name.to_string(), norm_fqname);
                Ok(true)
            }
        }
    }

    fn assert_typecode(
        &self,
        inner: &mut CacheInner,
        tc: &Arc<TypeCode>,
        ros_type: bool,
        demangled_ros_type: &str,
    ) -> Result<TypeAssertion, CacheError> {
        let type_fqname = tc.name().ok_or(CacheError::UnnamedType)?;

        // Re-mangle or demangle the incoming tree when its wire form
        // disagrees with the configured storage form.
        let assert_tc = if ros_type
            && !self.options.demangle_ros_names
            && type_fqname == demangled_ros_type
        {
            mangle_typecode(tc, self.options.legacy_rmw_compatible)?
        } else if ros_type
            && self.options.demangle_ros_names
            && type_fqname != demangled_ros_type
        {
            demangle_typecode(tc)?
        } else {
            Arc::clone(tc)
        };

        let type_fqname = assert_tc.name().ok_or(CacheError::UnnamedType)?.to_string();
        let key = self.storage_key(&type_fqname, ros_type)?;

        if let Some(cached) = inner.types_by_name.get(&key) {
            if **cached != *assert_tc {
                return Err(CacheError::TypeConflict(type_fqname));
            }
            let cached = Arc::clone(cached);
            return Ok(TypeAssertion {
                is_new: false,
                root: Arc::clone(&cached),
                newly_added: Vec::new(),
                already_present: vec![cached],
            });
        }

        let mut newly_added = Vec::new();
        let mut already_present = Vec::new();
        let root = self.intern(
            inner,
            &assert_tc,
            ros_type,
            &mut newly_added,
            &mut already_present,
        )?;
        Ok(TypeAssertion {
            is_new: true,
            root,
            newly_added,
            already_present,
        })
    }

    /// Intern a complex descriptor: nested complex nodes (and the content
    /// types of collections) are resolved against the cache children-first,
    /// so the stored tree references cache-owned instances only.
    fn intern(
        &self,
        inner: &mut CacheInner,
        tc: &Arc<TypeCode>,
        ros_type: bool,
        newly_added: &mut Vec<Arc<TypeCode>>,
        already_present: &mut Vec<Arc<TypeCode>>,
    ) -> Result<Arc<TypeCode>, CacheError> {
        let name = tc.name().ok_or(CacheError::UnnamedType)?.to_string();
        let key = self.storage_key(&name, ros_type)?;

        if let Some(cached) = inner.types_by_name.get(&key) {
            if **cached != **tc {
                return Err(CacheError::TypeConflict(name));
            }
            let cached = Arc::clone(cached);
            already_present.push(Arc::clone(&cached));
            return Ok(cached);
        }

        let rebuilt = match tc.as_ref() {
            TypeCode::Struct { name, members } => {
                let mut new_members = Vec::with_capacity(members.len());
                for member in members {
                    let ty = self.intern_member_type(
                        inner,
                        &member.ty,
                        ros_type,
                        newly_added,
                        already_present,
                    )?;
                    new_members.push(Member::new(member.name.clone(), ty));
                }
                TypeCode::structure(name.clone(), new_members)
            }
            TypeCode::Value {
                name,
                base,
                members,
            } => {
                let base = base
                    .as_ref()
                    .map(|b| {
                        self.intern_member_type(inner, b, ros_type, newly_added, already_present)
                    })
                    .transpose()?;
                let mut new_members = Vec::with_capacity(members.len());
                for member in members {
                    let ty = self.intern_member_type(
                        inner,
                        &member.ty,
                        ros_type,
                        newly_added,
                        already_present,
                    )?;
                    new_members.push(Member::new(member.name.clone(), ty));
                }
                TypeCode::value_type(name.clone(), base, new_members)
            }
            TypeCode::Union {
                name,
                discriminator,
                cases,
            } => {
                let discriminator = self.intern_member_type(
                    inner,
                    discriminator,
                    ros_type,
                    newly_added,
                    already_present,
                )?;
                let mut new_cases = Vec::with_capacity(cases.len());
                for case in cases {
                    let ty = self.intern_member_type(
                        inner,
                        &case.ty,
                        ros_type,
                        newly_added,
                        already_present,
                    )?;
                    new_cases.push(UnionCase {
                        name: case.name.clone(),
                        labels: case.labels.clone(),
                        ty,
                    });
                }
                TypeCode::union_type(name.clone(), discriminator, new_cases)
            }
            // Enums have no nested types to resolve.
            TypeCode::Enum { .. } => Arc::clone(tc),
            _ => return Err(CacheError::UnnamedType),
        };

        trace!(name = %name, "caching typecode");
        Self::insert(inner, key, Arc::clone(&rebuilt));
        newly_added.push(Arc::clone(&rebuilt));
        Ok(rebuilt)
    }

    fn intern_member_type(
        &self,
        inner: &mut CacheInner,
        ty: &Arc<TypeCode>,
        ros_type: bool,
        newly_added: &mut Vec<Arc<TypeCode>>,
        already_present: &mut Vec<Arc<TypeCode>>,
    ) -> Result<Arc<TypeCode>, CacheError> {
        match ty.as_ref() {
            _ if ty.is_complex() => {
                self.intern(inner, ty, ros_type, newly_added, already_present)
            }
            TypeCode::Sequence { bound, element } => {
                let interned = self.intern_member_type(
                    inner,
                    element,
                    ros_type,
                    newly_added,
                    already_present,
                )?;
                if Arc::ptr_eq(&interned, element) {
                    Ok(Arc::clone(ty))
                } else {
                    Ok(TypeCode::sequence(*bound, interned))
                }
            }
            TypeCode::Array {
                dimensions,
                element,
            } => {
                let interned = self.intern_member_type(
                    inner,
                    element,
                    ros_type,
                    newly_added,
                    already_present,
                )?;
                if Arc::ptr_eq(&interned, element) {
                    Ok(Arc::clone(ty))
                } else {
                    Ok(TypeCode::array(dimensions.clone(), interned))
                }
            }
            _ => Ok(Arc::clone(ty)),
        }
    }

    fn assert_name(
        &self,
        inner: &mut CacheInner,
        type_fqname: &str,
    ) -> Result<TypeAssertion, CacheError> {
        let (request_reply, is_request) = is_request_reply(type_fqname);
        let ros_name = demangle_dds_type_name(type_fqname)?;
        let (package, middle, type_name) = parse_ros_type_name(&ros_name)?;
        let description = inner.provider.load(&package, &middle, &type_name)?;

        let mut newly_added = Vec::new();
        let mut already_present = Vec::new();
        let (is_new, root) = self.assert_description(
            inner,
            &description,
            request_reply,
            is_request,
            true,
            &mut newly_added,
            &mut already_present,
        )?;
        Ok(TypeAssertion {
            is_new,
            root,
            newly_added,
            already_present,
        })
    }

    /// Build a struct descriptor from an introspection description and store
    /// it. Returns `(is_new, cache-owned node)`.
    #[allow(clippy::too_many_arguments)]
    fn assert_description(
        &self,
        inner: &mut CacheInner,
        description: &TypeDescription,
        request_reply: bool,
        is_request: bool,
        root: bool,
        newly_added: &mut Vec<Arc<TypeCode>>,
        already_present: &mut Vec<Arc<TypeCode>>,
    ) -> Result<(bool, Arc<TypeCode>), CacheError> {
        let dds_name = create_dds_type_name(
            &description.namespace,
            &description.name,
            !self.options.demangle_ros_names,
        );
        let node_name = if self.options.demangle_ros_names {
            normalize(&dds_name)?
        } else {
            mangle_dds_type_name(&dds_name)?
        };
        let key = self.storage_key(&node_name, true)?;

        // Introspection is deterministic per name; a cached entry is reused
        // without rebuilding.
        if let Some(cached) = inner.types_by_name.get(&key) {
            let cached = Arc::clone(cached);
            already_present.push(Arc::clone(&cached));
            return Ok((false, cached));
        }

        let mut members = Vec::with_capacity(description.members.len() + 1);
        if root && request_reply {
            if let Some(header) = self.request_reply_header(is_request) {
                let assertion = self.assert_typecode(inner, &header, true, "")?;
                newly_added.extend(assertion.newly_added.iter().cloned());
                already_present.extend(assertion.already_present.iter().cloned());
                members.push(Member::new("_header", assertion.root));
            }
        }

        for member in &description.members {
            if member.name.is_empty() || member.name == "_" {
                return Err(CacheError::BadMemberName(member.name.clone()));
            }
            let member_name = mangle_member_name(&member.name, self.options.legacy_rmw_compatible);
            let ty = self.convert_member(
                inner,
                member,
                request_reply,
                is_request,
                newly_added,
                already_present,
            )?;
            members.push(Member::new(member_name, ty));
        }

        let tc = TypeCode::structure(node_name, members);
        trace!(name = ?tc.name(), "caching introspected typecode");
        Self::insert(inner, key, Arc::clone(&tc));
        newly_added.push(Arc::clone(&tc));
        Ok((true, tc))
    }

    fn request_reply_header(&self, is_request: bool) -> Option<Arc<TypeCode>> {
        if self.options.cyclone_compatible {
            Some(headers::cyclone_request_header())
        } else if self.options.request_reply_mapping == RequestReplyMapping::Basic {
            if is_request {
                Some(headers::request_header())
            } else {
                Some(headers::reply_header())
            }
        } else {
            None
        }
    }

    fn convert_member(
        &self,
        inner: &mut CacheInner,
        member: &MemberDescription,
        request_reply: bool,
        is_request: bool,
        newly_added: &mut Vec<Arc<TypeCode>>,
        already_present: &mut Vec<Arc<TypeCode>>,
    ) -> Result<Arc<TypeCode>, CacheError> {
        let element = match member.type_id {
            ROS_TYPE_BOOLEAN => TypeCode::primitive(PrimitiveKind::Bool),
            ROS_TYPE_OCTET | ROS_TYPE_UINT8 | ROS_TYPE_INT8 => {
                TypeCode::primitive(PrimitiveKind::Octet)
            }
            ROS_TYPE_CHAR => TypeCode::primitive(PrimitiveKind::Char),
            ROS_TYPE_FLOAT => TypeCode::primitive(PrimitiveKind::Float),
            ROS_TYPE_DOUBLE => TypeCode::primitive(PrimitiveKind::Double),
            ROS_TYPE_INT16 => TypeCode::primitive(PrimitiveKind::Short),
            ROS_TYPE_UINT16 => TypeCode::primitive(PrimitiveKind::UShort),
            ROS_TYPE_INT32 => TypeCode::primitive(PrimitiveKind::Long),
            ROS_TYPE_UINT32 => TypeCode::primitive(PrimitiveKind::ULong),
            ROS_TYPE_INT64 => TypeCode::primitive(PrimitiveKind::LongLong),
            ROS_TYPE_UINT64 => TypeCode::primitive(PrimitiveKind::ULongLong),
            ROS_TYPE_STRING => TypeCode::string(Self::string_bound(member)?),
            ROS_TYPE_WSTRING => TypeCode::wstring(Self::string_bound(member)?),
            ROS_TYPE_MESSAGE => {
                let nested = member
                    .nested
                    .as_deref()
                    .ok_or(TypeSupportError::NullMembers)?;
                let (_, tc) = self.assert_description(
                    inner,
                    nested,
                    request_reply,
                    is_request,
                    false,
                    newly_added,
                    already_present,
                )?;
                tc
            }
            other => return Err(CacheError::UnsupportedFieldType(other)),
        };

        if !member.is_array {
            return Ok(element);
        }
        if member.array_size > 0 && !member.is_upper_bound {
            let dimension = Self::checked_length(member.array_size)?;
            Ok(TypeCode::array(vec![dimension], element))
        } else {
            let bound = if member.is_upper_bound {
                Bound::Limit(Self::checked_length(member.array_size)?)
            } else {
                Bound::Unbounded
            };
            Ok(TypeCode::sequence(bound, element))
        }
    }

    fn string_bound(member: &MemberDescription) -> Result<Bound, CacheError> {
        if member.string_upper_bound > 0 {
            Ok(Bound::Limit(Self::checked_length(
                member.string_upper_bound,
            )?))
        } else {
            Ok(Bound::Unbounded)
        }
    }

    fn checked_length(value: usize) -> Result<u32, CacheError> {
        if value > i32::MAX as usize {
            return Err(CacheError::LengthOverflow(value));
        }
        Ok(value as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typesupport::StaticIntrospection;

    fn demangle_cache(provider: StaticIntrospection) -> TypeCache {
        TypeCache::with_provider(CacheOptions::default(), Box::new(provider)).unwrap()
    }

    fn std_string_provider() -> StaticIntrospection {
        let mut provider = StaticIntrospection::new();
        provider.register(
            "std_msgs/msg/String",
            TypeDescription::new(
                "std_msgs__msg",
                "String",
                vec![MemberDescription::basic("data", ROS_TYPE_STRING)],
            ),
        );
        provider
    }

    fn simple_struct(name: &str, member: &str) -> Arc<TypeCode> {
        TypeCode::structure(
            name,
            vec![Member::new(member, TypeCode::primitive(PrimitiveKind::Long))],
        )
    }

    #[test]
    fn rejects_contradictory_options() {
        let options = CacheOptions {
            cyclone_compatible: true,
            legacy_rmw_compatible: true,
            ..Default::default()
        };
        assert!(matches!(
            TypeCache::with_provider(options, Box::new(StaticIntrospection::new())),
            Err(CacheError::InvalidConfig(_))
        ));

        let options = CacheOptions {
            cyclone_compatible: true,
            request_reply_mapping: RequestReplyMapping::Extended,
            ..Default::default()
        };
        assert!(matches!(
            TypeCache::with_provider(options, Box::new(StaticIntrospection::new())),
            Err(CacheError::InvalidConfig(_))
        ));

        let options = CacheOptions {
            legacy_rmw_compatible: true,
            request_reply_mapping: RequestReplyMapping::Basic,
            ..Default::default()
        };
        assert!(matches!(
            TypeCache::with_provider(options, Box::new(StaticIntrospection::new())),
            Err(CacheError::InvalidConfig(_))
        ));
    }

    #[test]
    fn assert_from_name_builds_struct() {
        let cache = demangle_cache(std_string_provider());
        let assertion = cache.assert_from_name("std_msgs/msg/String").unwrap();
        assert!(assertion.is_new);
        assert_eq!(assertion.newly_added.len(), 1);
        assert_eq!(assertion.root.name(), Some("std_msgs::msg::String"));
        let members: Vec<_> = assertion.root.walk_members().map(|(_, n, _)| n).collect();
        assert_eq!(members, vec!["data"]);
        assert_eq!(
            assertion.root.members()[0].ty,
            TypeCode::string(Bound::Unbounded)
        );
    }

    #[test]
    fn assert_from_name_is_idempotent() {
        let cache = demangle_cache(std_string_provider());
        let first = cache.assert_from_name("std_msgs/msg/String").unwrap();
        let second = cache
            .assert_from_name("std_msgs::msg::dds_::String_")
            .unwrap();
        assert!(first.is_new);
        assert!(!second.is_new);
        assert!(second.newly_added.is_empty());
        assert!(Arc::ptr_eq(&first.root, &second.root));
        assert_eq!(cache.ordered_types().len(), 1);
    }

    #[test]
    fn assert_typecode_idempotent_and_conflicting() {
        let cache = demangle_cache(StaticIntrospection::new());
        let a = simple_struct("ns::A", "x");
        let first = cache.assert_from_typecode(&a, false, "").unwrap();
        assert!(first.is_new);
        let second = cache.assert_from_typecode(&a, false, "").unwrap();
        assert!(!second.is_new);
        assert_eq!(cache.ordered_types().len(), 1);

        let conflicting = simple_struct("ns::A", "y");
        match cache.assert_from_typecode(&conflicting, false, "") {
            Err(CacheError::TypeConflict(name)) => assert_eq!(name, "ns::A"),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn nested_types_are_deduplicated() {
        let cache = demangle_cache(StaticIntrospection::new());
        let nested = simple_struct("ns::N", "x");
        let outer_a = TypeCode::structure(
            "ns::A",
            vec![Member::new("n", Arc::clone(&nested))],
        );
        let outer_b = TypeCode::structure(
            "ns::B",
            vec![Member::new("n", Arc::clone(&nested))],
        );

        let first = cache.assert_from_typecode(&outer_a, false, "").unwrap();
        let names: Vec<_> = first
            .newly_added
            .iter()
            .map(|tc| tc.name().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["ns::N", "ns::A"]);

        let second = cache.assert_from_typecode(&outer_b, false, "").unwrap();
        assert!(second.is_new);
        let already: Vec<_> = second
            .already_present
            .iter()
            .map(|tc| tc.name().unwrap().to_string())
            .collect();
        assert_eq!(already, vec!["ns::N"]);
        assert_eq!(cache.ordered_types().len(), 3);

        // The stored trees share the cache-owned nested instance.
        let cached_nested = cache.find("ns::N", false).unwrap();
        let cached_b = cache.find("ns::B", false).unwrap();
        assert!(Arc::ptr_eq(&cached_b.members()[0].ty, &cached_nested));
    }

    #[test]
    fn nested_conflict_is_detected() {
        let cache = demangle_cache(StaticIntrospection::new());
        cache
            .assert_from_typecode(&simple_struct("ns::N", "x"), false, "")
            .unwrap();
        let outer = TypeCode::structure(
            "ns::A",
            vec![Member::new("n", simple_struct("ns::N", "y"))],
        );
        assert!(matches!(
            cache.assert_from_typecode(&outer, false, ""),
            Err(CacheError::TypeConflict(_))
        ));
    }

    #[test]
    fn topic_binding_is_a_partial_function() {
        let cache = demangle_cache(std_string_provider());
        let first = cache
            .assert_topic_from_name("/chatter", "std_msgs/msg/String")
            .unwrap();
        assert!(first.is_new_topic);
        let second = cache
            .assert_topic_from_name("/chatter", "std_msgs/msg/String")
            .unwrap();
        assert!(!second.is_new_topic);

        let other = simple_struct("ns::Other", "x");
        match cache.assert_topic_from_typecode("/chatter", &other, false, "") {
            Err(CacheError::TopicConflict(topic)) => assert_eq!(topic, "/chatter"),
            other => panic!("expected topic conflict, got {other:?}"),
        }
    }

    #[test]
    fn mangled_storage_mode() {
        let options = CacheOptions {
            demangle_ros_names: false,
            ..Default::default()
        };
        let cache =
            TypeCache::with_provider(options, Box::new(std_string_provider())).unwrap();
        let assertion = cache.assert_from_name("std_msgs/msg/String").unwrap();
        assert_eq!(assertion.root.name(), Some("std_msgs::msg::dds_::String_"));
        // The cache key is still the canonical name.
        assert!(cache.find("std_msgs::msg::String", true).is_some());
        assert!(cache.find("std_msgs::msg::dds_::String_", true).is_some());
    }

    #[test]
    fn request_header_injected_under_basic_mapping() {
        let mut provider = StaticIntrospection::new();
        provider.register(
            "example/srv/AddTwoInts_Request",
            TypeDescription::new(
                "example__srv",
                "AddTwoInts_Request",
                vec![
                    MemberDescription::basic("a", ROS_TYPE_INT64),
                    MemberDescription::basic("b", ROS_TYPE_INT64),
                ],
            ),
        );
        let options = CacheOptions {
            request_reply_mapping: RequestReplyMapping::Basic,
            ..Default::default()
        };
        let cache = TypeCache::with_provider(options, Box::new(provider)).unwrap();
        let assertion = cache
            .assert_from_name("example/srv/AddTwoInts_Request")
            .unwrap();

        let members: Vec<_> = assertion.root.walk_members().map(|(_, n, _)| n).collect();
        assert_eq!(members, vec!["_header", "a", "b"]);
        assert_eq!(
            assertion.root.members()[0].ty.name(),
            Some("dds::msg::RequestHeader")
        );
        // Header constituents become cache entries of their own, leaves first.
        let names: Vec<_> = assertion
            .newly_added
            .iter()
            .map(|tc| tc.name().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "dds::msg::GUID",
                "dds::msg::SequenceNumber",
                "dds::msg::SampleIdentity",
                "dds::msg::RequestHeader",
                "example::srv::AddTwoInts_Request",
            ]
        );
    }

    #[test]
    fn no_header_under_extended_mapping() {
        let mut provider = StaticIntrospection::new();
        provider.register(
            "example/srv/AddTwoInts_Request",
            TypeDescription::new(
                "example__srv",
                "AddTwoInts_Request",
                vec![MemberDescription::basic("a", ROS_TYPE_INT64)],
            ),
        );
        let cache = demangle_cache(provider);
        let assertion = cache
            .assert_from_name("example/srv/AddTwoInts_Request")
            .unwrap();
        let members: Vec<_> = assertion.root.walk_members().map(|(_, n, _)| n).collect();
        assert_eq!(members, vec!["a"]);
    }

    #[test]
    fn cyclone_header_used_when_compatible() {
        let mut provider = StaticIntrospection::new();
        provider.register(
            "example/srv/AddTwoInts_Response",
            TypeDescription::new(
                "example__srv",
                "AddTwoInts_Response",
                vec![MemberDescription::basic("sum", ROS_TYPE_INT64)],
            ),
        );
        let options = CacheOptions {
            cyclone_compatible: true,
            request_reply_mapping: RequestReplyMapping::Basic,
            ..Default::default()
        };
        let cache = TypeCache::with_provider(options, Box::new(provider)).unwrap();
        let assertion = cache
            .assert_from_name("example/srv/AddTwoInts_Response")
            .unwrap();
        assert_eq!(
            assertion.root.members()[0].ty.name(),
            Some("dds::msg::CycloneRequestHeader")
        );
    }

    #[test]
    fn legacy_rmw_appends_member_underscores() {
        let options = CacheOptions {
            legacy_rmw_compatible: true,
            demangle_ros_names: false,
            ..Default::default()
        };
        let cache =
            TypeCache::with_provider(options, Box::new(std_string_provider())).unwrap();
        let assertion = cache.assert_from_name("std_msgs/msg/String").unwrap();
        let members: Vec<_> = assertion.root.walk_members().map(|(_, n, _)| n).collect();
        assert_eq!(members, vec!["data_"]);
    }

    #[test]
    fn nested_message_members_share_cache_entries() {
        let mut provider = StaticIntrospection::new();
        let stamp = TypeDescription::new(
            "builtin_interfaces__msg",
            "Time",
            vec![
                MemberDescription::basic("sec", ROS_TYPE_INT32),
                MemberDescription::basic("nanosec", ROS_TYPE_UINT32),
            ],
        );
        provider.register(
            "sensor_msgs/msg/TimeRef",
            TypeDescription::new(
                "sensor_msgs__msg",
                "TimeRef",
                vec![
                    MemberDescription::message("stamp", stamp.clone()),
                    MemberDescription::message("time_ref", stamp),
                ],
            ),
        );
        let cache = demangle_cache(provider);
        let assertion = cache.assert_from_name("sensor_msgs/msg/TimeRef").unwrap();
        assert!(assertion.is_new);
        let names: Vec<_> = assertion
            .newly_added
            .iter()
            .map(|tc| tc.name().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["builtin_interfaces::msg::Time", "sensor_msgs::msg::TimeRef"]
        );
        // Second occurrence of the nested message reuses the cached entry.
        let already: Vec<_> = assertion
            .already_present
            .iter()
            .map(|tc| tc.name().unwrap().to_string())
            .collect();
        assert_eq!(already, vec!["builtin_interfaces::msg::Time"]);
        let cached = cache.find("builtin_interfaces/msg/Time", true);
        assert!(cached.is_none(), "slash form is not a cache key");
        let cached = cache.find("builtin_interfaces::msg::Time", true).unwrap();
        let root = cache.find("sensor_msgs::msg::TimeRef", true).unwrap();
        assert!(Arc::ptr_eq(&root.members()[0].ty, &cached));
        assert!(Arc::ptr_eq(&root.members()[1].ty, &cached));
    }
}
