// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dynamic loading of `rosidl_typesupport_introspection_{c,cpp}` libraries.
//!
//! The C and C++ introspection plugins expose the same POD layout for their
//! member tables, so a single set of `repr(C)` mirrors serves both flavours;
//! only the typesupport identifier and symbol prefix differ.

use super::{
    library_search_path, IntrospectionProvider, MemberDescription, TypeDescription,
    TypeSupportError, ROS_TYPE_MESSAGE,
};
use libloading::Library;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const INTROSPECTION_C_IDENTIFIER: &str = "rosidl_typesupport_introspection_c";
const INTROSPECTION_CPP_IDENTIFIER: &str = "rosidl_typesupport_introspection_cpp";

type RosMessageTypesupportHandleFunction = Option<
    unsafe extern "C" fn(
        *const rosidl_message_type_support_t,
        *const c_char,
    ) -> *const rosidl_message_type_support_t,
>;

type RosOpaqueAccessor =
    Option<unsafe extern "C" fn(*const rosidl_message_type_support_t) -> *const c_void>;

/// Type support entry point mirroring `rosidl_message_type_support_t`.
///
/// Only the identifier, payload and narrowing function are read; the
/// trailing accessors exist to match the full layout of newer distros.
#[repr(C)]
#[allow(non_camel_case_types)]
pub struct rosidl_message_type_support_t {
    pub typesupport_identifier: *const c_char,
    pub data: *const c_void,
    pub func: RosMessageTypesupportHandleFunction,
    pub get_type_hash_func: RosOpaqueAccessor,
    pub get_type_description_func: RosOpaqueAccessor,
    pub get_type_description_sources_func: RosOpaqueAccessor,
}

type RosSizeFunction = Option<unsafe extern "C" fn(*const c_void) -> usize>;
type RosGetConstFunction = Option<unsafe extern "C" fn(*const c_void, usize) -> *const c_void>;
type RosGetFunction = Option<unsafe extern "C" fn(*mut c_void, usize) -> *mut c_void>;
type RosFetchFunction = Option<unsafe extern "C" fn(*const c_void, usize, *mut c_void)>;
type RosAssignFunction = Option<unsafe extern "C" fn(*mut c_void, usize, *const c_void)>;
type RosResizeFunction = Option<unsafe extern "C" fn(*mut c_void, usize) -> bool>;

/// Introspection metadata for a single message member.
#[repr(C)]
#[allow(non_camel_case_types)]
pub struct rosidl_typesupport_introspection_c__MessageMember {
    pub name_: *const c_char,
    pub type_id_: u8,
    pub string_upper_bound_: usize,
    pub members_: *const rosidl_message_type_support_t,
    pub is_array_: bool,
    pub array_size_: usize,
    pub is_upper_bound_: bool,
    pub offset_: u32,
    pub default_value_: *const c_void,
    pub size_function: RosSizeFunction,
    pub get_const_function: RosGetConstFunction,
    pub get_function: RosGetFunction,
    pub fetch_function: RosFetchFunction,
    pub assign_function: RosAssignFunction,
    pub resize_function: RosResizeFunction,
}

/// Aggregated introspection metadata for a message type.
#[repr(C)]
#[allow(non_camel_case_types)]
pub struct rosidl_typesupport_introspection_c__MessageMembers {
    pub message_namespace_: *const c_char,
    pub message_name_: *const c_char,
    pub member_count_: u32,
    pub size_of_: usize,
    pub members_: *const rosidl_typesupport_introspection_c__MessageMember,
    pub init_function: Option<unsafe extern "C" fn(*mut c_void, i32)>,
    pub fini_function: Option<unsafe extern "C" fn(*mut c_void)>,
}

/// Introspection language flavour of a loaded library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    C,
    Cpp,
}

impl Flavor {
    fn identifier(self) -> &'static str {
        match self {
            Flavor::C => INTROSPECTION_C_IDENTIFIER,
            Flavor::Cpp => INTROSPECTION_CPP_IDENTIFIER,
        }
    }

    fn lang(self) -> &'static str {
        match self {
            Flavor::C => "c",
            Flavor::Cpp => "cpp",
        }
    }
}

fn library_file_name(package: &str, flavor: Flavor) -> String {
    let (prefix, extension) = if cfg!(target_os = "windows") {
        ("", ".dll")
    } else if cfg!(target_os = "macos") {
        ("lib", ".dylib")
    } else {
        ("lib", ".so")
    };
    format!(
        "{prefix}{package}__rosidl_typesupport_introspection_{lang}{extension}",
        lang = flavor.lang()
    )
}

fn typesupport_symbol(flavor: Flavor, package: &str, middle: &str, type_name: &str) -> String {
    let middle = if middle.is_empty() { "msg" } else { middle };
    format!(
        "{identifier}__get_message_type_support_handle__{package}__{middle}__{type_name}",
        identifier = flavor.identifier()
    )
}

/// Prefixes under which a package's libraries may live: the ament resource
/// index entry for the package (if any) followed by the platform library
/// search path.
fn package_search_roots(package: &str, library_path: &[PathBuf]) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(prefixes) = std::env::var("AMENT_PREFIX_PATH") {
        for prefix in prefixes.split(':').filter(|p| !p.is_empty()) {
            let marker = Path::new(prefix)
                .join("share/ament_index/resource_index/packages")
                .join(package);
            if marker.exists() {
                roots.push(Path::new(prefix).join("lib"));
                break;
            }
        }
    }
    roots.extend(library_path.iter().cloned());
    roots
}

/// Dynamic introspection provider.
///
/// Loaded libraries are cached per package and language flavour; the handles
/// stay alive for the provider's lifetime so every pointer handed out by the
/// plugins remains valid while descriptions are being copied out.
pub struct LibraryIntrospection {
    search_path: Vec<PathBuf>,
    libraries_c: HashMap<String, Library>,
    libraries_cpp: HashMap<String, Library>,
}

impl LibraryIntrospection {
    /// Provider over the platform library search path.
    pub fn new() -> Self {
        Self::with_search_path(library_search_path())
    }

    /// Provider over an explicit list of library directories.
    pub fn with_search_path(search_path: Vec<PathBuf>) -> Self {
        Self {
            search_path,
            libraries_c: HashMap::new(),
            libraries_cpp: HashMap::new(),
        }
    }

    fn cached(&self, package: &str) -> Option<(Flavor, &Library)> {
        if let Some(lib) = self.libraries_c.get(package) {
            return Some((Flavor::C, lib));
        }
        self.libraries_cpp
            .get(package)
            .map(|lib| (Flavor::Cpp, lib))
    }

    fn describe_from_library(
        library: &Library,
        flavor: Flavor,
        package: &str,
        middle: &str,
        type_name: &str,
    ) -> Result<TypeDescription, TypeSupportError> {
        let symbol_name = typesupport_symbol(flavor, package, middle, type_name);
        let mut symbol_bytes = symbol_name.clone().into_bytes();
        symbol_bytes.push(0);
        // SAFETY: the symbol is a nullary typesupport accessor generated by
        // rosidl; the returned handle and everything reachable from it live
        // as long as the library, which outlives this call.
        unsafe {
            let get_typesupport = library
                .get::<unsafe extern "C" fn() -> *const rosidl_message_type_support_t>(
                    &symbol_bytes,
                )
                .map_err(|_| TypeSupportError::MissingSymbol(symbol_name))?;
            let handle = get_typesupport();
            let handle = narrow_typesupport(handle, flavor.identifier())
                .ok_or(TypeSupportError::NullTypeSupport)?;
            describe_members(handle)
        }
    }
}

impl Default for LibraryIntrospection {
    fn default() -> Self {
        Self::new()
    }
}

impl IntrospectionProvider for LibraryIntrospection {
    fn load(
        &mut self,
        package: &str,
        middle: &str,
        type_name: &str,
    ) -> Result<TypeDescription, TypeSupportError> {
        // A library already loaded for this package is tried first; a symbol
        // miss falls through to a fresh search.
        if let Some((flavor, library)) = self.cached(package) {
            match Self::describe_from_library(library, flavor, package, middle, type_name) {
                Ok(description) => return Ok(description),
                Err(err) => {
                    debug!(package, %err, "cached introspection library miss");
                }
            }
        }

        for root in package_search_roots(package, &self.search_path) {
            for flavor in [Flavor::C, Flavor::Cpp] {
                let path = root.join(library_file_name(package, flavor));
                if !path.exists() {
                    continue;
                }
                trace!(path = %path.display(), "loading introspection library");
                // SAFETY: loading a rosidl-generated typesupport library has
                // no unsound initialisation side effects.
                let library = match unsafe { Library::new(&path) } {
                    Ok(library) => library,
                    Err(source) => {
                        debug!(path = %path.display(), %source, "dlopen failed");
                        continue;
                    }
                };
                match Self::describe_from_library(&library, flavor, package, middle, type_name) {
                    Ok(description) => {
                        let cache = match flavor {
                            Flavor::C => &mut self.libraries_c,
                            Flavor::Cpp => &mut self.libraries_cpp,
                        };
                        cache.insert(package.to_string(), library);
                        return Ok(description);
                    }
                    Err(err) => {
                        debug!(path = %path.display(), %err, "introspection lookup failed");
                    }
                }
            }
        }
        Err(TypeSupportError::LibraryNotFound(package.to_string()))
    }
}

/// Narrow a typesupport handle to the requested identifier, following the
/// handle's own dispatch function when the identifiers differ.
///
/// # Safety
///
/// `handle` must be null or point to a valid, initialized
/// `rosidl_message_type_support_t`.
unsafe fn narrow_typesupport(
    handle: *const rosidl_message_type_support_t,
    identifier: &str,
) -> Option<*const rosidl_message_type_support_t> {
    if handle.is_null() {
        return None;
    }
    let ts = &*handle;
    if !ts.typesupport_identifier.is_null()
        && CStr::from_ptr(ts.typesupport_identifier).to_str() == Ok(identifier)
    {
        return Some(handle);
    }
    let func = ts.func?;
    let identifier = CString::new(identifier).ok()?;
    let narrowed = func(handle, identifier.as_ptr());
    if narrowed.is_null() {
        None
    } else {
        Some(narrowed)
    }
}

/// Narrow a nested member's typesupport to either introspection flavour,
/// trying C first like the ROS runtime does.
///
/// # Safety
///
/// `handle` must be null or point to a valid `rosidl_message_type_support_t`.
unsafe fn narrow_nested(
    handle: *const rosidl_message_type_support_t,
) -> Option<*const rosidl_message_type_support_t> {
    narrow_typesupport(handle, INTROSPECTION_C_IDENTIFIER)
        .or_else(|| narrow_typesupport(handle, INTROSPECTION_CPP_IDENTIFIER))
}

unsafe fn owned_cstr(ptr: *const c_char) -> Result<String, TypeSupportError> {
    if ptr.is_null() {
        return Ok(String::new());
    }
    Ok(CStr::from_ptr(ptr).to_str()?.to_string())
}

/// Copy an introspection member table into an owned [`TypeDescription`],
/// recursing into nested message members.
///
/// # Safety
///
/// `handle` must point to a valid introspection typesupport whose `data`
/// payload is a `MessageMembers` table; nested handles must be valid for the
/// duration of the call.
unsafe fn describe_members(
    handle: *const rosidl_message_type_support_t,
) -> Result<TypeDescription, TypeSupportError> {
    let ts = &*handle;
    if ts.data.is_null() {
        return Err(TypeSupportError::NullMembers);
    }
    let members = &*ts
        .data
        .cast::<rosidl_typesupport_introspection_c__MessageMembers>();

    let namespace = owned_cstr(members.message_namespace_)?;
    let name = owned_cstr(members.message_name_)?;

    if members.members_.is_null() && members.member_count_ > 0 {
        return Err(TypeSupportError::NullMembers);
    }
    let table = std::slice::from_raw_parts(members.members_, members.member_count_ as usize);

    let mut out = Vec::with_capacity(table.len());
    for member in table {
        let nested = if member.type_id_ == ROS_TYPE_MESSAGE {
            let nested_handle =
                narrow_nested(member.members_).ok_or(TypeSupportError::NullTypeSupport)?;
            Some(Box::new(describe_members(nested_handle)?))
        } else {
            None
        };
        out.push(MemberDescription {
            name: owned_cstr(member.name_)?,
            type_id: member.type_id_,
            string_upper_bound: member.string_upper_bound_,
            is_array: member.is_array_,
            array_size: member.array_size_,
            is_upper_bound: member.is_upper_bound_,
            nested,
        });
    }

    Ok(TypeDescription {
        namespace,
        name,
        members: out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_names_follow_platform_convention() {
        let name = library_file_name("std_msgs", Flavor::C);
        assert!(name.contains("std_msgs__rosidl_typesupport_introspection_c"));
        let name = library_file_name("std_msgs", Flavor::Cpp);
        assert!(name.contains("std_msgs__rosidl_typesupport_introspection_cpp"));
    }

    #[test]
    fn symbol_names_default_to_msg_module() {
        assert_eq!(
            typesupport_symbol(Flavor::C, "std_msgs", "", "String"),
            "rosidl_typesupport_introspection_c__get_message_type_support_handle__std_msgs__msg__String"
        );
        assert_eq!(
            typesupport_symbol(Flavor::Cpp, "example", "srv", "AddTwoInts_Request"),
            "rosidl_typesupport_introspection_cpp__get_message_type_support_handle__example__srv__AddTwoInts_Request"
        );
    }

    #[test]
    fn missing_library_reports_package() {
        let mut provider = LibraryIntrospection::with_search_path(vec![PathBuf::from(
            "/nonexistent/introspection/root",
        )]);
        match provider.load("no_such_pkg", "msg", "Nothing") {
            Err(TypeSupportError::LibraryNotFound(pkg)) => assert_eq!(pkg, "no_such_pkg"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
