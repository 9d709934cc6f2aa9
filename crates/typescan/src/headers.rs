// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Synthetic request/reply header descriptors.
//!
//! Request/reply correlation under the `basic` mapping (and under CycloneDDS
//! compatibility) rides inside the sample payload as a `_header` member
//! prepended to the request/reply struct. The descriptors below are built
//! once and shared; the cache asserts them like any other type the first
//! time a header is injected.

use crate::typecode::{Bound, Member, PrimitiveKind, TypeCode};
use std::sync::{Arc, OnceLock};

/// `dds::msg::GUID`: a 16-octet writer identifier.
pub fn guid() -> Arc<TypeCode> {
    static TC: OnceLock<Arc<TypeCode>> = OnceLock::new();
    Arc::clone(TC.get_or_init(|| {
        TypeCode::structure(
            "dds::msg::GUID",
            vec![Member::new(
                "value",
                TypeCode::array(vec![16], TypeCode::primitive(PrimitiveKind::Octet)),
            )],
        )
    }))
}

/// `dds::msg::SequenceNumber`: 64-bit sequence number split high/low.
pub fn sequence_number() -> Arc<TypeCode> {
    static TC: OnceLock<Arc<TypeCode>> = OnceLock::new();
    Arc::clone(TC.get_or_init(|| {
        TypeCode::structure(
            "dds::msg::SequenceNumber",
            vec![
                Member::new("high", TypeCode::primitive(PrimitiveKind::Long)),
                Member::new("low", TypeCode::primitive(PrimitiveKind::ULong)),
            ],
        )
    }))
}

/// `dds::msg::SampleIdentity`: writer GUID plus sequence number.
pub fn sample_identity() -> Arc<TypeCode> {
    static TC: OnceLock<Arc<TypeCode>> = OnceLock::new();
    Arc::clone(TC.get_or_init(|| {
        TypeCode::structure(
            "dds::msg::SampleIdentity",
            vec![
                Member::new("writer_guid", guid()),
                Member::new("sequence_number", sequence_number()),
            ],
        )
    }))
}

/// `dds::msg::RequestHeader`: inline header for request samples.
pub fn request_header() -> Arc<TypeCode> {
    static TC: OnceLock<Arc<TypeCode>> = OnceLock::new();
    Arc::clone(TC.get_or_init(|| {
        TypeCode::structure(
            "dds::msg::RequestHeader",
            vec![
                Member::new("requestId", sample_identity()),
                Member::new("instanceName", TypeCode::string(Bound::Limit(255))),
            ],
        )
    }))
}

/// `dds::msg::ReplyHeader`: inline header for reply samples.
pub fn reply_header() -> Arc<TypeCode> {
    static TC: OnceLock<Arc<TypeCode>> = OnceLock::new();
    Arc::clone(TC.get_or_init(|| {
        TypeCode::structure(
            "dds::msg::ReplyHeader",
            vec![
                Member::new("relatedRequestId", sample_identity()),
                Member::new("remoteEx", TypeCode::primitive(PrimitiveKind::Long)),
            ],
        )
    }))
}

/// `dds::msg::CycloneRequestHeader`: the compact header used by
/// `rmw_cyclonedds_cpp` for both requests and replies.
pub fn cyclone_request_header() -> Arc<TypeCode> {
    static TC: OnceLock<Arc<TypeCode>> = OnceLock::new();
    Arc::clone(TC.get_or_init(|| {
        TypeCode::structure(
            "dds::msg::CycloneRequestHeader",
            vec![
                Member::new("guid", TypeCode::primitive(PrimitiveKind::ULongLong)),
                Member::new("seq", TypeCode::primitive(PrimitiveKind::LongLong)),
            ],
        )
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_shared_instances() {
        assert!(Arc::ptr_eq(&request_header(), &request_header()));
        assert!(Arc::ptr_eq(&guid(), &guid()));
    }

    #[test]
    fn request_header_embeds_sample_identity() {
        let header = request_header();
        let members: Vec<_> = header.walk_members().map(|(_, n, _)| n).collect();
        assert_eq!(members, vec!["requestId", "instanceName"]);
        let identity = &header.members()[0].ty;
        assert!(Arc::ptr_eq(identity, &sample_identity()));
    }

    #[test]
    fn header_names_are_canonical() {
        for header in [
            guid(),
            sequence_number(),
            sample_identity(),
            request_header(),
            reply_header(),
            cyclone_request_header(),
        ] {
            let name = header.name().unwrap();
            assert_eq!(crate::names::normalize(name).unwrap(), name);
        }
    }
}
