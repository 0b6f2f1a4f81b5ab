// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use rmw_link::attachment::{
    extract_gid, extract_int64, lookup, pairs, read_int64, AttachmentData, SEQUENCE_NUMBER_KEY,
    SOURCE_GID_KEY, SOURCE_TIMESTAMP_KEY,
};

fuzz_target!(|data: &[u8]| {
    // Walk every pair
    for pair in pairs(data) {
        let _ = lookup(data, pair.key);
    }

    // Well-known keys
    let _ = extract_gid(data);
    let _ = extract_int64(data, SEQUENCE_NUMBER_KEY);
    let _ = read_int64(data, SOURCE_TIMESTAMP_KEY);
    let _ = lookup(data, SOURCE_GID_KEY);

    // Anything decoded must encode back to the same values
    if let Some(meta) = AttachmentData::from_attachment(data) {
        let again = AttachmentData::from_attachment(meta.to_attachment().as_bytes());
        assert_eq!(again, Some(meta));
    }
});
