// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Minimal key-expression matching for the in-process transport.
//!
//! A key expression is a `/`-separated list of non-empty chunks. In patterns
//! `*` matches exactly one chunk and `**` matches zero or more. Chunks that
//! start with `@` are verbatim: wildcards never match them.

use super::TransportError;

/// Reject empty expressions, empty chunks and leading/trailing separators.
pub fn validate(key_expr: &str) -> Result<(), TransportError> {
    if key_expr.is_empty() || key_expr.split('/').any(str::is_empty) {
        return Err(TransportError::InvalidKeyExpr(key_expr.to_string()));
    }
    Ok(())
}

/// Whether the concrete `key` is matched by `pattern`.
#[must_use]
pub fn matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('/').collect();
    let key: Vec<&str> = key.split('/').collect();
    match_chunks(&pattern, &key)
}

fn match_chunks(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"**", rest)) => {
            for skip in 0..=key.len() {
                if match_chunks(rest, &key[skip..]) {
                    return true;
                }
                // `**` may not swallow a verbatim chunk.
                if skip < key.len() && is_verbatim(key[skip]) {
                    return false;
                }
            }
            false
        }
        Some((chunk, rest)) => match key.split_first() {
            None => false,
            Some((head, tail)) => {
                let chunk_ok = if *chunk == "*" {
                    !is_verbatim(head)
                } else {
                    chunk == head
                };
                chunk_ok && match_chunks(rest, tail)
            }
        },
    }
}

fn is_verbatim(chunk: &str) -> bool {
    chunk.starts_with('@')
}
