// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Liveliness key expressions.
//!
//! Every graph entity is announced as a liveliness token under
//! `@ros2_lv/<domain_id>/...`; a context subscribes to the whole domain
//! subtree to learn the graph.

use crate::transport::SessionId;

/// Admin space prefix shared by every liveliness token.
pub const ADMIN_SPACE: &str = "@ros2_lv";

/// Key expression a context subscribes to for discovery in `domain_id`.
#[must_use]
pub fn subscription_token(domain_id: usize) -> String {
    format!("{ADMIN_SPACE}/{domain_id}/**")
}

/// Token announcing entity `entity_id` named `name`, owned by session `zid`.
///
/// `/` in the name would split it into several chunks, so it is mangled to `%`.
#[must_use]
pub fn entity_token(domain_id: usize, zid: &SessionId, entity_id: usize, name: &str) -> String {
    format!(
        "{ADMIN_SPACE}/{domain_id}/{zid}/{entity_id}/{}",
        mangle_name(name)
    )
}

fn mangle_name(name: &str) -> String {
    if name.is_empty() {
        "%".to_string()
    } else {
        name.replace('/', "%")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::keyexpr;

    #[test]
    fn subscription_covers_domain() {
        assert_eq!(subscription_token(0), "@ros2_lv/0/**");
        assert_eq!(subscription_token(42), "@ros2_lv/42/**");
    }

    #[test]
    fn entity_token_is_single_chunk_per_field() {
        let zid = SessionId::from_u128(0xab);
        let token = entity_token(3, &zid, 7, "/ns/talker");
        assert_eq!(token, "@ros2_lv/3/ab/7/%ns%talker");
        assert!(keyexpr::validate(&token).is_ok());
        assert!(keyexpr::matches(&subscription_token(3), &token));
        assert!(!keyexpr::matches(&subscription_token(4), &token));
    }

    #[test]
    fn empty_name_still_valid() {
        let token = entity_token(0, &SessionId::from_u128(1), 0, "");
        assert!(keyexpr::validate(&token).is_ok());
    }
}
