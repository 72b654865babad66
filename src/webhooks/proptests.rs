//! Property-Based Tests for Webhook Dispatch
//!
//! Invariants checked with random inputs:
//! - The token cache holds one entry per key and the last write wins
//! - Auth type matching ignores ASCII case
//! - Token responses with a non-blank access_token always validate

use proptest::prelude::*;
use std::collections::HashMap;

use crate::webhooks::oauth::TokenResponse;
use crate::webhooks::token_cache::TokenCache;
use crate::webhooks::types::{Auth, AuthKind};

fn arb_puts() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("endpoint-[0-4]", "[A-Za-z0-9._-]{1,24}"), 0..40)
}

proptest! {
    #[test]
    fn prop_cache_last_write_wins(puts in arb_puts()) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let cache = TokenCache::new();
            let mut expected = HashMap::new();
            for (key, token) in &puts {
                cache.put(key.clone(), token.clone()).await;
                expected.insert(key.clone(), token.clone());
            }

            prop_assert_eq!(cache.len().await, expected.len());
            for (key, token) in &expected {
                let got = cache.get(key).await;
                prop_assert_eq!(got.as_ref(), Some(token));
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_auth_type_case_insensitive(mask in prop::collection::vec(any::<bool>(), 6)) {
        let auth_type: String = "oauth2"
            .chars()
            .zip(mask)
            .map(|(c, upper)| if upper { c.to_ascii_uppercase() } else { c })
            .collect();
        let auth = Auth { auth_type, ..Auth::oauth2("http://auth/oauth", "a:b") };
        prop_assert_eq!(auth.kind(), AuthKind::OAuth2);
    }

    #[test]
    fn prop_token_response_accepts_any_non_blank_token(
        token in "[A-Za-z0-9._-]{1,64}",
        expires_in in proptest::option::of(0u64..100_000),
    ) {
        let mut body = serde_json::json!({ "access_token": token.clone(), "token_type": "bearer" });
        if let Some(secs) = expires_in {
            body["expires_in"] = serde_json::json!(secs);
        }

        let access = TokenResponse::parse(body.to_string().as_bytes()).unwrap();
        prop_assert_eq!(access.token, token);
        prop_assert_eq!(access.expires_in.map(|d| d.as_secs()), expires_in);
    }
}
