//! Property tests for request signing and encoding.

#![allow(clippy::unwrap_used)]

use pubrelay_client::{
    request::{grant_uri, query_escape},
    sign, Credentials,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn signature_is_deterministic_and_url_safe(secret in ".{1,64}", input in ".{0,256}") {
        let first = sign(&secret, &input).unwrap();
        let second = sign(&secret, &input).unwrap();

        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.len(), 44);
        prop_assert!(!first.contains('+'));
        prop_assert!(!first.contains('/'));
    }

    #[test]
    fn different_inputs_sign_differently(
        secret in "[a-z]{8}",
        a in "[a-z]{1,32}",
        b in "[a-z]{1,32}",
    ) {
        prop_assume!(a != b);
        prop_assert_ne!(sign(&secret, &a).unwrap(), sign(&secret, &b).unwrap());
    }

    #[test]
    fn query_escape_leaves_no_reserved_characters(value in ".{0,128}") {
        let escaped = query_escape(&value);
        for reserved in ['&', '=', '?', '#', ' ', '/'] {
            prop_assert!(!escaped.contains(reserved));
        }
    }

    #[test]
    fn revoke_request_is_stable(
        ttl in proptest::option::of(0u32..10_000),
        ts in 0u64..4_000_000_000,
    ) {
        let credentials = Credentials::new("pub", "sub", Some("secret"));
        let revoke = grant_uri(&credentials, "chat", "key", false, false, ttl, ts).unwrap();
        let again = grant_uri(&credentials, "chat", "key", false, false, ttl, ts).unwrap();
        let grant = grant_uri(&credentials, "chat", "key", true, true, ttl, ts).unwrap();

        prop_assert_eq!(&revoke, &again);
        prop_assert!(revoke.contains("&r=0&"));
        prop_assert!(grant.contains("&r=1&"));
    }
}
