//! Fuzz testing for route normalization and validation.
//!
//! Feeds arbitrary input through the functions that run before any route is
//! sent to the gateway and checks that they:
//!
//! - Never panic on any input
//! - Keep the normalization invariants (`/**` suffix, explicit scheme)
//! - Are idempotent: normalizing twice equals normalizing once
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```

#![no_main]

use gateway_console::models::{AllowedIp, RateLimit, RouteDraft};
use gateway_console::validation::{
    normalize_predicates, normalize_uri, prepare_route, validate_ip, validate_rate_limit,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let predicates = normalize_predicates(s);
        assert!(predicates.ends_with("/**"));
        assert_eq!(normalize_predicates(&predicates), predicates);

        let uri = normalize_uri(s);
        assert!(uri.starts_with("http://") || uri.starts_with("https://"));
        assert_eq!(normalize_uri(&uri), uri);

        let _ = validate_ip(s);

        let mid = (0..=s.len() / 2)
            .rev()
            .find(|&i| s.is_char_boundary(i))
            .unwrap_or(0);
        let (left, right) = s.split_at(mid);
        let mut draft = RouteDraft::new(left, right);
        draft.allowed_ips = vec![AllowedIp::new(s)];
        if let Ok(prepared) = prepare_route(draft) {
            assert!(prepared.predicates.ends_with("/**"));
            assert!(validate_ip(&prepared.allowed_ips[0].ip).is_ok());
        }
    }

    if data.len() >= 12 {
        let max_requests = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let time_window_ms = u64::from_le_bytes([
            data[4], data[5], data[6], data[7], data[8], data[9], data[10], data[11],
        ]);
        let _ = validate_rate_limit(&RateLimit {
            max_requests,
            time_window_ms,
        });
    }
});
