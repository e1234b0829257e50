//! Robustness tests for edge cases and error conditions.
//!
//! These tests verify that geowall handles hostile or damaged input gracefully.

use geowall::config::Config;
use geowall::enforcer::{FirewallBackend, MemoryBackend, INPUT_CHAIN};
use geowall::reconciler::FirewallReconciler;
use geowall::registry::{self, count_to_prefix, AddressRange};
use proptest::prelude::*;
use std::net::Ipv4Addr;

/// Test that every kind of junk line is counted, never fatal
#[test]
fn test_parser_survives_garbage() {
    let raw = "\
|||||||
apnic|AU|ipv4|||||
apnic|AU|ipv4|999.1.1.1|256|x|y
apnic|AU|ipv4|1.2.3.0|-1|x|y
apnic|AU|ipv4|1.2.3.0|99999999999999999999|x|y
apnic|AU|ipv4|1.2.3.0|8589934592|x|y
apnic|AU|ipv4|::1|256|x|y
\u{0}\u{1}\u{2}
apnic|AU|ipv4|1.2.3.0|256|20200101|allocated
";
    let report = registry::parse(raw, "AU");
    assert_eq!(report.ranges.len(), 1);
    assert_eq!(report.lines, 9);
    assert_eq!(report.invalid + report.skipped, 8);
}

#[test]
fn test_crlf_line_endings() {
    let raw = "# header\r\napnic|AU|ipv4|1.2.3.0|256|20200101|allocated\r\n\r\n";
    let report = registry::parse(raw, "AU");
    assert_eq!(report.ranges.len(), 1);
    assert_eq!(report.ranges[0].to_string(), "1.2.3.0/24");
}

#[test]
fn test_invalid_utf8_feed() {
    let mut raw = b"apnic|AU|ipv4|1.2.3.0|256|20200101|allocated\n".to_vec();
    raw.extend_from_slice(&[0xff, 0xfe, b'|', b'\n']);
    raw.extend_from_slice(b"apnic|AU|ipv4|5.6.0.0|65536|20200101|allocated\n");

    let report = registry::parse_bytes(&raw, "AU");
    assert_eq!(report.ranges.len(), 2);
}

#[test]
fn test_large_feed() {
    let mut raw = String::new();
    for i in 0..50_000u32 {
        let cc = if i % 2 == 0 { "AU" } else { "JP" };
        raw.push_str(&format!(
            "apnic|{}|ipv4|{}.{}.{}.0|256|20200101|allocated\n",
            cc,
            (i >> 16) & 0xff,
            (i >> 8) & 0xff,
            i & 0xff
        ));
    }
    let report = registry::parse(&raw, "AU");
    assert_eq!(report.ranges.len(), 25_000);
    assert_eq!(report.address_count(), 25_000 * 256);
}

#[test]
fn test_yaml_malformed_input() {
    let bad = [
        "country: [",
        "mandatory_ranges: 10.0.0.0/8",
        "fetch_timeout_secs: -1",
        "link_policy: 42",
    ];
    for yaml in bad {
        assert!(serde_yaml::from_str::<Config>(yaml).is_err(), "{}", yaml);
    }
}

#[test]
fn test_range_append_failures_do_not_abort() {
    let backend = MemoryBackend::new();
    backend.fail_on("-s 1.");

    let ranges: Vec<AddressRange> = (0..10u8)
        .map(|i| AddressRange::new(Ipv4Addr::new(1, i, 0, 0), 16).unwrap())
        .chain(std::iter::once(
            AddressRange::new(Ipv4Addr::new(2, 0, 0, 0), 16).unwrap(),
        ))
        .collect();
    let count = FirewallReconciler::new(&backend, "AU_WHITELIST")
        .install(&ranges, &[])
        .unwrap();

    assert_eq!(count.failed, 10);
    assert_eq!(count.ranges, 1);
    assert_eq!(backend.rules(INPUT_CHAIN).unwrap().len(), 2);
    assert!(backend.chain_exists("AU_WHITELIST"));
}

proptest! {
    #[test]
    fn prop_parse_never_panics(raw in "\\PC{0,400}") {
        let report = registry::parse(&raw, "AU");
        prop_assert_eq!(report.lines, raw.lines().count());
        prop_assert!(report.ranges.len() + report.invalid + report.skipped == report.lines);
    }

    #[test]
    fn prop_pipe_records_never_panic(
        fields in proptest::collection::vec("[A-Za-z0-9.:*-]{0,12}", 0..10)
    ) {
        let line = fields.join("|");
        let _ = registry::classify_line(&line, "AU");
    }

    #[test]
    fn prop_prefix_covers_at_most_count(count in 1i64..=(1i64 << 32)) {
        let prefix = count_to_prefix(count).unwrap();
        let block = 1u64 << (32 - u32::from(prefix));
        prop_assert!(block <= count as u64);
        prop_assert!(block * 2 > count as u64);
    }
}
