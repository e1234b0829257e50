//! Registry delegation feed parser.
//!
//! Converts a Regional Internet Registry "delegated" statistics file into the
//! ordered list of IPv4 CIDR ranges allocated to one country.
//!
//! Record format (pipe separated, at least 7 fields):
//!
//! ```text
//! registry|cc|type|start|value|date|status[|extensions...]
//! apnic|AU|ipv4|1.2.3.0|256|20200101|allocated
//! ```
//!
//! For `ipv4` records `value` is the number of addresses in the block, which the
//! registry publishes as a power of two. The prefix length is derived as
//! `32 - floor(log2(value))`; a count that is not a power of two is truncated to
//! the next smaller block rather than rejected.

use ipnet::Ipv4Net;
use std::fmt;
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

use crate::error::RecordError;
use crate::utils::format_count;

/// Minimum number of fields in a data record
const MIN_FIELDS: usize = 7;

/// Only the first few invalid records are logged individually
const MAX_LOGGED_ERRORS: usize = 5;

/// Number of ranges listed at debug level after a parse
const PREVIEW_RANGES: usize = 10;

/// Line prefixes of the version header (`2|...` or `2.3|...`).
const HEADER_PREFIXES: &[&str] = &["2.", "2|"];

/// A validated IPv4 block taken from one registry record.
///
/// The start address is kept exactly as the registry published it; it is not
/// normalized to the network address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange(Ipv4Net);

impl AddressRange {
    /// Build a range from a start address and a prefix length (0..=32).
    pub fn new(start: Ipv4Addr, prefix_len: u8) -> Option<Self> {
        Ipv4Net::new(start, prefix_len).ok().map(Self)
    }

    pub fn start(&self) -> Ipv4Addr {
        self.0.addr()
    }

    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }

    pub fn net(&self) -> Ipv4Net {
        self.0
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.start(), self.prefix_len())
    }
}

/// Ordered ranges produced by one parse run. Order follows the feed.
pub type RangeSet = Vec<AddressRange>;

/// Why a line was not considered a candidate record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Blank,
    Comment,
    Header,
    ShortRecord,
    OtherCountry,
    OtherResourceType,
}

/// Classification of a single feed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Not a record for the target country/family.
    Skipped(SkipReason),
    /// A matching record with a valid range.
    Accepted(AddressRange),
    /// A matching record that could not be turned into a range.
    Rejected(RecordError),
}

/// Convert an address count into a CIDR prefix length.
///
/// Returns `32 - floor(log2(count))`. Counts `<= 0` and counts whose prefix falls
/// outside `0..=32` (more than 2^32 addresses) are rejected.
pub fn count_to_prefix(count: i64) -> Result<u8, RecordError> {
    if count <= 0 {
        return Err(RecordError::InvalidCount(count));
    }

    let prefix = 32 - i64::from(count.ilog2());
    if !(0..=32).contains(&prefix) {
        return Err(RecordError::PrefixOutOfRange { prefix, count });
    }

    Ok(prefix as u8)
}

/// Classify one feed line against the target country.
pub fn classify_line(line: &str, country: &str) -> LineOutcome {
    if line.starts_with('#') {
        return LineOutcome::Skipped(SkipReason::Comment);
    }
    if HEADER_PREFIXES.iter().any(|p| line.starts_with(p)) {
        return LineOutcome::Skipped(SkipReason::Header);
    }
    if line.trim().is_empty() {
        return LineOutcome::Skipped(SkipReason::Blank);
    }

    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() < MIN_FIELDS {
        return LineOutcome::Skipped(SkipReason::ShortRecord);
    }

    let (cc, res_type, start, value) = (fields[1], fields[2], fields[3], fields[4]);

    if !cc.eq_ignore_ascii_case(country) {
        return LineOutcome::Skipped(SkipReason::OtherCountry);
    }
    if res_type != "ipv4" {
        return LineOutcome::Skipped(SkipReason::OtherResourceType);
    }

    match parse_range(start, value) {
        Ok(range) => LineOutcome::Accepted(range),
        Err(e) => LineOutcome::Rejected(e),
    }
}

fn parse_range(start: &str, value: &str) -> Result<AddressRange, RecordError> {
    let count: i64 = value
        .trim()
        .parse()
        .map_err(|_| RecordError::NonNumericCount(value.to_string()))?;
    let prefix = count_to_prefix(count)?;

    let addr: Ipv4Addr = start
        .trim()
        .parse()
        .map_err(|_| RecordError::InvalidAddress(start.to_string()))?;

    AddressRange::new(addr, prefix).ok_or(RecordError::PrefixOutOfRange {
        prefix: i64::from(prefix),
        count,
    })
}

/// Result of parsing a whole feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseReport {
    /// Accepted ranges, in feed order
    pub ranges: RangeSet,
    /// Total lines read
    pub lines: usize,
    /// Lines that were not candidate records
    pub skipped: usize,
    /// Matching records rejected during range derivation
    pub invalid: usize,
}

impl ParseReport {
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of addresses covered by the accepted ranges (overlaps counted twice).
    pub fn address_count(&self) -> u64 {
        self.ranges
            .iter()
            .map(|r| 1u64 << (32 - u32::from(r.prefix_len())))
            .sum()
    }
}

/// Parse registry text into the ranges allocated to `country`.
///
/// Never fails: malformed lines are counted and skipped, and a feed without any
/// match yields an empty report.
pub fn parse(raw: &str, country: &str) -> ParseReport {
    let mut report = ParseReport::default();

    for (idx, line) in raw.lines().enumerate() {
        report.lines += 1;

        match classify_line(line, country) {
            LineOutcome::Accepted(range) => report.ranges.push(range),
            LineOutcome::Skipped(_) => report.skipped += 1,
            LineOutcome::Rejected(e) => {
                report.invalid += 1;
                if report.invalid <= MAX_LOGGED_ERRORS {
                    warn!("Skipping invalid entry at line {}: {}", idx + 1, e);
                }
            }
        }
    }

    info!("Parsed {} total lines", format_count(report.lines));
    info!(
        "Found {} {} IPv4 ranges",
        format_count(report.ranges.len()),
        country.to_ascii_uppercase()
    );
    if report.invalid > 0 {
        warn!("Skipped {} invalid entries", report.invalid);
    }

    for (i, range) in report.ranges.iter().take(PREVIEW_RANGES).enumerate() {
        debug!("[{:02}] {}", i + 1, range);
    }
    if report.ranges.len() > PREVIEW_RANGES {
        debug!(
            "... ({} more ranges not shown)",
            report.ranges.len() - PREVIEW_RANGES
        );
    }

    report
}

/// Parse a raw byte feed, replacing invalid UTF-8 sequences.
pub fn parse_bytes(raw: &[u8], country: &str) -> ParseReport {
    parse(&String::from_utf8_lossy(raw), country)
}
