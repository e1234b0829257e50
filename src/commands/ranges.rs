//! Ranges command implementation.

use anyhow::Result;
use std::io::{self, Write};
use tracing::info;

use crate::config::Config;
use crate::fetcher::load_feed;
use crate::registry;
use crate::utils::{format_count, format_thousands};

/// Print the country's ranges, one CIDR per line
pub async fn run(config: &Config, refresh: bool) -> Result<()> {
    let feed = load_feed(config, refresh).await?;
    let report = registry::parse_bytes(&feed.bytes, &config.country);

    let mut out = io::BufWriter::new(io::stdout().lock());
    for range in &report.ranges {
        writeln!(out, "{}", range)?;
    }
    out.flush()?;

    info!(
        "{} ranges, {} addresses",
        format_count(report.ranges.len()),
        format_thousands(report.address_count())
    );
    Ok(())
}
