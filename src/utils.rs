//! Number formatting for log lines and command summaries.

/// Compact suffixes, largest first
const COUNT_SCALES: [(f64, &str); 2] = [(1_000_000.0, "M"), (1_000.0, "K")];

/// Binary size units above plain bytes
const BYTE_UNITS: [&str; 3] = ["KB", "MB", "GB"];

/// Range and rule counts as `850`, `3.4K` or `1.2M`.
///
/// ```
/// use geowall::utils::format_count;
/// assert_eq!(format_count(850), "850");
/// assert_eq!(format_count(3_412), "3.4K");
/// ```
pub fn format_count(count: usize) -> String {
    let value = count as f64;
    COUNT_SCALES
        .iter()
        .find(|(scale, _)| value >= *scale)
        .map(|(scale, suffix)| format!("{:.1}{}", value / scale, suffix))
        .unwrap_or_else(|| count.to_string())
}

/// Exact totals (e.g. covered addresses) with comma grouping.
///
/// ```
/// use geowall::utils::format_thousands;
/// assert_eq!(format_thousands(16_777_216), "16,777,216");
/// ```
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.char_indices() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

/// Feed sizes in binary units.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit + 1 < BYTE_UNITS.len() {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, BYTE_UNITS[unit])
}
