use chrono::NaiveDate;

/// Timestamp format used in every table (matches SQLite `datetime('now')`)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a date from a string (flexible format)
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let formats = [
        "%Y-%m-%d",    // 2025-04-28
        "%Y/%m/%d",    // 2025/04/28
        "%d-%m-%Y",    // 28-04-2025
        "%d/%m/%Y",    // 28/04/2025
        "%Y%m%d",      // 20250428
    ];

    for format in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }

    None
}

/// Format a date for display and storage
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
