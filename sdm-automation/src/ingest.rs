//! Ticket-number ingestion from uploaded text or CSV content.

/// Keep lines that are one or more ASCII digits after trimming, in input order.
///
/// Anything else (headers, blank lines, `300x`, comma-separated rows) is dropped;
/// duplicates are kept as given.
pub fn parse_ticket_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}
