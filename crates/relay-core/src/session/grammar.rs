//! Input grammar for free-text messages: locator detection and file
//! selection parsing.

use std::collections::BTreeSet;

use relay_types::error::SelectionError;

/// Literal prefix identifying a magnet locator.
pub const LOCATOR_PREFIX: &str = "magnet:";

/// Whether `text` (ignoring surrounding whitespace) is a locator.
pub fn is_locator(text: &str) -> bool {
    text.trim().starts_with(LOCATOR_PREFIX)
}

/// Parse a selection reply into 0-based file indices.
///
/// Accepts `all` (any case) or comma-separated 1-based numbers in
/// `[1, file_count]`. Whitespace around tokens is ignored and duplicates
/// collapse.
pub fn parse_selection(input: &str, file_count: usize) -> Result<BTreeSet<usize>, SelectionError> {
    if file_count == 0 {
        return Err(SelectionError::NoFiles);
    }

    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("all") {
        return Ok((0..file_count).collect());
    }

    let mut indices = BTreeSet::new();
    for token in trimmed.split(',') {
        let token = token.trim();
        let number: i64 = token
            .parse()
            .map_err(|_| SelectionError::Malformed(token.to_string()))?;
        if number < 1 || number as u64 > file_count as u64 {
            return Err(SelectionError::OutOfRange {
                number,
                max: file_count,
            });
        }
        indices.insert((number - 1) as usize);
    }
    Ok(indices)
}
