use std::ops::RangeInclusive;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("`{field}` = {value} is out of range, expected {min}..={max}")]
    InvalidWidth {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("invalid `{field}`: {reason}")]
    InvalidParameter { field: &'static str, reason: String },
    #[error("failed to allocate {entries} entries for {table}")]
    Allocation { table: &'static str, entries: usize },
}

/// Rejects a bit width outside `range` instead of letting it wrap the index mask.
pub fn check_width(
    field: &'static str,
    value: u32,
    range: RangeInclusive<u32>,
) -> Result<u32, ConfigError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidWidth {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

/// Allocates a table of `entries` copies of `init`, reporting failure instead of aborting.
pub fn allocate<T: Clone>(
    table: &'static str,
    entries: usize,
    init: T,
) -> Result<Vec<T>, ConfigError> {
    let mut v = Vec::new();
    v.try_reserve_exact(entries)
        .map_err(|_| ConfigError::Allocation { table, entries })?;
    v.resize(entries, init);
    Ok(v)
}
