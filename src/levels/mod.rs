//! Level names, priorities and ranks.
//!
//! A level is registered with a [`Priority`], an arbitrary ordering key that may be fractional so
//! new levels can be slotted between existing ones. Every mutation of the [`LevelTable`] re-derives
//! a dense [`Rank`] for each level from those priorities. Ranks are what the threshold compares.

mod table;
mod threshold;

use std::{cmp::Ordering, convert::Infallible, fmt, str::FromStr};

use heck::{ToLowerCamelCase, ToShoutySnakeCase};

use crate::error::{Error, Result};

pub use table::LevelTable;
pub use threshold::{Profile, ThresholdController};

/// Floor sentinel, disables all logging.
pub const NONE: &str = "NONE";
/// Ceiling sentinel, enables all logging.
pub const ALL: &str = "ALL";

pub const ERROR: &str = "ERROR";
pub const WARN: &str = "WARN";
pub const INFO: &str = "INFO";
pub const DEBUG: &str = "DEBUG";
pub const TRACE: &str = "TRACE";

pub(crate) const BUILTIN_LEVELS: [(&str, f64); 5] =
    [(ERROR, 1.0), (WARN, 2.0), (INFO, 3.0), (DEBUG, 4.0), (TRACE, 5.0)];

/// Canonical key for a level: `"FooBar"`, `"foo-bar"` and `"foo_bar"` all become `"FOO_BAR"`.
pub fn normalize_level(name: &str) -> Result<String> {
    let normalized = name.to_shouty_snake_case();
    if normalized.is_empty() {
        return Err(Error::invalid_level(name, "name is empty after normalization"));
    }

    Ok(normalized)
}

/// Identifier of the dispatch method for `level`, e.g. `FED_UP` -> `fedUp`.
pub fn log_method_name(level: &str) -> String {
    level.to_shouty_snake_case().to_lower_camel_case()
}

pub fn is_sentinel(normalized: &str) -> bool {
    normalized == NONE || normalized == ALL
}

/// Ordering key supplied at registration. Never used as a final rank.
#[derive(Debug, Clone, Copy)]
pub struct Priority(f64);

impl Priority {
    pub fn new(value: f64) -> Option<Self> {
        if value.is_nan() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Dense position of a level after reindexing. Lower ranks are more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rank(u64);

impl Rank {
    pub const FLOOR: Rank = Rank(0);
    pub const CEILING: Rank = Rank(u64::MAX);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<Rank> for u64 {
    fn from(rank: Rank) -> Self {
        rank.0
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Argument accepted by `set_level`: a level name or a rank in the current table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelSelector {
    Name(String),
    Rank(u64),
}

impl From<&str> for LevelSelector {
    fn from(name: &str) -> Self {
        LevelSelector::Name(name.to_string())
    }
}

impl From<String> for LevelSelector {
    fn from(name: String) -> Self {
        LevelSelector::Name(name)
    }
}

impl From<&String> for LevelSelector {
    fn from(name: &String) -> Self {
        LevelSelector::Name(name.clone())
    }
}

impl From<u64> for LevelSelector {
    fn from(rank: u64) -> Self {
        LevelSelector::Rank(rank)
    }
}

impl From<Rank> for LevelSelector {
    fn from(rank: Rank) -> Self {
        LevelSelector::Rank(rank.get())
    }
}

impl FromStr for LevelSelector {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.parse::<u64>() {
            Ok(rank) => Ok(LevelSelector::Rank(rank)),
            Err(_) => Ok(LevelSelector::Name(s.to_string())),
        }
    }
}

impl fmt::Display for LevelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelSelector::Name(name) => write!(f, "{}", name),
            LevelSelector::Rank(rank) => write!(f, "{}", rank),
        }
    }
}
