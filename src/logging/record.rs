use std::{fmt, panic::Location, time::Duration};

use chrono::{DateTime, Local};
use serde_json::Value;

use super::format_message;
use crate::{levels::Rank, utils::elapsed_between};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerLocation {
    pub file: String,
    pub line: u32,
}

impl CallerLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl From<&Location<'_>> for CallerLocation {
    fn from(location: &Location<'_>) -> Self {
        Self::new(location.file(), location.line())
    }
}

impl fmt::Display for CallerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One dispatch call, as seen by the formatter.
#[derive(Debug, Clone)]
pub struct Record {
    time: DateTime<Local>,
    last_time: DateTime<Local>,
    level: String,
    level_value: Rank,
    args: Vec<Value>,
    caller: Option<CallerLocation>,
}

impl Record {
    pub(crate) fn new(
        time: DateTime<Local>,
        last_time: DateTime<Local>,
        level: impl Into<String>,
        level_value: Rank,
        args: Vec<Value>,
        caller: Option<CallerLocation>,
    ) -> Self {
        Self {
            time,
            last_time,
            level: level.into(),
            level_value,
            args,
            caller,
        }
    }

    pub fn time(&self) -> &DateTime<Local> {
        &self.time
    }

    /// Time of the previous dispatch, or logger creation for the first one.
    pub fn last_time(&self) -> &DateTime<Local> {
        &self.last_time
    }

    pub fn level(&self) -> &str {
        &self.level
    }

    pub fn level_value(&self) -> Rank {
        self.level_value
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn caller(&self) -> Option<&CallerLocation> {
        self.caller.as_ref()
    }

    pub fn message(&self) -> String {
        format_message(&self.args)
    }

    pub fn delta(&self) -> Duration {
        elapsed_between(&self.last_time, &self.time)
    }
}

/// Table-derived facts a formatter may need for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderContext {
    pub levels_max_length: usize,
    pub colors: bool,
}
