use std::backtrace::Backtrace;

use super::CallerLocation;
use crate::error::{Error, Result};

/// Resolves where a dispatch call came from.
///
/// `site` is the location captured at the call, when one is known. Errors never reach the code
/// that called the dispatch method; the record is built with no caller instead.
pub trait CallerResolver: Send + Sync {
    fn resolve(&self, site: Option<&CallerLocation>) -> Result<Option<CallerLocation>>;
}

/// Uses the location captured by `#[track_caller]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackedCaller;

impl CallerResolver for TrackedCaller {
    fn resolve(&self, site: Option<&CallerLocation>) -> Result<Option<CallerLocation>> {
        Ok(site.cloned())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoCaller;

impl CallerResolver for NoCaller {
    fn resolve(&self, _site: Option<&CallerLocation>) -> Result<Option<CallerLocation>> {
        Ok(None)
    }
}

/// Call site when known, otherwise the first backtrace frame outside this crate and the standard
/// library. Needs debug info to find anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktraceCaller;

const SKIPPED_FRAMES: [&str; 6] = [
    "/rustc/",
    "/library/std/",
    "/library/core/",
    "src/registry.rs",
    "src/logging/",
    "src/levels/",
];

impl BacktraceCaller {
    fn scan(trace: &str) -> Option<CallerLocation> {
        trace
            .lines()
            .filter_map(|line| line.trim().strip_prefix("at "))
            .filter_map(parse_frame)
            .find(|frame| !SKIPPED_FRAMES.iter().any(|skip| frame.file.contains(skip)))
    }
}

impl CallerResolver for BacktraceCaller {
    fn resolve(&self, site: Option<&CallerLocation>) -> Result<Option<CallerLocation>> {
        if let Some(site) = site {
            return Ok(Some(site.clone()));
        }

        let trace = Backtrace::force_capture().to_string();
        Self::scan(&trace)
            .map(Some)
            .ok_or_else(|| Error::CallerUnavailable("no frame outside the logger".to_string()))
    }
}

// `path/to/file.rs:12:5`
fn parse_frame(frame: &str) -> Option<CallerLocation> {
    let mut parts = frame.rsplitn(3, ':');
    let _column = parts.next()?;
    let line = parts.next()?.parse().ok()?;
    let file = parts.next()?;
    Some(CallerLocation::new(file, line))
}
