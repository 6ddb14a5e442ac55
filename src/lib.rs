//! Leveled logging with a runtime-extensible level table.
//!
//! Levels are registered by name with a numeric priority and may be added at any time. Each
//! registration reindexes the table into dense ranks, and every level gets a dispatch method
//! that is enabled when its rank is at or below the active threshold:
//!
//! ```
//! use levelmux::{Builder, Output};
//!
//! let logger = Builder::new()
//!     .with_template("{level} - {message}")
//!     .with_output(Output::Null)
//!     .with_level("info")
//!     .build()?;
//!
//! logger.register_levels([("important", 2.5)])?;
//! assert_eq!(
//!     logger.levels(),
//!     ["NONE", "ERROR", "WARN", "IMPORTANT", "INFO", "DEBUG", "TRACE", "ALL"]
//! );
//!
//! let important = logger.method("important").unwrap();
//! important.log(["disk at %d%%", "91"]);
//!
//! logger.set_level("error")?;
//! assert!(!important.is_enabled());
//! # Ok::<(), levelmux::Error>(())
//! ```

pub mod config;
mod error;
pub mod http;
pub mod levels;
pub mod logging;
pub mod registry;
pub mod utils;

pub use config::{Environment, ProcessEnvironment};
pub use error::{Error, Result};
pub use http::{RequestLogLayer, RequestLogOptions};
pub use levels::{
    log_method_name, normalize_level, LevelSelector, LevelTable, Priority, Profile, Rank,
    ThresholdController,
};
pub use logging::{
    format_message, BacktraceCaller, Builder, CallerLocation, CallerResolver, Config, Format,
    LogFormatter, LogSink, Logger, NoCaller, Output, Record, RenderContext, TrackedCaller,
};
pub use registry::{DispatchMethod, MethodRegistry};
