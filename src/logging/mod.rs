mod caller;
mod formatters;
mod logger;
mod record;
mod sinks;

pub use caller::{BacktraceCaller, CallerResolver, NoCaller, TrackedCaller};
pub use formatters::{format_message, Format, JsonFormatter, TemplateFormatter};
pub use logger::{Builder, Config, Logger};
pub use record::{CallerLocation, Record, RenderContext};
pub use sinks::{
    ChannelSink, FileSink, FnSink, NullSink, Output, StderrSink, StdoutSink, WriterSink,
};

use crate::error::Result;

/// Turns a record into the line handed to the sink.
pub trait LogFormatter: Sync + Send {
    fn format(&self, record: &Record, context: &RenderContext) -> String;
}

impl<F> LogFormatter for F
where
    F: Fn(&Record) -> String + Sync + Send,
{
    fn format(&self, record: &Record, _context: &RenderContext) -> String {
        self(record)
    }
}

pub trait LogSink: Sync + Send {
    fn write_log(&self, line: &str) -> Result<()>;
    fn flush(&self) -> Result<()>;
}
