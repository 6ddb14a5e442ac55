use std::{
    fmt,
    fs::File,
    io::{self, LineWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
    sync::{mpsc::Sender, Arc, Mutex},
};

use super::LogSink;
use crate::{
    error::{Error, Result},
    utils::lock,
};

/// Destination for rendered lines.
pub enum Output {
    Stdout,
    Stderr,
    Null,
    /// Appends to the file, creating it when missing.
    File(PathBuf),
    Writer(Box<dyn Write + Send>),
    /// Emits every line, newline terminated, to a receiver.
    Channel(Sender<String>),
    /// Called with the bare line.
    Function(Arc<dyn Fn(&str) + Send + Sync>),
    Sink(Box<dyn LogSink>),
}

impl Default for Output {
    fn default() -> Self {
        Output::Stdout
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Stdout => f.write_str("Stdout"),
            Output::Stderr => f.write_str("Stderr"),
            Output::Null => f.write_str("Null"),
            Output::File(path) => f.debug_tuple("File").field(path).finish(),
            Output::Writer(_) => f.write_str("Writer(..)"),
            Output::Channel(_) => f.write_str("Channel(..)"),
            Output::Function(_) => f.write_str("Function(..)"),
            Output::Sink(_) => f.write_str("Sink(..)"),
        }
    }
}

impl FromStr for Output {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "stdout" | "console" => Ok(Output::Stdout),
            "stderr" => Ok(Output::Stderr),
            "null" | "none" => Ok(Output::Null),
            other => match other.strip_prefix("file:") {
                Some(path) if !path.is_empty() => Ok(Output::File(PathBuf::from(path))),
                _ => Err(Error::UnsupportedOutput(other.to_string())),
            },
        }
    }
}

impl Output {
    pub fn function(sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Output::Function(Arc::new(sink))
    }

    pub(crate) fn into_sink(self) -> Result<Box<dyn LogSink>> {
        let sink: Box<dyn LogSink> = match self {
            Output::Stdout => Box::new(StdoutSink::new()),
            Output::Stderr => Box::new(StderrSink::new()),
            Output::Null => Box::new(NullSink::new()),
            Output::File(path) => Box::new(FileSink::new(path)?),
            Output::Writer(writer) => Box::new(WriterSink::new(writer)),
            Output::Channel(sender) => Box::new(ChannelSink::new(sender)),
            Output::Function(sink) => Box::new(FnSink(sink)),
            Output::Sink(sink) => sink,
        };
        Ok(sink)
    }
}

pub struct FileSink {
    file: Mutex<LineWriter<File>>,
    file_path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| {
                io::Error::new(
                    err.kind(),
                    format!("failed opening or creating log file {}: {}", path.display(), err),
                )
            })?;

        Ok(Self {
            file: Mutex::new(LineWriter::new(file)),
            file_path: path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

impl LogSink for FileSink {
    fn write_log(&self, line: &str) -> Result<()> {
        let mut file = lock(&self.file);
        writeln!(file, "{}", line)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        lock(&self.file).flush()?;
        Ok(())
    }
}

pub struct StdoutSink {
    handle: io::Stdout,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            handle: io::stdout(),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for StdoutSink {
    fn write_log(&self, line: &str) -> Result<()> {
        let mut writer = self.handle.lock();
        writeln!(writer, "{}", line)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.handle.lock().flush()?;
        Ok(())
    }
}

pub struct StderrSink {
    handle: io::Stderr,
}

impl StderrSink {
    pub fn new() -> Self {
        Self {
            handle: io::stderr(),
        }
    }
}

impl Default for StderrSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for StderrSink {
    fn write_log(&self, line: &str) -> Result<()> {
        let mut writer = self.handle.lock();
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.handle.lock().flush()?;
        Ok(())
    }
}

/// Any `Write` stream. Lines are newline terminated.
pub struct WriterSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl WriterSink {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl LogSink for WriterSink {
    fn write_log(&self, line: &str) -> Result<()> {
        let mut writer = lock(&self.writer);
        writeln!(writer, "{}", line)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        lock(&self.writer).flush()?;
        Ok(())
    }
}

pub struct ChannelSink {
    sender: Mutex<Sender<String>>,
}

impl ChannelSink {
    pub fn new(sender: Sender<String>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }
}

impl LogSink for ChannelSink {
    fn write_log(&self, line: &str) -> Result<()> {
        lock(&self.sender)
            .send(format!("{}\n", line))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "log receiver was dropped"))?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

pub struct FnSink(pub Arc<dyn Fn(&str) + Send + Sync>);

impl LogSink for FnSink {
    fn write_log(&self, line: &str) -> Result<()> {
        (self.0)(line);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

pub struct NullSink {}

impl NullSink {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for NullSink {
    fn write_log(&self, _line: &str) -> Result<()> {
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
