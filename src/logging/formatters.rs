use std::{fmt, path::PathBuf, sync::Arc};

use chrono::format::{Item, StrftimeItems};
use serde_json::{json, Value};
use yansi::Paint;

use super::{LogFormatter, Record, RenderContext};
use crate::{
    error::{Error, Result},
    levels::{DEBUG, ERROR, INFO, TRACE, WARN},
    utils::format_delta,
};

const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

const BUILTIN_TEMPLATES: [(&str, &str); 3] = [
    ("default", "{time} {level:pad} {message}"),
    ("simple", "{level} - {message}"),
    (
        "verbose",
        "{time} {level:pad} [{pid}] {caller} - {message} (+{delta})",
    ),
];

/// Where the formatter comes from.
#[derive(Clone)]
pub enum Format {
    /// A built-in: `default`, `simple`, `verbose` or `json`.
    Named(String),
    Template(String),
    /// Template read from disk. A path without extension gets `.tpl` appended.
    File(PathBuf),
    Function(Arc<dyn Fn(&Record) -> String + Send + Sync>),
}

impl Default for Format {
    fn default() -> Self {
        Format::Named("default".to_string())
    }
}

impl fmt::Debug for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Format::Template(template) => f.debug_tuple("Template").field(template).finish(),
            Format::File(path) => f.debug_tuple("File").field(path).finish(),
            Format::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl Format {
    pub fn function(format: impl Fn(&Record) -> String + Send + Sync + 'static) -> Self {
        Format::Function(Arc::new(format))
    }

    pub(crate) fn build(self) -> Result<Box<dyn LogFormatter>> {
        match self {
            Format::Named(name) if name == "json" => Ok(Box::new(JsonFormatter)),
            Format::Named(name) => {
                let template = BUILTIN_TEMPLATES
                    .iter()
                    .find(|(builtin, _)| *builtin == name)
                    .map(|(_, template)| *template)
                    .ok_or(Error::UnsupportedFormat(name))?;
                Ok(Box::new(TemplateFormatter::parse(template)?))
            }
            Format::Template(template) => Ok(Box::new(TemplateFormatter::parse(&template)?)),
            Format::File(mut path) => {
                if path.extension().is_none() {
                    path.set_extension("tpl");
                }
                let template = std::fs::read_to_string(&path)?;
                Ok(Box::new(TemplateFormatter::parse(
                    template.trim_end_matches(&['\n', '\r'][..]),
                )?))
            }
            Format::Function(format) => Ok(Box::new(move |record: &Record| format(record))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Time(String),
    Level { pad: bool },
    LevelValue,
    Message,
    Args,
    Delta,
    Caller,
    File,
    Line,
    Pid,
}

impl Segment {
    fn placeholder(spec: &str) -> Result<Self> {
        let (name, modifier) = match spec.split_once(':') {
            Some((name, modifier)) => (name.trim(), Some(modifier)),
            None => (spec.trim(), None),
        };

        let segment = match (name, modifier) {
            ("time", None) => Segment::Time(DEFAULT_TIME_FORMAT.to_string()),
            ("time", Some(format)) => {
                if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                    return Err(Error::UnsupportedFormat(format!(
                        "{{{}}}: invalid time format",
                        spec
                    )));
                }
                Segment::Time(format.to_string())
            }
            ("level", None) => Segment::Level { pad: false },
            ("level", Some("pad")) => Segment::Level { pad: true },
            ("level_value", None) => Segment::LevelValue,
            ("message", None) => Segment::Message,
            ("args", None) => Segment::Args,
            ("delta", None) => Segment::Delta,
            ("caller", None) => Segment::Caller,
            ("file", None) => Segment::File,
            ("line", None) => Segment::Line,
            ("pid", None) => Segment::Pid,
            _ => {
                return Err(Error::UnsupportedFormat(format!(
                    "{{{}}}: unknown placeholder",
                    spec
                )))
            }
        };
        Ok(segment)
    }
}

/// Template compiled once at configuration time.
///
/// Placeholders are written `{name}` or `{name:modifier}`; `{{` and `}}` produce literal braces.
#[derive(Debug, Clone)]
pub struct TemplateFormatter {
    segments: Vec<Segment>,
}

impl TemplateFormatter {
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut spec = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        spec.push(c);
                    }
                    if !closed {
                        return Err(Error::UnsupportedFormat(format!(
                            "unterminated placeholder in {:?}",
                            template
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::placeholder(&spec)?);
                }
                c => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    fn format_level(&self, record: &Record, context: &RenderContext, pad: bool) -> String {
        let level = if pad {
            format!("{:<width$}", record.level(), width = context.levels_max_length)
        } else {
            record.level().to_string()
        };

        if !context.colors {
            return level;
        }

        match record.level() {
            ERROR => level.red().to_string(),
            WARN => level.yellow().to_string(),
            INFO => level.green().to_string(),
            DEBUG => level.blue().to_string(),
            TRACE => level.white().to_string(),
            _ => level.cyan().to_string(),
        }
    }
}

impl LogFormatter for TemplateFormatter {
    fn format(&self, record: &Record, context: &RenderContext) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Time(format) => {
                    out.push_str(&record.time().format(format).to_string());
                }
                Segment::Level { pad } => out.push_str(&self.format_level(record, context, *pad)),
                Segment::LevelValue => out.push_str(&record.level_value().to_string()),
                Segment::Message => out.push_str(&record.message()),
                Segment::Args => out.push_str(&Value::from(record.args().to_vec()).to_string()),
                Segment::Delta => out.push_str(&format_delta(record.last_time(), record.time())),
                Segment::Caller => {
                    if let Some(caller) = record.caller() {
                        out.push_str(&caller.to_string());
                    }
                }
                Segment::File => {
                    if let Some(caller) = record.caller() {
                        out.push_str(&caller.file);
                    }
                }
                Segment::Line => {
                    if let Some(caller) = record.caller() {
                        out.push_str(&caller.line.to_string());
                    }
                }
                Segment::Pid => out.push_str(&std::process::id().to_string()),
            }
        }
        out
    }
}

/// One JSON object per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl LogFormatter for JsonFormatter {
    fn format(&self, record: &Record, _context: &RenderContext) -> String {
        let caller = match record.caller() {
            Some(caller) => json!({ "file": caller.file, "line": caller.line }),
            None => Value::Null,
        };

        json!({
            "time": record.time().to_rfc3339(),
            "level": record.level(),
            "levelValue": record.level_value().get(),
            "message": record.message(),
            "args": record.args(),
            "deltaMs": record.delta().as_millis() as u64,
            "caller": caller,
        })
        .to_string()
    }
}

/// printf-style rendering of dispatch arguments.
///
/// A leading string argument is a format: `%s` takes the next argument as text, `%d`/`%i`/`%f`
/// as a number, `%j`/`%o`/`%O` as JSON and `%%` is a literal percent. Placeholders without a
/// matching argument are left as written. Remaining arguments are appended separated by spaces.
pub fn format_message(args: &[Value]) -> String {
    let mut out = String::new();
    let mut rest = args.iter().peekable();
    let mut started = false;

    if let Some(Value::String(format)) = args.first() {
        rest.next();
        started = true;
        let mut chars = format.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.peek().copied() {
                Some('%') => {
                    chars.next();
                    out.push('%');
                }
                Some(spec @ ('s' | 'd' | 'i' | 'f' | 'j' | 'o' | 'O')) if rest.peek().is_some() => {
                    chars.next();
                    if let Some(arg) = rest.next() {
                        out.push_str(&substitute(spec, arg));
                    }
                }
                _ => out.push('%'),
            }
        }
    }

    for arg in rest {
        if started {
            out.push(' ');
        }
        started = true;
        out.push_str(&display_value(arg));
    }
    out
}

fn substitute(spec: char, arg: &Value) -> String {
    match spec {
        's' => display_value(arg),
        'd' => match arg {
            Value::Number(number) => number.to_string(),
            other => format_number(as_number(other)),
        },
        'i' => format_number(as_number(arg).map(f64::trunc)),
        'f' => format_number(as_number(arg)),
        _ => arg.to_string(),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        _ => None,
    }
}

fn format_number(number: Option<f64>) -> String {
    match number {
        Some(number) if number.is_finite() && number.fract() == 0.0 && number.abs() < 1e15 => {
            format!("{}", number as i64)
        }
        Some(number) => number.to_string(),
        None => "NaN".to_string(),
    }
}
