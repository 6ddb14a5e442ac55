use std::{
    io::IsTerminal,
    path::PathBuf,
    sync::{mpsc::Sender, Arc, RwLock},
};

use indexmap::IndexMap;
use log::{LevelFilter, Log};
use serde_json::Value;

use super::{
    CallerLocation, CallerResolver, Format, LogSink, Output, Record, RenderContext, TrackedCaller,
};
use crate::{
    config::{Environment, ProcessEnvironment},
    error::Result,
    levels::{self, LevelSelector, LevelTable, Rank, ThresholdController},
    registry::{DispatchMethod, Dispatcher, MethodRegistry, Pipeline},
    utils::{read, write},
};

/// Everything `init` needs. Unset fields fall back to the built-in defaults.
pub struct Config {
    /// Starting level. Without it the environment override, then the profile default applies.
    pub level: Option<LevelSelector>,
    /// Replaces the built-in levels; position decides order.
    pub levels: Option<Vec<String>>,
    /// Merged in after the base levels.
    pub extra_levels: Vec<(String, f64)>,
    pub format: Format,
    pub out: Output,
    /// Attach the call site to records.
    pub caller: bool,
    pub caller_resolver: Option<Box<dyn CallerResolver>>,
    /// Colored level names. Unset means "when stdout is a terminal".
    pub colors: Option<bool>,
    pub environment: Box<dyn Environment>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: None,
            levels: None,
            extra_levels: Vec::new(),
            format: Format::default(),
            out: Output::default(),
            caller: true,
            caller_resolver: None,
            colors: None,
            environment: Box::new(ProcessEnvironment::new()),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Clone)]
struct Core {
    table: LevelTable,
    threshold: ThresholdController,
}

impl Core {
    fn prepare(config: Config) -> Result<(Core, Pipeline)> {
        let environment = config.environment;

        let mut table = match config.levels {
            Some(names) => LevelTable::from_names(names)?,
            None => LevelTable::new(),
        };
        if !config.extra_levels.is_empty() {
            table.register_levels(config.extra_levels)?;
        }

        let level = ThresholdController::initial_level(
            &table,
            config.level,
            environment.level_override().as_deref(),
            environment.profile(),
        );
        let threshold = ThresholdController::new(&table, level)?;

        let colors = environment
            .colors_override()
            .or(config.colors)
            .unwrap_or_else(|| std::io::stdout().is_terminal());

        let pipeline = Pipeline::new(
            config.format.build()?,
            config.out.into_sink()?,
            config
                .caller_resolver
                .unwrap_or_else(|| Box::new(TrackedCaller)),
            config.caller,
            RenderContext {
                levels_max_length: table.levels_max_length(),
                colors,
            },
        );

        Ok((Core { table, threshold }, pipeline))
    }
}

struct Shared {
    core: RwLock<Core>,
    methods: MethodRegistry,
    dispatcher: Arc<Dispatcher>,
}

/// A leveled logger: the level table, the active threshold and the dispatch methods they drive.
///
/// Clones share state. Every mutation rebuilds all dispatch methods before it returns.
#[derive(Clone)]
pub struct Logger {
    shared: Arc<Shared>,
}

impl Logger {
    pub fn new(config: Config) -> Result<Self> {
        let (core, pipeline) = Core::prepare(config)?;
        let dispatcher = Arc::new(Dispatcher::new(pipeline));
        let methods = MethodRegistry::new(dispatcher.clone());
        methods.rebuild_all(&core.table, &core.threshold);

        Ok(Self {
            shared: Arc::new(Shared {
                core: RwLock::new(core),
                methods,
                dispatcher,
            }),
        })
    }

    /// Reconfigures from scratch. Nothing changes when `config` is rejected; handles to dispatch
    /// methods taken earlier stay valid.
    pub fn init(&self, config: Config) -> Result<()> {
        let (next, pipeline) = Core::prepare(config)?;

        let mut core = write(&self.shared.core);
        self.shared.dispatcher.replace(pipeline);
        *core = next;
        self.shared.methods.rebuild_all(&core.table, &core.threshold);
        Ok(())
    }

    /// Adds or re-prioritizes levels, then reindexes and rebinds every dispatch method.
    pub fn register_levels<I, K>(&self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut core = write(&self.shared.core);
        let mut table = core.table.clone();
        table.register_levels(pairs)?;
        let mut threshold = core.threshold.clone();
        threshold.refresh(&table)?;

        core.table = table;
        core.threshold = threshold;
        self.shared.dispatcher.set_levels_max_length(core.table.levels_max_length());
        self.shared.methods.rebuild_all(&core.table, &core.threshold);

        log::debug!(target: "levelmux", "levels are now {:?}", core.table.ordered_names());
        Ok(())
    }

    /// Sets the threshold by name or by rank in the current table.
    pub fn set_level(&self, level: impl Into<LevelSelector>) -> Result<()> {
        let selector = level.into();
        let mut core = write(&self.shared.core);
        let Core { table, threshold } = &mut *core;
        threshold.set_level(table, &selector)?;
        self.shared.methods.rebuild_all(table, threshold);
        Ok(())
    }

    pub fn level(&self) -> String {
        read(&self.shared.core).threshold.level().to_string()
    }

    pub fn threshold_value(&self) -> Rank {
        read(&self.shared.core).threshold.level_value()
    }

    pub fn is_enabled(&self, level: &str) -> bool {
        let core = read(&self.shared.core);
        core.threshold.is_enabled(&core.table, level)
    }

    /// Names by ascending rank, sentinels included.
    pub fn levels(&self) -> Vec<String> {
        read(&self.shared.core).table.ordered_names()
    }

    pub fn level_value(&self, level: &str) -> Option<Rank> {
        read(&self.shared.core).table.rank(level)
    }

    pub fn priority(&self, level: &str) -> Option<f64> {
        read(&self.shared.core).table.priority(level)
    }

    pub fn levels_max_length(&self) -> usize {
        read(&self.shared.core).table.levels_max_length()
    }

    pub fn level_table(&self) -> LevelTable {
        read(&self.shared.core).table.clone()
    }

    pub fn log_method_name(&self, level: &str) -> String {
        levels::log_method_name(level)
    }

    /// Enabled state of every non-sentinel level.
    pub fn enabled_levels(&self) -> IndexMap<String, bool> {
        self.shared
            .methods
            .methods()
            .into_iter()
            .map(|method| (method.level().to_string(), method.is_enabled()))
            .collect()
    }

    /// The live namespace of dispatch methods.
    pub fn methods(&self) -> &MethodRegistry {
        &self.shared.methods
    }

    pub fn method(&self, level: &str) -> Option<Arc<DispatchMethod>> {
        self.shared.methods.get(level)
    }

    /// Logs through the method of `level`. Unknown levels are ignored.
    #[track_caller]
    pub fn log<I, V>(&self, level: &str, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        if let Some(method) = self.method(level) {
            method.log(args);
        }
    }

    #[track_caller]
    pub fn error<I: IntoIterator<Item = V>, V: Into<Value>>(&self, args: I) {
        self.log(levels::ERROR, args)
    }

    #[track_caller]
    pub fn warn<I: IntoIterator<Item = V>, V: Into<Value>>(&self, args: I) {
        self.log(levels::WARN, args)
    }

    #[track_caller]
    pub fn info<I: IntoIterator<Item = V>, V: Into<Value>>(&self, args: I) {
        self.log(levels::INFO, args)
    }

    #[track_caller]
    pub fn debug<I: IntoIterator<Item = V>, V: Into<Value>>(&self, args: I) {
        self.log(levels::DEBUG, args)
    }

    #[track_caller]
    pub fn trace<I: IntoIterator<Item = V>, V: Into<Value>>(&self, args: I) {
        self.log(levels::TRACE, args)
    }

    pub fn flush(&self) -> Result<()> {
        self.shared.dispatcher.flush()
    }

    /// Flushes the sink and empties the level table. Only `NONE` and `ALL` remain and the
    /// threshold drops to `NONE`, so no level is enabled and every dispatch method is unbound.
    /// A later `init` or `register_levels` starts over.
    pub fn dispose(&self) -> Result<()> {
        let table = LevelTable::empty();
        let threshold = ThresholdController::new(&table, levels::NONE)?;

        let mut core = write(&self.shared.core);
        self.shared.methods.clear();
        self.shared.dispatcher.set_levels_max_length(table.levels_max_length());
        *core = Core { table, threshold };
        drop(core);

        self.flush()
    }

    /// Routes records of the `log` facade to the matching dispatch method.
    pub fn install(&self) -> Result<()> {
        log::set_boxed_logger(Box::new(self.clone()))?;
        log::set_max_level(LevelFilter::Trace);
        Ok(())
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        // Our own diagnostics would feed back into the dispatcher.
        !metadata.target().starts_with("levelmux") && self.is_enabled(metadata.level().as_str())
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if let Some(method) = self.method(record.level().as_str()) {
            let site = record
                .file()
                .zip(record.line())
                .map(|(file, line)| CallerLocation::new(file, line));
            let message = record.args().to_string().replace('%', "%%");
            method.dispatch(vec![Value::String(message)], site);
        }
    }

    fn flush(&self) {
        if let Err(err) = Logger::flush(self) {
            log::error!(target: "levelmux", "failed flushing log output: {}", err);
        }
    }
}

pub struct Builder {
    config: Config,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_level(mut self, level: impl Into<LevelSelector>) -> Self {
        self.config.level = Some(level.into());
        self
    }

    pub fn with_levels<I, K>(mut self, levels: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.config.levels = Some(levels.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_extra_levels<I, K>(mut self, levels: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        self.config
            .extra_levels
            .extend(levels.into_iter().map(|(name, priority)| (name.into(), priority)));
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.config.format = format;
        self
    }

    pub fn with_template(self, template: impl Into<String>) -> Self {
        self.with_format(Format::Template(template.into()))
    }

    pub fn with_format_fn(
        self,
        format: impl Fn(&Record) -> String + Send + Sync + 'static,
    ) -> Self {
        self.with_format(Format::function(format))
    }

    pub fn with_output(mut self, out: Output) -> Self {
        self.config.out = out;
        self
    }

    pub fn with_file_sink(self, path: impl Into<PathBuf>) -> Self {
        self.with_output(Output::File(path.into()))
    }

    pub fn with_stderr_sink(self) -> Self {
        self.with_output(Output::Stderr)
    }

    pub fn with_channel_sink(self, sender: Sender<String>) -> Self {
        self.with_output(Output::Channel(sender))
    }

    pub fn with_sink(self, sink: impl LogSink + 'static) -> Self {
        self.with_output(Output::Sink(Box::new(sink)))
    }

    pub fn with_caller(mut self, caller: bool) -> Self {
        self.config.caller = caller;
        self
    }

    pub fn with_caller_resolver(mut self, resolver: impl CallerResolver + 'static) -> Self {
        self.config.caller_resolver = Some(Box::new(resolver));
        self
    }

    pub fn with_colors(mut self, colors: bool) -> Self {
        self.config.colors = Some(colors);
        self
    }

    pub fn with_environment(mut self, environment: impl Environment + 'static) -> Self {
        self.config.environment = Box::new(environment);
        self
    }

    pub fn config(self) -> Config {
        self.config
    }

    pub fn build(self) -> Result<Logger> {
        Logger::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashMap, sync::mpsc};

    use crate::{
        config::{LEVEL_VAR, PROFILE_VAR},
        error::Error,
    };

    fn quiet_env() -> HashMap<String, String> {
        HashMap::new()
    }

    fn builder(sender: Sender<String>) -> Builder {
        Builder::new()
            .with_template("{level} - {message}")
            .with_channel_sink(sender)
            .with_colors(false)
            .with_environment(quiet_env())
    }

    fn drain(receiver: &mpsc::Receiver<String>) -> Vec<String> {
        receiver.try_iter().collect()
    }

    #[test]
    fn defaults_log_up_to_info() {
        let (sender, receiver) = mpsc::channel();
        let logger = builder(sender).build().unwrap();

        logger.info(["hello"]);
        logger.error(["hello"]);
        logger.warn(["hello"]);
        logger.debug(["hello"]);
        logger.trace(["hello"]);

        assert_eq!(
            drain(&receiver),
            ["INFO - hello\n", "ERROR - hello\n", "WARN - hello\n"]
        );
        assert_eq!(logger.level(), "INFO");
    }

    #[test]
    fn explicit_level_beats_environment() {
        let (sender, _receiver) = mpsc::channel();
        let env: HashMap<String, String> =
            [(LEVEL_VAR.to_string(), "trace".to_string())].into_iter().collect();
        let logger = builder(sender)
            .with_environment(env.clone())
            .with_level("error")
            .build()
            .unwrap();
        assert_eq!(logger.level(), "ERROR");

        let (sender, _receiver) = mpsc::channel();
        let logger = builder(sender).with_environment(env).build().unwrap();
        assert_eq!(logger.level(), "TRACE");
    }

    #[test]
    fn production_profile_defaults_to_warn() {
        let (sender, _receiver) = mpsc::channel();
        let env: HashMap<String, String> =
            [(PROFILE_VAR.to_string(), "production".to_string())].into_iter().collect();
        let logger = builder(sender).with_environment(env).build().unwrap();
        assert_eq!(logger.level(), "WARN");
        assert!(!logger.is_enabled("info"));
    }

    #[test]
    fn unknown_environment_level_falls_back_silently() {
        let (sender, _receiver) = mpsc::channel();
        let env: HashMap<String, String> =
            [(LEVEL_VAR.to_string(), "shouty".to_string())].into_iter().collect();
        let logger = builder(sender).with_environment(env).build().unwrap();
        assert_eq!(logger.level(), "INFO");
    }

    #[test]
    fn change_level_at_runtime() {
        let (sender, receiver) = mpsc::channel();
        let logger = builder(sender).with_level("error").build().unwrap();

        logger.info(["hello"]);
        assert!(drain(&receiver).is_empty());

        logger.set_level("info").unwrap();
        logger.info(["hello"]);
        logger.trace(["hello"]);
        assert_eq!(drain(&receiver), ["INFO - hello\n"]);

        logger.set_level("trace").unwrap();
        logger.trace(["hello"]);
        logger.error(["hello"]);
        assert_eq!(drain(&receiver), ["TRACE - hello\n", "ERROR - hello\n"]);

        logger.set_level("all").unwrap();
        logger.debug(["hello"]);
        assert_eq!(drain(&receiver), ["DEBUG - hello\n"]);

        logger.set_level("none").unwrap();
        logger.error(["hello"]);
        logger.trace(["hello"]);
        assert!(drain(&receiver).is_empty());
    }

    #[test]
    fn set_level_by_rank() {
        let (sender, _receiver) = mpsc::channel();
        let logger = builder(sender).build().unwrap();

        logger.set_level(4u64).unwrap();
        assert_eq!(logger.level(), "DEBUG");

        let err = logger.set_level(99u64).unwrap_err();
        assert!(matches!(err, Error::UnsupportedLevel(_)));
        assert_eq!(logger.level(), "DEBUG");
    }

    #[test]
    fn registered_level_gets_a_method() {
        let (sender, receiver) = mpsc::channel();
        let logger = builder(sender).with_level("info").build().unwrap();
        assert!(logger.method("danger").is_none());
        assert_eq!(
            logger.levels(),
            ["NONE", "ERROR", "WARN", "INFO", "DEBUG", "TRACE", "ALL"]
        );

        logger.register_levels([("DANGER", 6.0)]).unwrap();
        logger.log("danger", ["world"]);
        assert!(drain(&receiver).is_empty());

        logger.set_level("danger").unwrap();
        logger.log("danger", ["world"]);
        assert_eq!(drain(&receiver), ["DANGER - world\n"]);
        assert_eq!(
            logger.levels(),
            ["NONE", "ERROR", "WARN", "INFO", "DEBUG", "TRACE", "DANGER", "ALL"]
        );
    }

    #[test]
    fn extra_levels_at_init() {
        let (sender, receiver) = mpsc::channel();
        let logger = builder(sender)
            .with_level("info")
            .with_extra_levels([("important", 2.5), ("danger", 6.0)])
            .build()
            .unwrap();

        assert_eq!(
            logger.levels(),
            ["NONE", "ERROR", "WARN", "IMPORTANT", "INFO", "DEBUG", "TRACE", "DANGER", "ALL"]
        );
        logger.info(["hello"]);
        logger.log("important", ["world"]);
        logger.log("danger", ["world"]);
        assert_eq!(drain(&receiver), ["INFO - hello\n", "IMPORTANT - world\n"]);
    }

    #[test]
    fn held_method_observes_threshold_changes() {
        let (sender, receiver) = mpsc::channel();
        let logger = builder(sender).build().unwrap();
        let debug = logger.method("debug").unwrap();

        debug.log(["before"]);
        logger.set_level("debug").unwrap();
        debug.log(["after"]);
        assert_eq!(drain(&receiver), ["DEBUG - after\n"]);
    }

    #[test]
    fn rank_in_record_follows_reindex() {
        let (sender, receiver) = mpsc::channel();
        let logger = builder(sender)
            .with_template("{level}={level_value}")
            .with_level("all")
            .build()
            .unwrap();
        let info = logger.method("info").unwrap();

        info.log(["x"]);
        logger.register_levels([("notice", 2.5)]).unwrap();
        info.log(["x"]);
        assert_eq!(drain(&receiver), ["INFO=3\n", "INFO=4\n"]);
    }

    #[test]
    fn failed_registration_changes_nothing() {
        let (sender, _receiver) = mpsc::channel();
        let logger = builder(sender).build().unwrap();
        let before = logger.levels();

        let err = logger
            .register_levels([("fine", 7.0), ("none", 1.0)])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidLevel { .. }));
        assert_eq!(logger.levels(), before);
        assert!(logger.method("fine").is_none());
    }

    #[test]
    fn reinit_is_idempotent() {
        let (sender, _receiver) = mpsc::channel();
        let logger = builder(sender.clone())
            .with_level("debug")
            .with_extra_levels([("audit", 1.5)])
            .build()
            .unwrap();
        let first = (logger.levels(), logger.level(), logger.enabled_levels());

        for _ in 0..2 {
            let config = builder(sender.clone())
                .with_level("debug")
                .with_extra_levels([("audit", 1.5)])
                .config();
            logger.init(config).unwrap();
            assert_eq!((logger.levels(), logger.level(), logger.enabled_levels()), first);
        }
    }

    #[test]
    fn list_form_replaces_the_table() {
        let (sender, _receiver) = mpsc::channel();
        let logger = builder(sender)
            .with_levels(["error", "warn", "http", "info", "debug", "trace"])
            .build()
            .unwrap();

        assert_eq!(logger.levels_max_length(), "ERROR".len());
        let levels = logger.levels();
        for (index, level) in levels.iter().enumerate() {
            let expected = if index == levels.len() - 1 {
                Rank::CEILING
            } else {
                Rank::new(index as u64)
            };
            assert_eq!(logger.level_value(level), Some(expected));
        }
    }

    #[test]
    fn rejected_init_keeps_previous_state() {
        let (sender, receiver) = mpsc::channel();
        let logger = builder(sender.clone()).build().unwrap();

        let config = builder(sender)
            .with_levels(["loud", "quiet"])
            .with_level("info")
            .config();
        assert!(matches!(logger.init(config), Err(Error::UnsupportedLevel(_))));

        logger.info(["still here"]);
        assert_eq!(drain(&receiver), ["INFO - still here\n"]);
    }

    #[test]
    fn reinit_drops_levels_missing_from_the_new_table() {
        let (sender, _receiver) = mpsc::channel();
        let logger = builder(sender.clone()).build().unwrap();
        let trace = logger.method("trace").unwrap();

        let config = builder(sender)
            .with_levels(["error", "warn", "info"])
            .with_level("all")
            .config();
        logger.init(config).unwrap();

        assert!(logger.method("trace").is_none());
        assert!(!trace.is_enabled());
        assert_eq!(logger.methods().len(), 3);
    }

    #[test]
    fn custom_format_function() {
        let (sender, receiver) = mpsc::channel();
        let logger = builder(sender)
            .with_format_fn(|record| {
                record
                    .args()
                    .iter()
                    .filter_map(|arg| arg.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .build()
            .unwrap();

        logger.info(["hello", "world"]);
        assert_eq!(drain(&receiver), ["hello,world\n"]);
    }

    #[test]
    fn caller_location_points_at_the_call() {
        let (sender, receiver) = mpsc::channel();
        let logger = builder(sender).with_template("{file}").build().unwrap();
        logger.info(["x"]);
        assert_eq!(drain(&receiver), [format!("{}\n", file!())]);

        let (sender, receiver) = mpsc::channel();
        let logger = builder(sender)
            .with_template("[{caller}]")
            .with_caller(false)
            .build()
            .unwrap();
        logger.info(["x"]);
        assert_eq!(drain(&receiver), ["[]\n"]);
    }

    #[test]
    fn dispose_unbinds_methods() {
        let (sender, receiver) = mpsc::channel();
        let logger = builder(sender).build().unwrap();
        let info = logger.method("info").unwrap();

        logger.dispose().unwrap();
        info.log(["x"]);
        logger.info(["x"]);
        assert!(drain(&receiver).is_empty());
        assert!(logger.methods().is_empty());
    }

    #[test]
    fn dispose_leaves_table_and_methods_in_agreement() {
        let (sender, receiver) = mpsc::channel();
        let logger = builder(sender).build().unwrap();

        logger.dispose().unwrap();
        assert_eq!(logger.levels(), ["NONE", "ALL"]);
        assert_eq!(logger.level(), "NONE");
        assert!(!logger.is_enabled("info"));
        assert!(logger.method("info").is_none());
        assert!(logger.enabled_levels().is_empty());

        let err = logger.set_level("debug").unwrap_err();
        assert!(matches!(err, Error::UnsupportedLevel(_)));
        assert!(logger.methods().is_empty());

        logger.register_levels([("notice", 1.0)]).unwrap();
        assert_eq!(logger.levels(), ["NONE", "NOTICE", "ALL"]);
        assert!(!logger.is_enabled("notice"));
        assert_eq!(logger.methods().len(), 1);
        logger.set_level("notice").unwrap();
        logger.log("notice", ["back"]);
        assert_eq!(drain(&receiver), ["NOTICE - back\n"]);
    }

    #[test]
    fn failed_flush_is_reported_not_raised() {
        struct Unflushable;

        impl LogSink for Unflushable {
            fn write_log(&self, _line: &str) -> Result<()> {
                Ok(())
            }

            fn flush(&self) -> Result<()> {
                Err(std::io::Error::other("disk gone").into())
            }
        }

        let logger = Builder::new()
            .with_sink(Unflushable)
            .with_environment(quiet_env())
            .build()
            .unwrap();
        assert!(logger.flush().is_err());
        Log::flush(&logger);
    }

    #[test]
    fn log_facade_records_route_to_methods() {
        let (sender, receiver) = mpsc::channel();
        let logger = builder(sender).with_level("debug").build().unwrap();

        let metadata = log::Metadata::builder()
            .level(log::Level::Trace)
            .target("app")
            .build();
        assert!(!Log::enabled(&logger, &metadata));

        Log::log(
            &logger,
            &log::Record::builder()
                .args(format_args!("{} at 100%", "done"))
                .level(log::Level::Warn)
                .target("app")
                .build(),
        );
        Log::log(
            &logger,
            &log::Record::builder()
                .args(format_args!("internal"))
                .level(log::Level::Error)
                .target("levelmux")
                .build(),
        );
        assert_eq!(drain(&receiver), ["WARN - done at 100%\n"]);
    }
}
