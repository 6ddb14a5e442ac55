//! Per-level dispatch methods.
//!
//! Each non-sentinel level owns one [`DispatchMethod`]. A method is either enabled, in which case
//! a call builds a [`Record`] and pushes it through the formatter and sink, or disabled and a
//! no-op. The binding lives inside the method itself, so a handle obtained before a
//! `set_level`/`register_levels` call observes the new binding without being fetched again.

use std::{
    fmt,
    panic::Location,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, RwLock,
    },
};

use chrono::{DateTime, Local};
use indexmap::IndexMap;
use serde_json::Value;

use crate::{
    error::{Error, Result},
    levels::{log_method_name, normalize_level, LevelTable, Rank, ThresholdController},
    logging::{CallerLocation, CallerResolver, LogFormatter, LogSink, Record, RenderContext},
    utils::{lock, read, write},
};

pub(crate) struct Pipeline {
    formatter: Box<dyn LogFormatter>,
    sink: Box<dyn LogSink>,
    resolver: Box<dyn CallerResolver>,
    caller: bool,
    context: RenderContext,
    last_time: DateTime<Local>,
}

impl Pipeline {
    pub(crate) fn new(
        formatter: Box<dyn LogFormatter>,
        sink: Box<dyn LogSink>,
        resolver: Box<dyn CallerResolver>,
        caller: bool,
        context: RenderContext,
    ) -> Self {
        Self {
            formatter,
            sink,
            resolver,
            caller,
            context,
            last_time: Local::now(),
        }
    }
}

/// Builds records and hands them to the configured formatter and sink.
pub(crate) struct Dispatcher {
    pipeline: Mutex<Pipeline>,
}

impl Dispatcher {
    pub(crate) fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Mutex::new(pipeline),
        }
    }

    /// Swaps formatter, sink and caller settings. The previous dispatch time carries over.
    pub(crate) fn replace(&self, mut pipeline: Pipeline) {
        let mut current = lock(&self.pipeline);
        pipeline.last_time = current.last_time;
        *current = pipeline;
    }

    pub(crate) fn set_levels_max_length(&self, levels_max_length: usize) {
        lock(&self.pipeline).context.levels_max_length = levels_max_length;
    }

    pub(crate) fn flush(&self) -> Result<()> {
        lock(&self.pipeline).sink.flush()
    }

    fn dispatch(
        &self,
        level: &str,
        level_value: Rank,
        args: Vec<Value>,
        site: Option<CallerLocation>,
    ) {
        let mut caller_error = None;

        let written = {
            let mut pipeline = lock(&self.pipeline);
            let caller = if pipeline.caller {
                match pipeline.resolver.resolve(site.as_ref()) {
                    Ok(caller) => caller,
                    Err(err) => {
                        caller_error = Some(err);
                        None
                    }
                }
            } else {
                None
            };

            let time = Local::now();
            let record = Record::new(time, pipeline.last_time, level, level_value, args, caller);
            pipeline.last_time = time;

            let line = pipeline.formatter.format(&record, &pipeline.context);
            pipeline.sink.write_log(&line)
        };

        if let Some(err) = caller_error {
            log::warn!(target: "levelmux", "{}", err);
        }
        if let Err(err) = written {
            log::error!(target: "levelmux", "failed writing {} log line: {}", level, err);
        }
    }
}

/// Callable bound to one level.
pub struct DispatchMethod {
    level: String,
    method_name: String,
    enabled: AtomicBool,
    rank: AtomicU64,
    dispatcher: Arc<Dispatcher>,
}

impl fmt::Debug for DispatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchMethod")
            .field("level", &self.level)
            .field("method_name", &self.method_name)
            .field("enabled", &self.is_enabled())
            .field("rank", &self.rank())
            .finish()
    }
}

impl DispatchMethod {
    fn new(level: &str, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            level: level.to_string(),
            method_name: log_method_name(level),
            enabled: AtomicBool::new(false),
            rank: AtomicU64::new(Rank::FLOOR.get()),
            dispatcher,
        }
    }

    fn bind(&self, enabled: bool, rank: Rank) {
        self.rank.store(rank.get(), Ordering::Release);
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn level(&self) -> &str {
        &self.level
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn rank(&self) -> Rank {
        Rank::new(self.rank.load(Ordering::Acquire))
    }

    /// Logs `args`; the first argument may be a `%s`-style format.
    #[track_caller]
    pub fn log<I, V>(&self, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        if !self.is_enabled() {
            return;
        }
        let site = CallerLocation::from(Location::caller());
        self.dispatch(args.into_iter().map(Into::into).collect(), Some(site));
    }

    /// Like [`log`](Self::log), but the arguments are only built when the level is enabled.
    #[track_caller]
    pub fn log_with<F, I, V>(&self, args: F)
    where
        F: FnOnce() -> I,
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        if !self.is_enabled() {
            return;
        }
        let site = CallerLocation::from(Location::caller());
        self.dispatch(args().into_iter().map(Into::into).collect(), Some(site));
    }

    /// Logs an already formatted message. `%` is taken literally.
    #[track_caller]
    pub fn log_fmt(&self, args: fmt::Arguments<'_>) {
        if !self.is_enabled() {
            return;
        }
        let site = CallerLocation::from(Location::caller());
        let message = args.to_string().replace('%', "%%");
        self.dispatch(vec![Value::String(message)], Some(site));
    }

    pub(crate) fn dispatch(&self, args: Vec<Value>, site: Option<CallerLocation>) {
        if !self.is_enabled() {
            return;
        }
        self.dispatcher.dispatch(&self.level, self.rank(), args, site);
    }
}

/// The shared namespace of dispatch methods, keyed by normalized level name.
pub struct MethodRegistry {
    methods: RwLock<IndexMap<String, Arc<DispatchMethod>>>,
    dispatcher: Arc<Dispatcher>,
}

impl MethodRegistry {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            methods: RwLock::new(IndexMap::new()),
            dispatcher,
        }
    }

    /// Rebinds every level of `table` against `threshold`.
    ///
    /// Methods for levels still in the table are updated in place. Methods for levels that left
    /// the table are disabled and dropped from the namespace.
    pub(crate) fn rebuild_all(&self, table: &LevelTable, threshold: &ThresholdController) {
        let mut methods = write(&self.methods);
        let mut rebuilt = IndexMap::with_capacity(table.len());

        for (level, rank) in table.iter() {
            let method = methods
                .swap_remove(level)
                .unwrap_or_else(|| Arc::new(DispatchMethod::new(level, self.dispatcher.clone())));
            method.bind(rank <= threshold.level_value(), rank);
            rebuilt.insert(level.to_string(), method);
        }

        for (level, stale) in methods.drain(..) {
            log::trace!(target: "levelmux", "dropping dispatch method for {}", level);
            stale.bind(false, stale.rank());
        }

        *methods = rebuilt;
    }

    pub(crate) fn clear(&self) {
        let mut methods = write(&self.methods);
        for (_, method) in methods.drain(..) {
            method.bind(false, method.rank());
        }
    }

    /// Looks up a method by any spelling of its level: `"fedUp"`, `"fed-up"` or `"FED_UP"`.
    pub fn get(&self, level: &str) -> Option<Arc<DispatchMethod>> {
        let level = normalize_level(level).ok()?;
        read(&self.methods).get(&level).cloned()
    }

    pub fn require(&self, level: &str) -> Result<Arc<DispatchMethod>> {
        self.get(level)
            .ok_or_else(|| Error::UnsupportedLevel(level.to_string()))
    }

    pub fn contains(&self, level: &str) -> bool {
        self.get(level).is_some()
    }

    /// Method names in rank order.
    pub fn method_names(&self) -> Vec<String> {
        read(&self.methods)
            .values()
            .map(|method| method.method_name().to_string())
            .collect()
    }

    pub fn methods(&self) -> Vec<Arc<DispatchMethod>> {
        read(&self.methods).values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        read(&self.methods).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.methods).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{NoCaller, TrackedCaller};

    struct Capture(Arc<Mutex<Vec<String>>>);

    impl LogSink for Capture {
        fn write_log(&self, line: &str) -> Result<()> {
            self.0.lock().unwrap().push(line.to_string());
            Ok(())
        }

        fn flush(&self) -> Result<()> {
            Ok(())
        }
    }

    struct Failing;

    impl CallerResolver for Failing {
        fn resolve(&self, _site: Option<&CallerLocation>) -> Result<Option<CallerLocation>> {
            Err(Error::CallerUnavailable("no stack".to_string()))
        }
    }

    fn registry(resolver: Box<dyn CallerResolver>) -> (MethodRegistry, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let formatter = |record: &Record| {
            let caller = record
                .caller()
                .map(|caller| caller.file.clone())
                .unwrap_or_else(|| "-".to_string());
            format!("{} {} {}", record.level(), record.message(), caller)
        };
        let pipeline = Pipeline::new(
            Box::new(formatter),
            Box::new(Capture(lines.clone())),
            resolver,
            true,
            RenderContext::default(),
        );
        (MethodRegistry::new(Arc::new(Dispatcher::new(pipeline))), lines)
    }

    fn take(lines: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        std::mem::take(&mut *lines.lock().unwrap())
    }

    #[test]
    fn every_level_gets_exactly_one_method() {
        let (registry, _) = registry(Box::new(NoCaller));
        let table = LevelTable::new();
        let threshold = ThresholdController::new(&table, "info").unwrap();
        registry.rebuild_all(&table, &threshold);

        assert_eq!(
            registry.method_names(),
            ["error", "warn", "info", "debug", "trace"]
        );
        assert!(!registry.contains("none"));
        assert!(!registry.contains("all"));
        assert!(registry.get("warn").unwrap().is_enabled());
        assert!(!registry.get("DEBUG").unwrap().is_enabled());
    }

    #[test]
    fn held_handles_follow_rebinds() {
        let (registry, lines) = registry(Box::new(NoCaller));
        let table = LevelTable::new();
        let mut threshold = ThresholdController::new(&table, "error").unwrap();
        registry.rebuild_all(&table, &threshold);

        let debug = registry.get("debug").unwrap();
        debug.log(["hidden"]);
        assert!(take(&lines).is_empty());

        threshold.set_level(&table, &"debug".into()).unwrap();
        registry.rebuild_all(&table, &threshold);
        debug.log(["shown"]);
        assert_eq!(take(&lines), ["DEBUG shown -"]);
        assert!(Arc::ptr_eq(&debug, &registry.get("debug").unwrap()));
    }

    #[test]
    fn removed_levels_lose_their_method() {
        let (registry, lines) = registry(Box::new(NoCaller));
        let table = LevelTable::new();
        let threshold = ThresholdController::new(&table, "all").unwrap();
        registry.rebuild_all(&table, &threshold);
        let trace = registry.get("trace").unwrap();

        let smaller = LevelTable::from_names(["error", "warn", "info"]).unwrap();
        let threshold = ThresholdController::new(&smaller, "all").unwrap();
        registry.rebuild_all(&smaller, &threshold);

        assert_eq!(registry.len(), 3);
        assert!(registry.get("trace").is_none());
        assert!(!trace.is_enabled());
        trace.log(["gone"]);
        assert!(take(&lines).is_empty());
    }

    #[test]
    fn lookup_accepts_any_spelling() {
        let (registry, _) = registry(Box::new(NoCaller));
        let mut table = LevelTable::new();
        table.register_levels([("fed-up", 0.5)]).unwrap();
        let threshold = ThresholdController::new(&table, "info").unwrap();
        registry.rebuild_all(&table, &threshold);

        let method = registry.get("fedUp").unwrap();
        assert_eq!(method.level(), "FED_UP");
        assert_eq!(method.method_name(), "fedUp");
        assert!(Arc::ptr_eq(&method, &registry.get("FED_UP").unwrap()));
        assert!(matches!(
            registry.require("bogus"),
            Err(Error::UnsupportedLevel(_))
        ));
    }

    #[test]
    fn lazy_arguments_are_skipped_when_disabled() {
        let (registry, lines) = registry(Box::new(NoCaller));
        let table = LevelTable::new();
        let threshold = ThresholdController::new(&table, "info").unwrap();
        registry.rebuild_all(&table, &threshold);

        let mut built = false;
        registry.get("trace").unwrap().log_with(|| {
            built = true;
            ["expensive"]
        });
        assert!(!built);

        registry.get("info").unwrap().log_with(|| ["%s!", "cheap"]);
        assert_eq!(take(&lines), ["INFO cheap! -"]);
    }

    #[test]
    fn call_site_is_recorded() {
        let (registry, lines) = registry(Box::new(TrackedCaller));
        let table = LevelTable::new();
        let threshold = ThresholdController::new(&table, "info").unwrap();
        registry.rebuild_all(&table, &threshold);

        registry.get("info").unwrap().log_fmt(format_args!("{}% done", 50));
        assert_eq!(take(&lines), [format!("INFO 50% done {}", file!())]);
    }

    #[test]
    fn caller_failure_degrades_to_no_location() {
        let (registry, lines) = registry(Box::new(Failing));
        let table = LevelTable::new();
        let threshold = ThresholdController::new(&table, "info").unwrap();
        registry.rebuild_all(&table, &threshold);

        registry.get("error").unwrap().log(["still logged"]);
        assert_eq!(take(&lines), ["ERROR still logged -"]);
    }

    #[test]
    fn clear_disables_everything() {
        let (registry, _) = registry(Box::new(NoCaller));
        let table = LevelTable::new();
        let threshold = ThresholdController::new(&table, "all").unwrap();
        registry.rebuild_all(&table, &threshold);
        let error = registry.get("error").unwrap();

        registry.clear();
        assert!(registry.is_empty());
        assert!(!error.is_enabled());
    }
}
