use std::{fmt::Display, path::PathBuf};

use clap::{Parser, Subcommand};
use eyre::Context;
use levelmux::{Builder, Format, LevelSelector, Logger, Output};

mod emit;
mod levels;

const BUILTIN_FORMATS: [&str; 4] = ["default", "simple", "verbose", "json"];

#[derive(Subcommand, Debug)]
pub enum LevelmuxCmd {
    Emit(emit::Cmd),

    Levels(levels::Cmd),
}

impl Display for LevelmuxCmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevelmuxCmd::Emit(cmd) => write!(f, "emit {}", cmd.level),
            LevelmuxCmd::Levels(_cmd) => write!(f, "levels"),
        }
    }
}

#[derive(Parser)]
#[command(version, long_version = "")]
#[command(about = "Write log lines through a configurable level table.", long_about = None, disable_help_subcommand = true)]
pub struct Levelmux {
    #[arg(
        global = true,
        long,
        help = "Active level, by name or rank. Defaults to LEVELMUX_LOG_LEVEL, then to WARN in production (LEVELMUX_ENV) or INFO otherwise.",
        display_order = 0
    )]
    pub level: Option<LevelSelector>,

    #[arg(
        global = true,
        long,
        value_delimiter = ',',
        help = "Replace the built-in levels with this ordered, comma separated list.",
        display_order = 1
    )]
    pub levels: Vec<String>,

    #[arg(
        global = true,
        long = "extra-level",
        value_name = "NAME=PRIORITY",
        value_parser = parse_extra_level,
        help = "Register an additional level. Fractional priorities slot between existing levels.",
        display_order = 2
    )]
    pub extra_levels: Vec<(String, f64)>,

    #[arg(
        global = true,
        long,
        conflicts_with = "format_file",
        help = "A built-in format (default, simple, verbose, json) or a template such as \"{level} - {message}\".",
        display_order = 3
    )]
    pub format: Option<String>,

    #[arg(
        global = true,
        long,
        help = "Read the template from a file.",
        display_order = 4
    )]
    pub format_file: Option<PathBuf>,

    #[arg(
        global = true,
        long,
        default_value = "stdout",
        help = "stdout, stderr, null or file:<path>.",
        display_order = 5
    )]
    pub out: String,

    #[arg(
        global = true,
        long,
        help = "Do not record the call site.",
        display_order = 6
    )]
    pub no_caller: bool,

    #[arg(
        global = true,
        long,
        help = "Force colored level names on or off.",
        display_order = 7
    )]
    pub colors: Option<bool>,

    #[command(subcommand)]
    pub cmd: LevelmuxCmd,
}

fn parse_extra_level(value: &str) -> Result<(String, f64), String> {
    let (name, priority) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PRIORITY, got {:?}", value))?;
    let priority = priority
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("invalid priority {:?}: {}", priority, err))?;

    Ok((name.trim().to_string(), priority))
}

impl Levelmux {
    fn format(&self) -> Format {
        if let Some(path) = &self.format_file {
            return Format::File(path.clone());
        }

        match &self.format {
            Some(name) if BUILTIN_FORMATS.contains(&name.as_str()) => Format::Named(name.clone()),
            Some(template) => Format::Template(template.clone()),
            None => Format::default(),
        }
    }

    fn setup_logging(&self) -> eyre::Result<Logger> {
        let out: Output = self
            .out
            .parse()
            .with_context(|| format!("Failed configuring output {}", self.out))?;

        let mut builder = Builder::new()
            .with_format(self.format())
            .with_output(out)
            .with_caller(!self.no_caller)
            .with_extra_levels(self.extra_levels.iter().cloned());

        if let Some(level) = &self.level {
            builder = builder.with_level(level.clone());
        }
        if !self.levels.is_empty() {
            builder = builder.with_levels(self.levels.iter().cloned());
        }
        if let Some(colors) = self.colors {
            builder = builder.with_colors(colors);
        }

        builder.build().context("Failed building logger")
    }

    pub fn run(self) -> eyre::Result<()> {
        let logger = self.setup_logging()?;

        let result = match &self.cmd {
            LevelmuxCmd::Emit(emit) => emit.run(&logger),
            LevelmuxCmd::Levels(levels) => levels.run(&logger),
        };

        logger
            .flush()
            .with_context(|| format!("Failed flushing output after {}", self.cmd))?;
        result
    }
}
