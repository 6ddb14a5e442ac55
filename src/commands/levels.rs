use clap::Args;
use levelmux::{levels::is_sentinel, Logger, Rank};

#[derive(Args, Debug)]
pub struct Cmd {}

impl Cmd {
    pub fn run(&self, logger: &Logger) -> eyre::Result<()> {
        let width = logger.levels_max_length();
        let threshold = logger.level();

        for level in logger.levels() {
            let rank = match logger.level_value(&level) {
                Some(Rank::CEILING) => "max".to_string(),
                Some(rank) => rank.to_string(),
                None => continue,
            };
            let method = if is_sentinel(&level) {
                "-".to_string()
            } else {
                logger.log_method_name(&level)
            };
            let marker = if level == threshold { "*" } else { " " };

            println!(
                "{} {:<width$}  {:>5}  {:<width$}  {}",
                marker,
                level,
                rank,
                method,
                if logger.is_enabled(&level) { "on" } else { "off" },
                width = width,
            );
        }
        Ok(())
    }
}
