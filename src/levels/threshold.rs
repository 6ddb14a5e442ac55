use std::str::FromStr;

use super::{normalize_level, LevelSelector, LevelTable, Rank, INFO, WARN};
use crate::error::{Error, Result};

/// Deployment profile used to pick a default verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    Production,
    #[default]
    Development,
}

impl Profile {
    pub fn default_level(self) -> &'static str {
        match self {
            Profile::Production => WARN,
            Profile::Development => INFO,
        }
    }
}

impl FromStr for Profile {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("production") {
            Ok(Profile::Production)
        } else {
            Ok(Profile::Development)
        }
    }
}

/// The active level and its rank in the table it was resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdController {
    level: String,
    level_value: Rank,
}

impl ThresholdController {
    pub fn new(table: &LevelTable, level: impl Into<LevelSelector>) -> Result<Self> {
        let level = Self::resolve(table, &level.into())?;
        let level_value = table
            .rank(&level)
            .ok_or_else(|| Error::UnsupportedLevel(level.clone()))?;

        Ok(Self { level, level_value })
    }

    /// Picks the starting level: an explicit choice, then the environment override when it names
    /// a known level, then the profile default. An unknown override is ignored.
    pub fn initial_level(
        table: &LevelTable,
        explicit: Option<LevelSelector>,
        env_override: Option<&str>,
        profile: Profile,
    ) -> LevelSelector {
        if let Some(level) = explicit {
            return level;
        }

        match env_override {
            Some(level) if table.has_level(level) => LevelSelector::Name(level.to_string()),
            Some(level) => {
                log::debug!(target: "levelmux", "ignoring unknown level override {:?}", level);
                LevelSelector::Name(profile.default_level().to_string())
            }
            None => LevelSelector::Name(profile.default_level().to_string()),
        }
    }

    /// Resolves a selector to a normalized level name present in `table`.
    pub fn resolve(table: &LevelTable, selector: &LevelSelector) -> Result<String> {
        let name = match selector {
            LevelSelector::Rank(rank) => table
                .name_for_rank(Rank::new(*rank))
                .ok_or_else(|| Error::UnsupportedLevel(rank.to_string()))?,
            LevelSelector::Name(name) => {
                normalize_level(name).map_err(|_| Error::UnsupportedLevel(name.clone()))?
            }
        };

        if !table.has_level(&name) {
            return Err(Error::UnsupportedLevel(name));
        }
        Ok(name)
    }

    pub fn set_level(&mut self, table: &LevelTable, selector: &LevelSelector) -> Result<()> {
        let level = Self::resolve(table, selector)?;
        self.level_value = table
            .rank(&level)
            .ok_or_else(|| Error::UnsupportedLevel(level.clone()))?;
        self.level = level;
        Ok(())
    }

    /// Recomputes the rank of the active level after the table was reindexed.
    pub fn refresh(&mut self, table: &LevelTable) -> Result<()> {
        self.level_value = table
            .rank(&self.level)
            .ok_or_else(|| Error::UnsupportedLevel(self.level.clone()))?;
        Ok(())
    }

    pub fn level(&self) -> &str {
        &self.level
    }

    pub fn level_value(&self) -> Rank {
        self.level_value
    }

    pub fn is_enabled(&self, table: &LevelTable, level: &str) -> bool {
        table
            .rank(level)
            .is_some_and(|rank| rank <= self.level_value)
    }
}
