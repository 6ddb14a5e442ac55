use std::collections::HashMap;

use crate::levels::Profile;

/// Initial level override, consulted once per `init`.
pub const LEVEL_VAR: &str = "LEVELMUX_LOG_LEVEL";
/// `true` forces colored level names, anything else disables them.
pub const COLORS_VAR: &str = "LEVELMUX_LOG_COLORS";
/// `production` selects the quieter default level.
pub const PROFILE_VAR: &str = "LEVELMUX_ENV";

/// Source of environment-style settings.
pub trait Environment: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;

    fn level_override(&self) -> Option<String> {
        self.var(LEVEL_VAR).filter(|level| !level.trim().is_empty())
    }

    fn colors_override(&self) -> Option<bool> {
        self.var(COLORS_VAR).map(|colors| colors.trim() == "true")
    }

    fn profile(&self) -> Profile {
        self.var(PROFILE_VAR)
            .and_then(|profile| profile.parse().ok())
            .unwrap_or_default()
    }
}

/// Reads the process environment.
#[derive(Default, Clone, Debug)]
pub struct ProcessEnvironment {}

impl ProcessEnvironment {
    pub fn new() -> Self {
        Self {}
    }
}

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}
