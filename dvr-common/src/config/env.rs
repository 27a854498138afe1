//! Environment variable parsing with type safety.
//!
//! Provides a parser for `DVR_*` environment variables that validates
//! values and collects every error so all issues can be reported at once
//! at startup, instead of silently defaulting mid-comparison.

use crate::errors::ConfigError;
use std::env;

/// Type-safe environment variable parser.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<ConfigError>,
}

impl EnvParser {
    /// Create a new parser with the DVR_ prefix.
    pub fn new() -> Self {
        Self {
            prefix: "DVR_",
            errors: Vec::new(),
        }
    }

    /// Get all accumulated errors.
    pub fn errors(&self) -> &[ConfigError] {
        &self.errors
    }

    /// Check if any errors occurred.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Take ownership of errors.
    pub fn take_errors(&mut self) -> Vec<ConfigError> {
        std::mem::take(&mut self.errors)
    }

    /// Get the full variable name with prefix.
    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Get a string value, keeping `current` when unset.
    pub fn get_string(&mut self, name: &str, current: &mut String) {
        if let Ok(value) = env::var(self.var_name(name)) {
            *current = value;
        }
    }

    /// Get an optional string value, keeping `current` when unset.
    pub fn get_opt_string(&mut self, name: &str, current: &mut Option<String>) {
        if let Ok(value) = env::var(self.var_name(name)) {
            *current = if value.is_empty() { None } else { Some(value) };
        }
    }

    /// Get an f64 value with range validation, keeping `current` when
    /// unset or invalid.
    pub fn get_f64_range(&mut self, name: &str, current: &mut f64, min: f64, max: f64) {
        let var_name = self.var_name(name);
        let Ok(value) = env::var(&var_name) else {
            return;
        };
        match value.parse::<f64>() {
            Ok(n) if n >= min && n <= max => *current = n,
            Ok(n) => self.errors.push(ConfigError::OutOfRange {
                var: var_name,
                value: n.to_string(),
                min: min.to_string(),
                max: max.to_string(),
            }),
            Err(_) => self.errors.push(ConfigError::InvalidEnv {
                var: var_name,
                expected: "decimal number".to_string(),
                value,
            }),
        }
    }

    /// Get a u32 value with range validation.
    pub fn get_u32_range(&mut self, name: &str, current: &mut u32, min: u32, max: u32) {
        let var_name = self.var_name(name);
        let Ok(value) = env::var(&var_name) else {
            return;
        };
        match value.parse::<u32>() {
            Ok(n) if n >= min && n <= max => *current = n,
            Ok(n) => self.errors.push(ConfigError::OutOfRange {
                var: var_name,
                value: n.to_string(),
                min: min.to_string(),
                max: max.to_string(),
            }),
            Err(_) => self.errors.push(ConfigError::InvalidEnv {
                var: var_name,
                expected: "unsigned 32-bit integer".to_string(),
                value,
            }),
        }
    }

    /// Get a duration in seconds, accepting humantime strings ("30s",
    /// "2m") or a bare number of seconds.
    pub fn get_duration_secs(&mut self, name: &str, current: &mut u64) {
        let var_name = self.var_name(name);
        let Ok(value) = env::var(&var_name) else {
            return;
        };
        if let Ok(n) = value.parse::<u64>() {
            *current = n;
            return;
        }
        match humantime::parse_duration(&value) {
            Ok(d) => *current = d.as_secs(),
            Err(_) => self.errors.push(ConfigError::InvalidEnv {
                var: var_name,
                expected: "duration (e.g. 30s, 2m) or seconds".to_string(),
                value,
            }),
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}
