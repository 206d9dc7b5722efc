//! Logging configuration
//!
//! [`LoggingConfiguration`] is built once at startup, validated, and then
//! shared read-only by every logger through an `Arc`. It can be assembled in
//! code with the builder, parsed from a camelCase JSON document, or (with the
//! `env` feature) read from `LOGLINE_*` environment variables.

use crate::capture::DEFAULT_MAX_BODY_SIZE;
use crate::error::ConfigError;
use crate::masking::{MaskPattern, MaskingEngine, DEFAULT_MASK_VALUE};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default maximum number of stack frames per error
pub const DEFAULT_MAX_STACK_TRACE_DEPTH: usize = 50;

/// Request and response logging settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestLoggingConfig {
    /// Whether request records are emitted
    pub enabled: bool,
    /// Whether headers are captured
    pub log_headers: bool,
    /// Whether request bodies are captured
    pub log_body: bool,
    /// Whether response bodies are captured
    pub log_response_body: bool,
    /// Maximum captured body size, in characters
    pub max_body_size: usize,
    /// Paths that are never logged; checked first
    pub exclude_patterns: Vec<String>,
    /// When non-empty, only matching paths are logged
    pub include_patterns: Vec<String>,
}

impl Default for RequestLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_headers: true,
            log_body: true,
            log_response_body: true,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            exclude_patterns: vec![
                "/actuator/**".to_string(),
                "/health/**".to_string(),
                "/favicon.ico".to_string(),
            ],
            include_patterns: Vec::new(),
        }
    }
}

impl RequestLoggingConfig {
    /// Compile the include and exclude patterns
    pub fn url_filter(&self) -> Result<UrlFilter, ConfigError> {
        UrlFilter::new(&self.include_patterns, &self.exclude_patterns)
    }
}

/// Application event logging settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationLoggingConfig {
    /// Whether application records are emitted
    pub enabled: bool,
    /// Whether error records carry stack frames
    pub include_stack_trace: bool,
    /// Maximum number of stack frames per error
    pub max_stack_trace_depth: usize,
}

impl Default for ApplicationLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_stack_trace: true,
            max_stack_trace_depth: DEFAULT_MAX_STACK_TRACE_DEPTH,
        }
    }
}

/// Process-wide logging configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfiguration {
    /// Master switch
    pub enabled: bool,
    /// Application name stamped on every record; blank falls back to the
    /// factory's name
    pub application_name: Option<String>,
    /// Request logging settings
    pub request: RequestLoggingConfig,
    /// Application logging settings
    pub application: ApplicationLoggingConfig,
    /// Header names whose values are masked, case-insensitive
    pub masked_headers: Vec<String>,
    /// Body field names whose values are masked, case-insensitive
    pub masked_fields: Vec<String>,
    /// Placeholder written in place of masked values
    pub mask_value: String,
    /// Whether card numbers and email addresses are masked in text
    pub mask_patterns: bool,
}

impl Default for LoggingConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            application_name: None,
            request: RequestLoggingConfig::default(),
            application: ApplicationLoggingConfig::default(),
            masked_headers: ["Authorization", "X-Api-Key", "Cookie", "Set-Cookie"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            masked_fields: ["password", "secret", "token", "creditCard", "ssn"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            mask_value: DEFAULT_MASK_VALUE.to_string(),
            mask_patterns: true,
        }
    }
}

impl LoggingConfiguration {
    /// Create a new builder for LoggingConfiguration
    pub fn builder() -> LoggingConfigurationBuilder {
        LoggingConfigurationBuilder::default()
    }

    /// Parse a camelCase JSON document; missing keys take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a config for local development: everything captured
    pub fn development() -> Self {
        Self {
            request: RequestLoggingConfig {
                log_headers: true,
                log_body: true,
                log_response_body: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create a config for production: metadata only, no bodies
    pub fn production() -> Self {
        Self {
            request: RequestLoggingConfig {
                log_headers: false,
                log_body: false,
                log_response_body: false,
                ..Default::default()
            },
            application: ApplicationLoggingConfig {
                max_stack_trace_depth: 20,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create a config with all logging switched off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Reject settings that cannot work
    ///
    /// Checks the URL patterns compile, the body budget is non-zero, and the
    /// mask value is non-blank and would not itself be masked again.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request.max_body_size == 0 {
            return Err(ConfigError::InvalidMaxBodySize);
        }
        self.request.url_filter()?;

        let mask = self.mask_value.trim();
        if mask.is_empty() {
            return Err(ConfigError::InvalidMaskValue(self.mask_value.clone()));
        }
        if self
            .masked_fields
            .iter()
            .chain(self.masked_headers.iter())
            .any(|name| name.eq_ignore_ascii_case(mask))
        {
            return Err(ConfigError::InvalidMaskValue(self.mask_value.clone()));
        }
        if self.mask_patterns && MaskPattern::defaults().iter().any(|p| p.is_match(mask)) {
            return Err(ConfigError::InvalidMaskValue(self.mask_value.clone()));
        }
        Ok(())
    }

    /// Application name if configured and non-blank
    pub fn configured_application_name(&self) -> Option<&str> {
        self.application_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Build the masking rules described by this configuration
    pub fn masking_engine(&self) -> MaskingEngine {
        let patterns = if self.mask_patterns {
            MaskPattern::defaults()
        } else {
            Vec::new()
        };
        MaskingEngine::new(
            &self.masked_fields,
            &self.masked_headers,
            self.mask_value.clone(),
            patterns,
        )
    }

    /// Maximum stack depth to capture, zero when stacks are disabled
    pub fn stack_depth(&self) -> usize {
        if self.application.include_stack_trace {
            self.application.max_stack_trace_depth
        } else {
            0
        }
    }
}

/// Builder for LoggingConfiguration
#[derive(Default)]
pub struct LoggingConfigurationBuilder {
    config: LoggingConfiguration,
}

impl LoggingConfigurationBuilder {
    /// Set the master switch
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Set the application name
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.config.application_name = Some(name.into());
        self
    }

    /// Enable or disable request records
    pub fn request_logging(mut self, enabled: bool) -> Self {
        self.config.request.enabled = enabled;
        self
    }

    /// Enable or disable header capture
    pub fn log_headers(mut self, enabled: bool) -> Self {
        self.config.request.log_headers = enabled;
        self
    }

    /// Enable or disable request body capture
    pub fn log_body(mut self, enabled: bool) -> Self {
        self.config.request.log_body = enabled;
        self
    }

    /// Enable or disable response body capture
    pub fn log_response_body(mut self, enabled: bool) -> Self {
        self.config.request.log_response_body = enabled;
        self
    }

    /// Set maximum captured body size
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.request.max_body_size = size;
        self
    }

    /// Add a path pattern that is never logged
    pub fn exclude_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.request.exclude_patterns.push(pattern.into());
        self
    }

    /// Replace the exclude patterns
    pub fn exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.request.exclude_patterns = patterns;
        self
    }

    /// Add a path pattern to the allow-list
    pub fn include_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.request.include_patterns.push(pattern.into());
        self
    }

    /// Enable or disable application records
    pub fn application_logging(mut self, enabled: bool) -> Self {
        self.config.application.enabled = enabled;
        self
    }

    /// Enable or disable stack frames on errors
    pub fn include_stack_trace(mut self, include: bool) -> Self {
        self.config.application.include_stack_trace = include;
        self
    }

    /// Set maximum stack frames per error
    pub fn max_stack_trace_depth(mut self, depth: usize) -> Self {
        self.config.application.max_stack_trace_depth = depth;
        self
    }

    /// Add a header to mask
    pub fn mask_header(mut self, header: impl Into<String>) -> Self {
        self.config.masked_headers.push(header.into());
        self
    }

    /// Replace the masked headers
    pub fn masked_headers(mut self, headers: Vec<String>) -> Self {
        self.config.masked_headers = headers;
        self
    }

    /// Add a body field to mask
    pub fn mask_field(mut self, field: impl Into<String>) -> Self {
        self.config.masked_fields.push(field.into());
        self
    }

    /// Replace the masked fields
    pub fn masked_fields(mut self, fields: Vec<String>) -> Self {
        self.config.masked_fields = fields;
        self
    }

    /// Set the mask placeholder
    pub fn mask_value(mut self, value: impl Into<String>) -> Self {
        self.config.mask_value = value.into();
        self
    }

    /// Enable or disable card and email masking in text
    pub fn mask_patterns(mut self, enabled: bool) -> Self {
        self.config.mask_patterns = enabled;
        self
    }

    /// Build the configuration without validating it
    pub fn build(self) -> LoggingConfiguration {
        self.config
    }

    /// Build and validate the configuration
    pub fn try_build(self) -> Result<LoggingConfiguration, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// One compiled Ant-style path pattern
///
/// `**` matches any number of path segments, `*` anything within one segment
/// and `?` a single character other than `/`.
#[derive(Clone, Debug)]
pub struct PathPattern {
    source: String,
    regex: Regex,
}

impl PathPattern {
    /// Compile `pattern`, which must start with `/`
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };
        if !pattern.starts_with('/') {
            return Err(invalid("pattern must start with `/`"));
        }

        let mut expr = String::from("^");
        let segments: Vec<&str> = pattern[1..].split('/').collect();
        for (index, segment) in segments.iter().enumerate() {
            if *segment == "**" {
                if index == segments.len() - 1 {
                    expr.push_str("(?:/.*)?");
                } else {
                    expr.push_str("(?:/[^/]+)*");
                }
                continue;
            }
            if segment.contains("**") {
                return Err(invalid("`**` must be a whole path segment"));
            }
            expr.push('/');
            for ch in segment.chars() {
                match ch {
                    '*' => expr.push_str("[^/]*"),
                    '?' => expr.push_str("[^/]"),
                    other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
                }
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| invalid(&e.to_string()))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as configured
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `path` matches
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// Decides which request paths are logged
#[derive(Clone, Debug, Default)]
pub struct UrlFilter {
    include: Vec<PathPattern>,
    exclude: Vec<PathPattern>,
}

impl UrlFilter {
    /// Compile include and exclude pattern lists
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self, ConfigError> {
        let compile = |patterns: &[S]| {
            patterns
                .iter()
                .map(|p| PathPattern::new(p.as_ref()))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// Whether `path` should produce request records
    ///
    /// Exclusions win; a non-empty include list acts as an allow-list.
    pub fn should_log(&self, path: &str) -> bool {
        if self.exclude.iter().any(|p| p.matches(path)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches(path))
    }
}

#[cfg(feature = "env")]
mod env {
    use super::LoggingConfiguration;
    use crate::error::ConfigError;
    use serde::Deserialize;

    /// Flat view of the `LOGLINE_*` variables
    #[derive(Debug, Default, Deserialize)]
    struct EnvOverrides {
        enabled: Option<bool>,
        application_name: Option<String>,
        request_enabled: Option<bool>,
        request_log_headers: Option<bool>,
        request_log_body: Option<bool>,
        request_log_response_body: Option<bool>,
        request_max_body_size: Option<usize>,
        request_exclude_patterns: Option<Vec<String>>,
        request_include_patterns: Option<Vec<String>>,
        application_enabled: Option<bool>,
        application_include_stack_trace: Option<bool>,
        application_max_stack_trace_depth: Option<usize>,
        masked_headers: Option<Vec<String>>,
        masked_fields: Option<Vec<String>>,
        mask_value: Option<String>,
        mask_patterns: Option<bool>,
    }

    /// Prefix of every recognised variable
    pub const ENV_PREFIX: &str = "LOGLINE_";

    impl LoggingConfiguration {
        /// Load the defaults with `LOGLINE_*` overrides applied
        ///
        /// A `.env` file in the working directory is loaded first when
        /// present; variables already set in the process take precedence.
        /// List values are comma separated.
        pub fn from_env() -> Result<Self, ConfigError> {
            Self::default().with_env_overrides()
        }

        /// Apply `LOGLINE_*` overrides on top of this configuration
        pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
            if let Err(err) = dotenvy::dotenv() {
                if !err.not_found() {
                    tracing::warn!(error = %err, "failed to load .env file");
                }
            }
            let overrides: EnvOverrides = envy::prefixed(ENV_PREFIX).from_env()?;
            let config = overrides.apply(self);
            config.validate()?;
            tracing::debug!(enabled = config.enabled, "logging configuration loaded from environment");
            Ok(config)
        }
    }

    impl EnvOverrides {
        fn apply(self, mut config: LoggingConfiguration) -> LoggingConfiguration {
            fn set<T>(slot: &mut T, value: Option<T>) {
                if let Some(value) = value {
                    *slot = value;
                }
            }

            set(&mut config.enabled, self.enabled);
            if self.application_name.is_some() {
                config.application_name = self.application_name;
            }
            set(&mut config.request.enabled, self.request_enabled);
            set(&mut config.request.log_headers, self.request_log_headers);
            set(&mut config.request.log_body, self.request_log_body);
            set(&mut config.request.log_response_body, self.request_log_response_body);
            set(&mut config.request.max_body_size, self.request_max_body_size);
            set(&mut config.request.exclude_patterns, self.request_exclude_patterns);
            set(&mut config.request.include_patterns, self.request_include_patterns);
            set(&mut config.application.enabled, self.application_enabled);
            set(
                &mut config.application.include_stack_trace,
                self.application_include_stack_trace,
            );
            set(
                &mut config.application.max_stack_trace_depth,
                self.application_max_stack_trace_depth,
            );
            set(&mut config.masked_headers, self.masked_headers);
            set(&mut config.masked_fields, self.masked_fields);
            set(&mut config.mask_value, self.mask_value);
            set(&mut config.mask_patterns, self.mask_patterns);
            config
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serial_test::serial;

        const VARS: [&str; 4] = [
            "LOGLINE_APPLICATION_NAME",
            "LOGLINE_REQUEST_MAX_BODY_SIZE",
            "LOGLINE_REQUEST_EXCLUDE_PATTERNS",
            "LOGLINE_MASK_PATTERNS",
        ];

        fn clear_vars() {
            for var in VARS {
                std::env::remove_var(var);
            }
        }

        #[test]
        #[serial]
        fn test_env_overrides_apply() {
            clear_vars();
            std::env::set_var("LOGLINE_APPLICATION_NAME", "billing");
            std::env::set_var("LOGLINE_REQUEST_MAX_BODY_SIZE", "256");
            std::env::set_var("LOGLINE_REQUEST_EXCLUDE_PATTERNS", "/internal/**,/ping");
            std::env::set_var("LOGLINE_MASK_PATTERNS", "false");

            let config = LoggingConfiguration::from_env().unwrap();
            clear_vars();

            assert_eq!(config.configured_application_name(), Some("billing"));
            assert_eq!(config.request.max_body_size, 256);
            assert_eq!(
                config.request.exclude_patterns,
                vec!["/internal/**".to_string(), "/ping".to_string()]
            );
            assert!(!config.mask_patterns);
            assert!(config.request.log_body);
        }

        #[test]
        #[serial]
        fn test_env_invalid_value_is_rejected() {
            clear_vars();
            std::env::set_var("LOGLINE_REQUEST_MAX_BODY_SIZE", "lots");
            let result = LoggingConfiguration::from_env();
            clear_vars();
            assert!(matches!(result, Err(ConfigError::Env(_))));
        }

        #[test]
        #[serial]
        fn test_env_zero_body_size_fails_validation() {
            clear_vars();
            std::env::set_var("LOGLINE_REQUEST_MAX_BODY_SIZE", "0");
            let result = LoggingConfiguration::from_env();
            clear_vars();
            assert!(matches!(result, Err(ConfigError::InvalidMaxBodySize)));
        }
    }
}

#[cfg(feature = "env")]
pub use env::ENV_PREFIX;
