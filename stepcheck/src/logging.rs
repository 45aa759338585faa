//! Logging configuration for stepcheck.
//!
//! The engine logs through `tracing` with structured fields. [`LogConfig`]
//! controls how chatty interrogation is; [`setup`] wires a subscriber for
//! applications that do not bring their own.

/// Which interrogation events are emitted.
///
/// Failures and threshold breaches are always logged; these switches only
/// cover the high-volume events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Per-step predicate and count events at `debug`.
    pub log_step_details: bool,
    /// Source binding and extraction events at `info`.
    pub log_data_operations: bool,
    /// The end-of-run summary event.
    pub log_metrics: bool,
    /// Predicates longer than this many bytes are cut in log fields.
    pub max_field_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::balanced()
    }
}

impl LogConfig {
    /// Everything on, with long predicates kept mostly intact.
    pub fn verbose() -> Self {
        Self {
            log_step_details: true,
            log_data_operations: true,
            log_metrics: true,
            max_field_length: 2048,
        }
    }

    /// Only failures and breaches.
    pub fn production() -> Self {
        Self {
            log_step_details: false,
            log_data_operations: false,
            log_metrics: false,
            max_field_length: 160,
        }
    }

    /// Source events and the run summary, no per-step detail.
    pub fn balanced() -> Self {
        Self {
            log_step_details: false,
            log_data_operations: true,
            log_metrics: true,
            max_field_length: 512,
        }
    }
}

/// `debug!` that fires only with [`LogConfig::log_step_details`].
#[macro_export]
macro_rules! log_step {
    ($config:expr, $($arg:tt)*) => {
        if $config.log_step_details {
            tracing::debug!($($arg)*);
        }
    };
}

/// `info!` that fires only with [`LogConfig::log_data_operations`].
#[macro_export]
macro_rules! log_data_op {
    ($config:expr, $($arg:tt)*) => {
        if $config.log_data_operations {
            tracing::info!($($arg)*);
        }
    };
}

/// Cuts `value` to at most `max_length` bytes on a char boundary.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }
    let mut cut = max_length;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...(truncated)", &value[..cut])
}

/// Subscriber setup for applications without their own tracing configuration.
pub mod setup {
    use tracing::Level;

    /// Configuration for the global subscriber.
    #[derive(Debug, Clone)]
    pub struct LoggingConfig {
        /// Level for every target other than stepcheck.
        pub level: Level,
        /// Level for the `stepcheck` target.
        pub stepcheck_level: Level,
        /// One JSON object per event instead of human-readable lines.
        pub json_format: bool,
        /// Full filter directive; replaces both levels when set.
        pub env_filter: Option<String>,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                level: Level::INFO,
                stepcheck_level: Level::DEBUG,
                json_format: false,
                env_filter: None,
            }
        }
    }

    impl LoggingConfig {
        /// JSON output, warnings from dependencies, info from stepcheck.
        pub fn production() -> Self {
            Self {
                level: Level::WARN,
                stepcheck_level: Level::INFO,
                json_format: true,
                env_filter: None,
            }
        }

        pub fn development() -> Self {
            Self {
                level: Level::DEBUG,
                stepcheck_level: Level::DEBUG,
                json_format: false,
                env_filter: None,
            }
        }

        pub fn with_level(mut self, level: Level) -> Self {
            self.level = level;
            self
        }

        pub fn with_stepcheck_level(mut self, level: Level) -> Self {
            self.stepcheck_level = level;
            self
        }

        pub fn with_json_format(mut self, enabled: bool) -> Self {
            self.json_format = enabled;
            self
        }

        pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
            self.env_filter = Some(filter.into());
            self
        }

        /// The `EnvFilter` directive, e.g. `warn,stepcheck=info`.
        pub fn env_filter(&self) -> String {
            match &self.env_filter {
                Some(filter) => filter.clone(),
                None => format!(
                    "{},stepcheck={}",
                    self.level.as_str().to_lowercase(),
                    self.stepcheck_level.as_str().to_lowercase()
                ),
            }
        }
    }

    /// Installs a global `tracing` subscriber. `RUST_LOG` overrides the
    /// configured filter.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use stepcheck::logging::setup::{init_logging, LoggingConfig};
    ///
    /// init_logging(LoggingConfig::development().with_json_format(true)).unwrap();
    /// ```
    pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.env_filter()));

        let fmt_layer = if config.json_format {
            tracing_subscriber::fmt::layer().json().boxed()
        } else {
            tracing_subscriber::fmt::layer().boxed()
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;

        Ok(())
    }
}
