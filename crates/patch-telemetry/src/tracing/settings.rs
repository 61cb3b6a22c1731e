//! Settings of the individual subscribers.
use std::path::PathBuf;

use tracing::level_filters::LevelFilter;
pub use tracing_appender::rolling::Rotation;
use tracing_subscriber::EnvFilter;

/// The level filter of a subscriber.
#[derive(Debug, PartialEq, Eq)]
pub struct Settings {
    /// The environment variable which overrides [`Self::default_level`], using the
    /// [`EnvFilter`] directive syntax.
    pub environment_variable: &'static str,

    pub default_level: LevelFilter,
}

impl Settings {
    /// Builds the filter from the environment. Invalid directives are ignored.
    pub(crate) fn env_filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_env_var(self.environment_variable)
            .with_default_directive(self.default_level.into())
            .from_env_lossy()
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub enum ConsoleLogSettings {
    #[default]
    Disabled,

    /// Writes to stdout.
    Enabled {
        common_settings: Settings,
        log_format: Format,
    },
}

impl ConsoleLogSettings {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }
}

/// Output format of the console logs.
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Format {
    /// Unstructured output. ANSI colors can be turned off by setting `NO_COLOR`.
    #[default]
    Plain,

    /// One JSON object per event, for log collectors which parse structured output.
    Json,
}

/// File logs are always written as JSON.
#[derive(Debug, Default, PartialEq)]
pub enum FileLogSettings {
    #[default]
    Disabled,

    Enabled {
        common_settings: Settings,
        file_log_dir: PathBuf,
        rotation_period: Rotation,

        /// Appended to the service name, which is the file name prefix.
        filename_suffix: String,

        /// Older files are deleted on rotation. [`None`] keeps all of them.
        max_log_files: Option<usize>,
    },
}

impl FileLogSettings {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("plain", Format::Plain)]
    #[case("json", Format::Json)]
    fn format_from_str(#[case] input: &str, #[case] expected: Format) {
        assert_eq!(Format::from_str(input), Ok(expected));
        assert_eq!(expected.to_string(), input);
    }

    #[test]
    fn format_rejects_unknown() {
        assert!(Format::from_str("yaml").is_err());
    }

    #[test]
    fn env_filter_falls_back_to_default_level() {
        let settings = Settings {
            environment_variable: "PATCH_TELEMETRY_UNSET_LOG_LEVEL",
            default_level: LevelFilter::DEBUG,
        };

        assert_eq!(settings.env_filter().max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn disabled_by_default() {
        assert!(!ConsoleLogSettings::default().is_enabled());
        assert!(!FileLogSettings::default().is_enabled());
    }
}
