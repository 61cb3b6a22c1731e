//! Initialises the console and rolling file log subscribers.
//!
//! To get started, see [`Tracing`].
use std::path::PathBuf;

use snafu::{ResultExt as _, Snafu};
use tracing::{level_filters::LevelFilter, subscriber::SetGlobalDefaultError};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{InitError, RollingFileAppender},
};
use tracing_subscriber::{Layer, Registry, layer::SubscriberExt};

use crate::tracing::settings::{ConsoleLogSettings, FileLogSettings, Format, Rotation, Settings};

pub mod settings;

type Result<T, E = Error> = std::result::Result<T, E>;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Errors which can be encountered when initialising [`Tracing`].
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to initialize rolling file appender"))]
    InitRollingFileAppender { source: InitError },

    #[snafu(display("unable to set the global default subscriber"))]
    SetGlobalDefaultSubscriber { source: SetGlobalDefaultError },
}

/// The console and rolling file log subscribers of a service.
///
/// The subscribers are active as long as the value returned by [`Tracing::init`] is alive. File
/// logs are written by a background worker, dropping the value flushes all buffered lines. Hold
/// onto it until the application exits.
///
/// <div class="warning">
/// Name the guard variable appropriately, do not just use <code>let _ =</code>, as that will drop
/// immediately.
/// </div>
///
/// ```
/// use patch_telemetry::tracing::{Error, TelemetryOptions, Tracing};
///
/// fn main() -> Result<(), Error> {
///     let _tracing_guard = Tracing::pre_configured("test", TelemetryOptions::default()).init()?;
///
///     tracing::info!("log a message");
///     Ok(())
/// }
/// ```
///
/// ## Environment Variables and CLI Arguments
///
/// ### Console logs
///
/// - `CONSOLE_LOG_DISABLED` (`--console-log-disabled`): Disables console logs when set to `true`.
/// - `CONSOLE_LOG_FORMAT` (`--console-log-format`): Either `plain` (default) or `json`.
/// - `CONSOLE_LOG_LEVEL`: Set the log level for the console logs.
///
/// ### File logs
///
/// - `FILE_LOG_DIRECTORY` (`--file-log-directory`): Enable the file logs and set the file log directory.
/// - `FILE_LOG_ROTATION_PERIOD` (`--file-log-rotation-period`): Set the rotation period of log files.
/// - `FILE_LOG_MAX_FILES` (`--file-log-max-files`): Set the maximum number of log files to keep.
/// - `FILE_LOG_LEVEL`: Set the log level for file logs.
pub struct Tracing {
    service_name: &'static str,
    console_log_settings: ConsoleLogSettings,
    file_log_settings: FileLogSettings,

    file_log_guard: Option<WorkerGuard>,
}

impl Tracing {
    /// The environment variable used to set the console log level filter.
    pub const CONSOLE_LOG_LEVEL: &str = "CONSOLE_LOG_LEVEL";
    /// The environment variable used to set the rolling file log level filter.
    pub const FILE_LOG_LEVEL: &str = "FILE_LOG_LEVEL";
    /// The filename suffix of the rolling file logs.
    pub const FILE_LOG_SUFFIX: &str = "tracing-rs.json";

    /// Configures the subscribers from `options`. Both default to the INFO level, and file logs
    /// are never rotated unless a rotation period is given.
    ///
    /// The service name is used as the filename prefix of the log files.
    pub fn pre_configured(service_name: &'static str, options: TelemetryOptions) -> Self {
        let TelemetryOptions {
            console_log_disabled,
            console_log_format,
            file_log_directory,
            file_log_rotation_period,
            file_log_max_files,
        } = options;

        let console_log_settings = if console_log_disabled {
            ConsoleLogSettings::Disabled
        } else {
            ConsoleLogSettings::Enabled {
                common_settings: Settings {
                    environment_variable: Self::CONSOLE_LOG_LEVEL,
                    default_level: LevelFilter::INFO,
                },
                log_format: console_log_format,
            }
        };

        let file_log_settings = match file_log_directory {
            Some(file_log_dir) => FileLogSettings::Enabled {
                common_settings: Settings {
                    environment_variable: Self::FILE_LOG_LEVEL,
                    default_level: LevelFilter::INFO,
                },
                file_log_dir,
                rotation_period: file_log_rotation_period.unwrap_or_default().into(),
                filename_suffix: Self::FILE_LOG_SUFFIX.to_owned(),
                max_log_files: file_log_max_files,
            },
            None => FileLogSettings::Disabled,
        };

        Self {
            service_name,
            console_log_settings,
            file_log_settings,
            file_log_guard: None,
        }
    }

    /// Installs the configured subscribers as the global default.
    ///
    /// Returns `self`, which holds the file log worker. See the type level docs.
    pub fn init(mut self) -> Result<Self> {
        let layers = self.layers()?;

        if !layers.is_empty() {
            tracing::subscriber::set_global_default(tracing_subscriber::registry().with(layers))
                .context(SetGlobalDefaultSubscriberSnafu)?;
        }

        Ok(self)
    }

    /// Builds one layer per enabled subscriber and starts the file log worker.
    fn layers(&mut self) -> Result<Vec<BoxedLayer>> {
        let mut layers: Vec<BoxedLayer> = Vec::new();

        if let ConsoleLogSettings::Enabled {
            common_settings,
            log_format,
        } = &self.console_log_settings
        {
            let env_filter = common_settings.env_filter();
            layers.push(match log_format {
                Format::Plain => tracing_subscriber::fmt::layer()
                    .with_filter(env_filter)
                    .boxed(),
                Format::Json => tracing_subscriber::fmt::layer()
                    .json()
                    .with_filter(env_filter)
                    .boxed(),
            });
        }

        if let FileLogSettings::Enabled {
            common_settings,
            file_log_dir,
            rotation_period,
            filename_suffix,
            max_log_files,
        } = &self.file_log_settings
        {
            let mut file_appender = RollingFileAppender::builder()
                .rotation(rotation_period.clone())
                .filename_prefix(self.service_name)
                .filename_suffix(filename_suffix);

            if let Some(max_log_files) = max_log_files {
                file_appender = file_appender.max_log_files(*max_log_files);
            }

            let file_appender = file_appender
                .build(file_log_dir)
                .context(InitRollingFileAppenderSnafu)?;

            // Writing happens on a dedicated thread, so request handling never blocks on disk I/O
            let (file_writer, file_log_guard) = tracing_appender::non_blocking(file_appender);
            self.file_log_guard = Some(file_log_guard);

            layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(file_writer)
                    .with_filter(common_settings.env_filter())
                    .boxed(),
            );
        }

        Ok(layers)
    }
}

impl Drop for Tracing {
    fn drop(&mut self) {
        tracing::debug!(
            file_log.enabled = self.file_log_settings.is_enabled(),
            "shutting down tracing subscribers"
        );

        // Flushes buffered file log lines
        drop(self.file_log_guard.take());
    }
}

/// Contains options which can be passed to [`Tracing::pre_configured()`].
///
/// Additionally, this struct can be used as CLI arguments. This functionality is only
/// available if the feature `clap` is enabled.
///
#[cfg_attr(
    feature = "clap",
    doc = r#"
```
# use patch_telemetry::tracing::TelemetryOptions;
use clap::Parser;

#[derive(Parser)]
struct Cli {
    #[arg(long)]
    subnet: String,

    #[clap(flatten)]
    telemetry_arguments: TelemetryOptions,
}
```
"#
)]
#[cfg_attr(feature = "clap", derive(clap::Args, PartialEq, Eq))]
#[derive(Debug, Default)]
pub struct TelemetryOptions {
    /// Disable console logs.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub console_log_disabled: bool,

    /// Output FORMAT of console logs.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_name = "FORMAT", default_value_t = Format::Plain)
    )]
    pub console_log_format: Format,

    /// Enable logging to files located in the specified DIRECTORY.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_name = "DIRECTORY", group = "file_log")
    )]
    pub file_log_directory: Option<PathBuf>,

    /// Time PERIOD after which log files are rolled over.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_name = "PERIOD", requires = "file_log")
    )]
    pub file_log_rotation_period: Option<RotationPeriod>,

    /// Maximum number of log files to keep.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, value_name = "COUNT", requires = "file_log")
    )]
    pub file_log_max_files: Option<usize>,
}

/// Supported periods when the log file is rolled over.
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(Clone, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "PascalCase")]
#[allow(missing_docs)]
pub enum RotationPeriod {
    Minutely,
    Hourly,
    Daily,

    #[default]
    Never,
}

impl From<RotationPeriod> for Rotation {
    fn from(value: RotationPeriod) -> Self {
        match value {
            RotationPeriod::Minutely => Self::MINUTELY,
            RotationPeriod::Hourly => Self::HOURLY,
            RotationPeriod::Daily => Self::DAILY,
            RotationPeriod::Never => Self::NEVER,
        }
    }
}
