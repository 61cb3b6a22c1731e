//! Command line interface. Every deployment profile is a subcommand, all options can also be
//! provided through environment variables.
//!
//! ```
//! use admission_patcher::cli::{Cli, Profile};
//! use clap::Parser;
//!
//! let cli = Cli::parse_from([
//!     "admission-patcher",
//!     "service-subnet",
//!     "--subnet",
//!     "subnet-1234",
//!     "--match-namespace",
//!     "^prod-",
//! ]);
//! assert!(matches!(cli.profile, Profile::ServiceSubnet(_)));
//! ```
use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use patch_telemetry::tracing::TelemetryOptions;
use patch_webhook::{
    WebhookOptions,
    constants::{DEFAULT_SOCKET_ADDRESS, DEFAULT_TLS_CERTIFICATE_PATH, DEFAULT_TLS_PRIVATE_KEY_PATH},
};

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(name = "admission-patcher", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub profile: Profile,
}

/// The deployment profiles. Each of them patches a different kind of object.
#[derive(Debug, PartialEq, Eq, Subcommand, strum::IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Profile {
    /// Place the load balancers of `LoadBalancer` Services into an internal subnet.
    ServiceSubnet(ServiceSubnetArguments),

    /// Attach an elastic network interface IP to the first container of Pods.
    PodEni(PodEniArguments),
}

impl Profile {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Splits the profile into its rule specific arguments and the options shared by all
    /// profiles.
    pub fn into_parts(self) -> (RuleArguments, CommonOptions) {
        match self {
            Profile::ServiceSubnet(ServiceSubnetArguments { subnet, common }) => {
                (RuleArguments::ServiceSubnet { subnet }, common)
            }
            Profile::PodEni(PodEniArguments { common }) => (RuleArguments::PodEni, common),
        }
    }
}

/// The raw, not yet validated, rule arguments of a [`Profile`].
#[derive(Debug, PartialEq, Eq)]
pub enum RuleArguments {
    ServiceSubnet { subnet: String },
    PodEni,
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct ServiceSubnetArguments {
    /// The ID of the subnet internal load balancers are placed in.
    #[arg(long, env = "CFG_SUBNET", value_name = "SUBNET_ID")]
    pub subnet: String,

    // IMPORTANT: All (flattened) sub structs should be placed at the end to ensure the help
    // headings are correct.
    #[command(flatten)]
    pub common: CommonOptions,
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct PodEniArguments {
    #[command(flatten)]
    pub common: CommonOptions,
}

/// Options shared by all profiles.
#[derive(Debug, PartialEq, Eq, Args)]
pub struct CommonOptions {
    /// Only objects in namespaces matching this regular expression are patched.
    #[arg(long, env = "CFG_MATCH_NS", value_name = "PATTERN")]
    pub match_namespace: String,

    /// The socket address the HTTPS server binds to.
    #[arg(long, env, value_name = "ADDRESS", default_value_t = DEFAULT_SOCKET_ADDRESS)]
    pub bind_address: SocketAddr,

    /// Path of the PEM encoded TLS certificate chain, leaf certificate first.
    #[arg(long, env, value_name = "FILE", default_value = DEFAULT_TLS_CERTIFICATE_PATH)]
    pub tls_certificate: PathBuf,

    /// Path of the PEM encoded TLS private key.
    #[arg(long, env, value_name = "FILE", default_value = DEFAULT_TLS_PRIVATE_KEY_PATH)]
    pub tls_private_key: PathBuf,

    #[command(flatten)]
    pub telemetry: TelemetryOptions,
}

impl CommonOptions {
    pub fn webhook_options(&self) -> WebhookOptions {
        WebhookOptions::builder()
            .socket_addr(self.bind_address)
            .tls_certificate_path(&self.tls_certificate)
            .tls_private_key_path(&self.tls_private_key)
            .build()
    }
}
