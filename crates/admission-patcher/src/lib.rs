//! A mutating admission webhook which patches cloud networking settings into admitted objects.
//!
//! The binary serves one [`Profile`][cli::Profile] at a time. Each profile validates its
//! configuration, plugs its rule set into a [`MutatingWebhook`] and runs the
//! [`WebhookServer`] until it receives SIGINT or SIGTERM.
use patch_telemetry::Tracing;
use patch_webhook::{
    WebhookError, WebhookOptions, WebhookServer,
    webhooks::{MutatingWebhook, Webhook},
};
use snafu::{ResultExt, Snafu};

use crate::{
    cli::{Profile, RuleArguments},
    config::{ConfigError, NamespaceMatcher, SubnetId},
    profiles::{PodEniRules, ServiceSubnetRules},
};

pub mod cli;
pub mod config;
pub mod profiles;

pub const APP_NAME: &str = "admission-patcher";

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to initialize tracing"))]
    InitTracing {
        source: patch_telemetry::tracing::Error,
    },

    #[snafu(display("invalid configuration"))]
    Configure { source: ConfigError },

    #[snafu(display("failed to create webhook server"))]
    CreateWebhookServer { source: WebhookError },

    #[snafu(display("failed to run webhook server"))]
    RunWebhookServer { source: WebhookError },
}

/// Runs the webhook server of the selected `profile` until it is shut down by a signal.
pub async fn run(profile: Profile) -> Result<()> {
    let profile_name = profile.name();
    let (rules, common) = profile.into_parts();
    let options = common.webhook_options();

    let _tracing_guard = Tracing::pre_configured(APP_NAME, common.telemetry)
        .init()
        .context(InitTracingSnafu)?;

    tracing::info!(
        profile = profile_name,
        version = env!("CARGO_PKG_VERSION"),
        "starting admission patcher"
    );

    let result = serve(rules, &common.match_namespace, options).await;
    match &result {
        Ok(()) => tracing::info!("admission patcher exited"),
        Err(err) => {
            tracing::error!(error = %snafu::Report::from_error(err), "admission patcher failed")
        }
    }

    result
}

async fn serve(
    rules: RuleArguments,
    match_namespace: &str,
    options: WebhookOptions,
) -> Result<()> {
    let webhook = build_webhook(rules, match_namespace).context(ConfigureSnafu)?;

    let server = WebhookServer::new(vec![webhook], options).context(CreateWebhookServerSnafu)?;
    server.run().await.context(RunWebhookServerSnafu)
}

/// Validates the raw arguments and plugs the resulting rule set into a [`MutatingWebhook`].
fn build_webhook(
    rules: RuleArguments,
    match_namespace: &str,
) -> Result<Box<dyn Webhook>, ConfigError> {
    let namespaces: NamespaceMatcher = match_namespace.parse()?;
    tracing::debug!(%namespaces, "compiled namespace pattern");

    let webhook: Box<dyn Webhook> = match rules {
        RuleArguments::ServiceSubnet { subnet } => {
            let subnet: SubnetId = subnet.parse()?;
            tracing::debug!(%subnet, "using load balancer subnet");

            Box::new(MutatingWebhook::new(ServiceSubnetRules::new(
                subnet, namespaces,
            )))
        }
        RuleArguments::PodEni => Box::new(MutatingWebhook::new(PodEniRules::new(namespaces))),
    };

    Ok(webhook)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(RuleArguments::ServiceSubnet { subnet: "subnet-1234".to_owned() }, "^prod-")]
    #[case(RuleArguments::PodEni, ".*")]
    fn valid_configuration(#[case] rules: RuleArguments, #[case] match_namespace: &str) {
        assert!(build_webhook(rules, match_namespace).is_ok());
    }

    #[rstest]
    #[case(RuleArguments::ServiceSubnet { subnet: "  ".to_owned() }, "^prod-")]
    #[case(RuleArguments::ServiceSubnet { subnet: "subnet-1234".to_owned() }, " ")]
    #[case(RuleArguments::PodEni, "(")]
    fn invalid_configuration(#[case] rules: RuleArguments, #[case] match_namespace: &str) {
        assert!(build_webhook(rules, match_namespace).is_err());
    }

    #[tokio::test]
    async fn missing_tls_material_is_fatal() {
        let options = WebhookOptions::builder()
            .bind_address([127, 0, 0, 1], 0)
            .tls_certificate_path("/this/path/does/not/exist/tls.crt")
            .tls_private_key_path("/this/path/does/not/exist/tls.key")
            .build();

        let err = serve(RuleArguments::PodEni, ".*", options)
            .await
            .expect_err("server must not start without TLS material");

        assert!(matches!(err, Error::CreateWebhookServer { .. }));
    }
}
