//! Utility types and functions to easily create ready-to-use mutating admission webhook servers.
//! All webhook servers use HTTPS. This library is fully compatible with the [`tracing`] crate and
//! emits debug level tracing data.
//!
//! Most users will only use the top-level exported [`WebhookServer`] together with a
//! [`MutatingWebhook`][1], which drives a [`PatchRules`][2] implementation:
//!
//! ```no_run
//! use patch_webhook::{
//!     WebhookOptions, WebhookServer,
//!     patch::PatchDocument,
//!     view::{self, ProjectObjectError},
//!     webhooks::{MutatingWebhook, PatchRules},
//! };
//! use serde_json::value::RawValue;
//!
//! struct NoOp;
//!
//! impl PatchRules for NoOp {
//!     type View = serde_json::Value;
//!
//!     fn project(&self, object: &RawValue) -> Result<Self::View, ProjectObjectError> {
//!         view::deserialize_object(object)
//!     }
//!
//!     fn evaluate(&self, _view: &Self::View, _namespace: &str) -> PatchDocument {
//!         PatchDocument::new()
//!     }
//! }
//!
//! # async fn run() -> patch_webhook::Result<()> {
//! let server = WebhookServer::new(
//!     vec![Box::new(MutatingWebhook::new(NoOp))],
//!     WebhookOptions::default(),
//! )?;
//! server.run().await
//! # }
//! ```
//!
//! This library additionally also exposes lower-level structs and functions, like the
//! [`TlsServer`][3] and the admission review codec in [`review`].
//!
//! [1]: crate::webhooks::MutatingWebhook
//! [2]: crate::webhooks::PatchRules
//! [3]: crate::tls::TlsServer
use axum::{Router, routing::get};
use snafu::{ResultExt, Snafu};
use tokio::signal::unix::{SignalKind, signal};
use tower_http::trace::TraceLayer;

use crate::{tls::TlsServer, webhooks::Webhook};

pub mod constants;
pub mod options;
pub mod patch;
pub mod review;
pub mod tls;
pub mod view;
pub mod webhooks;

// Selected re-exports
pub use crate::options::{TlsOptions, WebhookOptions};

/// A result type alias with the [`WebhookError`] type as the default error type.
pub type Result<T, E = WebhookError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum WebhookError {
    #[snafu(display("failed to create TLS server"))]
    CreateTlsServer { source: tls::TlsServerError },

    #[snafu(display("failed to run TLS server"))]
    RunTlsServer { source: tls::TlsServerError },

    #[snafu(display("failed to register handler for {signal} signals"))]
    RegisterSignalHandler {
        source: std::io::Error,
        signal: &'static str,
    },
}

/// Builds the root router out of the routes contributed by `webhooks`.
///
/// The health route is added below the trace layer so as not to be instrumented.
fn router(webhooks: Vec<Box<dyn Webhook>>) -> Router {
    let mut router = Router::new();
    for webhook in webhooks {
        router = webhook.register_routes(router);
    }

    tracing::debug!("create core router");
    router
        .layer(TraceLayer::new_for_http())
        .route("/health", get(|| async { "ok" }))
}

/// A ready-to-use webhook server.
///
/// This server abstracts away lower-level details like TLS termination and request tracing. The
/// served routes are contributed by the [`Webhook`]s passed to [`WebhookServer::new()`].
pub struct WebhookServer {
    tls_server: TlsServer,
}

impl WebhookServer {
    /// Creates a new ready-to-use webhook server.
    ///
    /// The server listens on the socket address provided via the [`WebhookOptions`] and reads the
    /// TLS material from the paths referenced there. Failing to read the TLS material is fatal,
    /// no listener is bound in that case. Most of the time it is sufficient to use
    /// [`WebhookOptions::default()`].
    ///
    /// To start the server, use the [`WebhookServer::run()`] function.
    pub fn new(webhooks: Vec<Box<dyn Webhook>>, options: WebhookOptions) -> Result<Self> {
        tracing::trace!("create new webhook server");

        let router = router(webhooks);

        tracing::debug!("create TLS server");
        let tls_server = TlsServer::new(options.socket_addr, router, &options.tls)
            .context(CreateTlsServerSnafu)?;

        Ok(Self { tls_server })
    }

    /// Runs the webhook server and sets up signal handlers for shutting down.
    ///
    /// On SIGINT or SIGTERM the server stops accepting connections and returns once all
    /// in-flight requests are answered.
    pub async fn run(self) -> Result<()> {
        let mut sigint = signal(SignalKind::interrupt())
            .context(RegisterSignalHandlerSnafu { signal: "SIGINT" })?;
        let mut sigterm = signal(SignalKind::terminate())
            .context(RegisterSignalHandlerSnafu { signal: "SIGTERM" })?;

        tracing::debug!("created unix signal handlers");

        let shutdown = async move {
            tokio::select! {
                signal = sigint.recv() => {
                    if signal.is_some() {
                        tracing::info!("received SIGINT, shutting down");
                    }
                },
                signal = sigterm.recv() => {
                    if signal.is_some() {
                        tracing::info!("received SIGTERM, shutting down");
                    }
                },
            }
        };

        tracing::debug!("run webhook server");
        self.tls_server
            .run(shutdown)
            .await
            .context(RunTlsServerSnafu)
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use rstest::rstest;
    use serde_json::value::RawValue;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        patch::PatchDocument,
        review::AdmissionReviewResponse,
        view::{self, ProjectObjectError},
        webhooks::{MutatingWebhook, PatchRules},
    };

    struct Untouched;

    impl PatchRules for Untouched {
        type View = serde_json::Value;

        fn project(&self, object: &RawValue) -> Result<Self::View, ProjectObjectError> {
            view::deserialize_object(object)
        }

        fn evaluate(&self, _view: &Self::View, _namespace: &str) -> PatchDocument {
            PatchDocument::new()
        }
    }

    fn test_router() -> Router {
        router(vec![Box::new(MutatingWebhook::new(Untouched))])
    }

    #[tokio::test]
    async fn health_route() {
        let request = Request::get("/health")
            .body(Body::empty())
            .expect("request must build");
        let response = test_router()
            .oneshot(request)
            .await
            .expect("router is infallible");

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body must be readable");
        assert_eq!(&body[..], b"ok");
    }

    #[rstest]
    #[case::root("/")]
    #[case::mutate("/mutate")]
    #[case::nested("/apis/v1/mutate")]
    #[tokio::test]
    async fn other_paths_reach_webhook(#[case] path: &str) {
        let request = Request::post(path)
            .body(Body::from(r#"{"request": {"uid": "abc", "object": {}}}"#))
            .expect("request must build");
        let response = test_router()
            .oneshot(request)
            .await
            .expect("router is infallible");

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body must be readable");
        let review: AdmissionReviewResponse =
            serde_json::from_slice(&body).expect("body must be a review");
        assert_eq!(review.response.uid, "abc");
        assert!(review.response.allowed);
    }
}
