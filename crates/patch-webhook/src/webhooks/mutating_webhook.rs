use std::{error::Error, sync::Arc};

use axum::{
    Router,
    body::Bytes,
    extract::DefaultBodyLimit,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use snafu::{ResultExt, Snafu};
use tracing::instrument;

use super::{PatchRules, Webhook};
use crate::{
    constants::MAX_ADMISSION_REVIEW_BYTES,
    patch::PatchDocument,
    review::{AdmissionReview, AdmissionReviewResponse, DecodeError, EncodeError},
    view::ProjectObjectError,
};

/// Per-request failures. Each of them is answered with `400 Bad Request` and the error chain as
/// plain text body. The admission is never denied.
#[derive(Debug, Snafu)]
pub enum MutateError {
    #[snafu(display("failed to decode admission review"))]
    DecodeReview { source: DecodeError },

    #[snafu(display("failed to project object of admission request {uid:?}"))]
    ProjectObject {
        source: ProjectObjectError,
        uid: String,
    },

    #[snafu(display("failed to encode response for admission request {uid:?}"))]
    EncodeResponse { source: EncodeError, uid: String },
}

impl MutateError {
    /// Renders the error and all of its sources as a single line.
    pub fn chain(&self) -> String {
        std::iter::successors(Some(self as &(dyn Error + 'static)), |err| (*err).source())
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(": ")
    }
}

impl IntoResponse for MutateError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.chain()).into_response()
    }
}

/// Mutating webhook, which intercepts object creations/modifications and patches the object on
/// the fly.
///
/// The decision which patches to apply is delegated to the [`PatchRules`] `R`. The webhook
/// answers on every path except `/health`, the path is chosen by the webhook configuration of the
/// cluster.
///
/// ### Example usage
///
/// ```
/// use patch_webhook::{
///     patch::PatchDocument,
///     view::{self, ProjectObjectError},
///     webhooks::{MutatingWebhook, PatchRules},
/// };
/// use serde::Deserialize;
/// use serde_json::value::RawValue;
///
/// #[derive(Debug, Deserialize)]
/// struct KindView {
///     kind: String,
/// }
///
/// // Basic no-op implementation
/// struct NoOp;
///
/// impl PatchRules for NoOp {
///     type View = KindView;
///
///     fn project(&self, object: &RawValue) -> Result<KindView, ProjectObjectError> {
///         view::deserialize_object(object)
///     }
///
///     fn evaluate(&self, _view: &KindView, _namespace: &str) -> PatchDocument {
///         PatchDocument::new()
///     }
/// }
///
/// let mutating_webhook = MutatingWebhook::new(NoOp);
/// ```
pub struct MutatingWebhook<R> {
    rules: Arc<R>,
}

impl<R> MutatingWebhook<R>
where
    R: PatchRules,
{
    pub fn new(rules: R) -> Self {
        Self {
            rules: Arc::new(rules),
        }
    }

    /// Runs a single admission request through decode, projection, rule evaluation and encode.
    ///
    /// The inbound review is logged as audit record as soon as it is decoded, regardless of the
    /// outcome of the following steps. Reviews without an object (or with a `null` object), as
    /// sent for DELETE and CONNECT operations, are allowed unchanged.
    #[instrument(name = "mutate_admission_request", skip_all)]
    pub fn mutate(&self, body: &[u8]) -> Result<AdmissionReviewResponse, MutateError> {
        let review = AdmissionReview::from_slice(body).context(DecodeReviewSnafu)?;

        tracing::info!(
            uid = %review.request.uid,
            namespace = %review.request.namespace,
            review = %String::from_utf8_lossy(body),
            "received admission review"
        );

        let uid = review.request.uid.clone();
        let patch = match review.request.object.as_deref() {
            Some(object) => {
                let view = self
                    .rules
                    .project(object)
                    .with_context(|_| ProjectObjectSnafu { uid: uid.clone() })?;

                let patch = self.rules.evaluate(&view, &review.request.namespace);
                tracing::debug!(
                    %uid,
                    ?view,
                    patch.operations = patch.len(),
                    "evaluated patch rules"
                );
                patch
            }
            None => {
                tracing::debug!(
                    %uid,
                    operation = ?review.request.operation,
                    "admission request carries no object, leaving it unchanged"
                );
                PatchDocument::new()
            }
        };

        review
            .into_response(&patch)
            .context(EncodeResponseSnafu { uid })
    }

    fn handle(&self, body: &[u8]) -> Response {
        match self.mutate(body).and_then(|review| {
            review.to_vec().with_context(|_| EncodeResponseSnafu {
                uid: review.response.uid.clone(),
            })
        }) {
            Ok(encoded) => (
                [(header::CONTENT_TYPE, "application/json")],
                encoded,
            )
                .into_response(),
            Err(err) => {
                tracing::warn!(
                    error = %err.chain(),
                    review = %String::from_utf8_lossy(body),
                    "failed to handle admission review"
                );
                err.into_response()
            }
        }
    }
}

impl<R> Webhook for MutatingWebhook<R>
where
    R: PatchRules,
{
    fn register_routes(&self, router: Router) -> Router {
        let webhook = Self {
            rules: self.rules.clone(),
        };
        let webhook = Arc::new(webhook);
        let handler_fn = move |body: Bytes| {
            let webhook = webhook.clone();
            async move { webhook.handle(&body) }
        };

        tracing::debug!("registering fallback route for mutating webhook");
        router
            .fallback(handler_fn)
            .layer(DefaultBodyLimit::max(MAX_ADMISSION_REVIEW_BYTES))
    }
}
