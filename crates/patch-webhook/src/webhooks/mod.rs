use std::fmt::Debug;

use axum::Router;
pub use mutating_webhook::{MutateError, MutatingWebhook};
use serde_json::value::RawValue;

use crate::{patch::PatchDocument, view::ProjectObjectError};

mod mutating_webhook;

/// A webhook (such as the mutating webhook) needs to implement this trait.
pub trait Webhook {
    /// The webhook can add arbitrary routes to the passed [`Router`] and needs to return the
    /// resulting [`Router`].
    fn register_routes(&self, router: Router) -> Router;
}

/// The rule strategy driven by a [`MutatingWebhook`].
///
/// Each deployment profile supplies its own implementation together with its own (immutable)
/// configuration, the server, codec and lifecycle are shared.
///
/// Both functions are synchronous and must not perform any I/O. They are called once per
/// admission request.
pub trait PatchRules: Send + Sync + 'static {
    /// The minimal typed view of the admitted object.
    type View: Debug;

    /// Projects the raw admitted object into [`Self::View`].
    ///
    /// Unknown fields must be ignored. Malformed objects, or objects missing a field or element
    /// the rules depend on, fail with a [`ProjectObjectError`].
    fn project(&self, object: &RawValue) -> Result<Self::View, ProjectObjectError>;

    /// Decides which operations to apply to the object described by `view`.
    ///
    /// This function is total: the same input always results in the same ordered
    /// [`PatchDocument`]. An empty document allows the object unchanged.
    fn evaluate(&self, view: &Self::View, namespace: &str) -> PatchDocument;
}
