//! The `AdmissionReview` envelope exchanged with the API server.
//!
//! Only the parts of the request this webhook needs are decoded. The admitted object is kept as
//! raw JSON, it is up to the [`PatchRules`][crate::webhooks::PatchRules] to project it into a view.
//! The response never echoes the request section back.
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use snafu::{ResultExt, Snafu};

use crate::patch::PatchDocument;

/// The `apiVersion` used for responses when the request didn't carry one.
pub const ADMISSION_REVIEW_API_VERSION: &str = "admission.k8s.io/v1";

/// The `kind` used for responses when the request didn't carry one.
pub const ADMISSION_REVIEW_KIND: &str = "AdmissionReview";

#[derive(Debug, Snafu)]
pub enum DecodeError {
    #[snafu(display("request body is not a valid AdmissionReview"))]
    DeserializeReview { source: serde_json::Error },
}

#[derive(Debug, Snafu)]
pub enum EncodeError {
    #[snafu(display("failed to serialize JSON patch"))]
    SerializePatch { source: serde_json::Error },

    #[snafu(display("failed to serialize AdmissionReview response"))]
    SerializeReview { source: serde_json::Error },
}

/// An inbound `AdmissionReview`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub request: AdmissionRequest,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    /// Opaque identifier which has to be copied verbatim into the response.
    pub uid: String,

    /// Empty for cluster-scoped objects.
    #[serde(default)]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Box<RawValue>>,
}

impl AdmissionReview {
    pub fn from_slice(body: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(body).context(DeserializeReviewSnafu)
    }

    /// Turns this review into the response envelope.
    ///
    /// The request is consumed, so it can't end up in the response. The response always allows
    /// the admission. `patch` and `patchType` are only set if `patch` contains operations.
    pub fn into_response(self, patch: &PatchDocument) -> Result<AdmissionReviewResponse, EncodeError> {
        let mut response = AdmissionResponse::allowed(self.request.uid);

        if !patch.is_empty() {
            let patch = serde_json::to_vec(patch).context(SerializePatchSnafu)?;
            response.patch = Some(STANDARD.encode(patch));
            response.patch_type = Some(PatchType::JsonPatch);
        }

        Ok(AdmissionReviewResponse {
            api_version: self
                .api_version
                .unwrap_or_else(|| ADMISSION_REVIEW_API_VERSION.to_owned()),
            kind: self
                .kind
                .unwrap_or_else(|| ADMISSION_REVIEW_KIND.to_owned()),
            response,
        })
    }
}

/// An outbound `AdmissionReview`, carrying only the response section.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewResponse {
    pub api_version: String,
    pub kind: String,
    pub response: AdmissionResponse,
}

impl AdmissionReviewResponse {
    pub fn to_vec(&self) -> Result<Vec<u8>, EncodeError> {
        serde_json::to_vec(self).context(SerializeReviewSnafu)
    }
}

#[derive(Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,

    /// Base64 encoded [`PatchDocument`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<PatchType>,
}

impl AdmissionResponse {
    pub fn allowed(uid: String) -> Self {
        Self {
            uid,
            allowed: true,
            patch: None,
            patch_type: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub enum PatchType {
    #[serde(rename = "JSONPatch")]
    JsonPatch,
}
