//! Assembles the [JSON-Patch][rfc6902] document which is handed back to the API server.
//!
//! The API server applies the operations strictly in order, so every operation targeting a child
//! path needs to be preceded by an operation that guarantees the existence of its parent. Use
//! [`PatchDocument::ensure_object`] for the parents and [`PatchDocument::replace`] for the leaves.
//!
//! Paths are [`PointerBuf`]s. Tokens are escaped when they are appended, so keys like
//! `service.kubernetes.io/qcloud-loadbalancer-internal-subnetid` can be passed in as-is.
//!
//! ```
//! use json_patch::jsonptr::PointerBuf;
//! use patch_webhook::patch::{PatchDocument, child_pointer};
//!
//! let annotations = PointerBuf::from_tokens(["metadata", "annotations"]);
//!
//! let mut patch = PatchDocument::new();
//! patch
//!     .ensure_object(annotations.clone())
//!     .replace(child_pointer(&annotations, "example.com/key"), "value");
//!
//! let paths: Vec<&str> = patch.iter().map(|(path, _)| path.as_str()).collect();
//! assert_eq!(paths, ["/metadata/annotations", "/metadata/annotations/example.com~1key"]);
//! ```
//!
//! [rfc6902]: https://datatracker.ietf.org/doc/html/rfc6902
use json_patch::{
    Patch, PatchOperation, ReplaceOperation,
    jsonptr::{Pointer, PointerBuf},
};
use serde::Serialize;
use serde_json::{Map, Value};

/// Returns `parent` with the (unescaped) `token` appended.
pub fn child_pointer(parent: &PointerBuf, token: &str) -> PointerBuf {
    let mut pointer = parent.clone();
    pointer.push_back(token);
    pointer
}

/// An ordered [`Patch`] which only consists of `replace` operations.
///
/// Parents are created by replacing them with an empty object, so no other operation kind is
/// needed. An empty document means "no mutation". It serializes as a plain JSON array.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct PatchDocument(Patch);

impl Default for PatchDocument {
    fn default() -> Self {
        Self(Patch(Vec::new()))
    }
}

impl PatchDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation which replaces the value at `path` with `value`.
    pub fn replace(&mut self, path: PointerBuf, value: impl Into<Value>) -> &mut Self {
        self.0.0.push(PatchOperation::Replace(ReplaceOperation {
            path,
            value: value.into(),
        }));
        self
    }

    /// Appends an operation which replaces the value at `path` with an empty object, so that
    /// subsequent operations can write below it.
    pub fn ensure_object(&mut self, path: PointerBuf) -> &mut Self {
        self.replace(path, Map::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.0.len()
    }

    /// Iterates over the target paths and values, in the order they are applied.
    pub fn iter(&self) -> impl Iterator<Item = (&Pointer, &Value)> {
        self.0.0.iter().filter_map(|operation| match operation {
            PatchOperation::Replace(replace) => Some((&*replace.path, &replace.value)),
            _ => None,
        })
    }
}
