//! The rule sets of the deployment profiles.
//!
//! Every profile projects the admitted object into its own view and only patches objects whose
//! namespace matches the configured [`NamespaceMatcher`][crate::config::NamespaceMatcher]. Leaf
//! values are only written if they differ from the desired value, so running the rules against
//! an already patched object results in an empty patch.
use json_patch::jsonptr::PointerBuf;

pub mod pod_eni;
pub mod service_subnet;

pub use pod_eni::PodEniRules;
pub use service_subnet::ServiceSubnetRules;

/// `/metadata/annotations`
fn annotations_pointer() -> PointerBuf {
    PointerBuf::from_tokens(["metadata", "annotations"])
}

#[cfg(test)]
pub(crate) mod test_utils {
    use patch_webhook::patch::PatchDocument;
    use serde_json::{Value, value::RawValue};

    pub fn raw(object: &Value) -> Box<RawValue> {
        serde_json::value::to_raw_value(object).expect("object must serialize")
    }

    pub fn to_json(patch: &PatchDocument) -> Value {
        serde_json::to_value(patch).expect("patch must serialize")
    }

    /// Applies the patch the way the API server does. A `replace` inserts missing keys, but the
    /// parent has to exist. This panics if an operation is emitted before its parent is created.
    pub fn apply(object: &mut Value, patch: &PatchDocument) {
        for (path, value) in patch.iter() {
            let pointer = path.as_str();
            let (parent, token) = pointer
                .rsplit_once('/')
                .expect("pointer must address a child");
            let token = token.replace("~1", "/").replace("~0", "~");

            let parent = object
                .pointer_mut(parent)
                .unwrap_or_else(|| panic!("parent of {pointer} must exist"));

            match parent {
                Value::Object(map) => {
                    map.insert(token, value.clone());
                }
                Value::Array(items) => {
                    let index: usize = token.parse().expect("array index must be numeric");
                    items[index] = value.clone();
                }
                other => panic!("parent of {pointer} must be a container, got {other}"),
            }
        }
    }
}
