//! Building blocks for the minimal typed views rule sets project admitted objects into.
//!
//! A view only carries what a rule set consumes. Nested objects which might be missing are never
//! defaulted, because a patch must first create a missing parent before it can write into it.
//! [`Nested`] and [`Block`] make that state explicit.
use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value, value::RawValue};
use snafu::{ResultExt, Snafu};

pub type Result<T, E = ProjectObjectError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProjectObjectError {
    #[snafu(display("failed to deserialize admitted object"))]
    DeserializeObject { source: serde_json::Error },

    #[snafu(display("admitted object has no element at {path}/{index}"))]
    MissingElement { path: &'static str, index: usize },
}

/// The state of a single key inside an optional JSON object, e.g. one annotation inside
/// `metadata.annotations`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Nested<T> {
    /// The enclosing object is missing (or `null`) and has to be created first.
    Absent,

    /// The enclosing object exists, but doesn't contain the key.
    Vacant,

    /// The key is set to this value.
    Occupied(T),
}

impl<T> Nested<T> {
    /// Projects `key` out of an optionally present map, dropping all other entries.
    pub fn from_map(map: Option<BTreeMap<String, T>>, key: &str) -> Self {
        match map {
            None => Self::Absent,
            Some(mut map) => map.remove(key).map_or(Self::Vacant, Self::Occupied),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns `true` if the key is set and equals `expected`.
    pub fn holds<U>(&self, expected: &U) -> bool
    where
        T: PartialEq<U>,
        U: ?Sized,
    {
        match self {
            Self::Occupied(value) => value == expected,
            Self::Absent | Self::Vacant => false,
        }
    }
}

/// The state of an optional JSON object whose content is projected further, e.g. the `resources`
/// block of a container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block<T> {
    /// The object is missing (or `null`) and has to be created first.
    Absent,

    /// The object exists.
    Present(T),
}

impl<T> Block<T> {
    pub fn from_option<U>(value: Option<U>, project: impl FnOnce(U) -> T) -> Self {
        value.map_or(Self::Absent, |value| Self::Present(project(value)))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Deserializes the raw admitted object into `T`.
///
/// `T` is expected to declare only the fields a rule set needs, all other fields are ignored.
/// The object has to be a JSON object. Derived implementations would otherwise also accept an
/// array, binding its elements to the fields in declaration order.
pub fn deserialize_object<T>(object: &RawValue) -> Result<T>
where
    T: DeserializeOwned,
{
    let object: Map<String, Value> =
        serde_json::from_str(object.get()).context(DeserializeObjectSnafu)?;

    serde_json::from_value(Value::Object(object)).context(DeserializeObjectSnafu)
}

/// Returns the element at `index`, treating its absence as a projection failure.
pub fn require_element<T>(elements: Vec<T>, path: &'static str, index: usize) -> Result<T> {
    elements
        .into_iter()
        .nth(index)
        .ok_or(ProjectObjectError::MissingElement { path, index })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Meta {
        kind: String,
        annotations: Option<BTreeMap<String, String>>,
    }

    fn raw(json: &str) -> Box<RawValue> {
        RawValue::from_string(json.to_owned()).expect("test input must be valid JSON")
    }

    #[rstest]
    #[case(r#"{"kind": "Service"}"#, Nested::Absent)]
    #[case(r#"{"kind": "Service", "annotations": null}"#, Nested::Absent)]
    #[case(r#"{"kind": "Service", "annotations": {}}"#, Nested::Vacant)]
    #[case(r#"{"kind": "Service", "annotations": {"other": "x"}}"#, Nested::Vacant)]
    #[case(
        r#"{"kind": "Service", "annotations": {"key": "x", "other": "y"}}"#,
        Nested::Occupied("x".to_owned())
    )]
    fn nested_from_map(#[case] input: &str, #[case] expected: Nested<String>) {
        let meta: Meta = deserialize_object(&raw(input)).expect("object must deserialize");

        assert_eq!(meta.kind, "Service");
        assert_eq!(Nested::from_map(meta.annotations, "key"), expected);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let meta: Meta = deserialize_object(&raw(
            r#"{"kind": "Service", "status": {"loadBalancer": {}}, "unknown": [1, 2]}"#,
        ))
        .expect("object must deserialize");

        assert_eq!(meta.kind, "Service");
    }

    #[rstest]
    #[case::array(r#"["Service", {"key": "x"}]"#)]
    #[case::string(r#""Service""#)]
    #[case::null("null")]
    fn non_object_fails(#[case] input: &str) {
        let err = deserialize_object::<Meta>(&raw(input)).expect_err("only objects project");

        assert!(matches!(err, ProjectObjectError::DeserializeObject { .. }));
    }

    #[test]
    fn missing_required_field_fails() {
        let err = deserialize_object::<Meta>(&raw(r#"{"annotations": {}}"#))
            .expect_err("kind is required");

        assert!(matches!(err, ProjectObjectError::DeserializeObject { .. }));
    }

    #[test]
    fn nested_holds() {
        assert!(Nested::Occupied("1".to_owned()).holds("1"));
        assert!(!Nested::Occupied("2".to_owned()).holds("1"));
        assert!(!Nested::<String>::Vacant.holds("1"));
        assert!(!Nested::<String>::Absent.holds("1"));
    }

    #[test]
    fn require_element_out_of_range() {
        let err = require_element(Vec::<u8>::new(), "/spec/containers", 0)
            .expect_err("empty list has no first element");

        assert_eq!(
            err.to_string(),
            "admitted object has no element at /spec/containers/0"
        );
    }
}
