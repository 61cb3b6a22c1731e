//! Routes Pods through an elastic network interface (ENI). The network plugin picks up Pods
//! carrying the networks annotation, and allocates an ENI IP to every Pod requesting the ENI IP
//! extended resource.
//!
//! All keys and values are fixed by the contract of the network plugin, only the matched
//! namespaces are configurable.
use k8s_openapi::{
    api::core::v1::ResourceRequirements,
    apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::ObjectMeta},
};
use json_patch::jsonptr::PointerBuf;
use patch_webhook::{
    patch::{PatchDocument, child_pointer},
    view::{self, Block, Nested, ProjectObjectError},
    webhooks::PatchRules,
};
use serde::Deserialize;
use serde_json::value::RawValue;

use super::annotations_pointer;
use crate::config::NamespaceMatcher;

pub const POD_KIND: &str = "Pod";
pub const NETWORKS_ANNOTATION: &str = "tke.cloud.tencent.com/networks";
pub const NETWORKS_ANNOTATION_VALUE: &str = "tke-route-eni";
pub const ENI_IP_RESOURCE: &str = "tke.cloud.tencent.com/eni-ip";
pub const ENI_IP_RESOURCE_QUANTITY: &str = "1";

const CONTAINERS_PATH: &str = "/spec/containers";
const FIRST_CONTAINER: usize = 0;

#[derive(Debug, Deserialize)]
struct RawPod {
    kind: String,

    #[serde(default)]
    metadata: ObjectMeta,

    #[serde(default)]
    spec: Option<RawPodSpec>,
}

#[derive(Debug, Deserialize)]
struct RawPodSpec {
    #[serde(default)]
    containers: Option<Vec<RawContainer>>,
}

#[derive(Debug, Deserialize)]
struct RawContainer {
    #[serde(default)]
    resources: Option<ResourceRequirements>,
}

/// The parts of an admitted object the ENI rules look at.
#[derive(Debug, PartialEq)]
pub struct PodView {
    pub kind: String,

    pub networks_annotation: Nested<String>,

    /// The `resources` of the first container. This is only projected for Pods, for any other
    /// kind the containers are never addressed and this is [`None`].
    pub resources: Option<Block<ContainerResources>>,
}

/// The ENI IP entries of `limits` and `requests`.
#[derive(Debug, PartialEq)]
pub struct ContainerResources {
    pub limits: Nested<Quantity>,
    pub requests: Nested<Quantity>,
}

impl ContainerResources {
    /// The state of a `resources` block which doesn't exist yet.
    const ABSENT: Self = Self {
        limits: Nested::Absent,
        requests: Nested::Absent,
    };

    fn project(resources: ResourceRequirements) -> Self {
        Self {
            limits: Nested::from_map(resources.limits, ENI_IP_RESOURCE),
            requests: Nested::from_map(resources.requests, ENI_IP_RESOURCE),
        }
    }
}

pub struct PodEniRules {
    namespaces: NamespaceMatcher,
}

impl PodEniRules {
    pub fn new(namespaces: NamespaceMatcher) -> Self {
        Self { namespaces }
    }

    fn applies_to(&self, view: &PodView, namespace: &str) -> bool {
        view.kind == POD_KIND && self.namespaces.is_match(namespace)
    }
}

impl PatchRules for PodEniRules {
    type View = PodView;

    fn project(&self, object: &RawValue) -> Result<PodView, ProjectObjectError> {
        let RawPod {
            kind,
            metadata,
            spec,
        } = view::deserialize_object(object)?;

        let resources = if kind == POD_KIND {
            let containers = spec
                .and_then(|spec| spec.containers)
                .unwrap_or_default();
            let container = view::require_element(containers, CONTAINERS_PATH, FIRST_CONTAINER)?;

            Some(Block::from_option(
                container.resources,
                ContainerResources::project,
            ))
        } else {
            None
        };

        Ok(PodView {
            kind,
            networks_annotation: Nested::from_map(metadata.annotations, NETWORKS_ANNOTATION),
            resources,
        })
    }

    fn evaluate(&self, view: &PodView, namespace: &str) -> PatchDocument {
        let mut patch = PatchDocument::new();
        if !self.applies_to(view, namespace) {
            return patch;
        }

        let Some(resources) = &view.resources else {
            return patch;
        };

        let annotations = annotations_pointer();
        if view.networks_annotation.is_absent() {
            patch.ensure_object(annotations.clone());
        }

        if !view.networks_annotation.holds(NETWORKS_ANNOTATION_VALUE) {
            patch.replace(
                child_pointer(&annotations, NETWORKS_ANNOTATION),
                NETWORKS_ANNOTATION_VALUE,
            );
        }

        let resources_pointer = PointerBuf::from_tokens([
            "spec",
            "containers",
            &FIRST_CONTAINER.to_string(),
            "resources",
        ]);
        let limits_pointer = child_pointer(&resources_pointer, "limits");
        let requests_pointer = child_pointer(&resources_pointer, "requests");

        // Outer to inner, a missing block implies missing children
        let missing = ContainerResources::ABSENT;
        let resources = match resources {
            Block::Absent => {
                patch.ensure_object(resources_pointer);
                &missing
            }
            Block::Present(resources) => resources,
        };

        if resources.limits.is_absent() {
            patch.ensure_object(limits_pointer.clone());
        }

        if resources.requests.is_absent() {
            patch.ensure_object(requests_pointer.clone());
        }

        let quantity = Quantity(ENI_IP_RESOURCE_QUANTITY.to_owned());
        if !resources.limits.holds(&quantity) {
            patch.replace(
                child_pointer(&limits_pointer, ENI_IP_RESOURCE),
                ENI_IP_RESOURCE_QUANTITY,
            );
        }

        if !resources.requests.holds(&quantity) {
            patch.replace(
                child_pointer(&requests_pointer, ENI_IP_RESOURCE),
                ENI_IP_RESOURCE_QUANTITY,
            );
        }

        patch
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use super::*;
    use crate::profiles::test_utils::{apply, raw, to_json};

    const RESOURCES: &str = "/spec/containers/0/resources";
    const LIMIT: &str = "/spec/containers/0/resources/limits/tke.cloud.tencent.com~1eni-ip";
    const REQUEST: &str = "/spec/containers/0/resources/requests/tke.cloud.tencent.com~1eni-ip";
    const NETWORKS: &str = "/metadata/annotations/tke.cloud.tencent.com~1networks";

    fn rules() -> PodEniRules {
        PodEniRules::new("^team-".parse().expect("pattern must be valid"))
    }

    fn pod(annotations: Option<Value>, resources: Option<Value>) -> Value {
        let mut pod = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web-0"},
            "spec": {
                "containers": [
                    {"name": "web", "image": "nginx"},
                    {"name": "sidecar", "image": "envoy"},
                ],
            },
        });

        if let Some(annotations) = annotations {
            pod["metadata"]["annotations"] = annotations;
        }
        if let Some(resources) = resources {
            pod["spec"]["containers"][0]["resources"] = resources;
        }

        pod
    }

    fn evaluate(object: &Value, namespace: &str) -> PatchDocument {
        let rules = rules();
        let view = rules.project(&raw(object)).expect("object must project");
        rules.evaluate(&view, namespace)
    }

    #[test]
    fn bare_pod() {
        let patch = evaluate(&pod(None, None), "team-a");

        assert_eq!(
            to_json(&patch),
            json!([
                {"op": "replace", "path": "/metadata/annotations", "value": {}},
                {"op": "replace", "path": NETWORKS, "value": "tke-route-eni"},
                {"op": "replace", "path": RESOURCES, "value": {}},
                {"op": "replace", "path": "/spec/containers/0/resources/limits", "value": {}},
                {"op": "replace", "path": "/spec/containers/0/resources/requests", "value": {}},
                {"op": "replace", "path": LIMIT, "value": "1"},
                {"op": "replace", "path": REQUEST, "value": "1"},
            ])
        );
    }

    #[test]
    fn pod_with_partial_resources() {
        let patch = evaluate(
            &pod(
                Some(json!({"team": "a"})),
                Some(json!({"limits": {"cpu": "500m"}})),
            ),
            "team-a",
        );

        assert_eq!(
            to_json(&patch),
            json!([
                {"op": "replace", "path": NETWORKS, "value": "tke-route-eni"},
                {"op": "replace", "path": "/spec/containers/0/resources/requests", "value": {}},
                {"op": "replace", "path": LIMIT, "value": "1"},
                {"op": "replace", "path": REQUEST, "value": "1"},
            ])
        );
    }

    #[test]
    fn fully_patched_pod() {
        let object = pod(
            Some(json!({NETWORKS_ANNOTATION: NETWORKS_ANNOTATION_VALUE})),
            Some(json!({
                "limits": {ENI_IP_RESOURCE: "1"},
                "requests": {ENI_IP_RESOURCE: "1"},
            })),
        );

        assert!(evaluate(&object, "team-a").is_empty());
    }

    #[rstest]
    #[case::namespace_mismatch(pod(None, None), "default")]
    #[case::deployment(
        json!({"kind": "Deployment", "spec": {"template": {}}}),
        "team-a"
    )]
    fn no_patch(#[case] object: Value, #[case] namespace: &str) {
        assert!(evaluate(&object, namespace).is_empty());
    }

    #[test]
    fn ancestors_precede_descendants() {
        let patch = evaluate(&pod(None, None), "team-a");

        for (index, (path, _)) in patch.iter().enumerate() {
            for (ancestor_index, (ancestor, _)) in patch.iter().enumerate() {
                if path.as_str().starts_with(&format!("{ancestor}/")) {
                    assert!(
                        ancestor_index < index,
                        "{ancestor} must precede {path}"
                    );
                }
            }
        }
    }

    #[rstest]
    #[case(pod(None, None))]
    #[case(pod(Some(json!({})), Some(json!({}))))]
    #[case(pod(None, Some(json!({"limits": {ENI_IP_RESOURCE: "2"}, "requests": null}))))]
    fn patch_is_idempotent(#[case] mut object: Value) {
        let patch = evaluate(&object, "team-a");
        assert!(!patch.is_empty());

        apply(&mut object, &patch);
        assert_eq!(
            object["spec"]["containers"][0]["resources"]["limits"][ENI_IP_RESOURCE],
            "1"
        );
        assert!(object["spec"]["containers"][1].get("resources").is_none());
        assert!(evaluate(&object, "team-a").is_empty());
    }

    #[rstest]
    #[case::empty_containers(json!({"kind": "Pod", "spec": {"containers": []}}))]
    #[case::null_containers(json!({"kind": "Pod", "spec": {"containers": null}}))]
    #[case::without_spec(json!({"kind": "Pod", "metadata": {}}))]
    fn pod_without_containers(#[case] object: Value) {
        let err = rules()
            .project(&raw(&object))
            .expect_err("first container is required");

        assert!(matches!(
            err,
            ProjectObjectError::MissingElement {
                path: CONTAINERS_PATH,
                index: 0
            }
        ));
    }

    #[test]
    fn project_reads_quantities() {
        let view = rules()
            .project(&raw(&pod(
                None,
                Some(json!({"limits": {ENI_IP_RESOURCE: "1", "memory": "1Gi"}, "requests": {}})),
            )))
            .expect("object must project");

        assert_eq!(view.networks_annotation, Nested::Absent);
        assert_eq!(
            view.resources,
            Some(Block::Present(ContainerResources {
                limits: Nested::Occupied(Quantity("1".to_owned())),
                requests: Nested::Vacant,
            }))
        );
    }
}
