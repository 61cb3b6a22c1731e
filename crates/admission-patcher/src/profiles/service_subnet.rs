//! Places the load balancers of `LoadBalancer` Services into an internal subnet, by setting the
//! subnet annotation the cloud controller manager reads.
use k8s_openapi::{api::core::v1::ServiceSpec, apimachinery::pkg::apis::meta::v1::ObjectMeta};
use patch_webhook::{
    patch::{PatchDocument, child_pointer},
    view::{self, Nested, ProjectObjectError},
    webhooks::PatchRules,
};
use serde::Deserialize;
use serde_json::value::RawValue;

use super::annotations_pointer;
use crate::config::{NamespaceMatcher, SubnetId};

pub const SERVICE_KIND: &str = "Service";
pub const LOAD_BALANCER_SERVICE_TYPE: &str = "LoadBalancer";
pub const SUBNET_ANNOTATION: &str = "service.kubernetes.io/qcloud-loadbalancer-internal-subnetid";

#[derive(Debug, Deserialize)]
struct RawService {
    kind: String,

    #[serde(default)]
    metadata: ObjectMeta,

    #[serde(default)]
    spec: Option<ServiceSpec>,
}

/// The parts of an admitted object the subnet rules look at.
#[derive(Debug, PartialEq, Eq)]
pub struct ServiceView {
    pub kind: String,

    /// `spec.type`
    pub service_type: Option<String>,

    pub subnet_annotation: Nested<String>,
}

pub struct ServiceSubnetRules {
    subnet: SubnetId,
    namespaces: NamespaceMatcher,
}

impl ServiceSubnetRules {
    pub fn new(subnet: SubnetId, namespaces: NamespaceMatcher) -> Self {
        Self { subnet, namespaces }
    }

    fn applies_to(&self, view: &ServiceView, namespace: &str) -> bool {
        view.kind == SERVICE_KIND
            && view.service_type.as_deref() == Some(LOAD_BALANCER_SERVICE_TYPE)
            && self.namespaces.is_match(namespace)
    }
}

impl PatchRules for ServiceSubnetRules {
    type View = ServiceView;

    fn project(&self, object: &RawValue) -> Result<ServiceView, ProjectObjectError> {
        let RawService {
            kind,
            metadata,
            spec,
        } = view::deserialize_object(object)?;

        Ok(ServiceView {
            kind,
            service_type: spec.and_then(|spec| spec.type_),
            subnet_annotation: Nested::from_map(metadata.annotations, SUBNET_ANNOTATION),
        })
    }

    fn evaluate(&self, view: &ServiceView, namespace: &str) -> PatchDocument {
        let mut patch = PatchDocument::new();
        if !self.applies_to(view, namespace) {
            return patch;
        }

        let annotations = annotations_pointer();
        if view.subnet_annotation.is_absent() {
            patch.ensure_object(annotations.clone());
        }

        if !view.subnet_annotation.holds(&*self.subnet) {
            patch.replace(child_pointer(&annotations, SUBNET_ANNOTATION), &*self.subnet);
        }

        patch
    }
}
