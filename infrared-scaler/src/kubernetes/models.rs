use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Service, ServicePort};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::fmt;

use crate::error::ResourceError;

/// Identity the proxy tags a server with, `<service>-<namespace>`.
pub type ServerId = String;

/// Namespaced name of a Service. StatefulSets are joined to Services by this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub namespace: String,
    pub name: String,
}

impl ServiceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_meta(kind: &'static str, meta: &ObjectMeta) -> Result<Self, ResourceError> {
        let name = meta
            .name
            .clone()
            .ok_or(ResourceError::MissingMetadata { kind, field: "name" })?;
        let namespace = meta
            .namespace
            .clone()
            .ok_or(ResourceError::MissingMetadata { kind, field: "namespace" })?;
        Ok(Self { namespace, name })
    }

    pub fn server_id(&self) -> ServerId {
        format!("{}-{}", self.name, self.namespace)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Namespaced name of a StatefulSet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkloadRef {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "statefulset {}/{}", self.namespace, self.name)
    }
}

/// A Service that may be routed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointResource {
    pub key: ServiceKey,
    /// Port the proxy dials, taken from the first TCP port.
    pub port: i32,
    /// Value of the domain annotation. `None` means the Service is not routable.
    pub domain: Option<String>,
}

impl EndpointResource {
    pub fn from_service(svc: &Service, domain_annotation: &str) -> Result<Self, ResourceError> {
        let key = ServiceKey::from_meta("Service", &svc.metadata)?;
        let ports = svc
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .ok_or_else(|| ResourceError::MissingSpec {
                kind: "Service",
                name: key.to_string(),
            })?;
        let port = ports
            .iter()
            .find(|p| is_tcp(p))
            .ok_or_else(|| ResourceError::NoTcpPort(key.to_string()))?;

        let domain = svc
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(domain_annotation))
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Ok(Self {
            key,
            port: dial_port(port),
            domain,
        })
    }

    pub fn server_id(&self) -> ServerId {
        self.key.server_id()
    }

    pub fn address(&self) -> String {
        format!("{}.{}:{}", self.key.name, self.key.namespace, self.port)
    }
}

// Kubernetes defaults an unset protocol to TCP.
fn is_tcp(port: &ServicePort) -> bool {
    port.protocol.as_deref().map_or(true, |p| p == "TCP")
}

// Named target ports can't be resolved without the pod spec, so those fall
// back to the service port like an unset one does.
fn dial_port(port: &ServicePort) -> i32 {
    match port.target_port {
        Some(IntOrString::Int(target)) if target > 0 => target,
        _ => port.port,
    }
}

/// A StatefulSet backing a routable Service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadResource {
    pub workload: WorkloadRef,
    /// The Service named by `spec.serviceName`.
    pub service: ServiceKey,
    pub desired_replicas: i32,
    pub ready_replicas: i32,
}

impl WorkloadResource {
    pub fn from_statefulset(sts: &StatefulSet) -> Result<Self, ResourceError> {
        let key = ServiceKey::from_meta("StatefulSet", &sts.metadata)?;
        let spec = sts.spec.as_ref().ok_or_else(|| ResourceError::MissingSpec {
            kind: "StatefulSet",
            name: key.to_string(),
        })?;
        if spec.service_name.is_empty() {
            return Err(ResourceError::MissingServiceName(key.to_string()));
        }

        Ok(Self {
            service: ServiceKey::new(key.namespace.clone(), spec.service_name.clone()),
            workload: WorkloadRef {
                namespace: key.namespace,
                name: key.name,
            },
            // The API server defaults an omitted replica count to 1.
            desired_replicas: spec.replicas.unwrap_or(1),
            ready_replicas: sts
                .status
                .as_ref()
                .and_then(|s| s.ready_replicas)
                .unwrap_or(0),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use k8s_openapi::api::core::v1::ServiceSpec;

    #[test]
    fn service_with_domain_is_routable() {
        let svc = service("game-a", "ns1", Some("a.example.com"), 25565);
        let endpoint = EndpointResource::from_service(&svc, DOMAIN_ANNOTATION).unwrap();

        assert_eq!(endpoint.server_id(), "game-a-ns1");
        assert_eq!(endpoint.address(), "game-a.ns1:25565");
        assert_eq!(endpoint.domain.as_deref(), Some("a.example.com"));
    }

    #[test]
    fn numeric_target_port_wins_over_port() {
        let mut svc = service("game-a", "ns1", None, 80);
        svc.spec.as_mut().unwrap().ports.as_mut().unwrap()[0].target_port =
            Some(IntOrString::Int(25565));

        let endpoint = EndpointResource::from_service(&svc, DOMAIN_ANNOTATION).unwrap();
        assert_eq!(endpoint.address(), "game-a.ns1:25565");
        assert_eq!(endpoint.domain, None);
    }

    #[test]
    fn named_target_port_falls_back_to_port() {
        let mut svc = service("game-a", "ns1", None, 25565);
        svc.spec.as_mut().unwrap().ports.as_mut().unwrap()[0].target_port =
            Some(IntOrString::String("minecraft".to_string()));

        let endpoint = EndpointResource::from_service(&svc, DOMAIN_ANNOTATION).unwrap();
        assert_eq!(endpoint.port, 25565);
    }

    #[test]
    fn first_tcp_port_is_selected() {
        let mut svc = service("game-a", "ns1", None, 25565);
        svc.spec.as_mut().unwrap().ports.as_mut().unwrap().insert(
            0,
            ServicePort {
                port: 19132,
                protocol: Some("UDP".to_string()),
                ..ServicePort::default()
            },
        );

        let endpoint = EndpointResource::from_service(&svc, DOMAIN_ANNOTATION).unwrap();
        assert_eq!(endpoint.port, 25565);
    }

    #[test]
    fn udp_only_service_is_rejected() {
        let mut svc = service("game-a", "ns1", None, 25565);
        svc.spec.as_mut().unwrap().ports.as_mut().unwrap()[0].protocol = Some("UDP".to_string());

        assert_eq!(
            EndpointResource::from_service(&svc, DOMAIN_ANNOTATION),
            Err(ResourceError::NoTcpPort("ns1/game-a".to_string()))
        );
    }

    #[test]
    fn service_without_ports_is_rejected() {
        let mut svc = service("game-a", "ns1", None, 25565);
        svc.spec = Some(ServiceSpec::default());

        assert!(matches!(
            EndpointResource::from_service(&svc, DOMAIN_ANNOTATION),
            Err(ResourceError::MissingSpec { .. })
        ));
    }

    #[test]
    fn blank_domain_counts_as_absent() {
        let svc = service("game-a", "ns1", Some("  "), 25565);
        let endpoint = EndpointResource::from_service(&svc, DOMAIN_ANNOTATION).unwrap();
        assert_eq!(endpoint.domain, None);
    }

    #[test]
    fn statefulset_joins_on_service_name() {
        let sts = statefulset("game-a-sts", "ns1", "game-a", 2, 1);
        let workload = WorkloadResource::from_statefulset(&sts).unwrap();

        assert_eq!(workload.service, ServiceKey::new("ns1", "game-a"));
        assert_eq!(workload.workload.name, "game-a-sts");
        assert_eq!(workload.desired_replicas, 2);
        assert_eq!(workload.ready_replicas, 1);
    }

    #[test]
    fn statefulset_without_service_name_is_rejected() {
        let sts = statefulset("game-a-sts", "ns1", "", 1, 1);
        assert_eq!(
            WorkloadResource::from_statefulset(&sts),
            Err(ResourceError::MissingServiceName("ns1/game-a-sts".to_string()))
        );
    }
}
