// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Maps the REST service of a cluster to a connectable address.
//!
//! `Ok(None)` means "not reachable yet" (for instance while a load balancer
//! is still being provisioned) and callers are expected to poll.

use crate::domain::cluster::{ClusterIdentity, Endpoint};
use crate::domain::config::ServiceExposedType;
use crate::infrastructure::constants::PORT_NAME_REST;
use crate::shared::error::KubeError;
use k8s_openapi::api::core::v1::{LoadBalancerIngress, Service, ServicePort};

/// The exposed type declared by `service`, or `fallback` when it declares none.
pub fn exposed_type_of(
    service: &Service,
    fallback: ServiceExposedType,
) -> Result<ServiceExposedType, KubeError> {
    match service.spec.as_ref().and_then(|spec| spec.type_.as_deref()) {
        Some(type_) => type_.parse(),
        None => Ok(fallback),
    }
}

pub fn resolve_endpoint(
    service: &Service,
    identity: &ClusterIdentity,
    advertised_host: Option<&str>,
) -> Result<Option<Endpoint>, KubeError> {
    let exposed_type = exposed_type_of(service, ServiceExposedType::ClusterIP)?;
    resolve_with_type(exposed_type, service, identity, advertised_host)
}

pub fn resolve_with_type(
    exposed_type: ServiceExposedType,
    service: &Service,
    identity: &ClusterIdentity,
    advertised_host: Option<&str>,
) -> Result<Option<Endpoint>, KubeError> {
    let rest_port = rest_port(service)?;

    match exposed_type {
        ServiceExposedType::ClusterIP => Ok(Some(Endpoint::new(
            identity.namespaced_rest_service_name(),
            rest_port.port,
        ))),
        ServiceExposedType::NodePort => Ok(rest_port
            .node_port
            .zip(non_empty(advertised_host))
            .map(|(node_port, host)| Endpoint::new(host, node_port))),
        ServiceExposedType::LoadBalancer => {
            let host = match first_ingress(service) {
                Some(ingress) => non_empty(ingress.ip.as_deref())
                    .or_else(|| non_empty(ingress.hostname.as_deref())),
                None => external_ip(service),
            };
            Ok(host.map(|host| Endpoint::new(host, rest_port.port)))
        }
    }
}

fn rest_port(service: &Service) -> Result<&ServicePort, KubeError> {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .and_then(|ports| {
            ports
                .iter()
                .find(|port| port.name.as_deref() == Some(PORT_NAME_REST))
        })
        .ok_or_else(|| {
            KubeError::invalid_spec(format!(
                "Service '{}' has no port named '{}'",
                service.metadata.name.as_deref().unwrap_or_default(),
                PORT_NAME_REST
            ))
        })
}

// Only the first ingress entry is consulted. Static external IPs apply
// only while no ingress record has been assigned.
fn first_ingress(service: &Service) -> Option<&LoadBalancerIngress> {
    service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .first()
}

fn external_ip(service: &Service) -> Option<String> {
    let external_ips = service.spec.as_ref()?.external_ips.as_ref()?;
    non_empty(external_ips.first().map(String::as_str))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        LoadBalancerIngress, LoadBalancerStatus, ServiceSpec, ServiceStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn identity() -> ClusterIdentity {
        ClusterIdentity::new("m1", "ns")
    }

    fn service(type_: &str) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some("m1-rest".to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some(type_.to_string()),
                ports: Some(vec![ServicePort {
                    name: Some("rest".to_string()),
                    port: 8081,
                    node_port: Some(30081),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn with_ingress(mut service: Service, ingress: Vec<LoadBalancerIngress>) -> Service {
        service.status = Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(ingress),
                ..Default::default()
            }),
            ..Default::default()
        });
        service
    }

    #[test]
    fn test_cluster_ip_uses_internal_dns_name() {
        let endpoint = resolve_endpoint(&service("ClusterIP"), &identity(), None)
            .unwrap()
            .unwrap();
        assert_eq!(endpoint, Endpoint::new("m1-rest.ns", 8081));
    }

    #[test]
    fn test_node_port_uses_advertised_host_regardless_of_ingress() {
        let svc = with_ingress(
            service("NodePort"),
            vec![LoadBalancerIngress {
                ip: Some("1.2.3.4".to_string()),
                ..Default::default()
            }],
        );
        let endpoint = resolve_endpoint(&svc, &identity(), Some("api.example.com"))
            .unwrap()
            .unwrap();
        assert_eq!(endpoint, Endpoint::new("api.example.com", 30081));
    }

    #[test]
    fn test_load_balancer_without_ingress_is_absent() {
        let svc = with_ingress(service("LoadBalancer"), vec![]);
        assert_eq!(resolve_endpoint(&svc, &identity(), Some("api")).unwrap(), None);
        assert_eq!(
            resolve_endpoint(&service("LoadBalancer"), &identity(), Some("api")).unwrap(),
            None
        );
    }

    #[test]
    fn test_load_balancer_prefers_ip_then_hostname() {
        let by_ip = with_ingress(
            service("LoadBalancer"),
            vec![LoadBalancerIngress {
                ip: Some("1.2.3.4".to_string()),
                hostname: Some("lb.example.com".to_string()),
                ..Default::default()
            }],
        );
        assert_eq!(
            resolve_endpoint(&by_ip, &identity(), None).unwrap(),
            Some(Endpoint::new("1.2.3.4", 8081))
        );

        let by_hostname = with_ingress(
            service("LoadBalancer"),
            vec![LoadBalancerIngress {
                ip: Some(String::new()),
                hostname: Some("lb.example.com".to_string()),
                ..Default::default()
            }],
        );
        assert_eq!(
            resolve_endpoint(&by_hostname, &identity(), None).unwrap(),
            Some(Endpoint::new("lb.example.com", 8081))
        );
    }

    #[test]
    fn test_first_ingress_entry_wins() {
        let svc = with_ingress(
            service("LoadBalancer"),
            vec![
                LoadBalancerIngress {
                    ip: Some("10.0.0.1".to_string()),
                    ..Default::default()
                },
                LoadBalancerIngress {
                    ip: Some("10.0.0.2".to_string()),
                    ..Default::default()
                },
            ],
        );
        assert_eq!(
            resolve_endpoint(&svc, &identity(), None).unwrap().unwrap().host,
            "10.0.0.1"
        );
    }

    #[test]
    fn test_load_balancer_falls_back_to_external_ip() {
        let mut svc = service("LoadBalancer");
        svc.spec.as_mut().unwrap().external_ips = Some(vec!["5.6.7.8".to_string()]);
        assert_eq!(
            resolve_endpoint(&svc, &identity(), None).unwrap(),
            Some(Endpoint::new("5.6.7.8", 8081))
        );
    }

    #[test]
    fn test_empty_ingress_record_does_not_fall_back_to_external_ip() {
        let mut svc = with_ingress(
            service("LoadBalancer"),
            vec![LoadBalancerIngress::default()],
        );
        svc.spec.as_mut().unwrap().external_ips = Some(vec!["5.6.7.8".to_string()]);
        assert_eq!(resolve_endpoint(&svc, &identity(), None).unwrap(), None);
    }

    #[test]
    fn test_untyped_service_uses_fallback() {
        let mut svc = service("NodePort");
        svc.spec.as_mut().unwrap().type_ = None;
        assert_eq!(
            exposed_type_of(&svc, ServiceExposedType::NodePort).unwrap(),
            ServiceExposedType::NodePort
        );
        assert_eq!(
            resolve_endpoint(&svc, &identity(), Some("api")).unwrap(),
            Some(Endpoint::new("m1-rest.ns", 8081))
        );
    }

    #[test]
    fn test_missing_rest_port_is_an_error() {
        let mut svc = service("ClusterIP");
        svc.spec.as_mut().unwrap().ports = Some(vec![]);
        assert!(matches!(
            resolve_endpoint(&svc, &identity(), None),
            Err(KubeError::InvalidSpec(_))
        ));
    }
}
