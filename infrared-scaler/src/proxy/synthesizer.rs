//! Derives the routing document for one Service.

use infrared_scaler_common::{DialTimeoutStatus, RoutingConfig};

use crate::config::{Template, Templates};
use crate::kubernetes::models::{EndpointResource, WorkloadResource};

/// What the proxy shows when it can't dial the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// No StatefulSet backs the Service.
    Unreachable,
    /// More replicas requested than are ready.
    Waking,
    /// Scaled to zero.
    Sleeping,
}

impl Presentation {
    pub fn for_workload(workload: Option<&WorkloadResource>) -> Option<Self> {
        let workload = match workload {
            Some(w) => w,
            None => return Some(Presentation::Unreachable),
        };

        if workload.desired_replicas > workload.ready_replicas {
            Some(Presentation::Waking)
        } else if workload.desired_replicas == 0 && workload.ready_replicas == 0 {
            Some(Presentation::Sleeping)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct Synthesizer {
    gateways: Vec<String>,
    templates: Templates,
}

impl Synthesizer {
    pub fn new(gateways: Vec<String>, templates: Templates) -> Self {
        Self { gateways, templates }
    }

    /// Builds the document for `endpoint`, or `None` when it carries no domain.
    ///
    /// The output depends only on the arguments, so re-publishing after a
    /// replayed or reordered event is harmless.
    pub fn synthesize(
        &self,
        endpoint: &EndpointResource,
        workload: Option<&WorkloadResource>,
    ) -> Option<RoutingConfig> {
        let domain = endpoint.domain.clone()?;
        let template = Presentation::for_workload(workload).map(|p| self.template(p));

        Some(RoutingConfig {
            domains: vec![domain],
            address: endpoint.address(),
            gateways: self.gateways.clone(),
            dial_timeout_message: template.map(|t| t.message.clone()),
            dial_timeout_status: template.map(|t| DialTimeoutStatus {
                version_name: t.status.clone(),
                motd: t.message.clone(),
            }),
        })
    }

    fn template(&self, presentation: Presentation) -> &Template {
        match presentation {
            Presentation::Unreachable => &self.templates.unreachable,
            Presentation::Waking => &self.templates.waking,
            Presentation::Sleeping => &self.templates.sleeping,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_synthesizer() -> Synthesizer {
    let template = |status: &str| Template {
        status: status.to_string(),
        message: format!("{} {{{{username}}}}", status),
    };
    Synthesizer::new(
        vec!["default".to_string()],
        Templates {
            unreachable: template("unreachable"),
            waking: template("waking"),
            sleeping: template("sleeping"),
        },
    )
}
