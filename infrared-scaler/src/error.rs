use thiserror::Error;

/// A watched object that can't be turned into something routable or scalable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("{kind} is missing metadata.{field}")]
    MissingMetadata { kind: &'static str, field: &'static str },

    #[error("{kind} {name} has no spec")]
    MissingSpec { kind: &'static str, name: String },

    #[error("Service {0} has no TCP port")]
    NoTcpPort(String),

    #[error("StatefulSet {0} has no serviceName")]
    MissingServiceName(String),
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("invalid config store url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("config store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("config store answered {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Error, Debug)]
pub enum ScaleError {
    #[error("cluster rejected scale of {workload} ({code} {reason}): {message}")]
    Rejected {
        workload: String,
        code: u16,
        reason: String,
        message: String,
    },

    #[error("scale of {workload} failed: {source}")]
    Client {
        workload: String,
        #[source]
        source: kube::Error,
    },
}
