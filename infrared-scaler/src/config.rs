//! Startup configuration.
//!
//! Every flag can also be supplied through the environment, which is how the
//! scaler is configured when running in-cluster.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "infrared-scaler", about = "Keeps Infrared routes in sync with the cluster and scales idle servers to zero")]
pub struct Opt {
    /// Namespace whose Services and StatefulSets are watched
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "default")]
    pub watch_namespace: String,

    /// Prefix of the `<prefix>/domainName` Service annotation
    #[arg(long, env = "ANNOTATION_PREFIX", default_value = "infrared-scaler.sixfal.ls")]
    pub annotation_prefix: String,

    /// Base URL of the Infrared config API
    #[arg(long, env = "INFRARED_URL", default_value = "http://infrared:8080/v1")]
    pub infrared_url: String,

    /// Directory, as seen by Infrared, that generated configs are stored under
    #[arg(long, env = "CONFIG_PATH", default_value = "/config/proxies/")]
    pub config_path: String,

    /// Address the callback listener binds to
    #[arg(long = "listen", env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: SocketAddr,

    /// Gateway tags attached to every generated server
    #[arg(long, env = "GATEWAYS", value_delimiter = ',', default_value = "default")]
    pub gateways: Vec<String>,

    #[arg(long, env = "IDLE_TIMEOUT_SECS", default_value_t = 300)]
    pub idle_timeout_secs: u64,

    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value_t = 30)]
    pub sweep_interval_secs: u64,

    #[arg(long, env = "RECONNECT_DELAY_SECS", default_value_t = 10)]
    pub reconnect_delay_secs: u64,

    #[arg(long, env = "UNREACHABLE_STATUS", default_value = "Unavailable")]
    pub unreachable_status: String,

    #[arg(
        long,
        env = "UNREACHABLE_MESSAGE",
        default_value = "Sorry {{username}}, {{requestedAddress}} can't be reached right now."
    )]
    pub unreachable_message: String,

    #[arg(long, env = "WAKING_STATUS", default_value = "Starting...")]
    pub waking_status: String,

    #[arg(
        long,
        env = "WAKING_MESSAGE",
        default_value = "{{requestedAddress}} is starting up. Try again in a minute, {{username}}."
    )]
    pub waking_message: String,

    #[arg(long, env = "SLEEPING_STATUS", default_value = "Sleeping")]
    pub sleeping_status: String,

    #[arg(
        long,
        env = "SLEEPING_MESSAGE",
        default_value = "{{requestedAddress}} is asleep. Join again to wake it up, {{username}}."
    )]
    pub sleeping_message: String,
}

/// Status line and kick message shown while a backend is not dialable.
///
/// `{{username}}` and `{{requestedAddress}}` are left for Infrared to fill in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Templates {
    pub unreachable: Template,
    pub waking: Template,
    pub sleeping: Template,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub watch_namespace: String,
    pub domain_annotation: String,
    pub infrared_url: String,
    pub config_path: String,
    pub listen_addr: SocketAddr,
    pub gateways: Vec<String>,
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
    pub reconnect_delay: Duration,
    pub templates: Templates,
}

impl From<Opt> for Settings {
    fn from(opt: Opt) -> Self {
        let gateways = opt
            .gateways
            .into_iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect();

        Self {
            watch_namespace: opt.watch_namespace,
            domain_annotation: format!("{}/domainName", opt.annotation_prefix.trim_end_matches('/')),
            infrared_url: opt.infrared_url,
            config_path: opt.config_path,
            listen_addr: opt.listen_addr,
            gateways,
            idle_timeout: Duration::from_secs(opt.idle_timeout_secs),
            sweep_interval: Duration::from_secs(opt.sweep_interval_secs.max(1)),
            reconnect_delay: Duration::from_secs(opt.reconnect_delay_secs),
            templates: Templates {
                unreachable: Template {
                    status: opt.unreachable_status,
                    message: opt.unreachable_message,
                },
                waking: Template {
                    status: opt.waking_status,
                    message: opt.waking_message,
                },
                sleeping: Template {
                    status: opt.sleeping_status,
                    message: opt.sleeping_message,
                },
            },
        }
    }
}
