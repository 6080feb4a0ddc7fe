use anyhow::Context;
use clap::Parser;
use infrared_scaler::config::{Opt, Settings};
use infrared_scaler::event_loop::{self, ControlEvent, Controller, EVENT_BUFFER};
use infrared_scaler::kubernetes::reconciler::Reconciler;
use infrared_scaler::kubernetes::scaler::KubeScaler;
use infrared_scaler::kubernetes::watcher;
use infrared_scaler::occupancy::autoscaler::Autoscaler;
use infrared_scaler::proxy::publisher::HttpConfigStore;
use infrared_scaler::proxy::synthesizer::Synthesizer;
use infrared_scaler::webhook;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client};
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::{signal, task};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let opt = Opt::parse();

    env_logger::init();

    let settings = Settings::from(opt);

    let client = Client::try_default()
        .await
        .context("Failed to build cluster client")?;
    let version = client
        .apiserver_version()
        .await
        .context("Failed to reach the cluster API")?;
    info!(
        "Connected to Kubernetes {}.{}, watching namespace {}",
        version.major, version.minor, settings.watch_namespace
    );

    let store = HttpConfigStore::new(&settings.infrared_url)?;
    let reconciler = Reconciler::new(
        Arc::new(store),
        Synthesizer::new(settings.gateways.clone(), settings.templates.clone()),
        settings.config_path.clone(),
        settings.domain_annotation.clone(),
    );
    let autoscaler = Autoscaler::new(Arc::new(KubeScaler::new(client.clone())));
    let controller = Controller::new(reconciler, autoscaler, settings.idle_timeout);

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);

    let services: Api<Service> = Api::namespaced(client.clone(), &settings.watch_namespace);
    let statefulsets: Api<StatefulSet> = Api::namespaced(client, &settings.watch_namespace);
    task::spawn(watcher::supervise(
        "Service",
        services,
        settings.reconnect_delay,
        tx.clone(),
        ControlEvent::Services,
    ));
    task::spawn(watcher::supervise(
        "StatefulSet",
        statefulsets,
        settings.reconnect_delay,
        tx.clone(),
        ControlEvent::StatefulSets,
    ));
    task::spawn(event_loop::tick_sweeps(settings.sweep_interval, tx.clone()));

    let listener = TcpListener::bind(settings.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.listen_addr))?;
    let server = task::spawn(webhook::serve(listener, tx));
    let event_loop = task::spawn(controller.run(rx));

    info!("Waiting for Ctrl-C...");
    tokio::select! {
        res = signal::ctrl_c() => res?,
        res = server => {
            res??;
            anyhow::bail!("Callback listener stopped");
        }
        _ = event_loop => anyhow::bail!("Event loop stopped"),
    }
    info!("Exiting...");

    Ok(())
}
