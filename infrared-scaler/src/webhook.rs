//! HTTP listener for Infrared's event callbacks.
//!
//! `POST /callback` always answers `200 ok`, whatever happens to the event.
//! Failing the hook would only make the proxy retry it.

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use infrared_scaler_common::CallbackMessage;
use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::event_loop::ControlEvent;
use crate::occupancy::autoscaler::HookEvent;

#[derive(Clone)]
pub struct HookState {
    events: mpsc::Sender<ControlEvent>,
}

pub fn router(events: mpsc::Sender<ControlEvent>) -> Router {
    Router::new()
        .route("/callback", post(callback))
        .route("/healthz", get(healthz))
        .with_state(HookState { events })
}

pub async fn serve(listener: TcpListener, events: mpsc::Sender<ControlEvent>) -> anyhow::Result<()> {
    info!(target: "webhook", "Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(events)).await?;
    Ok(())
}

async fn callback(State(state): State<HookState>, body: Bytes) -> &'static str {
    let message: CallbackMessage = match serde_json::from_slice(&body) {
        Ok(m) => m,
        Err(e) => {
            warn!(target: "webhook", "Ignoring unparseable callback: {}", e);
            return "ok";
        }
    };

    let topics = message.topics.join(",");
    match HookEvent::from_message(message) {
        Ok(Some(event)) => {
            if state.events.send(ControlEvent::Hook(event)).await.is_err() {
                error!(target: "webhook", "Event loop is gone, dropping {} callback", topics);
            }
        }
        Ok(None) => debug!(target: "webhook", "Ignoring callback with topics [{}]", topics),
        Err(e) => warn!(target: "webhook", "Malformed {} callback: {}", topics, e),
    }
    "ok"
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn post_callback(app: Router, body: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/callback")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn login_callback_is_queued() {
        let (tx, mut rx) = mpsc::channel(8);
        let body = r#"{
            "topics": ["PrePlayerJoin"],
            "data": {
                "isLoginRequest": true,
                "server": { "serverId": "game-a-ns1", "serverAddress": "a.example.com" }
            }
        }"#;

        let (status, text) = post_callback(router(tx), body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "ok");
        match rx.try_recv() {
            Ok(ControlEvent::Hook(HookEvent::PreJoin { server_id, login })) => {
                assert_eq!(server_id, "game-a-ns1");
                assert!(login);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn garbage_still_answers_ok() {
        let (tx, mut rx) = mpsc::channel(8);

        let (status, text) = post_callback(router(tx), "{not json").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "ok");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_topic_is_ignored() {
        let (tx, mut rx) = mpsc::channel(8);
        let body = r#"{ "topics": ["ServerRegistered"], "data": {} }"#;

        let (status, _) = post_callback(router(tx), body).await;

        assert_eq!(status, StatusCode::OK);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_event_loop_still_answers_ok() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let body = r#"{
            "topics": ["PlayerJoin"],
            "data": { "server": { "serverId": "game-a-ns1" }, "client": { "username": "alex" } }
        }"#;

        let (status, text) = post_callback(router(tx), body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn healthz_answers_ok() {
        let (tx, _rx) = mpsc::channel(8);
        let response = router(tx)
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
