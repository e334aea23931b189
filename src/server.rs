use std::net::SocketAddr;

use axum::{
    http::StatusCode, response::IntoResponse, routing::get, Extension, Json, Router,
};
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, info_span, warn, Instrument};

use crate::{
    config::Config,
    error::Error,
    hub::{self, BroadcastHub},
    registry::SubscriberRegistry,
    serial::{
        reader::{LinkState, SerialReader},
        Connector,
    },
    websocket,
};

/// The default port to run the server on.
pub const DEFAULT_PORT: u16 = 8000;

/// Build the routes.
///
/// Samples reach subscribers through the given registry, and `/status` reports the given link state.
pub(crate) fn router(
    config: &Config,
    registry: SubscriberRegistry,
    link_state: watch::Receiver<LinkState>,
) -> Result<Router, Error> {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([config.allowed_origin_header()?]))
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/ws", get(websocket::ws_handler))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/config", get(show_config))
        .route("/version", get(show_version))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                // Each websocket needs to be able to register with the registry
                .layer(Extension(registry))
                .layer(Extension(link_state))
                // The config should be known to the web server
                .layer(Extension(config.clone())),
        ))
}

async fn run<C: Connector>(
    config: Config,
    connector: C,
    port: Option<u16>,
    allocated_port: Option<oneshot::Sender<u16>>,
) -> Result<(), Error> {
    config.validate()?;

    let registry = SubscriberRegistry::new();
    let hub = BroadcastHub::new(registry.clone());
    let (samples_tx, samples_rx) = hub::handoff();

    let (reader, link_state) = SerialReader::new(connector, config.reconnect_delay());

    // Detached, the reader lives as long as the process does.
    reader.spawn(samples_tx)?;

    tokio::spawn(hub.run(samples_rx).instrument(info_span!("Hub")));

    let app = router(&config, registry, link_state)?;

    let addr = SocketAddr::new(config.bind_address, port.unwrap_or(0));
    let server = axum::Server::try_bind(&addr)
        .map_err(|e| Error::Bind {
            addr,
            problem: e.to_string(),
        })?
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());
    let addr = server.local_addr();

    if let Some(port_reply) = allocated_port {
        if port_reply.send(addr.port()).is_err() {
            warn!("Nobody wanted to know which port was allocated");
        }
    }

    info!("listening on {}", addr);

    server.await.map_err(|e| Error::Server(e.to_string()))
}

/// Start the server on an arbitrary available port.
/// The port allocated will be sent on the provided channel.
pub async fn run_any_port<C: Connector>(
    config: Config,
    connector: C,
    allocated_port: oneshot::Sender<u16>,
) -> Result<(), Error> {
    run(config, connector, None, Some(allocated_port)).await
}

/// Start the server on the port from the configuration.
pub async fn run_on_port<C: Connector>(config: Config, connector: C) -> Result<(), Error> {
    let port = config.port;
    run(config, connector, Some(port), None).await
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(Health { status: "ok" })
}

#[derive(Debug, Serialize)]
struct Status {
    link: LinkState,
    subscribers: usize,
}

async fn status(
    Extension(registry): Extension<SubscriberRegistry>,
    Extension(link_state): Extension<watch::Receiver<LinkState>>,
) -> impl IntoResponse {
    let link = *link_state.borrow();

    Json(Status {
        link,
        subscribers: registry.len(),
    })
}

async fn show_config(Extension(config): Extension<Config>) -> impl IntoResponse {
    match config.serialize_pretty() {
        Ok(ron) => (StatusCode::OK, ron),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn show_version() -> impl IntoResponse {
    format!("Touch Relay v{}\n", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, HttpBody},
        http::Request,
    };
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use super::*;

    fn test_router() -> Router {
        let (_state_tx, state_rx) = watch::channel(LinkState::Connecting);

        router(&Config::default(), SubscriberRegistry::new(), state_rx).unwrap()
    }

    async fn get_body(uri: &str) -> (StatusCode, String) {
        let response = test_router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();

        let mut body = response.into_body();
        let mut bytes = vec![];
        while let Some(chunk) = body.data().await {
            bytes.extend_from_slice(&chunk.unwrap());
        }

        (status, String::from_utf8(bytes).unwrap())
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = get_body("/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn status_reports_link_and_subscribers() {
        let (status, body) = get_body("/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"link":"connecting","subscribers":0}"#);
    }

    #[tokio::test]
    async fn version_is_shown() {
        let (status, body) = get_body("/version").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test]
    async fn config_is_shown() {
        let (_, body) = get_body("/config").await;

        assert_eq!(Config::deserialize(&body).unwrap(), Config::default());
    }

    #[tokio::test]
    async fn allowed_origin_gets_cors_headers() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "http://localhost:4321")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:4321"
        );
    }

    #[tokio::test]
    async fn other_origins_get_no_cors_headers() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "http://evil.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response
            .headers()
            .get("access-control-allow-origin")
            .is_none());
    }
}
