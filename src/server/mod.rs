mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::{DynAPI, API};
use crate::error::Error;
use crate::server::handlers::{health, negotiations, rides};

pub fn router(api: DynAPI) -> Router {
    Router::new()
        .route("/api/health", get(health::check))
        .route("/api/rides", post(rides::create).get(rides::list))
        .route("/api/rides/{ride_id}", get(rides::find))
        .route(
            "/api/rides/{ride_id}/accept/{negotiation_id}",
            post(rides::accept),
        )
        .route("/api/negotiations", post(negotiations::create))
        .route("/api/negotiations/counter", post(negotiations::counter))
        .route("/api/negotiations/{ride_id}", get(negotiations::list))
        .layer(Extension(api))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serves until Ctrl-C, then lets in-flight requests finish.
pub async fn serve<T: API + Sync + Send + 'static>(api: T, addr: SocketAddr) -> Result<(), Error> {
    let app = router(Arc::new(api) as DynAPI);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(Error::server_error)?;

    tracing::info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(Error::server_error)?;

    tracing::info!("server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }

    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::db::MemoryStore;
    use crate::engine::Engine;

    fn app() -> axum::Router {
        super::router(Arc::new(Engine::new(Arc::new(MemoryStore::new()))))
    }

    async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        (status, value)
    }

    async fn create_ride(app: &axum::Router) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/rides",
            Some(json!({
                "rider_name": "John Doe",
                "rider_phone": "555-1234",
                "origin": "Downtown Mall",
                "destination": "Airport",
                "initial_price": 25.0
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Ride request created");
        assert_eq!(body["ride"]["status"], "open");
        assert_eq!(body["ride"]["current_price"], 25.0);
        assert_eq!(body["ride"]["id"], body["ride_id"]);

        body["ride_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "healthy" }));
    }

    #[tokio::test]
    async fn negotiation_flow() {
        let app = app();
        let ride_id = create_ride(&app).await;

        let (status, body) = send(&app, "GET", "/api/rides", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rides"].as_array().unwrap().len(), 1);

        let (status, body) = send(
            &app,
            "POST",
            "/api/negotiations",
            Some(json!({
                "ride_id": ride_id,
                "driver_name": "Alice Smith",
                "driver_phone": "555-5678",
                "offer_amount": 30.0
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Negotiation started");
        let offer_id = body["negotiation_id"].as_str().unwrap().to_string();

        let (status, body) = send(&app, "GET", &format!("/api/rides/{}", ride_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ride"]["status"], "negotiating");
        assert_eq!(body["ride"]["current_price"], 30.0);

        let (status, body) = send(
            &app,
            "POST",
            "/api/negotiations/counter",
            Some(json!({
                "negotiation_id": offer_id,
                "from_user_name": "John Doe",
                "from_user_phone": "555-1234",
                "offer_amount": 27.0
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Counter offer made");
        let counter_id = body["negotiation_id"].as_str().unwrap().to_string();

        let (status, body) =
            send(&app, "GET", &format!("/api/negotiations/{}", ride_id), None).await;
        assert_eq!(status, StatusCode::OK);
        let negotiations = body["negotiations"].as_array().unwrap();
        assert_eq!(negotiations.len(), 2);
        assert_eq!(negotiations[0]["message"], "I can do this ride for $30.0");
        assert_eq!(negotiations[1]["parent_negotiation_id"], offer_id.as_str());
        assert_eq!(negotiations[1]["from_user_id"], negotiations[0]["to_user_id"]);
        assert_eq!(negotiations[1]["to_user_id"], negotiations[0]["from_user_id"]);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/rides/{}/accept/{}", ride_id, counter_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "message": "Ride agreement confirmed!", "final_price": 27.0 })
        );

        let (_, body) = send(&app, "GET", &format!("/api/rides/{}", ride_id), None).await;
        assert_eq!(body["ride"]["status"], "agreed");
        assert_eq!(body["ride"]["agreed_driver_name"], "John Doe");

        let (_, body) = send(&app, "GET", "/api/rides", None).await;
        assert!(body["rides"].as_array().unwrap().is_empty());

        let (status, body) = send(
            &app,
            "POST",
            "/api/negotiations",
            Some(json!({
                "ride_id": ride_id,
                "driver_name": "Bob",
                "driver_phone": "555-0000",
                "offer_amount": 20.0
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 100);
    }

    #[tokio::test]
    async fn unknown_ids() {
        let app = app();
        let missing = uuid::Uuid::new_v4();

        let (status, body) = send(&app, "GET", &format!("/api/rides/{}", missing), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Ride not found");

        let (status, _) = send(&app, "GET", "/api/rides/nonexistent-id", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            "POST",
            "/api/negotiations",
            Some(json!({
                "ride_id": "nonexistent-id",
                "driver_name": "Alice",
                "driver_phone": "555",
                "offer_amount": 30.0
            })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            "POST",
            "/api/negotiations/counter",
            Some(json!({
                "negotiation_id": missing,
                "from_user_name": "John",
                "from_user_phone": "555",
                "offer_amount": 30.0
            })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Original negotiation not found");

        let ride_id = create_ride(&app).await;
        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/rides/{}/accept/{}", ride_id, missing),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, "GET", "/api/negotiations/nonexistent-id", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "negotiations": [] }));
    }

    #[tokio::test]
    async fn invalid_input() {
        let app = app();

        let (status, body) = send(
            &app,
            "POST",
            "/api/rides",
            Some(json!({
                "rider_name": "John Doe",
                "rider_phone": "555-1234",
                "origin": "Downtown Mall",
                "destination": "Airport",
                "initial_price": 0.0
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 101);

        let (status, body) = send(
            &app,
            "POST",
            "/api/rides",
            Some(json!({ "rider_name": "John Doe" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 101);
        assert!(body["error"].as_str().unwrap().contains("missing field"));

        let (status, body) = send(
            &app,
            "POST",
            "/api/negotiations/counter",
            Some(json!({ "negotiation_id": "x", "offer_amount": "thirty" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 101);
    }

    #[tokio::test]
    async fn blank_message_gets_default() {
        let app = app();
        let ride_id = create_ride(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/negotiations",
            Some(json!({
                "ride_id": ride_id,
                "driver_name": "Alice Smith",
                "driver_phone": "555-5678",
                "offer_amount": 30.0,
                "message": ""
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let offer_id = body["negotiation_id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            "POST",
            "/api/negotiations/counter",
            Some(json!({
                "negotiation_id": offer_id,
                "from_user_name": "John Doe",
                "from_user_phone": "555-1234",
                "offer_amount": 27.5,
                "message": ""
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, "GET", &format!("/api/negotiations/{}", ride_id), None).await;
        assert_eq!(body["negotiations"][0]["message"], "I can do this ride for $30.0");
        assert_eq!(body["negotiations"][1]["message"], "How about $27.5?");
    }
}
