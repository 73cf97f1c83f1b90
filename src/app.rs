use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, export, pipeline, profile, scans};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .merge(auth::router())
                .merge(pipeline::router())
                .merge(scans::router())
                .merge(export::router())
                .merge(profile::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, ms, "response");
                        } else if status.is_client_error() {
                            tracing::warn!(%status, ms, "response");
                        } else {
                            tracing::info!(%status, ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::services::JwtKeys;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", t));
        }
        req.body(Body::empty()).unwrap()
    }

    fn json_request(method: Method, uri: &str, token: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart_upload(token: &str, field: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
        let boundary = "mealscan-boundary";
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"; filename=\"meal.jpg\"\r\nContent-Type: {ct}\r\n\r\n",
            b = boundary,
            f = field,
            ct = content_type
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/pipeline/upload")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn token_for(state: &AppState) -> String {
        JwtKeys::from(&state.config.jwt)
            .sign_access(Uuid::new_v4())
            .unwrap()
    }

    async fn status(app: &Router, req: Request<Body>) -> StatusCode {
        app.clone().oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::fake());
        let s = status(&app, request(Method::GET, "/api/v1/health", None)).await;
        assert_eq!(s, StatusCode::OK);
    }

    #[tokio::test]
    async fn scan_routes_require_a_token() {
        let app = build_app(AppState::fake());
        for (m, uri) in [
            (Method::GET, "/api/v1/scans"),
            (Method::GET, "/api/v1/pipeline"),
            (Method::POST, "/api/v1/pipeline/save"),
            (Method::GET, "/api/v1/scans/export"),
        ] {
            assert_eq!(status(&app, request(m, uri, None)).await, StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn authenticated_routes_over_empty_history() {
        let state = AppState::fake();
        let token = token_for(&state);
        let app = build_app(state);

        let cases = [
            (Method::GET, "/api/v1/scans?sort=asc&page=4".to_string(), StatusCode::OK),
            (Method::GET, "/api/v1/scans/stats".to_string(), StatusCode::OK),
            (Method::GET, "/api/v1/pipeline".to_string(), StatusCode::OK),
            (Method::GET, "/api/v1/scans/export".to_string(), StatusCode::NO_CONTENT),
            (Method::POST, "/api/v1/pipeline/save".to_string(), StatusCode::CONFLICT),
            (
                Method::DELETE,
                format!("/api/v1/scans/{}", Uuid::new_v4()),
                StatusCode::NOT_FOUND,
            ),
            (
                Method::GET,
                format!("/api/v1/share-cards/{}", Uuid::new_v4()),
                StatusCode::NOT_FOUND,
            ),
        ];
        for (m, uri, expected) in cases {
            assert_eq!(status(&app, request(m, &uri, Some(&token))).await, expected, "{}", uri);
        }
    }

    #[tokio::test]
    async fn upload_review_and_save_over_http() {
        let state = AppState::fake();
        let token = token_for(&state);
        let app = build_app(state);

        let (s, snap) = send(&app, multipart_upload(&token, "file", "image/jpeg", &[0xFF, 0xD8, 0xFF])).await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(snap["stage"], "reviewing");
        assert!(snap["draft"]["image_url"]
            .as_str()
            .unwrap()
            .starts_with("https://fake.local/food-images/"));
        assert_eq!(snap["draft"]["menu_items"].as_array().unwrap().len(), 2);

        let (s, edit) = send(
            &app,
            json_request(
                Method::PATCH,
                "/api/v1/pipeline/draft/menu-items/0",
                &token,
                json!({"field": "nama_menu", "value": "Nasi Uduk"}),
            ),
        )
        .await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(edit["applied"], true);
        assert_eq!(edit["draft"]["menu_items"][0]["nama_menu"], "Nasi Uduk");

        let (s, edit) = send(
            &app,
            json_request(
                Method::PATCH,
                "/api/v1/pipeline/draft/nutrition-items/1",
                &token,
                json!({"field": "calories_kcal", "value": 100}),
            ),
        )
        .await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(
            edit["draft"]["nutrition_facts"]["nutrition_summary"]["calories_kcal"].as_f64(),
            Some(295.0)
        );

        let (s, edit) = send(
            &app,
            json_request(
                Method::PATCH,
                "/api/v1/pipeline/draft/nutrition-items/9",
                &token,
                json!({"field": "protein_g", "value": 1}),
            ),
        )
        .await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(edit["applied"], false);

        let (s, _) = send(
            &app,
            json_request(
                Method::PATCH,
                "/api/v1/pipeline/draft/nutrition-items/0",
                &token,
                json!({"field": "fat_g", "value": -1}),
            ),
        )
        .await;
        assert_eq!(s, StatusCode::BAD_REQUEST);

        let (s, scan) = send(&app, request(Method::POST, "/api/v1/pipeline/save", Some(&token))).await;
        assert_eq!(s, StatusCode::CREATED);
        assert_eq!(scan["menu_items"][0]["nama_menu"], "Nasi Uduk");

        let (s, page) = send(&app, request(Method::GET, "/api/v1/scans", Some(&token))).await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(page["total"], 1);
        assert_eq!(page["scans"][0]["id"], scan["id"]);
        assert_eq!(
            page["scans"][0]["nutrition_facts"]["nutrition_summary"]["calories_kcal"].as_f64(),
            Some(295.0)
        );
    }

    #[tokio::test]
    async fn upload_requires_an_image_file_field() {
        let state = AppState::fake();
        let token = token_for(&state);
        let app = build_app(state);

        let (s, _) = send(&app, multipart_upload(&token, "photo", "image/jpeg", &[1, 2, 3])).await;
        assert_eq!(s, StatusCode::BAD_REQUEST);
        let (s, _) = send(&app, multipart_upload(&token, "file", "application/pdf", &[1, 2, 3])).await;
        assert_eq!(s, StatusCode::BAD_REQUEST);

        let (_, snap) = send(&app, request(Method::GET, "/api/v1/pipeline", Some(&token))).await;
        assert_eq!(snap["stage"], "idle");
    }

    #[tokio::test]
    async fn camera_capture_runs_the_pipeline() {
        let state = AppState::fake();
        let token = token_for(&state);
        let app = build_app(state);

        let (s, _) = send(
            &app,
            json_request(
                Method::POST,
                "/api/v1/pipeline/capture",
                &token,
                json!({"width": 4, "height": 4, "rgba_base64": STANDARD.encode([0u8; 16])}),
            ),
        )
        .await;
        assert_eq!(s, StatusCode::BAD_REQUEST);
        let (s, _) = send(
            &app,
            json_request(
                Method::POST,
                "/api/v1/pipeline/capture",
                &token,
                json!({"width": 2, "height": 2, "rgba_base64": "not base64!"}),
            ),
        )
        .await;
        assert_eq!(s, StatusCode::BAD_REQUEST);

        let (s, snap) = send(
            &app,
            json_request(
                Method::POST,
                "/api/v1/pipeline/capture",
                &token,
                json!({"width": 2, "height": 2, "rgba_base64": STANDARD.encode([200u8; 16])}),
            ),
        )
        .await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(snap["stage"], "reviewing");
        assert!(snap["draft"]["image_url"].as_str().unwrap().ends_with(".jpg"));
    }

    #[tokio::test]
    async fn foreign_image_urls_are_rejected() {
        let state = AppState::fake();
        let token = token_for(&state);
        let app = build_app(state);

        let (s, _) = send(
            &app,
            json_request(
                Method::POST,
                "/api/v1/analyze",
                &token,
                json!({"image_url": "http://169.254.169.254/latest/meta-data"}),
            ),
        )
        .await;
        assert_eq!(s, StatusCode::BAD_REQUEST);
        let (_, snap) = send(&app, request(Method::GET, "/api/v1/pipeline", Some(&token))).await;
        assert_eq!(snap["stage"], "idle");

        let (s, _) = send(
            &app,
            json_request(
                Method::POST,
                "/api/v1/scans",
                &token,
                json!({
                    "image_url": "http://internal.local/secret.jpg",
                    "menu_items": [],
                    "nutrition_facts": {
                        "nutrition_summary": {"calories_kcal": 0, "protein_g": 0, "fat_g": 0, "carbs_g": 0, "sodium_mg": 0, "fiber_g": 0},
                        "items": []
                    }
                }),
            ),
        )
        .await;
        assert_eq!(s, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn other_users_cannot_see_or_delete_a_scan() {
        let state = AppState::fake();
        let owner = token_for(&state);
        let intruder = token_for(&state);
        let app = build_app(state);

        send(&app, multipart_upload(&owner, "file", "image/png", &[1, 2, 3])).await;
        let (s, scan) = send(&app, request(Method::POST, "/api/v1/pipeline/save", Some(&owner))).await;
        assert_eq!(s, StatusCode::CREATED);
        let uri = format!("/api/v1/scans/{}", scan["id"].as_str().unwrap());

        assert_eq!(
            status(&app, request(Method::DELETE, &uri, Some(&intruder))).await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(&app, request(Method::POST, &format!("{}/share", uri), Some(&intruder))).await,
            StatusCode::NOT_FOUND
        );
        let (_, page) = send(&app, request(Method::GET, "/api/v1/scans", Some(&intruder))).await;
        assert_eq!(page["total"], 0);

        let (_, page) = send(&app, request(Method::GET, "/api/v1/scans", Some(&owner))).await;
        assert_eq!(page["total"], 1);
        assert_eq!(
            status(&app, request(Method::DELETE, &uri, Some(&owner))).await,
            StatusCode::NO_CONTENT
        );
        let (_, page) = send(&app, request(Method::GET, "/api/v1/scans", Some(&owner))).await;
        assert_eq!(page["total"], 0);
    }
}
