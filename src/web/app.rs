use super::{MAX_REQUEST_BODY_BYTES, SharedDispatcher, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::path::Path;
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::Level;

pub fn create_app(dispatcher: SharedDispatcher, public_dir: &Path) -> Router {
    Router::new()
        .route("/replicate", post(handlers::replicate))
        .route("/models", get(handlers::list_models))
        // Form, scripts and generated images
        .fallback_service(ServeDir::new(public_dir))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::INFO)))
        .with_state(dispatcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::tests::{SpyGenerator, test_dispatcher};
    use crate::upstream::UpstreamOutput;
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Fixture {
        public: tempfile::TempDir,
        spy: Arc<SpyGenerator>,
        app: Router,
    }

    impl Fixture {
        fn new(spy: SpyGenerator) -> Self {
            let public = tempfile::tempdir().unwrap();
            let output_dir = public.path().join("replicate");
            std::fs::create_dir(&output_dir).unwrap();
            let spy = Arc::new(spy);
            let dispatcher = Arc::new(test_dispatcher(&output_dir, spy.clone()));
            let app = create_app(dispatcher, public.path());
            Self { public, spy, app }
        }

        fn output_files(&self) -> usize {
            std::fs::read_dir(self.public.path().join("replicate"))
                .unwrap()
                .count()
        }
    }

    fn post_json(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/replicate")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn generation_body(password: &str, model: &str) -> Value {
        json!({
            "password": password,
            "shortModelName": model,
            "userName": "Ala",
            "modelPayload": {
                "prompt": "a lighthouse at dusk",
                "output_format": "webp",
                "aspect_ratio": "16:9",
                "num_outputs": 2
            },
            "metaData": { "copyright": "CC0", "comment": "test run" }
        })
    }

    #[tokio::test]
    async fn test_generation_returns_created_with_file_names() {
        let fixture = Fixture::new(SpyGenerator::returning(UpstreamOutput::Multi(vec![
            b"one".to_vec(),
            b"two".to_vec(),
        ])));

        let response = fixture
            .app
            .clone()
            .oneshot(post_json(generation_body("alpha", "flux-dev")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = read_json(response).await;
        let names: Vec<String> = serde_json::from_value(body).unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|name| name.ends_with(".webp")));
        assert_eq!(fixture.spy.call_count(), 1);
        assert_eq!(fixture.output_files(), 2);

        // Generated files are reachable through the static file service.
        let response = fixture
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/replicate/{}", names[1]))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"two");
    }

    #[tokio::test]
    async fn test_wrong_password_is_500_without_side_effects() {
        let fixture = Fixture::new(SpyGenerator::returning(UpstreamOutput::Multi(vec![
            b"one".to_vec(),
        ])));

        let response = fixture
            .app
            .clone()
            .oneshot(post_json(generation_body("wrong", "flux-dev")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        let detail = body["detail"].as_str().unwrap();
        assert!(detail.to_lowercase().contains("password"), "{detail}");
        assert_eq!(fixture.spy.call_count(), 0);
        assert_eq!(fixture.output_files(), 0);
    }

    #[tokio::test]
    async fn test_unknown_model_is_500() {
        let fixture = Fixture::new(SpyGenerator::returning(UpstreamOutput::Multi(vec![])));

        let response = fixture
            .app
            .clone()
            .oneshot(post_json(generation_body("beta", "dall-e")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        assert_eq!(body["detail"], json!("Unknown model: dall-e"));
        assert_eq!(fixture.spy.call_count(), 0);
    }

    #[tokio::test]
    async fn test_upstream_error_is_500_with_message() {
        let fixture = Fixture::new(SpyGenerator::failing("model is warming up"));

        let response = fixture
            .app
            .clone()
            .oneshot(post_json(generation_body("alpha", "z-image-turbo")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        assert!(body["detail"].as_str().unwrap().contains("model is warming up"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_500_with_detail() {
        let fixture = Fixture::new(SpyGenerator::returning(UpstreamOutput::Multi(vec![])));

        let request = Request::builder()
            .method("POST")
            .uri("/replicate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = fixture.app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        assert!(body["detail"].as_str().unwrap().starts_with("Invalid request"));
        assert_eq!(fixture.spy.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_password_field_is_rejected_as_wrong_password() {
        let fixture = Fixture::new(SpyGenerator::returning(UpstreamOutput::Multi(vec![])));

        let response = fixture
            .app
            .clone()
            .oneshot(post_json(json!({ "shortModelName": "flux-dev" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(read_json(response).await["detail"], json!("Wrong password"));
    }

    #[tokio::test]
    async fn test_models_listing() {
        let fixture = Fixture::new(SpyGenerator::returning(UpstreamOutput::Multi(vec![])));

        let response = fixture
            .app
            .clone()
            .oneshot(Request::builder().uri("/models").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        let models = body.as_array().unwrap();
        assert_eq!(models.len(), 11);
        assert!(models.contains(&json!({
            "name": "flux-dev",
            "provider": "black-forest-labs/flux-dev",
            "shape": "multi"
        })));
        assert!(models.contains(&json!({
            "name": "hidream-l1-fast",
            "provider": "prunaai/hidream-l1-fast",
            "shape": "single"
        })));
    }
}
