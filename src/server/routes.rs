//! HTTP routes. Prediction runs on actix's blocking pool since decoding,
//! resizing and the forward pass are all CPU-bound.

use super::protocol::{PredictRequest, PredictResponse, StatusResponse};
use super::WebError;
use crate::inference::Predictor;
use actix_web::{get, post, web, Responder};
use tracing::*;

type Result<T> = std::result::Result<T, WebError>;

#[post("/predict")]
pub async fn predict(
    req: web::Json<PredictRequest>,
    state: web::Data<Predictor>,
) -> Result<impl Responder> {
    debug!("got request {:?}", req);

    let req = req.into_inner();
    let predictor = state.into_inner();
    let prediction = web::block(move || predictor.predict_payload(&req.image)).await??;

    info!("finished serving prediction request");

    Ok(web::Json(PredictResponse { prediction }))
}

/// Liveness check
#[get("/")]
pub async fn status(state: web::Data<Predictor>) -> impl Responder {
    web::Json(StatusResponse {
        message: "digit classifier is running".into(),
        classes: state.num_classes(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::inference::tests::{BrightnessClassifier, FailingClassifier, FixedClassifier};
    use crate::inference::Classifier;
    use crate::preprocess::tests::{black_payload, png_payload};
    use crate::server::protocol::ErrorResponse;
    use crate::server::{configure, cors};
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use std::sync::Arc;

    fn predictor(classifier: impl Classifier + 'static) -> web::Data<Predictor> {
        web::Data::new(Predictor::new(Arc::new(classifier)))
    }

    fn settings() -> Settings {
        Settings::load("does-not-exist.toml").unwrap()
    }

    #[actix_web::test]
    async fn test_predict() {
        let settings = settings();
        let app = test::init_service(
            App::new()
                .app_data(predictor(FixedClassifier(vec![0.1, 0.9, 0.05])))
                .configure(configure(&settings.server)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/predict")
            .set_json(serde_json::json!({ "image": png_payload(100, 80) }))
            .to_request();
        let resp: PredictResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.prediction, 1);
    }

    #[actix_web::test]
    async fn test_predict_data_url_is_deterministic() {
        let settings = settings();
        let app = test::init_service(
            App::new()
                .app_data(predictor(BrightnessClassifier))
                .configure(configure(&settings.server)),
        )
        .await;

        let payload = format!("data:image/png;base64,{}", black_payload());
        let mut predictions = vec![];
        for _ in 0..3 {
            let req = test::TestRequest::post()
                .uri("/predict")
                .set_json(serde_json::json!({ "image": payload }))
                .to_request();
            let resp: PredictResponse = test::call_and_read_body_json(&app, req).await;
            predictions.push(resp.prediction);
        }
        assert!(predictions.iter().all(|p| *p == predictions[0]));
    }

    #[actix_web::test]
    async fn test_predict_errors_name_the_stage() {
        let settings = settings();
        let app = test::init_service(
            App::new()
                .app_data(predictor(BrightnessClassifier))
                .configure(configure(&settings.server)),
        )
        .await;

        let cases = [
            ("ab%d", StatusCode::BAD_REQUEST, "base64"),
            ("aGVsbG8gd29ybGQ", StatusCode::BAD_REQUEST, "image"),
        ];
        for (image, expected_status, stage) in cases {
            let req = test::TestRequest::post()
                .uri("/predict")
                .set_json(serde_json::json!({ "image": image }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), expected_status);
            let body: ErrorResponse = test::read_body_json(resp).await;
            assert_eq!(body.stage, stage);
            assert_eq!(body.errors.len(), 1);
        }

        // missing field
        let req = test::TestRequest::post()
            .uri("/predict")
            .set_json(serde_json::json!({ "picture": "QUJD" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_inference_failure_is_server_error() {
        let settings = settings();
        let app = test::init_service(
            App::new()
                .app_data(predictor(FailingClassifier))
                .configure(configure(&settings.server)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/predict")
            .set_json(serde_json::json!({ "image": black_payload() }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.stage, "inference");
    }

    #[actix_web::test]
    async fn test_payload_limit() {
        let mut settings = settings();
        settings.server.max_payload_bytes = 64;
        let app = test::init_service(
            App::new()
                .app_data(predictor(BrightnessClassifier))
                .configure(configure(&settings.server)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/predict")
            .set_json(serde_json::json!({ "image": png_payload(64, 64) }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_client_error());
    }

    #[actix_web::test]
    async fn test_status_and_cors() {
        let settings = settings();
        let app = test::init_service(
            App::new()
                .app_data(predictor(BrightnessClassifier))
                .wrap(cors(&settings.server))
                .configure(configure(&settings.server)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/")
            .insert_header(("Origin", "http://localhost:3000"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert_eq!(
            resp.headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("http://localhost:3000")
        );
        let body: StatusResponse = test::read_body_json(resp).await;
        assert_eq!(body.classes, 10);
    }
}
