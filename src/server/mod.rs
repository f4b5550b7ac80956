//! The user-facing JSON web server that listens for digit prediction
//! requests

use crate::config::ServerSettings;
use crate::inference::PredictError;
use actix_cors::Cors;
use actix_web::error::BlockingError;
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use protocol::ErrorResponse;

pub mod protocol;
pub mod routes;

#[derive(Debug)]
pub enum WebError {
    /// The request could not be decoded or classified
    Predict(PredictError),

    /// The blocking thread pool dropped the job
    Blocking(BlockingError),
}

impl WebError {
    fn stage(&self) -> &'static str {
        match self {
            WebError::Predict(e) => e.stage(),
            WebError::Blocking(_) => "server",
        }
    }
}

impl std::fmt::Display for WebError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebError::Predict(e) => write!(f, "{e}"),
            WebError::Blocking(e) => write!(f, "{e}"),
        }
    }
}

impl actix_web::error::ResponseError for WebError {
    fn error_response(&self) -> HttpResponse {
        let err = ErrorResponse {
            stage: self.stage().into(),
            errors: vec![self.to_string()],
        };

        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(err)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            WebError::Predict(PredictError::Decode(_)) => StatusCode::BAD_REQUEST,
            WebError::Predict(PredictError::Inference(_)) | WebError::Blocking(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<PredictError> for WebError {
    fn from(err: PredictError) -> WebError {
        WebError::Predict(err)
    }
}

impl From<BlockingError> for WebError {
    fn from(err: BlockingError) -> Self {
        WebError::Blocking(err)
    }
}

/// Register the routes and the JSON body limit on an `App`
pub fn configure(settings: &ServerSettings) -> impl FnOnce(&mut web::ServiceConfig) {
    let limit = settings.max_payload_bytes;
    move |cfg| {
        cfg.app_data(web::JsonConfig::default().limit(limit))
            .service(routes::status)
            .service(routes::predict);
    }
}

/// CORS policy for the drawing front end
pub fn cors(settings: &ServerSettings) -> Cors {
    settings
        .allowed_origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allow_any_method()
        .allow_any_header()
        .supports_credentials()
}
