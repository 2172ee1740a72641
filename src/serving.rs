//! HTTP surface of the classifier.
//!
//! Inference is CPU bound, so requests are handed to a fixed set of OS threads.
//! Each thread owns a clone of the loaded [Classifier]; the clones share the
//! same read-only parameters and no lock is ever taken around the model.

use std::{
    path::PathBuf,
    sync::{mpsc, Arc, Mutex},
    thread,
};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;

use crate::{
    data::ColorConvention,
    error::Error,
    inference::{Classifier, Prediction},
};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_WORKERS: usize = 4;
/// The drawing canvas paints white strokes on black.
pub const DEFAULT_INPUT_CONVENTION: ColorConvention = ColorConvention::LightOnDark;

#[derive(Config, Debug)]
pub struct ServeConfig {
    /// Snapshot written by the training run.
    pub model_path: PathBuf,
    #[config(default = "DEFAULT_PORT")]
    pub port: u16,
    #[config(default = "DEFAULT_WORKERS")]
    pub workers: usize,
    /// Convention of payloads that don't state one.
    #[config(default = "DEFAULT_INPUT_CONVENTION")]
    pub convention: ColorConvention,
}

struct Job {
    payload: String,
    convention: Option<ColorConvention>,
    reply: oneshot::Sender<crate::Result<Prediction>>,
}

/// Fixed pool of inference threads.
pub struct InferencePool {
    sender: mpsc::Sender<Job>,
}

impl InferencePool {
    pub fn new<B: Backend>(classifier: Classifier<B>, workers: usize) -> crate::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        for index in 0..workers.max(1) {
            let receiver = receiver.clone();
            let classifier = classifier.clone();

            thread::Builder::new()
                .name(format!("inference-{index}"))
                .spawn(move || loop {
                    let job = match receiver.lock() {
                        Ok(receiver) => receiver.recv(),
                        Err(_) => break,
                    };
                    let Ok(job) = job else {
                        break;
                    };

                    let result = match job.convention {
                        Some(convention) => {
                            classifier.predict_with_convention(&job.payload, convention)
                        }
                        None => classifier.predict(&job.payload),
                    };
                    if let Err(err) = &result {
                        log::warn!("Prediction failed: {err}");
                    }

                    // The requester may have gone away, nothing to do then.
                    let _ = job.reply.send(result);
                })?;
        }
        log::info!("Started {} inference workers", workers.max(1));

        Ok(Self { sender })
    }

    pub async fn predict(
        &self,
        payload: String,
        convention: Option<ColorConvention>,
    ) -> crate::Result<Prediction> {
        let (reply, response) = oneshot::channel();
        let job = Job {
            payload,
            convention,
            reply,
        };

        self.sender.send(job).map_err(|_| Error::Unavailable)?;
        response.await.map_err(|_| Error::Unavailable)?
    }
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    /// Data URI or bare base64 image.
    pub image: String,
    #[serde(default)]
    pub convention: Option<ColorConvention>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub fn router(pool: InferencePool) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(pool))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

async fn predict(
    State(pool): State<Arc<InferencePool>>,
    Json(request): Json<PredictRequest>,
) -> Response {
    match pool.predict(request.image, request.convention).await {
        Ok(prediction) => Json(prediction).into_response(),
        Err(err) => {
            let status = if err.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            let body = ErrorBody {
                error: err.to_string(),
            };

            (status, Json(body)).into_response()
        }
    }
}

/// Loads the snapshot and serves predictions until the process is stopped.
///
/// A missing snapshot fails before anything binds the port.
pub async fn run<B: Backend>(
    config: &ServeConfig,
    device: B::Device,
) -> crate::Result<()> {
    let classifier = Classifier::<B>::load(&config.model_path, device)?
        .with_input_convention(config.convention);
    let pool = InferencePool::new(classifier, config.workers)?;

    let address = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    log::info!("Serving predictions on {address}");

    axum::serve(listener, router(pool))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        log::info!("Shutting down");
    }
}
