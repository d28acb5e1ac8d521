/*
Copyright 2024 The Kubernetes Authors.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! HTTP(S) endpoint serving `AdmissionReview` requests.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use kube::{
    api::DynamicObject,
    core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, SerializePatchError},
};
use serde::Deserialize;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::TlsPaths;
use crate::{Error, LabelReconciler, Result};

/// Shared state for the admission handlers.
#[derive(Clone)]
pub struct WebhookState {
    pub reconciler: LabelReconciler,
}

impl WebhookState {
    pub fn new(reconciler: LabelReconciler) -> Self {
        Self { reconciler }
    }
}

/// Failures to process a review. These never carry a policy decision.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("invalid admission review: {0}")]
    InvalidReview(String),
    #[error(transparent)]
    Processing(#[from] Error),
    #[error("cannot serialize patch: {0}")]
    Serialization(#[from] SerializePatchError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::InvalidReview(_) => StatusCode::BAD_REQUEST,
            WebhookError::Processing(_) | WebhookError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

/// Query parameters the API server appends to webhook calls.
#[derive(Debug, Default, Deserialize)]
pub struct MutateParams {
    /// Time the API server waits for an answer, as a Go duration such as `10s`.
    pub timeout: Option<String>,
}

impl MutateParams {
    pub fn deadline(&self) -> std::result::Result<Option<Duration>, WebhookError> {
        self.timeout
            .as_deref()
            .map(|raw| {
                humantime::parse_duration(raw.trim()).map_err(|e| {
                    WebhookError::InvalidReview(format!("invalid timeout `{raw}`: {e}"))
                })
            })
            .transpose()
    }
}

pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/mutate", post(mutate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }))
        .with_state(state)
}

pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Query(params): Query<MutateParams>,
    body: Bytes,
) -> std::result::Result<Json<AdmissionReview<DynamicObject>>, WebhookError> {
    let deadline = params.deadline()?;
    let review: AdmissionReview<DynamicObject> = serde_json::from_slice(&body)
        .map_err(|e| WebhookError::InvalidReview(e.to_string()))?;
    let request: AdmissionRequest<DynamicObject> = review
        .try_into()
        .map_err(|e: kube::core::admission::ConvertAdmissionReviewError| {
            WebhookError::InvalidReview(e.to_string())
        })?;

    let span = info_span!(
        "admission",
        uid = %request.uid,
        namespace = request.namespace.as_deref().unwrap_or_default(),
        kind = %request.kind.kind,
        name = %request.name,
    );
    let response = mutate(&state.reconciler, &request, deadline)
        .instrument(span)
        .await
        .inspect_err(|e| error!(uid = %request.uid, error = %e, "failed to process admission review"))?;
    Ok(Json(response.into_review()))
}

async fn mutate(
    reconciler: &LabelReconciler,
    request: &AdmissionRequest<DynamicObject>,
    deadline: Option<Duration>,
) -> std::result::Result<AdmissionResponse, WebhookError> {
    info!(operation = ?request.operation, ?deadline, "handle");

    let Some(object) = &request.object else {
        debug!("no object in request, allowing unchanged");
        return Ok(AdmissionResponse::from(request));
    };
    let namespace = request
        .namespace
        .as_deref()
        .ok_or_else(|| WebhookError::InvalidReview("request has no namespace".to_string()))?;

    let verdict = reconciler
        .review(namespace, object.metadata.labels.as_ref(), deadline)
        .await?;
    Ok(verdict.into_admission_response(AdmissionResponse::from(request))?)
}

/// Serves `router` until SIGINT or SIGTERM, over TLS when `tls` is set.
pub async fn serve(addr: SocketAddr, tls: Option<TlsPaths>, router: Router) -> Result<()> {
    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    let served = match tls {
        Some(paths) => {
            let config = RustlsConfig::from_pem_file(&paths.certificate_path, &paths.private_key_path)
                .await
                .map_err(|e| {
                    Error::ServerError(format!(
                        "cannot load TLS key pair {} / {}: {e}",
                        paths.certificate_path.display(),
                        paths.private_key_path.display()
                    ))
                })?;
            info!(%addr, "serving admission webhook over TLS");
            axum_server::bind_rustls(addr, config)
                .handle(handle)
                .serve(router.into_make_service())
                .await
        }
        None => {
            warn!(%addr, "no TLS key pair configured, serving admission webhook over plain HTTP");
            axum_server::bind(addr)
                .handle(handle)
                .serve(router.into_make_service())
                .await
        }
    };
    served.map_err(|e| Error::ServerError(e.to_string()))
}

async fn shutdown_on_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for SIGINT: {e}");
            futures::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                futures::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = futures::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutting down admission webhook");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
