//! HTTP API
//!
//! Every response is a JSON envelope `{ message, status, data?, code? }`.
//! Registry and verifier calls block, so they run on the blocking pool.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State as AxumState},
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use registry_core::{ProofVerifier, Registry, RegistryError, Submission};
use registry_smt::{FieldElement, SmtError};
use serde::Serialize;
use tracing::{error, info, warn};

const CONTENT_SECURITY_POLICY: &str = "default-src 'none'; script-src 'self'; connect-src 'self';";

/// Shared handler state
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) registry: Arc<Registry>,
    pub(crate) verifier: Arc<dyn ProofVerifier>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("registry", &self.registry)
            .field("verifier", &self.verifier.name())
            .finish()
    }
}

/// Response envelope
#[derive(Debug, Serialize)]
pub(crate) struct Envelope<T> {
    pub(crate) message: String,
    pub(crate) status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<&'static str>,
}

impl<T> Envelope<T> {
    fn ok(status: &'static str, message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self { message: message.into(), status, data: Some(data), code: None })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmitData {
    pub(crate) identity_index: u64,
    pub(crate) eligibility_index: u64,
    pub(crate) identity_root: String,
    pub(crate) eligibility_root: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PathData {
    pub(crate) leaf_index: u64,
    pub(crate) path: Vec<String>,
    pub(crate) path_indices: Vec<u8>,
    pub(crate) root: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RootData {
    pub(crate) root: String,
    pub(crate) depth: u32,
    pub(crate) leaves_count: u64,
}

/// A failed request, rendered as an error envelope.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into() }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let status = match &err {
            RegistryError::ProofVerificationFailed
            | RegistryError::MalformedPayload(_)
            | RegistryError::InvalidTreeId(_)
            | RegistryError::LeafOutOfRange { .. }
            | RegistryError::Tree(SmtError::FieldRange(_) | SmtError::LeafOutOfRange { .. }) => StatusCode::BAD_REQUEST,
            RegistryError::DuplicateNullifier(_) => StatusCode::CONFLICT,
            RegistryError::Tree(SmtError::TreeFull { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %err, code = err.code(), "request failed");
        }
        Self::new(status, err.code(), err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::new(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", "Request body too large");
        }
        Self::new(StatusCode::BAD_REQUEST, "malformed_payload", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope::<()> { message: self.message, status: "error", data: None, code: Some(self.code) };
        (self.status, Json(body)).into_response()
    }
}

/// Build the router.
pub(crate) fn router(state: AppState, max_body_size: usize) -> Router {
    let api = Router::new()
        .route("/submit_proof", post(submit_proof))
        .route("/merkle_path/:tree_id/:leaf_index", get(merkle_path))
        .route("/root/:tree_id", get(root));

    Router::new()
        .nest("/api", api)
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(middleware::map_response(set_csp))
        .with_state(state)
}

async fn set_csp(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CONTENT_SECURITY_POLICY, HeaderValue::from_static(CONTENT_SECURITY_POLICY));
    response
}

/// Health check endpoint
pub(crate) async fn health() -> &'static str {
    "ok"
}

/// Run a registry call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RegistryError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(format!("worker task failed: {e}")))?
        .map_err(ApiError::from)
}

/// POST /api/submit_proof
pub(crate) async fn submit_proof(
    AxumState(state): AxumState<AppState>,
    payload: Result<Json<Submission>, JsonRejection>,
) -> Result<Json<Envelope<SubmitData>>, ApiError> {
    let Json(submission) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "rejected submission body");
        ApiError::from(rejection)
    })?;
    info!(signals = submission.public_signals.len(), "received proof submission");

    let AppState { registry, verifier } = state;
    let receipt = blocking(move || registry.register(verifier.as_ref(), submission)).await?;

    Ok(Envelope::ok(
        "accepted",
        "Proof submitted successfully",
        SubmitData {
            identity_index: receipt.identity_index,
            eligibility_index: receipt.eligibility_index,
            identity_root: receipt.identity_root.to_hex(),
            eligibility_root: receipt.eligibility_root.to_hex(),
        },
    ))
}

/// GET /api/merkle_path/:tree_id/:leaf_index
pub(crate) async fn merkle_path(
    AxumState(state): AxumState<AppState>,
    Path((tree_id, leaf_index)): Path<(String, String)>,
) -> Result<Json<Envelope<PathData>>, ApiError> {
    let position: u64 = leaf_index.parse().map_err(|_| {
        ApiError::new(StatusCode::BAD_REQUEST, "leaf_out_of_range", format!("invalid leaf index {leaf_index:?}"))
    })?;

    let registry = state.registry;
    let path = blocking(move || registry.get_path(&tree_id, position)).await?;

    Ok(Envelope::ok(
        "success",
        "Merkle path retrieved successfully",
        PathData {
            leaf_index: path.leaf_index,
            path: path.path.iter().map(FieldElement::to_hex).collect(),
            path_indices: path.path_indices,
            root: path.root.to_hex(),
        },
    ))
}

/// GET /api/root/:tree_id
pub(crate) async fn root(
    AxumState(state): AxumState<AppState>,
    Path(tree_id): Path<String>,
) -> Result<Json<Envelope<RootData>>, ApiError> {
    let registry = state.registry;
    let info = blocking(move || registry.get_root(&tree_id)).await?;

    Ok(Envelope::ok(
        "success",
        "Merkle tree root retrieved successfully",
        RootData { root: info.root.to_hex(), depth: info.depth, leaves_count: info.leaves_count },
    ))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use registry_core::test_utils::sample_submission;
    use registry_core::{MemoryStore, RegistryConfig};
    use registry_smt::PoseidonBackend;
    use registry_verifier::MockVerifier;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    fn state_with(verifier: MockVerifier) -> AppState {
        let config = RegistryConfig { depth: 3, ..RegistryConfig::default() };
        let registry = Registry::open(config, Arc::new(MemoryStore::new()), Arc::new(PoseidonBackend)).unwrap();
        AppState { registry: Arc::new(registry), verifier: Arc::new(verifier) }
    }

    fn state() -> AppState {
        state_with(MockVerifier::new())
    }

    async fn render<T: IntoResponse>(response: T) -> (StatusCode, Value) {
        let response = response.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn submit(state: &AppState, signals: &[u64]) -> (StatusCode, Value) {
        render(submit_proof(AxumState(state.clone()), Ok(Json(sample_submission(signals)))).await).await
    }

    #[tokio::test]
    async fn test_submit_accepted() {
        let state = state();
        let (status, body) = submit(&state, &[1, 2, 3]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "accepted");
        assert_eq!(body["data"]["identityIndex"], 0);
        assert_eq!(body["data"]["eligibilityIndex"], 0);
        let root = body["data"]["identityRoot"].as_str().unwrap();
        assert!(root.starts_with("0x"));
        assert_eq!(root.len(), 66);
        assert!(body.get("code").is_none());

        let (_, body) = submit(&state, &[4, 5, 6, 7]).await;
        assert_eq!(body["data"]["identityIndex"], 1);
    }

    #[tokio::test]
    async fn test_submit_errors() {
        let state = state();
        submit(&state, &[1, 2, 3]).await;

        let (status, body) = submit(&state, &[8, 9, 3]).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], "duplicate_nullifier");

        let (status, body) = submit(&state, &[8, 9]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "malformed_payload");

        let rejecting = state_with(MockVerifier::rejecting());
        let (status, body) = submit(&rejecting, &[1, 2, 3]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "proof_verification_failed");
        assert_eq!(rejecting.registry.leaves_count(), 0);
    }

    #[tokio::test]
    async fn test_tree_full_is_unavailable() {
        let config = RegistryConfig { depth: 0, ..RegistryConfig::default() };
        let registry = Registry::open(config, Arc::new(MemoryStore::new()), Arc::new(PoseidonBackend)).unwrap();
        let state = AppState { registry: Arc::new(registry), verifier: Arc::new(MockVerifier::new()) };

        submit(&state, &[1, 2, 3]).await;
        let (status, body) = submit(&state, &[4, 5, 6]).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "tree_full");
    }

    #[tokio::test]
    async fn test_merkle_path() {
        let state = state();
        let (_, submitted) = submit(&state, &[1, 2, 3]).await;

        let response = merkle_path(AxumState(state.clone()), Path(("identity".into(), "0".into()))).await;
        let (status, body) = render(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["leafIndex"], 0);
        assert_eq!(body["data"]["path"].as_array().unwrap().len(), 3);
        assert_eq!(body["data"]["pathIndices"], serde_json::json!([0, 0, 0]));
        assert_eq!(body["data"]["root"], submitted["data"]["identityRoot"]);

        let response = merkle_path(AxumState(state.clone()), Path(("identity".into(), "8".into()))).await;
        let (status, body) = render(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "leaf_out_of_range");

        let response = merkle_path(AxumState(state.clone()), Path(("identity".into(), "-1".into()))).await;
        assert_eq!(render(response).await.0, StatusCode::BAD_REQUEST);

        let response = merkle_path(AxumState(state), Path(("dvv".into(), "0".into()))).await;
        let (status, body) = render(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_tree_id");
    }

    #[tokio::test]
    async fn test_root() {
        let state = state();
        submit(&state, &[1, 2, 3]).await;

        let (status, body) = render(root(AxumState(state.clone()), Path("eligibility".into())).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["depth"], 3);
        assert_eq!(body["data"]["leavesCount"], 1);

        let (status, body) = render(root(AxumState(state), Path("zk".into())).await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_tree_id");
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let state = state();
        let app = router(state.clone(), 64);
        let body = format!(r#"{{"padding":"{}"}}"#, "a".repeat(1024));
        let request = Request::builder()
            .method("POST")
            .uri("/api/submit_proof")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get(header::CONTENT_SECURITY_POLICY).unwrap(),
            "default-src 'none'; script-src 'self'; connect-src 'self';"
        );
        let (status, body) = render(response).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], "payload_too_large");
        assert_eq!(state.registry.leaves_count(), 0);
    }

    #[tokio::test]
    async fn test_csp_on_every_response() {
        let app = router(state(), 4096);
        for uri in ["/health", "/api/root/identity", "/api/root/zk"] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(
                response.headers().get(header::CONTENT_SECURITY_POLICY).unwrap(),
                CONTENT_SECURITY_POLICY,
                "{uri}"
            );
        }
    }
}
