//! REST API for the allocation service.
//!
//! Calculator endpoints evaluate demand against containers; inventory
//! endpoints (in [`inventory`]) manage the catalog. Uses Axum as the web
//! framework and supports CORS.

mod inventory;

use std::convert::Infallible;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequestParts, Json, State};
use axum::http::request::Parts;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::allocator::{
    AllocationLimits, AllocationLine, AllocationRequest, ContainerAllocation, DemandLine,
    ErrorKind, EvaluationError, EvaluationResult, Evaluator,
};
use crate::catalog::{
    AccessPolicy, CatalogError, ContainerPatch, ContainerUtilization, InMemoryCatalog, ItemPatch, NewItem,
};
use crate::config::ApiConfig;
use crate::model::{Actor, Container, ContainerId, ItemType, Role, StoredItem, UserId, ValidationError};
use crate::strategy::Strategy;
use crate::types::Utilization;

/// Header carrying the caller's user id.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
/// Header carrying the caller's role (`admin` or `user`).
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    catalog: Arc<InMemoryCatalog>,
    limits: AllocationLimits,
}

impl ApiState {
    pub fn new(catalog: Arc<InMemoryCatalog>, limits: AllocationLimits) -> Self {
        Self { catalog, limits }
    }

    fn evaluator(&self) -> Evaluator<'_, InMemoryCatalog, dyn AccessPolicy> {
        Evaluator::new(self.catalog.as_ref(), self.catalog.policy(), self.limits)
    }
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>pack_calc API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// JSON error body shared by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    /// One of `VALIDATION_ERROR`, `UNAUTHORIZED`, `FORBIDDEN`, `NOT_FOUND`, `INVALID_JSON`
    pub code: String,
    pub details: String,
}

/// Handler error, rendered as [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    error: &'static str,
    details: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, error: &'static str, details: impl Into<String>) -> Self {
        Self {
            status,
            code,
            error,
            details: details.into(),
        }
    }

    pub fn validation(details: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "Invalid input data", details)
    }

    pub fn unauthorized(details: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Unauthorized", details)
    }

    pub fn forbidden(details: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", "Forbidden", details)
    }

    pub fn not_found(details: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Not found", details)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, details = %self.details, "request failed");
        }
        let body = ErrorResponse {
            error: self.error.to_string(),
            code: self.code.to_string(),
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

fn join_ids<T: std::fmt::Display>(ids: &[T]) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl From<EvaluationError> for ApiError {
    fn from(err: EvaluationError) -> Self {
        let details = match &err {
            EvaluationError::ContainersNotFound(ids) => format!("{err}: {}", join_ids(ids)),
            EvaluationError::ItemTypesNotFound(ids) => format!("{err}: {}", join_ids(ids)),
            _ => err.to_string(),
        };
        match err.kind() {
            ErrorKind::BadRequest => ApiError::validation(details),
            ErrorKind::Forbidden => ApiError::forbidden(details),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match &err {
            CatalogError::ContainerNotFound(_)
            | CatalogError::ItemTypeNotFound(_)
            | CatalogError::ItemNotFound(_) => ApiError::not_found(err.to_string()),
            CatalogError::ContainersNotFound(ids) => {
                ApiError::validation(format!("{err}: {}", join_ids(ids)))
            }
            CatalogError::ItemTypesNotFound(ids) => {
                ApiError::validation(format!("{err}: {}", join_ids(ids)))
            }
            CatalogError::Forbidden(_) => ApiError::forbidden(err.to_string()),
            CatalogError::Validation(_) | CatalogError::InvalidPage(_) => {
                ApiError::validation(err.to_string())
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "INVALID_JSON",
            "Invalid JSON data",
            err.body_text(),
        )
    }
}

impl From<PathRejection> for ApiError {
    fn from(err: PathRejection) -> Self {
        ApiError::validation(err.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        ApiError::validation(err.body_text())
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Caller identity taken from the `x-actor-id` / `x-actor-role` headers.
#[derive(Clone, Copy, Debug)]
pub struct CurrentActor(pub Actor);

impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw_id = parts
            .headers
            .get(ACTOR_ID_HEADER)
            .ok_or_else(|| ApiError::unauthorized(format!("missing {ACTOR_ID_HEADER} header")))?
            .to_str()
            .map_err(|_| ApiError::unauthorized(format!("{ACTOR_ID_HEADER} is not valid text")))?;
        let id = Uuid::parse_str(raw_id.trim())
            .map_err(|err| ApiError::unauthorized(format!("{ACTOR_ID_HEADER}: {err}")))?;

        let role = match parts.headers.get(ACTOR_ROLE_HEADER) {
            None => Role::User,
            Some(value) => value
                .to_str()
                .map_err(|_| ApiError::unauthorized(format!("{ACTOR_ROLE_HEADER} is not valid text")))?
                .parse::<Role>()
                .map_err(|err| ApiError::unauthorized(format!("{ACTOR_ROLE_HEADER}: {err}")))?,
        };

        Ok(CurrentActor(Actor::new(UserId::from(id), role)))
    }
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Request structure for the evaluation endpoints.
#[derive(Debug, Deserialize, ToSchema)]
#[schema(
    example = json!({
        "items": [
            { "itemTypeId": "9b2f6a52-5d0e-4c55-8b7f-0d2b8e1b7f11", "quantity": 12 }
        ],
        "containers": ["4c1d1a7e-0b59-4d0a-9d5c-1f1a55c3c2d0"],
        "strategy": "best_fit_decreasing"
    })
)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    pub items: Vec<DemandLine>,
    pub containers: Vec<ContainerId>,
    /// One of `first_fit`, `best_fit`, `best_fit_decreasing` (alias `bfd`), `single_container_only`
    pub strategy: String,
}

impl From<EvaluateRequest> for AllocationRequest {
    fn from(request: EvaluateRequest) -> Self {
        AllocationRequest {
            items: request.items,
            containers: request.containers,
            strategy: request.strategy,
        }
    }
}

/// Handler for POST /calculator/evaluate.
///
/// Distributes the requested quantities over the listed containers.
/// Infeasible demand is reported in the result, not as an error.
#[utoipa::path(
    post,
    path = "/calculator/evaluate",
    request_body = EvaluateRequest,
    params(
        ("x-actor-id" = String, Header, description = "UUID of the calling user"),
        ("x-actor-role" = Option<String>, Header, description = "`admin` or `user` (default)")
    ),
    responses(
        (status = 200, description = "Evaluation finished", body = EvaluationResult),
        (status = BAD_REQUEST, description = "Invalid request or unknown ids", body = ErrorResponse),
        (status = UNAUTHORIZED, description = "Missing or malformed actor headers", body = ErrorResponse),
        (status = FORBIDDEN, description = "A container belongs to somebody else", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Malformed JSON", body = ErrorResponse)
    ),
    tag = "calculator"
)]
async fn handle_evaluate(
    State(state): State<ApiState>,
    CurrentActor(actor): CurrentActor,
    payload: Result<Json<EvaluateRequest>, JsonRejection>,
) -> Result<Json<EvaluationResult>, ApiError> {
    let Json(payload) = payload?;
    let request = AllocationRequest::from(payload);

    info!(
        items = request.items.len(),
        containers = request.containers.len(),
        strategy = %request.strategy,
        "new evaluation request"
    );
    let result = state.evaluator().evaluate(&request, &actor).await?;
    Ok(Json(result))
}

/// Handler for POST /calculator/evaluate_stream (SSE).
///
/// Streams allocation events in real time as Server-Sent Events
/// (text/event-stream). Request errors are returned before the stream opens.
#[utoipa::path(
    post,
    path = "/calculator/evaluate_stream",
    request_body = EvaluateRequest,
    params(
        ("x-actor-id" = String, Header, description = "UUID of the calling user"),
        ("x-actor-role" = Option<String>, Header, description = "`admin` or `user` (default)")
    ),
    responses(
        (
            status = 200,
            description = "Streams allocation events in real time",
            content_type = "text/event-stream",
            body = String
        ),
        (status = BAD_REQUEST, description = "Invalid request or unknown ids", body = ErrorResponse),
        (status = UNAUTHORIZED, description = "Missing or malformed actor headers", body = ErrorResponse),
        (status = FORBIDDEN, description = "A container belongs to somebody else", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Malformed JSON", body = ErrorResponse)
    ),
    tag = "calculator"
)]
async fn handle_evaluate_stream(
    State(state): State<ApiState>,
    CurrentActor(actor): CurrentActor,
    payload: Result<Json<EvaluateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let request = AllocationRequest::from(payload);
    let prepared = state.evaluator().prepare(&request, &actor).await?;

    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::task::spawn_blocking(move || {
        let _ = prepared.run_with_progress(|evt| match serde_json::to_string(evt) {
            // a closed receiver only means the client went away
            Ok(json) => {
                let _ = tx.blocking_send(json);
            }
            Err(err) => warn!(error = %err, "could not serialize allocation event"),
        });
    });

    let stream = ReceiverStream::new(rx).map(|msg| Ok::<_, Infallible>(Event::default().data(msg)));
    Ok(Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response())
}

// ---------------------------------------------------------------------------
// Docs and health
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        handle_evaluate,
        handle_evaluate_stream,
        inventory::list_item_types,
        inventory::create_item_type,
        inventory::get_item_type,
        inventory::list_containers,
        inventory::list_containers_page,
        inventory::create_container,
        inventory::get_container,
        inventory::update_container,
        inventory::delete_container,
        inventory::calculate_container,
        inventory::list_items,
        inventory::create_item,
        inventory::update_item,
        inventory::delete_item,
        handle_health
    ),
    components(
        schemas(
            EvaluateRequest,
            DemandLine,
            EvaluationResult,
            ContainerAllocation,
            AllocationLine,
            Utilization,
            Strategy,
            ErrorResponse,
            ItemType,
            Container,
            StoredItem,
            ContainerUtilization,
            ContainerPatch,
            NewItem,
            ItemPatch,
            inventory::CreateItemTypeRequest,
            inventory::CreateContainerRequest,
            HealthResponse
        )
    ),
    tags(
        (name = "calculator", description = "Allocation evaluation"),
        (name = "inventory", description = "Item types, containers and stored items"),
        (name = "system", description = "Service health")
    )
)]
struct ApiDoc;

#[derive(Serialize, ToSchema)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "system"
)]
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn serve_openapi_json() -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Builds the application router.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/calculator/evaluate", post(handle_evaluate))
        .route("/calculator/evaluate_stream", post(handle_evaluate_stream))
        .route(
            "/item-types",
            get(inventory::list_item_types).post(inventory::create_item_type),
        )
        .route("/item-types/{id}", get(inventory::get_item_type))
        .route(
            "/containers",
            get(inventory::list_containers).post(inventory::create_container),
        )
        .route("/containers/page", get(inventory::list_containers_page))
        .route(
            "/containers/{id}",
            get(inventory::get_container)
                .patch(inventory::update_container)
                .delete(inventory::delete_container),
        )
        .route("/containers/{id}/calculate", post(inventory::calculate_container))
        .route(
            "/containers/{id}/items",
            get(inventory::list_items).post(inventory::create_item),
        )
        .route(
            "/items/{id}",
            patch(inventory::update_item).delete(inventory::delete_item),
        )
        .route("/health", get(handle_health))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Binds the configured address and serves until the server stops.
pub async fn start_api_server(config: ApiConfig, state: ApiState) -> std::io::Result<()> {
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        "server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() {
        info!("local access: http://localhost:{}", config.port());
    }
    info!("documentation: GET /docs, GET /docs/openapi.json");

    axum::serve(listener, router(state)).await
}
