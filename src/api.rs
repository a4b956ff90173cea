//! REST API for the skyline layout service.
//!
//! Provides HTTP endpoints that lay out a list of tiles for a given column width.
//! Uses Axum as the web framework and supports CORS.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use utoipa::{OpenApi, ToSchema};

use crate::config::{ApiConfig, EngineConfig};
use crate::layout::{
    LayoutConfig, LayoutDiagnostics, LayoutResult, layout_tiles_with_config,
    layout_tiles_with_progress,
};
use crate::model::{PlacedTile, Tile, ValidationError, validate_container_width};
use crate::skyline::{Segment, SkylineError};
use crate::types::Dimensional;

#[derive(Clone)]
struct ApiState {
    engine_config: EngineConfig,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>skyline-layout API Docs</title>
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

/// Request structure for the layout endpoints.
///
/// `tiles` are laid out in the given order; `width` is the column width.
#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "width": 100.0,
        "tiles": [
            { "id": 1, "dims": [40.0, 20.0] },
            { "id": 2, "dims": [30.0, 10.0], "min_dims": [20.0, 15.0] }
        ],
        "max_width_ratio": 0.5
    })
)]
pub struct LayoutRequest {
    pub width: f64,
    pub tiles: Vec<Tile>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub max_width_ratio: Option<f64>,
}

#[derive(Debug)]
struct ValidatedLayoutRequest {
    width: f64,
    tiles: Vec<Tile>,
    max_width_ratio: Option<f64>,
}

impl ValidatedLayoutRequest {
    fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Applies the request-level ratio on top of the service configuration.
    fn effective_config(&self, base: LayoutConfig) -> LayoutConfig {
        let mut config = base;
        if let Some(ratio) = self.max_width_ratio {
            config.max_width_ratio = ratio;
        }
        config
    }

    fn into_parts(self) -> (f64, Vec<Tile>) {
        (self.width, self.tiles)
    }
}

#[derive(Debug)]
enum LayoutRequestValidationError {
    InvalidWidth(ValidationError),
    InvalidRatio(f64),
    InvalidTile(ValidationError),
}

impl LayoutRequest {
    fn into_validated(self) -> Result<ValidatedLayoutRequest, LayoutRequestValidationError> {
        validate_container_width(self.width).map_err(LayoutRequestValidationError::InvalidWidth)?;

        // Finite ratios outside [0.01, 1] are clamped by the resolver.
        if let Some(ratio) = self.max_width_ratio {
            if !ratio.is_finite() {
                return Err(LayoutRequestValidationError::InvalidRatio(ratio));
            }
        }

        let tiles = self
            .tiles
            .into_iter()
            .map(Tile::validated)
            .collect::<Result<Vec<_>, ValidationError>>()
            .map_err(LayoutRequestValidationError::InvalidTile)?;

        Ok(ValidatedLayoutRequest {
            width: self.width,
            tiles,
            max_width_ratio: self.max_width_ratio,
        })
    }
}

/// Response structure with all placements and the final skyline.
#[derive(Serialize, ToSchema)]
pub struct LayoutResponse {
    pub width: f64,
    pub placements: Vec<PlacedTileResponse>,
    pub unplaced: Vec<UnplacedTileResponse>,
    pub is_complete: bool,
    #[schema(value_type = [f64; 2], example = json!([100.0, 30.0]))]
    pub content_size: (f64, f64),
    pub skyline: Vec<Segment>,
    pub diagnostics: LayoutDiagnostics,
}

/// Single placed tile in the response.
///
/// # Fields
/// * `id` - Tile ID
/// * `pos` - Position (x, y) relative to the container origin
/// * `dims` - Resolved size (width, height)
#[derive(Serialize, ToSchema)]
pub struct PlacedTileResponse {
    pub id: usize,
    #[schema(value_type = [f64; 2], example = json!([0.0, 0.0]))]
    pub pos: (f64, f64),
    #[schema(value_type = [f64; 2], example = json!([40.0, 20.0]))]
    pub dims: (f64, f64),
}

impl From<PlacedTile> for PlacedTileResponse {
    fn from(placed: PlacedTile) -> Self {
        Self {
            id: placed.tile.id,
            pos: placed.position(),
            dims: placed.rect.size().as_tuple(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UnplacedTileResponse {
    pub id: usize,
    #[schema(value_type = [f64; 2], example = json!([140.0, 20.0]))]
    pub dims: (f64, f64),
    pub reason_code: String,
    pub reason: String,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn validation_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid input data",
        details,
    )
}

fn layout_failure(err: &SkylineError) -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Layout failed",
        err.to_string(),
    )
}

fn parse_layout_request(
    payload: Result<Json<LayoutRequest>, JsonRejection>,
) -> Result<ValidatedLayoutRequest, Response> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(err) => return Err(json_deserialize_error(err)),
    };

    match payload.into_validated() {
        Ok(validated) => Ok(validated),
        Err(LayoutRequestValidationError::InvalidWidth(err)) => {
            Err(validation_error(err.to_string()))
        }
        Err(LayoutRequestValidationError::InvalidRatio(ratio)) => Err(validation_error(format!(
            "max_width_ratio must be a finite number, got: {}",
            ratio
        ))),
        Err(LayoutRequestValidationError::InvalidTile(err)) => {
            Err(validation_error(err.to_string()))
        }
    }
}

impl LayoutResponse {
    /// Creates a LayoutResponse from a LayoutResult.
    pub fn from_layout_result(result: LayoutResult) -> Self {
        let is_complete = result.is_complete();
        let LayoutResult {
            width,
            placed,
            unplaced,
            content_size,
            skyline,
            diagnostics,
        } = result;

        Self {
            width,
            placements: placed.into_iter().map(PlacedTileResponse::from).collect(),
            unplaced: unplaced
                .into_iter()
                .map(|entry| UnplacedTileResponse {
                    id: entry.tile.id,
                    dims: entry.tile.dimensions().as_tuple(),
                    reason_code: entry.reason.code().to_string(),
                    reason: entry.reason.to_string(),
                })
                .collect(),
            is_complete,
            content_size: content_size.as_tuple(),
            skyline,
            diagnostics,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_layout, handle_layout_stream),
    components(
        schemas(
            LayoutRequest,
            LayoutResponse,
            PlacedTileResponse,
            UnplacedTileResponse,
            ErrorResponse,
            Tile,
            Segment,
            LayoutDiagnostics
        )
    ),
    tags((name = "layout", description = "Endpoints for skyline layout"))
)]
struct ApiDoc;

/// Builds the router with all endpoints.
fn router(engine_config: EngineConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let state = ApiState { engine_config };

    Router::new()
        .route("/layout", post(handle_layout))
        .route("/layout_stream", post(handle_layout_stream))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server.
///
/// Configures CORS for cross-origin requests.
/// Blocks until the server is terminated.
pub async fn start_api_server(config: ApiConfig, engine_config: EngineConfig) {
    let app = router(engine_config);

    let addr = config.socket_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("❌ Could not bind API server to {}: {}", addr, err);
            return;
        }
    };

    let display_host = config.display_host().to_string();
    println!(
        "🚀 Server running on http://{}:{}",
        display_host,
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        println!("💡 Local access: http://localhost:{}", config.port());
    }
    println!("📐 API Endpoints:");
    println!("   - POST /layout");
    println!("   - POST /layout_stream");
    println!("📑 Documentation:");
    println!("   - GET /docs");
    println!("   - GET /docs/openapi.json");

    if let Err(err) = axum::serve(listener, app).await {
        eprintln!("❌ API server terminated with an error: {err}");
    }
}

/// Handler for POST /layout endpoint.
///
/// Lays out the tiles in order and returns every placement together with
/// the content size and the final skyline.
#[utoipa::path(
    post,
    path = "/layout",
    request_body = LayoutRequest,
    responses(
        (status = 200, description = "Successfully laid out tiles", body = LayoutResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request",
            body = ErrorResponse
        ),
        (
            status = INTERNAL_SERVER_ERROR,
            description = "Layout engine failed",
            body = ErrorResponse
        )
    ),
    tag = "layout"
)]
async fn handle_layout(
    State(state): State<ApiState>,
    payload: Result<Json<LayoutRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_layout_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let tile_count = request.tile_count();
    let config = request.effective_config(state.engine_config.layout_config());
    let (width, tiles) = request.into_parts();

    println!(
        "📥 New layout request: {} tiles, width {}",
        tile_count, width
    );

    let outcome =
        tokio::task::spawn_blocking(move || layout_tiles_with_config(tiles, width, config)).await;

    match outcome {
        Ok(Ok(result)) => {
            println!(
                "📐 Result: {} placed, {} unplaced, height {}",
                result.placed_count(),
                result.unplaced_count(),
                result.content_size.height
            );
            let response = LayoutResponse::from_layout_result(result);
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(Err(err)) => {
            eprintln!("❌ Layout failed: {}", err);
            layout_failure(&err)
        }
        Err(join_err) => {
            eprintln!("❌ Layout task aborted: {}", join_err);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Layout failed",
                join_err.to_string(),
            )
        }
    }
}

/// Handler for POST /layout_stream endpoint (SSE).
///
/// Streams layout events in real-time as Server-Sent Events (text/event-stream).
#[utoipa::path(
    post,
    path = "/layout_stream",
    request_body = LayoutRequest,
    responses(
        (
            status = 200,
            description = "Streams layout events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request",
            body = ErrorResponse
        )
    ),
    tag = "layout"
)]
async fn handle_layout_stream(
    State(state): State<ApiState>,
    payload: Result<Json<LayoutRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_layout_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let config = request.effective_config(state.engine_config.layout_config());
    let (width, tiles) = request.into_parts();

    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::task::spawn_blocking(move || {
        let outcome = layout_tiles_with_progress(tiles, width, config, |evt| {
            if let Ok(json) = serde_json::to_string(evt) {
                // Receiver has closed the stream; remaining events are discarded.
                let _ = tx.blocking_send(json);
            }
        });
        if let Err(err) = outcome {
            eprintln!("❌ Layout stream aborted: {}", err);
            let payload = json!({ "type": "Failed", "details": err.to_string() });
            let _ = tx.blocking_send(payload.to_string());
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::layout_tiles;

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        assert!(
            paths.contains_key("/layout"),
            "OpenAPI documentation is missing the /layout path"
        );
        assert!(
            paths.contains_key("/layout_stream"),
            "OpenAPI documentation is missing the /layout_stream path"
        );
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        let schemas = &components.schemas;
        for name in ["LayoutRequest", "LayoutResponse", "ErrorResponse", "Segment"] {
            assert!(
                schemas.contains_key(name),
                "Expected schema '{}' is missing from OpenAPI spec",
                name
            );
        }
    }

    #[test]
    fn layout_request_parses_optional_sizes_and_ratio() {
        let json = r#"{
            "width": 100.0,
            "tiles": [
                {"id": 1, "dims": [40.0, 20.0]},
                {"id": 2, "dims": [30.0, 10.0], "min_dims": [20.0, 15.0], "max_dims": null}
            ],
            "max_width_ratio": 0.5
        }"#;
        let request: LayoutRequest = serde_json::from_str(json).expect("Should parse valid JSON");
        assert_eq!(request.max_width_ratio, Some(0.5));
        assert_eq!(request.tiles[0].min_dims, None);
        assert_eq!(request.tiles[1].min_dims, Some((20.0, 15.0)));
        assert_eq!(request.tiles[1].max_dims, None);
    }

    #[test]
    fn layout_request_ratio_defaults_to_none() {
        let json = r#"{"width": 100.0, "tiles": []}"#;
        let request: LayoutRequest = serde_json::from_str(json).expect("Should parse valid JSON");
        assert_eq!(request.max_width_ratio, None);
    }

    #[test]
    fn request_level_ratio_overrides_config() {
        let request = LayoutRequest {
            width: 100.0,
            tiles: vec![Tile::new(1, (10.0, 10.0)).unwrap()],
            max_width_ratio: Some(0.25),
        }
        .into_validated()
        .expect("Should validate successfully");

        let config = request.effective_config(LayoutConfig::default());
        assert_eq!(config.max_width_ratio, 0.25);
    }

    #[test]
    fn missing_ratio_preserves_config() {
        let request = LayoutRequest {
            width: 100.0,
            tiles: Vec::new(),
            max_width_ratio: None,
        }
        .into_validated()
        .expect("Should validate successfully");

        let base = LayoutConfig::builder().max_width_ratio(0.75).build();
        assert_eq!(request.effective_config(base).max_width_ratio, 0.75);
    }

    #[test]
    fn validation_rejects_bad_width_ratio_and_tiles() {
        let bad_width = LayoutRequest {
            width: 0.0,
            tiles: Vec::new(),
            max_width_ratio: None,
        };
        assert!(matches!(
            bad_width.into_validated(),
            Err(LayoutRequestValidationError::InvalidWidth(_))
        ));

        let bad_ratio = LayoutRequest {
            width: 100.0,
            tiles: Vec::new(),
            max_width_ratio: Some(f64::INFINITY),
        };
        assert!(matches!(
            bad_ratio.into_validated(),
            Err(LayoutRequestValidationError::InvalidRatio(_))
        ));

        let clamped_ratio = LayoutRequest {
            width: 100.0,
            tiles: Vec::new(),
            max_width_ratio: Some(1.5),
        };
        assert!(clamped_ratio.into_validated().is_ok());

        let bad_tile = LayoutRequest {
            width: 100.0,
            tiles: vec![Tile {
                id: 9,
                dims: (10.0, -1.0),
                min_dims: None,
                max_dims: None,
            }],
            max_width_ratio: None,
        };
        assert!(matches!(
            bad_tile.into_validated(),
            Err(LayoutRequestValidationError::InvalidTile(_))
        ));
    }

    #[test]
    fn response_reports_placements_and_skyline() {
        let tiles = vec![
            Tile::new(1, (40.0, 20.0)).unwrap(),
            Tile::new(2, (30.0, 10.0)).unwrap(),
        ];
        let result = layout_tiles(tiles, 100.0).unwrap();
        let response = LayoutResponse::from_layout_result(result);

        assert!(response.is_complete);
        assert_eq!(response.placements.len(), 2);
        assert_eq!(response.placements[1].pos, (40.0, 0.0));
        assert_eq!(response.content_size, (70.0, 20.0));
        assert_eq!(response.skyline.len(), 3);

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["skyline"][0]["y"], json!(20.0));
    }

    #[test]
    fn diverged_normalization_maps_to_internal_error() {
        let response = layout_failure(&SkylineError::NormalizationDiverged { passes: 3 });
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = validation_error("Width must be positive");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn response_reports_unplaced_tiles_with_ideal_size() {
        let config = LayoutConfig::builder()
            .skyline(
                crate::skyline::SkylineConfig::builder()
                    .oversize_policy(crate::skyline::OversizePolicy::Reject)
                    .build(),
            )
            .build();
        let tiles = vec![Tile::new(4, (99.7, 10.0)).unwrap()];
        let result = layout_tiles_with_config(tiles, 99.5, config).unwrap();
        let response = LayoutResponse::from_layout_result(result);

        assert!(!response.is_complete);
        assert_eq!(response.unplaced.len(), 1);
        assert_eq!(response.unplaced[0].id, 4);
        assert_eq!(response.unplaced[0].dims, (99.7, 10.0));
        assert_eq!(response.unplaced[0].reason_code, "wider_than_container");
    }
}
