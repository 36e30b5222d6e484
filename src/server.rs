use crate::config::AppConfig;
use crate::data;
use crate::error::LoadError;
use crate::render::{self, render_error_page, DrawCommands};
use crate::tooltip::{self, HoverEvent, Tooltip};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use geo::algorithm::contains::Contains;
use geo::bounding_rect::BoundingRect;
use geo::Point;
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

// Wrapper for RTree indexing
pub struct AreaIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for AreaIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// A successfully loaded map with everything the handlers need precomputed.
pub struct LoadedMap {
    pub commands: DrawCommands,
    pub tree: RTree<AreaIndex>,
    pub svg: String,
    pub html: String,
}

impl LoadedMap {
    pub fn build(commands: DrawCommands) -> Self {
        let tree_items: Vec<AreaIndex> = commands
            .counties
            .iter()
            .enumerate()
            .filter_map(|(i, county)| {
                let rect = county.geometry.bounding_rect()?;
                Some(AreaIndex {
                    index: i,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();
        let tree = RTree::bulk_load(tree_items);
        let svg = commands.to_svg();
        let html = commands.to_html();
        Self { commands, tree, svg, html }
    }

    /// The county under the pointer, if any.
    pub fn hit(&self, x: f64, y: f64) -> Option<usize> {
        let point = Point::new(x, y);
        let envelope = AABB::from_point([x, y]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|candidate| candidate.index)
            .find(|&i| {
                self.commands
                    .counties
                    .get(i)
                    .is_some_and(|county| county.geometry.contains(&point))
            })
    }
}

pub enum LoadState {
    Loaded(Arc<LoadedMap>),
    Failed(String),
}

pub struct AppState {
    pub config: AppConfig,
    pub map: RwLock<LoadState>,
}

/// Acquire, render and index. The result replaces whatever was served before.
pub async fn load_map(config: &AppConfig) -> Result<LoadedMap, LoadError> {
    let model = data::load_model(config).await?;
    let commands = render::render(&model)?;
    Ok(LoadedMap::build(commands))
}

async fn load_state(config: &AppConfig) -> LoadState {
    match load_map(config).await {
        Ok(map) => LoadState::Loaded(Arc::new(map)),
        Err(e) => {
            error!(error = %e, "Failed to load map data");
            LoadState::Failed(e.to_string())
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let files = ServeDir::new(&state.config.output.dir);
    Router::new()
        .route("/", get(index_handler))
        .route("/map.svg", get(svg_handler))
        .route("/api/tooltip", get(tooltip_handler))
        .route("/api/query", get(query_handler))
        .route("/api/reload", post(reload_handler))
        .nest_service("/files", files)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig) -> Result<()> {
    let map = load_state(&config).await;
    let port = config.server.port;
    let state = Arc::new(AppState {
        config,
        map: RwLock::new(map),
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Returned while the last load failed.
#[derive(Debug)]
pub struct Unavailable(pub String);

impl IntoResponse for Unavailable {
    fn into_response(self) -> Response {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": self.0 })),
        )
            .into_response()
    }
}

async fn current(state: &AppState) -> Result<Arc<LoadedMap>, Unavailable> {
    match &*state.map.read().await {
        LoadState::Loaded(map) => Ok(Arc::clone(map)),
        LoadState::Failed(message) => Err(Unavailable(message.clone())),
    }
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    match current(&state).await {
        Ok(map) => Html(map.html.clone()).into_response(),
        Err(Unavailable(message)) => {
            (StatusCode::SERVICE_UNAVAILABLE, Html(render_error_page(&message))).into_response()
        }
    }
}

async fn svg_handler(State(state): State<Arc<AppState>>) -> Result<Response, Unavailable> {
    let map = current(&state).await?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], map.svg.clone()).into_response())
}

#[derive(Debug, Deserialize)]
pub struct TooltipParams {
    fips: Option<u32>,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    /// Pointer left the county.
    #[serde(default)]
    leave: bool,
}

async fn tooltip_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TooltipParams>,
) -> Result<Json<Tooltip>, Unavailable> {
    let map = current(&state).await?;
    if params.leave {
        return Ok(Json(Tooltip::hidden()));
    }
    let event = HoverEvent {
        feature_id: params.fips,
        pointer_x: params.x,
        pointer_y: params.y,
    };
    Ok(Json(tooltip::resolve(&event, &map.commands.index)))
}

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    x: f64,
    y: f64,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    fips: Option<u32>,
    tooltip: Tooltip,
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Option<QueryResponse>>, Unavailable> {
    let map = current(&state).await?;
    let response = map.hit(params.x, params.y).map(|i| {
        let fips = map.commands.counties[i].fips;
        let event = HoverEvent { feature_id: fips, pointer_x: params.x, pointer_y: params.y };
        QueryResponse { fips, tooltip: tooltip::resolve(&event, &map.commands.index) }
    });
    Ok(Json(response))
}

async fn reload_handler(State(state): State<Arc<AppState>>) -> Response {
    info!("Reloading map data");
    let next = load_state(&state.config).await;
    let failure = match &next {
        LoadState::Failed(message) => Some(message.clone()),
        LoadState::Loaded(_) => None,
    };

    let mut map = state.map.write().await;
    match failure {
        None => {
            *map = next;
            Json(serde_json::json!({ "status": "ok" })).into_response()
        }
        Some(message) => {
            // A previously good map stays up; only a failed state is refreshed.
            if matches!(*map, LoadState::Failed(_)) {
                *map = next;
            }
            Unavailable(message).into_response()
        }
    }
}
