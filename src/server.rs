use crate::config::AppConfig;
use crate::data::Inputs;
use crate::interact::{place_label, HighlightState, InfoLabel, StyleSnapshot, StyledElement};
use crate::render::ViewSession;
use crate::types::Attribute;
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::{Point, Rect};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

// Bounding-box entry pointing back into the region vector.
struct RegionIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

pub struct AppState {
    pub inputs: Inputs,
    pub tree: RTree<RegionIndex>,
    pub config: AppConfig,
    // Selection and hover state live behind locks; each handler updates
    // state fully before rendering or answering, so the two views always
    // read the same expressed attribute.
    pub session: Mutex<ViewSession>,
    pub highlight: Mutex<HighlightState>,
}

pub async fn start_server(config: AppConfig, inputs: Inputs) -> Result<()> {
    info!("Building spatial index for hover queries...");
    let tree_items: Vec<RegionIndex> = inputs
        .regions
        .iter()
        .enumerate()
        .map(|(i, region)| {
            let rect = region.geometry.bounding_rect().unwrap_or(Rect::new(
                geo::Coord { x: 0.0, y: 0.0 },
                geo::Coord { x: 0.0, y: 0.0 },
            ));
            RegionIndex {
                index: i,
                aabb: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
            }
        })
        .collect();
    let tree = RTree::bulk_load(tree_items);

    let mut session = ViewSession::new();
    session.initial_render(&inputs, &config)?;

    let port = config.server.port;
    let svg_dir = config.output.svg_dir.clone();
    let state = Arc::new(AppState {
        inputs,
        tree,
        config,
        session: Mutex::new(session),
        highlight: Mutex::new(HighlightState::new()),
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting server on http://{}", addr);

    let app = Router::new()
        .route("/api/attributes", get(attributes_handler))
        .route("/api/select", post(select_handler))
        .route("/api/hover", get(hover_handler))
        .route("/api/leave", get(leave_handler))
        .nest_service("/views", ServeDir::new(svg_dir))
        .fallback_service(ServeDir::new("."))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Dropdown payload: a disabled placeholder prompt plus the five attribute
/// options, and which one is currently expressed.
#[derive(Serialize)]
struct AttributesResponse {
    prompt: &'static str,
    options: Vec<String>,
    expressed: Attribute,
}

async fn attributes_handler(State(state): State<Arc<AppState>>) -> Json<AttributesResponse> {
    let expressed = state.session.lock().expect("session lock").expressed();
    Json(AttributesResponse {
        prompt: "Select Attribute",
        options: Attribute::ALL.iter().map(|a| a.to_string()).collect(),
        expressed,
    })
}

#[derive(Deserialize)]
struct SelectRequest {
    attribute: String,
}

#[derive(Serialize)]
struct SelectResponse {
    expressed: Attribute,
}

/// The SelectionChanged command. The attribute is validated against the
/// enumerated set; the session lock is held across update and re-render so
/// no reader can observe the new attribute with the old views.
async fn select_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SelectRequest>,
) -> Result<Json<SelectResponse>, (StatusCode, String)> {
    let attr: Attribute = req
        .attribute
        .parse()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("{e}")))?;

    let mut session = state.session.lock().expect("session lock");
    session
        .change_attribute(attr, &state.inputs, &state.config)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;

    Ok(Json(SelectResponse {
        expressed: session.expressed(),
    }))
}

#[derive(Deserialize)]
struct HoverParams {
    lon: f64,
    lat: f64,
    // Pointer position and viewport size, for label placement.
    px: f64,
    py: f64,
    vw: f64,
    vh: f64,
    #[serde(default = "default_label_width")]
    label_width: f64,
}

fn default_label_width() -> f64 {
    120.0
}

#[derive(Serialize)]
struct HoverResponse {
    label: InfoLabel,
    label_text: String,
    label_position: (f64, f64),
    highlight: Vec<StyledElement>,
}

/// Point-in-region lookup: R-tree candidates by bounding box, then an exact
/// containment test. A hit highlights the region's elements in both views
/// and returns the floating label.
async fn hover_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HoverParams>,
) -> Json<Option<HoverResponse>> {
    let point = Point::new(params.lon, params.lat);
    let envelope = AABB::from_point([params.lon, params.lat]);

    for candidate in state.tree.locate_in_envelope_intersecting(&envelope) {
        let Some(region) = state.inputs.regions.get(candidate.index) else {
            continue;
        };
        if !region.geometry.contains(&point) {
            continue;
        }

        let expressed = state.session.lock().expect("session lock").expressed();
        let label = InfoLabel::for_region(region, expressed);
        let label_text = label.value_text();

        let current = StyleSnapshot {
            stroke: state.config.palette.region_stroke.clone(),
            stroke_width: state.config.palette.region_stroke_width,
        };
        let highlight = state
            .highlight
            .lock()
            .expect("highlight lock")
            .highlight(&region.code, &current, &state.config.palette);

        let label_position = place_label(
            (params.px, params.py),
            (params.vw, params.vh),
            params.label_width,
        );

        return Json(Some(HoverResponse {
            label,
            label_text,
            label_position,
            highlight,
        }));
    }

    Json(None)
}

#[derive(Deserialize)]
struct LeaveParams {
    code: String,
}

#[derive(Serialize)]
struct LeaveResponse {
    restore: Vec<StyledElement>,
}

/// Mouse-out: hand back the exact styles captured at hover time and drop
/// the floating label (the label simply is not part of the response).
async fn leave_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeaveParams>,
) -> Json<LeaveResponse> {
    let restore = state
        .highlight
        .lock()
        .expect("highlight lock")
        .dehighlight(&params.code);
    Json(LeaveResponse { restore })
}
