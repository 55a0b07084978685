//! HTTP surface of the service.
//!
//! Identity comes from the `X-User-Id` header set by the gateway in front of
//! the daemon. Every body is wrapped in `{status, message, data}`; an empty
//! result is answered with 204 rather than an error.

use actix_web::dev::Payload;
use actix_web::http::StatusCode;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse, ResponseError};
use chrono::prelude::*;
use futures::future::{ready, Ready};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::buffer::{MemoryPositionBuffer, PositionBuffer};
use crate::config::{Config, StorageBackend};
use crate::error::{Error, ErrorKind, Result};
use crate::models::{Coordinate, Position};
use crate::processor::{GeoTraceProcessor, HttpTraceProcessor, TraceProcessor};
use crate::routes::{RouteService, RouteStrategyKind};
use crate::session::{DrawingEngine, DrawingImages, PositionSource};
use crate::store::{PgPositionBuffer, Stores};

pub const USER_HEADER: &str = "X-User-Id";

pub struct AppState {
    pub engine: DrawingEngine,
    pub routes: RouteService,
}

impl AppState {
    pub fn new(stores: Stores, buffer: Arc<dyn PositionBuffer>, processor: Arc<dyn TraceProcessor>, config: &Config) -> AppState {
        AppState {
            engine: DrawingEngine::new(stores.clone(), buffer, processor, config.trace_processor_timeout),
            routes: RouteService::new(stores, config.match_policy),
        }
    }

    /// Wires the backends named by the configuration.
    pub fn from_config(config: &Config) -> Result<AppState> {
        let (stores, buffer) = match config.storage {
            StorageBackend::Memory => {
                let buffer: Arc<dyn PositionBuffer> = Arc::new(MemoryPositionBuffer::new());
                (Stores::memory(), buffer)
            }
            StorageBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .ok_or_else(|| Error::Config("DATABASE_URL is not set".to_string()))?;
                let pool = crate::create_db_pool(url)?;
                let buffer: Arc<dyn PositionBuffer> = Arc::new(PgPositionBuffer::new(pool.clone()));
                (Stores::postgres(pool), buffer)
            }
        };
        let processor: Arc<dyn TraceProcessor> = match &config.trace_processor_url {
            Some(url) => Arc::new(HttpTraceProcessor::new(url, config.trace_processor_timeout)?),
            None => Arc::new(GeoTraceProcessor),
        };
        Ok(AppState::new(stores, buffer, processor, config))
    }
}

#[derive(Debug, Serialize)]
pub struct ResultDto<T: Serialize> {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    pub data: Option<T>,
}

fn respond<T: Serialize>(status: StatusCode, message: &str, data: T) -> HttpResponse {
    HttpResponse::build(status).json(ResultDto { status: status.as_u16(), message: message.to_string(), code: None, data: Some(data) })
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::DependencyFailure => match self {
                Error::ProcessingFailed(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(ResultDto::<()> {
            status: status.as_u16(),
            message: self.to_string(),
            code: Some(self.code()),
            data: None,
        })
    }
}

/// The caller, as identified by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub i64);

impl FromRequest for CurrentUser {
    type Error = Error;
    type Future = Ready<std::result::Result<CurrentUser, Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let user = req
            .headers()
            .get(USER_HEADER)
            .ok_or_else(|| Error::Unauthorized(format!("missing {} header", USER_HEADER)))
            .and_then(|value| {
                value
                    .to_str()
                    .ok()
                    .and_then(|raw| raw.trim().parse::<i64>().ok())
                    .map(CurrentUser)
                    .ok_or_else(|| Error::Unauthorized(format!("malformed {} header", USER_HEADER)))
            });
        ready(user)
    }
}

fn checked_position(lat: f64, lng: f64, time: DateTime<Utc>) -> Result<Position> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(Error::InvalidInput(format!("position out of range: {}, {}", lat, lng)));
    }
    Ok(Position::new(lat, lng, time))
}

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRequest {
    pub lat: f64,
    pub lng: f64,
    pub time: DateTime<Utc>,
    pub route_id: Option<i64>,
}

/// Either the latest fix (live buffer) or the full trace held by the client.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceInput {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub time: Option<DateTime<Utc>>,
    pub positions: Option<Vec<Position>>,
}

impl TraceInput {
    fn into_source(self) -> Result<PositionSource> {
        match (self.positions, self.lat, self.lng, self.time) {
            (Some(positions), None, None, None) => {
                let positions = positions
                    .into_iter()
                    .map(|p| checked_position(p.lat, p.lng, p.time))
                    .collect::<Result<Vec<_>>>()?;
                Ok(PositionSource::Supplied(positions))
            }
            (None, Some(lat), Some(lng), Some(time)) => Ok(PositionSource::Live(Some(checked_position(lat, lng, time)?))),
            (None, None, None, None) => Ok(PositionSource::Live(None)),
            _ => Err(Error::InvalidInput(
                "send either positions or a single lat, lng and time".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveDrawingRequest {
    #[serde(flatten)]
    pub trace: TraceInput,
    pub drawing_image: String,
    pub drawing_detail_image: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteDrawingRequest {
    #[serde(flatten)]
    pub trace: TraceInput,
    pub title: String,
    pub step: i64,
    pub drawing_image: String,
    pub drawing_detail_image: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRouteRequest {
    pub positions: Vec<Coordinate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedRoute {
    pub route_id: i64,
    pub positions: Vec<Coordinate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRouteRequest {
    pub route_id: i64,
    pub title: String,
    pub art_image: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindRoutesQuery {
    #[serde(rename = "type")]
    pub kind: String,
    pub lat: f64,
    pub lng: f64,
    pub average_speed: Option<f64>,
}

async fn start_drawing(
    state: web::Data<AppState>,
    user: CurrentUser,
    query: web::Query<StartQuery>,
    body: web::Json<PositionRequest>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let initial = checked_position(body.lat, body.lng, body.time)?;
    let started = state.engine.start_drawing(user.0, &query.kind, initial, body.route_id).await?;
    Ok(respond(StatusCode::CREATED, "drawing started", started))
}

async fn restart_drawing(
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<i64>,
    body: web::Json<PositionRequest>,
) -> Result<HttpResponse> {
    let resume = checked_position(body.lat, body.lng, body.time)?;
    let restarted = state.engine.restart_drawing(user.0, path.into_inner(), resume).await?;
    Ok(respond(StatusCode::OK, "drawing restarted", restarted))
}

async fn record_position(
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<i64>,
    body: web::Json<PositionRequest>,
) -> Result<HttpResponse> {
    let position = checked_position(body.lat, body.lng, body.time)?;
    state.engine.record_position(user.0, path.into_inner(), position).await?;
    Ok(respond(StatusCode::OK, "position recorded", ()))
}

async fn save_drawing(
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<i64>,
    body: web::Json<SaveDrawingRequest>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let images = DrawingImages { drawing_image: body.drawing_image, detail_image: body.drawing_detail_image };
    let saved = state
        .engine
        .save_drawing(user.0, path.into_inner(), body.trace.into_source()?, images)
        .await?;
    Ok(respond(StatusCode::OK, "drawing saved", saved))
}

async fn complete_drawing(
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<i64>,
    body: web::Json<CompleteDrawingRequest>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let images = DrawingImages { drawing_image: body.drawing_image, detail_image: body.drawing_detail_image };
    let saved = state
        .engine
        .complete_drawing(user.0, path.into_inner(), &body.title, body.step, body.trace.into_source()?, images)
        .await?;
    Ok(respond(StatusCode::OK, "drawing completed", saved))
}

async fn get_drawing(state: web::Data<AppState>, user: CurrentUser, path: web::Path<i64>) -> Result<HttpResponse> {
    let drawing = state.engine.get_drawing(user.0, path.into_inner()).await?;
    Ok(respond(StatusCode::OK, "drawing found", drawing))
}

async fn publish_drawing(state: web::Data<AppState>, user: CurrentUser, path: web::Path<i64>) -> Result<HttpResponse> {
    state.engine.publish_drawing(user.0, path.into_inner()).await?;
    Ok(respond(StatusCode::OK, "drawing published", ()))
}

async fn stage_route(
    state: web::Data<AppState>,
    user: CurrentUser,
    body: web::Json<StageRouteRequest>,
) -> Result<HttpResponse> {
    let positions = body.into_inner().positions;
    let route = state.routes.stage_route(user.0, positions.clone()).await?;
    Ok(respond(StatusCode::OK, "route converted", StagedRoute { route_id: route.id, positions }))
}

async fn finalize_route(
    state: web::Data<AppState>,
    user: CurrentUser,
    body: web::Json<FinalizeRouteRequest>,
) -> Result<HttpResponse> {
    let route = state
        .routes
        .finalize_route(user.0, body.route_id, &body.title, &body.art_image)
        .await?;
    Ok(respond(StatusCode::OK, "route saved", route))
}

async fn find_routes(
    state: web::Data<AppState>,
    user: CurrentUser,
    query: web::Query<FindRoutesQuery>,
) -> Result<HttpResponse> {
    let kind: RouteStrategyKind = query.kind.parse()?;
    let location = checked_position(query.lat, query.lng, Utc::now())?.coordinate();
    let found = state.routes.find_routes(kind, user.0, location, query.average_speed).await?;
    if found.is_empty() {
        return Ok(HttpResponse::NoContent().finish());
    }
    Ok(respond(StatusCode::OK, "routes found", found))
}

async fn week_exercise(state: web::Data<AppState>, user: CurrentUser) -> Result<HttpResponse> {
    let week = state.engine.week_exercise(user.0, Utc::now().date_naive()).await?;
    Ok(respond(StatusCode::OK, "weekly exercise", week))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default().error_handler(|err, _| Error::InvalidInput(err.to_string()).into()),
    )
    .app_data(web::QueryConfig::default().error_handler(|err, _| Error::InvalidInput(err.to_string()).into()))
    .service(
        web::scope("/drawings")
            .route("/start", web::post().to(start_drawing))
            .route("/{id}", web::get().to(get_drawing))
            .route("/{id}/restart", web::patch().to(restart_drawing))
            .route("/{id}/positions", web::post().to(record_position))
            .route("/{id}/save", web::patch().to(save_drawing))
            .route("/{id}/complete", web::patch().to(complete_drawing))
            .route("/{id}/publish", web::patch().to(publish_drawing)),
    )
    .service(
        web::scope("/routes")
            .route("", web::post().to(stage_route))
            .route("", web::get().to(find_routes))
            .route("/end", web::post().to(finalize_route)),
    )
    .route("/users/exercise/week", web::get().to(week_exercise));
}
