//! Routes: turning a drawn shape into a followable route, and picking the
//! routes worth recommending to someone about to run.

use async_trait::async_trait;
use chrono::prelude::*;
use geo::{Centroid, HaversineDistance, HaversineLength, LineString, MultiPoint, Point};
use log::info;
use serde::Serialize;
use std::str::FromStr;

use crate::config::MatchPolicy;
use crate::error::{Error, Result};
use crate::models::{Coordinate, Route};
use crate::store::{RouteStore, Stores};

const MAX_TITLE_LEN: usize = 30;

/// Center and length of a shape, in degrees and meters.
pub fn route_geometry(positions: &[Coordinate]) -> Option<(Coordinate, i64)> {
    let points: MultiPoint<f64> = positions.iter().map(|c| Point::new(c.lng, c.lat)).collect();
    let center = points.centroid()?;
    let line: LineString<f64> = positions.iter().map(|c| (c.lng, c.lat)).collect();
    let distance = line.haversine_length().round() as i64;
    Some((Coordinate::new(center.y(), center.x()), distance))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecommendation {
    pub route_id: i64,
    pub title: String,
    pub art_image: Option<String>,
    pub center: Coordinate,
    /// meters
    pub distance: i64,
    /// How far the requester is from the route's center, in meters.
    pub distance_from_user: f64,
    /// Seconds at the requester's pace, when it is known.
    pub estimated_time: Option<i64>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteQuery {
    pub user_id: i64,
    pub location: Coordinate,
    /// meters per second
    pub average_speed: Option<f64>,
}

/// Scores one route for a requester. `None` means it should not be offered.
pub fn recommend(route: &Route, query: &RouteQuery, policy: &MatchPolicy) -> Option<RouteRecommendation> {
    let title = route.title.clone()?;

    let user = Point::new(query.location.lng, query.location.lat);
    let center = Point::new(route.center_lng, route.center_lat);
    let distance_from_user = user.haversine_distance(&center);
    if distance_from_user > policy.max_distance_m {
        return None;
    }

    let estimated_time = match query.average_speed {
        Some(speed) if speed > 0.0 => {
            let seconds = route.distance as f64 / speed;
            if seconds > policy.max_duration_s {
                return None;
            }
            Some(seconds.round() as i64)
        }
        _ => None,
    };

    Some(RouteRecommendation {
        route_id: route.id,
        title,
        art_image: route.art_image.clone(),
        center: route.center(),
        distance: route.distance,
        distance_from_user,
        estimated_time,
        created: route.created,
    })
}

#[async_trait]
pub trait RouteStrategy: Send + Sync {
    async fn find_routes(&self, query: &RouteQuery) -> Result<Vec<RouteRecommendation>>;
}

/// Everybody else's finished routes, newest first.
pub struct OthersRoutes<'a> {
    routes: &'a dyn RouteStore,
    policy: MatchPolicy,
}

#[async_trait]
impl<'a> RouteStrategy for OthersRoutes<'a> {
    async fn find_routes(&self, query: &RouteQuery) -> Result<Vec<RouteRecommendation>> {
        let routes = self.routes.find_owned_by_others(query.user_id).await?;
        Ok(routes
            .iter()
            .filter(|route| route.title.is_some())
            .filter_map(|route| recommend(route, query, &self.policy))
            .collect())
    }
}

/// The `type` a client asks routes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStrategyKind {
    Others,
}

impl FromStr for RouteStrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<RouteStrategyKind> {
        match s {
            "others" => Ok(RouteStrategyKind::Others),
            other => Err(Error::InvalidInput(format!("unknown route type: {}", other))),
        }
    }
}

pub struct RouteService {
    stores: Stores,
    policy: MatchPolicy,
}

impl RouteService {
    pub fn new(stores: Stores, policy: MatchPolicy) -> RouteService {
        RouteService { stores, policy }
    }

    fn strategy(&self, kind: RouteStrategyKind) -> Box<dyn RouteStrategy + '_> {
        match kind {
            RouteStrategyKind::Others => Box::new(OthersRoutes { routes: self.stores.routes.as_ref(), policy: self.policy }),
        }
    }

    /// Stores a converted shape as an untitled route of `user_id`.
    pub async fn stage_route(&self, user_id: i64, positions: Vec<Coordinate>) -> Result<Route> {
        self.stores.users.find_user(user_id).await?.ok_or(Error::UserNotFound(user_id))?;
        if positions.is_empty() {
            return Err(Error::InvalidInput("a route needs at least one position".to_string()));
        }
        let route = self.stores.routes.create_route(user_id, Utc::now()).await?;
        self.stores.routes.save_positions(route.id, &positions).await?;
        info!("user {} staged route {} with {} positions", user_id, route.id, positions.len());
        Ok(route)
    }

    /// Names a staged route and fixes its center and length. From here on it
    /// is offered to other users.
    pub async fn finalize_route(&self, user_id: i64, route_id: i64, title: &str, art_image: &str) -> Result<Route> {
        let title = title.trim();
        if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
            return Err(Error::InvalidInput(format!("route title must be 1 to {} characters", MAX_TITLE_LEN)));
        }
        let route = self
            .stores
            .routes
            .find_route(route_id)
            .await?
            .filter(|route| route.user_id == user_id)
            .ok_or(Error::RouteNotFound(route_id))?;

        let positions = self.stores.routes.positions(route.id).await?;
        let (center, distance) = route_geometry(&positions)
            .ok_or_else(|| Error::InvalidInput(format!("route {} has no positions", route.id)))?;

        self.stores.routes.finalize_route(route.id, title, art_image).await?;
        self.stores.routes.update_geometry(route.id, center.lat, center.lng, distance).await?;
        info!("user {} finalized route {} ({} m)", user_id, route.id, distance);

        self.stores.routes.find_route(route.id).await?.ok_or(Error::RouteNotFound(route.id))
    }

    /// Routes `user_id` could run from `location`. When no pace is given the
    /// user's lifetime average is used.
    pub async fn find_routes(
        &self,
        kind: RouteStrategyKind,
        user_id: i64,
        location: Coordinate,
        average_speed: Option<f64>,
    ) -> Result<Vec<RouteRecommendation>> {
        self.stores.users.find_user(user_id).await?.ok_or(Error::UserNotFound(user_id))?;
        let average_speed = match average_speed {
            Some(speed) => Some(speed),
            None => self.stores.health.find_health(user_id).await?.and_then(|health| health.average_speed()),
        };

        let query = RouteQuery { user_id, location, average_speed };
        let found = self.strategy(kind).find_routes(&query).await?;
        info!("{} routes found for user {} ({:?})", found.len(), user_id, kind);
        Ok(found)
    }
}
