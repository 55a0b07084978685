use chrono::prelude::*;
use serde::{Deserialize, Serialize};

/// Drawings a user may have open against routes at the same time.
pub const MAX_ROUTE_DRAWINGS_IN_PROGRESS: usize = 3;

/// A raw GPS sample as reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
    pub time: DateTime<Utc>,
}

impl Position {
    pub fn new(lat: f64, lng: f64, time: DateTime<Utc>) -> Position {
        Position { lat, lng, time }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate { lat: self.lat, lng: self.lng }
    }
}

/// A point of a shape, without timing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Coordinate {
        Coordinate { lat, lng }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// Rolling exercise summary of a user, folded on every completed drawing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Health {
    pub user_id: i64,
    /// meters
    pub total_distance: i64,
    /// seconds
    pub total_time: i64,
    pub running_count: i64,
    pub total_steps: i64,
}

impl Health {
    pub fn empty(user_id: i64) -> Health {
        Health { user_id, ..Health::default() }
    }

    /// Meters per second over the whole history.
    pub fn average_speed(&self) -> Option<f64> {
        if self.total_time <= 0 {
            return None;
        }
        Some(self.total_distance as f64 / self.total_time as f64)
    }

    pub fn record_session(&mut self, summary: &TraceSummary, steps: i64, running_count: i64) {
        self.total_distance += summary.distance;
        self.total_time += summary.elapsed_time;
        self.total_steps += steps;
        self.running_count = running_count;
    }
}

/// Metrics derived from a position sequence by the trace processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSummary {
    /// meters per second
    pub average_speed: f64,
    /// meters
    pub distance: i64,
    /// seconds
    pub elapsed_time: i64,
    pub normalized_positions: Vec<Coordinate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawingMode {
    Free,
    Route,
}

impl std::str::FromStr for DrawingMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<DrawingMode, crate::Error> {
        match s {
            "free" => Ok(DrawingMode::Free),
            "route" => Ok(DrawingMode::Route),
            other => Err(crate::Error::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drawing {
    pub id: i64,
    pub user_id: i64,
    pub route_id: Option<i64>,
    pub title: Option<String>,
    pub is_completed: bool,
    pub is_published: bool,
    pub accumulated_image: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Drawing {
    /// Route-bound and still running. These count against the per-user cap.
    pub fn is_route_in_progress(&self) -> bool {
        !self.is_completed && self.title.is_some()
    }

    pub fn change_accumulated_image(&mut self, image: String, now: DateTime<Utc>) {
        self.accumulated_image = Some(image);
        self.updated = now;
    }

    pub fn complete(&mut self, title: String, image: String, now: DateTime<Utc>) {
        self.title = Some(title);
        self.is_completed = true;
        self.accumulated_image = Some(image);
        self.updated = now;
    }

    pub fn publish(&mut self) {
        self.is_published = true;
    }
}

/// Row shape for a drawing that has not been inserted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDrawing {
    pub user_id: i64,
    pub route_id: Option<i64>,
    pub title: Option<String>,
    pub created: DateTime<Utc>,
}

impl NewDrawing {
    pub fn free(user_id: i64, now: DateTime<Utc>) -> NewDrawing {
        NewDrawing { user_id, route_id: None, title: None, created: now }
    }

    pub fn on_route(user_id: i64, route: &Route, now: DateTime<Utc>) -> NewDrawing {
        NewDrawing {
            user_id,
            route_id: Some(route.id),
            title: route.title.clone(),
            created: now,
        }
    }
}

/// One checkpoint of a drawing, taken at a save or complete call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingDetail {
    pub id: i64,
    pub drawing_id: i64,
    pub distance: i64,
    pub average_speed: f64,
    pub elapsed_time: i64,
    pub image: String,
    pub positions: Vec<Coordinate>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDrawingDetail {
    pub drawing_id: i64,
    pub distance: i64,
    pub average_speed: f64,
    pub elapsed_time: i64,
    pub image: String,
    pub positions: Vec<Coordinate>,
    pub created: DateTime<Utc>,
}

impl NewDrawingDetail {
    pub fn from_summary(drawing_id: i64, summary: TraceSummary, image: String, now: DateTime<Utc>) -> NewDrawingDetail {
        NewDrawingDetail {
            drawing_id,
            distance: summary.distance,
            average_speed: summary.average_speed,
            elapsed_time: summary.elapsed_time,
            image,
            positions: summary.normalized_positions,
            created: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: i64,
    pub user_id: i64,
    pub title: Option<String>,
    pub art_image: Option<String>,
    pub center_lat: f64,
    pub center_lng: f64,
    /// meters
    pub distance: i64,
    pub created: DateTime<Utc>,
}

impl Route {
    pub fn center(&self) -> Coordinate {
        Coordinate::new(self.center_lat, self.center_lng)
    }
}
