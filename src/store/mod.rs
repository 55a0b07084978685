//! Persistent records: users, health summaries, drawings with their
//! checkpoints, and routes with their shapes.

use async_trait::async_trait;
use chrono::prelude::*;
use std::sync::Arc;

use crate::error::Result;
use crate::DbPool;
use crate::models::{Coordinate, Drawing, DrawingDetail, Health, NewDrawing, NewDrawingDetail, Route, User};

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryStore;
pub use self::postgres::{PgPositionBuffer, PgStore};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts the user together with an empty health summary.
    async fn create_user(&self, name: &str, email: &str) -> Result<User>;
    async fn find_user(&self, id: i64) -> Result<Option<User>>;
}

#[async_trait]
pub trait HealthStore: Send + Sync {
    async fn find_health(&self, user_id: i64) -> Result<Option<Health>>;
    async fn save_health(&self, health: &Health) -> Result<()>;
}

#[async_trait]
pub trait DrawingStore: Send + Sync {
    async fn create_drawing(&self, drawing: NewDrawing) -> Result<Drawing>;
    async fn find_drawing(&self, id: i64) -> Result<Option<Drawing>>;
    /// Persists the mutable columns (title, flags, image, updated).
    async fn save_drawing(&self, drawing: &Drawing) -> Result<()>;
    /// Drawings of the user that are bound to a route and not completed yet.
    async fn count_route_drawings_in_progress(&self, user_id: i64) -> Result<usize>;

    async fn add_detail(&self, detail: NewDrawingDetail) -> Result<DrawingDetail>;
    /// Writes one checkpoint as a unit: the drawing's new state, its detail
    /// and, when the drawing completes, the owner's health summary. Either
    /// all of it lands or none of it does.
    async fn record_checkpoint(&self, drawing: &Drawing, detail: NewDrawingDetail, health: Option<&Health>) -> Result<DrawingDetail>;
    /// Checkpoints of a drawing, oldest first.
    async fn details(&self, drawing_id: i64) -> Result<Vec<DrawingDetail>>;
    /// Checkpoints across every drawing the user owns.
    async fn count_user_details(&self, user_id: i64) -> Result<i64>;
    /// Checkpoints of the user created within `[from, to)`.
    async fn user_details_between(&self, user_id: i64, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<DrawingDetail>>;
}

#[async_trait]
pub trait RouteStore: Send + Sync {
    /// Inserts an untitled route owned by `user_id`.
    async fn create_route(&self, user_id: i64, now: DateTime<Utc>) -> Result<Route>;
    async fn find_route(&self, id: i64) -> Result<Option<Route>>;
    async fn finalize_route(&self, id: i64, title: &str, art_image: &str) -> Result<()>;
    async fn update_geometry(&self, id: i64, center_lat: f64, center_lng: f64, distance: i64) -> Result<()>;
    /// Routes owned by anyone but `user_id`, newest first.
    async fn find_owned_by_others(&self, user_id: i64) -> Result<Vec<Route>>;

    async fn save_positions(&self, route_id: i64, positions: &[Coordinate]) -> Result<()>;
    /// The route's shape, empty when none was stored.
    async fn positions(&self, route_id: i64) -> Result<Vec<Coordinate>>;
}

/// The four stores the engine and the route service work against.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub health: Arc<dyn HealthStore>,
    pub drawings: Arc<dyn DrawingStore>,
    pub routes: Arc<dyn RouteStore>,
}

impl Stores {
    /// Serves all four concerns from one backend.
    pub fn shared<S>(store: Arc<S>) -> Stores
    where
        S: UserStore + HealthStore + DrawingStore + RouteStore + 'static,
    {
        Stores {
            users: store.clone(),
            health: store.clone(),
            drawings: store.clone(),
            routes: store,
        }
    }

    pub fn memory() -> Stores {
        Stores::shared(Arc::new(MemoryStore::new()))
    }

    pub fn postgres(pool: DbPool) -> Stores {
        Stores::shared(Arc::new(PgStore::new(pool)))
    }
}
