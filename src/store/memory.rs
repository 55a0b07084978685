use async_trait::async_trait;
use chrono::prelude::*;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{DrawingStore, HealthStore, RouteStore, UserStore};
use crate::error::{Error, Result};
use crate::models::{Coordinate, Drawing, DrawingDetail, Health, NewDrawing, NewDrawingDetail, Route, User};

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    users: Vec<User>,
    health: HashMap<i64, Health>,
    drawings: Vec<Drawing>,
    details: Vec<DrawingDetail>,
    routes: Vec<Route>,
    route_positions: HashMap<i64, Vec<Coordinate>>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-local store, used by the test suite and `STORAGE=memory`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, name: &str, email: &str) -> Result<User> {
        let mut tables = self.tables()?;
        let user = User { id: tables.next_id(), name: name.to_string(), email: email.to_string() };
        tables.health.insert(user.id, Health::empty(user.id));
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        Ok(self.tables()?.users.iter().find(|u| u.id == id).cloned())
    }
}

#[async_trait]
impl HealthStore for MemoryStore {
    async fn find_health(&self, user_id: i64) -> Result<Option<Health>> {
        Ok(self.tables()?.health.get(&user_id).cloned())
    }

    async fn save_health(&self, health: &Health) -> Result<()> {
        self.tables()?.health.insert(health.user_id, health.clone());
        Ok(())
    }
}

#[async_trait]
impl DrawingStore for MemoryStore {
    async fn create_drawing(&self, drawing: NewDrawing) -> Result<Drawing> {
        let mut tables = self.tables()?;
        let drawing = Drawing {
            id: tables.next_id(),
            user_id: drawing.user_id,
            route_id: drawing.route_id,
            title: drawing.title,
            is_completed: false,
            is_published: false,
            accumulated_image: None,
            created: drawing.created,
            updated: drawing.created,
        };
        tables.drawings.push(drawing.clone());
        Ok(drawing)
    }

    async fn find_drawing(&self, id: i64) -> Result<Option<Drawing>> {
        Ok(self.tables()?.drawings.iter().find(|d| d.id == id).cloned())
    }

    async fn save_drawing(&self, drawing: &Drawing) -> Result<()> {
        let mut tables = self.tables()?;
        match tables.drawings.iter_mut().find(|d| d.id == drawing.id) {
            Some(stored) => {
                *stored = drawing.clone();
                Ok(())
            }
            None => Err(Error::DrawingNotFound(drawing.id)),
        }
    }

    async fn count_route_drawings_in_progress(&self, user_id: i64) -> Result<usize> {
        let tables = self.tables()?;
        Ok(tables
            .drawings
            .iter()
            .filter(|d| d.user_id == user_id && d.is_route_in_progress())
            .count())
    }

    async fn add_detail(&self, detail: NewDrawingDetail) -> Result<DrawingDetail> {
        let mut tables = self.tables()?;
        let detail = DrawingDetail {
            id: tables.next_id(),
            drawing_id: detail.drawing_id,
            distance: detail.distance,
            average_speed: detail.average_speed,
            elapsed_time: detail.elapsed_time,
            image: detail.image,
            positions: detail.positions,
            created: detail.created,
        };
        tables.details.push(detail.clone());
        Ok(detail)
    }

    async fn record_checkpoint(&self, drawing: &Drawing, detail: NewDrawingDetail, health: Option<&Health>) -> Result<DrawingDetail> {
        let mut tables = self.tables()?;
        let slot = tables
            .drawings
            .iter()
            .position(|d| d.id == drawing.id)
            .ok_or(Error::DrawingNotFound(drawing.id))?;

        tables.drawings[slot] = drawing.clone();
        let detail = DrawingDetail {
            id: tables.next_id(),
            drawing_id: detail.drawing_id,
            distance: detail.distance,
            average_speed: detail.average_speed,
            elapsed_time: detail.elapsed_time,
            image: detail.image,
            positions: detail.positions,
            created: detail.created,
        };
        tables.details.push(detail.clone());
        if let Some(health) = health {
            tables.health.insert(health.user_id, health.clone());
        }
        Ok(detail)
    }

    async fn details(&self, drawing_id: i64) -> Result<Vec<DrawingDetail>> {
        let tables = self.tables()?;
        Ok(tables.details.iter().filter(|d| d.drawing_id == drawing_id).cloned().collect())
    }

    async fn count_user_details(&self, user_id: i64) -> Result<i64> {
        let tables = self.tables()?;
        let count = tables
            .details
            .iter()
            .filter(|detail| tables.drawings.iter().any(|d| d.id == detail.drawing_id && d.user_id == user_id))
            .count();
        Ok(count as i64)
    }

    async fn user_details_between(&self, user_id: i64, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<DrawingDetail>> {
        let tables = self.tables()?;
        Ok(tables
            .details
            .iter()
            .filter(|detail| detail.created >= from && detail.created < to)
            .filter(|detail| tables.drawings.iter().any(|d| d.id == detail.drawing_id && d.user_id == user_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RouteStore for MemoryStore {
    async fn create_route(&self, user_id: i64, now: DateTime<Utc>) -> Result<Route> {
        let mut tables = self.tables()?;
        let route = Route {
            id: tables.next_id(),
            user_id,
            title: None,
            art_image: None,
            center_lat: 0.0,
            center_lng: 0.0,
            distance: 0,
            created: now,
        };
        tables.routes.push(route.clone());
        Ok(route)
    }

    async fn find_route(&self, id: i64) -> Result<Option<Route>> {
        Ok(self.tables()?.routes.iter().find(|r| r.id == id).cloned())
    }

    async fn finalize_route(&self, id: i64, title: &str, art_image: &str) -> Result<()> {
        let mut tables = self.tables()?;
        let route = tables.routes.iter_mut().find(|r| r.id == id).ok_or(Error::RouteNotFound(id))?;
        route.title = Some(title.to_string());
        route.art_image = Some(art_image.to_string());
        Ok(())
    }

    async fn update_geometry(&self, id: i64, center_lat: f64, center_lng: f64, distance: i64) -> Result<()> {
        let mut tables = self.tables()?;
        let route = tables.routes.iter_mut().find(|r| r.id == id).ok_or(Error::RouteNotFound(id))?;
        route.center_lat = center_lat;
        route.center_lng = center_lng;
        route.distance = distance;
        Ok(())
    }

    async fn find_owned_by_others(&self, user_id: i64) -> Result<Vec<Route>> {
        let tables = self.tables()?;
        let mut routes: Vec<Route> = tables.routes.iter().filter(|r| r.user_id != user_id).cloned().collect();
        // newest first; ids break ties between routes created in the same instant
        routes.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        Ok(routes)
    }

    async fn save_positions(&self, route_id: i64, positions: &[Coordinate]) -> Result<()> {
        self.tables()?.route_positions.insert(route_id, positions.to_vec());
        Ok(())
    }

    async fn positions(&self, route_id: i64) -> Result<Vec<Coordinate>> {
        Ok(self.tables()?.route_positions.get(&route_id).cloned().unwrap_or_default())
    }
}
