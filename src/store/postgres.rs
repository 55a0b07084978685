//! Postgres/PostGIS backend.
//!
//! The driver is synchronous, so every call checks a connection out of the
//! r2d2 pool on a blocking thread and hands the result back to the caller's
//! task.

use async_trait::async_trait;
use chrono::prelude::*;
use postgis::ewkb;
use ::postgres::{Client, Row};

use super::{DrawingStore, HealthStore, RouteStore, UserStore};
use crate::buffer::PositionBuffer;
use crate::error::{Error, Result};
use crate::models::{Coordinate, Drawing, DrawingDetail, Health, NewDrawing, NewDrawingDetail, Position, Route, User};
use crate::DbPool;

const SRID: i32 = 4326;

const SCHEMA: &str = "
CREATE EXTENSION IF NOT EXISTS postgis;

CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS health (
    user_id BIGINT PRIMARY KEY REFERENCES users (id) ON DELETE CASCADE,
    total_distance BIGINT NOT NULL DEFAULT 0,
    total_time BIGINT NOT NULL DEFAULT 0,
    running_count BIGINT NOT NULL DEFAULT 0,
    total_steps BIGINT NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS routes (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    title TEXT,
    art_image TEXT,
    center_lat DOUBLE PRECISION NOT NULL DEFAULT 0,
    center_lng DOUBLE PRECISION NOT NULL DEFAULT 0,
    distance BIGINT NOT NULL DEFAULT 0,
    geom geometry(MultiPoint, 4326),
    created TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS drawings (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    route_id BIGINT REFERENCES routes (id) ON DELETE SET NULL,
    title TEXT,
    is_completed BOOLEAN NOT NULL DEFAULT FALSE,
    is_published BOOLEAN NOT NULL DEFAULT FALSE,
    accumulated_image TEXT,
    created TIMESTAMPTZ NOT NULL,
    updated TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS drawing_details (
    id BIGSERIAL PRIMARY KEY,
    drawing_id BIGINT NOT NULL REFERENCES drawings (id) ON DELETE CASCADE,
    distance BIGINT NOT NULL,
    average_speed DOUBLE PRECISION NOT NULL,
    elapsed_time BIGINT NOT NULL,
    image TEXT NOT NULL,
    geom geometry(MultiPoint, 4326),
    created TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS running_positions (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL,
    lat DOUBLE PRECISION NOT NULL,
    lng DOUBLE PRECISION NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS running_positions_user_idx ON running_positions (user_id, id);
CREATE INDEX IF NOT EXISTS drawing_details_drawing_idx ON drawing_details (drawing_id, id);
";

pub fn create_db(db: &mut Client) -> Result<()> {
    db.batch_execute(SCHEMA)?;
    Ok(())
}

pub fn empty_db(db: &mut Client) -> Result<()> {
    db.batch_execute(
        "DROP TABLE IF EXISTS running_positions, drawing_details, drawings, routes, health, users CASCADE",
    )?;
    Ok(())
}

fn to_multipoint(positions: &[Coordinate]) -> ewkb::MultiPoint {
    ewkb::MultiPoint {
        points: positions.iter().map(|c| ewkb::Point::new(c.lng, c.lat, Some(SRID))).collect(),
        srid: Some(SRID),
    }
}

fn from_multipoint(geom: Option<ewkb::MultiPoint>) -> Vec<Coordinate> {
    geom.map(|mp| mp.points.iter().map(|p| Coordinate::new(p.y, p.x)).collect())
        .unwrap_or_default()
}

fn drawing_from_row(row: &Row) -> Drawing {
    Drawing {
        id: row.get("id"),
        user_id: row.get("user_id"),
        route_id: row.get("route_id"),
        title: row.get("title"),
        is_completed: row.get("is_completed"),
        is_published: row.get("is_published"),
        accumulated_image: row.get("accumulated_image"),
        created: row.get("created"),
        updated: row.get("updated"),
    }
}

fn detail_from_row(row: &Row) -> DrawingDetail {
    DrawingDetail {
        id: row.get("id"),
        drawing_id: row.get("drawing_id"),
        distance: row.get("distance"),
        average_speed: row.get("average_speed"),
        elapsed_time: row.get("elapsed_time"),
        image: row.get("image"),
        positions: from_multipoint(row.get("geom")),
        created: row.get("created"),
    }
}

fn route_from_row(row: &Row) -> Route {
    Route {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        art_image: row.get("art_image"),
        center_lat: row.get("center_lat"),
        center_lng: row.get("center_lng"),
        distance: row.get("distance"),
        created: row.get("created"),
    }
}

const DRAWING_COLUMNS: &str =
    "id, user_id, route_id, title, is_completed, is_published, accumulated_image, created, updated";
const DETAIL_COLUMNS: &str = "id, drawing_id, distance, average_speed, elapsed_time, image, geom, created";
const ROUTE_COLUMNS: &str = "id, user_id, title, art_image, center_lat, center_lng, distance, created";

async fn blocking<T, F>(pool: &DbPool, f: F) -> Result<T>
where
    F: FnOnce(&mut Client) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut db = pool.get()?;
        f(&mut db)
    })
    .await?
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> PgStore {
        PgStore { pool }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, name: &str, email: &str) -> Result<User> {
        let (name, email) = (name.to_string(), email.to_string());
        blocking(&self.pool, move |db| {
            let mut tx = db.transaction()?;
            let row = tx.query_one("INSERT INTO users (name, email) VALUES ($1, $2) RETURNING id", &[&name, &email])?;
            let id: i64 = row.get(0);
            tx.execute("INSERT INTO health (user_id) VALUES ($1)", &[&id])?;
            tx.commit()?;
            Ok(User { id, name, email })
        })
        .await
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        blocking(&self.pool, move |db| {
            let row = db.query_opt("SELECT id, name, email FROM users WHERE id = $1", &[&id])?;
            Ok(row.map(|row| User { id: row.get("id"), name: row.get("name"), email: row.get("email") }))
        })
        .await
    }
}

#[async_trait]
impl HealthStore for PgStore {
    async fn find_health(&self, user_id: i64) -> Result<Option<Health>> {
        blocking(&self.pool, move |db| {
            let row = db.query_opt(
                "SELECT user_id, total_distance, total_time, running_count, total_steps FROM health WHERE user_id = $1",
                &[&user_id],
            )?;
            Ok(row.map(|row| Health {
                user_id: row.get("user_id"),
                total_distance: row.get("total_distance"),
                total_time: row.get("total_time"),
                running_count: row.get("running_count"),
                total_steps: row.get("total_steps"),
            }))
        })
        .await
    }

    async fn save_health(&self, health: &Health) -> Result<()> {
        let health = health.clone();
        blocking(&self.pool, move |db| {
            db.execute(
                "INSERT INTO health (user_id, total_distance, total_time, running_count, total_steps)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (user_id) DO UPDATE SET
                    total_distance = EXCLUDED.total_distance,
                    total_time = EXCLUDED.total_time,
                    running_count = EXCLUDED.running_count,
                    total_steps = EXCLUDED.total_steps",
                &[&health.user_id, &health.total_distance, &health.total_time, &health.running_count, &health.total_steps],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl DrawingStore for PgStore {
    async fn create_drawing(&self, drawing: NewDrawing) -> Result<Drawing> {
        blocking(&self.pool, move |db| {
            let row = db.query_one(
                format!(
                    "INSERT INTO drawings (user_id, route_id, title, created, updated)
                     VALUES ($1, $2, $3, $4, $4) RETURNING {}",
                    DRAWING_COLUMNS
                )
                .as_str(),
                &[&drawing.user_id, &drawing.route_id, &drawing.title, &drawing.created],
            )?;
            Ok(drawing_from_row(&row))
        })
        .await
    }

    async fn find_drawing(&self, id: i64) -> Result<Option<Drawing>> {
        blocking(&self.pool, move |db| {
            let row = db.query_opt(format!("SELECT {} FROM drawings WHERE id = $1", DRAWING_COLUMNS).as_str(), &[&id])?;
            Ok(row.as_ref().map(drawing_from_row))
        })
        .await
    }

    async fn save_drawing(&self, drawing: &Drawing) -> Result<()> {
        let drawing = drawing.clone();
        blocking(&self.pool, move |db| {
            let updated = db.execute(
                "UPDATE drawings
                 SET title = $2, is_completed = $3, is_published = $4, accumulated_image = $5, updated = $6
                 WHERE id = $1",
                &[
                    &drawing.id,
                    &drawing.title,
                    &drawing.is_completed,
                    &drawing.is_published,
                    &drawing.accumulated_image,
                    &drawing.updated,
                ],
            )?;
            if updated == 0 {
                return Err(Error::DrawingNotFound(drawing.id));
            }
            Ok(())
        })
        .await
    }

    async fn count_route_drawings_in_progress(&self, user_id: i64) -> Result<usize> {
        blocking(&self.pool, move |db| {
            let row = db.query_one(
                "SELECT COUNT(*) FROM drawings WHERE user_id = $1 AND is_completed = FALSE AND title IS NOT NULL",
                &[&user_id],
            )?;
            let count: i64 = row.get(0);
            Ok(count as usize)
        })
        .await
    }

    async fn add_detail(&self, detail: NewDrawingDetail) -> Result<DrawingDetail> {
        blocking(&self.pool, move |db| {
            let geom = to_multipoint(&detail.positions);
            let row = db.query_one(
                format!(
                    "INSERT INTO drawing_details (drawing_id, distance, average_speed, elapsed_time, image, geom, created)
                     VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
                    DETAIL_COLUMNS
                )
                .as_str(),
                &[
                    &detail.drawing_id,
                    &detail.distance,
                    &detail.average_speed,
                    &detail.elapsed_time,
                    &detail.image,
                    &geom,
                    &detail.created,
                ],
            )?;
            Ok(detail_from_row(&row))
        })
        .await
    }

    async fn record_checkpoint(&self, drawing: &Drawing, detail: NewDrawingDetail, health: Option<&Health>) -> Result<DrawingDetail> {
        let (drawing, health) = (drawing.clone(), health.cloned());
        blocking(&self.pool, move |db| {
            let mut tx = db.transaction()?;
            let updated = tx.execute(
                "UPDATE drawings
                 SET title = $2, is_completed = $3, is_published = $4, accumulated_image = $5, updated = $6
                 WHERE id = $1",
                &[
                    &drawing.id,
                    &drawing.title,
                    &drawing.is_completed,
                    &drawing.is_published,
                    &drawing.accumulated_image,
                    &drawing.updated,
                ],
            )?;
            if updated == 0 {
                return Err(Error::DrawingNotFound(drawing.id));
            }

            let geom = to_multipoint(&detail.positions);
            let row = tx.query_one(
                format!(
                    "INSERT INTO drawing_details (drawing_id, distance, average_speed, elapsed_time, image, geom, created)
                     VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
                    DETAIL_COLUMNS
                )
                .as_str(),
                &[
                    &detail.drawing_id,
                    &detail.distance,
                    &detail.average_speed,
                    &detail.elapsed_time,
                    &detail.image,
                    &geom,
                    &detail.created,
                ],
            )?;

            if let Some(health) = health {
                tx.execute(
                    "INSERT INTO health (user_id, total_distance, total_time, running_count, total_steps)
                     VALUES ($1, $2, $3, $4, $5)
                     ON CONFLICT (user_id) DO UPDATE SET
                        total_distance = EXCLUDED.total_distance,
                        total_time = EXCLUDED.total_time,
                        running_count = EXCLUDED.running_count,
                        total_steps = EXCLUDED.total_steps",
                    &[&health.user_id, &health.total_distance, &health.total_time, &health.running_count, &health.total_steps],
                )?;
            }

            tx.commit()?;
            Ok(detail_from_row(&row))
        })
        .await
    }

    async fn details(&self, drawing_id: i64) -> Result<Vec<DrawingDetail>> {
        blocking(&self.pool, move |db| {
            let rows = db.query(
                format!("SELECT {} FROM drawing_details WHERE drawing_id = $1 ORDER BY id", DETAIL_COLUMNS).as_str(),
                &[&drawing_id],
            )?;
            Ok(rows.iter().map(detail_from_row).collect())
        })
        .await
    }

    async fn count_user_details(&self, user_id: i64) -> Result<i64> {
        blocking(&self.pool, move |db| {
            let row = db.query_one(
                "SELECT COUNT(dd.id) FROM drawing_details dd
                 INNER JOIN drawings d ON d.id = dd.drawing_id
                 WHERE d.user_id = $1",
                &[&user_id],
            )?;
            Ok(row.get(0))
        })
        .await
    }

    async fn user_details_between(&self, user_id: i64, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<DrawingDetail>> {
        blocking(&self.pool, move |db| {
            let rows = db.query(
                "SELECT dd.id, dd.drawing_id, dd.distance, dd.average_speed, dd.elapsed_time, dd.image, dd.geom, dd.created
                 FROM drawing_details dd
                 INNER JOIN drawings d ON d.id = dd.drawing_id
                 WHERE d.user_id = $1 AND dd.created >= $2 AND dd.created < $3
                 ORDER BY dd.id",
                &[&user_id, &from, &to],
            )?;
            Ok(rows.iter().map(detail_from_row).collect())
        })
        .await
    }
}

#[async_trait]
impl RouteStore for PgStore {
    async fn create_route(&self, user_id: i64, now: DateTime<Utc>) -> Result<Route> {
        blocking(&self.pool, move |db| {
            let row = db.query_one(
                format!("INSERT INTO routes (user_id, created) VALUES ($1, $2) RETURNING {}", ROUTE_COLUMNS).as_str(),
                &[&user_id, &now],
            )?;
            Ok(route_from_row(&row))
        })
        .await
    }

    async fn find_route(&self, id: i64) -> Result<Option<Route>> {
        blocking(&self.pool, move |db| {
            let row = db.query_opt(format!("SELECT {} FROM routes WHERE id = $1", ROUTE_COLUMNS).as_str(), &[&id])?;
            Ok(row.as_ref().map(route_from_row))
        })
        .await
    }

    async fn finalize_route(&self, id: i64, title: &str, art_image: &str) -> Result<()> {
        let (title, art_image) = (title.to_string(), art_image.to_string());
        blocking(&self.pool, move |db| {
            let updated = db.execute("UPDATE routes SET title = $2, art_image = $3 WHERE id = $1", &[&id, &title, &art_image])?;
            if updated == 0 {
                return Err(Error::RouteNotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn update_geometry(&self, id: i64, center_lat: f64, center_lng: f64, distance: i64) -> Result<()> {
        blocking(&self.pool, move |db| {
            let updated = db.execute(
                "UPDATE routes SET center_lat = $2, center_lng = $3, distance = $4 WHERE id = $1",
                &[&id, &center_lat, &center_lng, &distance],
            )?;
            if updated == 0 {
                return Err(Error::RouteNotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn find_owned_by_others(&self, user_id: i64) -> Result<Vec<Route>> {
        blocking(&self.pool, move |db| {
            let rows = db.query(
                format!("SELECT {} FROM routes WHERE user_id <> $1 ORDER BY created DESC, id DESC", ROUTE_COLUMNS).as_str(),
                &[&user_id],
            )?;
            Ok(rows.iter().map(route_from_row).collect())
        })
        .await
    }

    async fn save_positions(&self, route_id: i64, positions: &[Coordinate]) -> Result<()> {
        let geom = to_multipoint(positions);
        blocking(&self.pool, move |db| {
            let updated = db.execute("UPDATE routes SET geom = $2 WHERE id = $1", &[&route_id, &geom])?;
            if updated == 0 {
                return Err(Error::RouteNotFound(route_id));
            }
            Ok(())
        })
        .await
    }

    async fn positions(&self, route_id: i64) -> Result<Vec<Coordinate>> {
        blocking(&self.pool, move |db| {
            let row = db.query_opt("SELECT geom FROM routes WHERE id = $1", &[&route_id])?;
            Ok(row.map(|row| from_multipoint(row.get("geom"))).unwrap_or_default())
        })
        .await
    }
}

/// Position buffer kept in the `running_positions` table, ordered by insert id.
#[derive(Clone)]
pub struct PgPositionBuffer {
    pool: DbPool,
}

impl PgPositionBuffer {
    pub fn new(pool: DbPool) -> PgPositionBuffer {
        PgPositionBuffer { pool }
    }
}

#[async_trait]
impl PositionBuffer for PgPositionBuffer {
    async fn append(&self, user_id: i64, position: Position) -> Result<()> {
        blocking(&self.pool, move |db| {
            db.execute(
                "INSERT INTO running_positions (user_id, lat, lng, recorded_at) VALUES ($1, $2, $3, $4)",
                &[&user_id, &position.lat, &position.lng, &position.time],
            )?;
            Ok(())
        })
        .await
    }

    async fn read_all(&self, user_id: i64) -> Result<Vec<Position>> {
        blocking(&self.pool, move |db| {
            let rows = db.query(
                "SELECT lat, lng, recorded_at FROM running_positions WHERE user_id = $1 ORDER BY id",
                &[&user_id],
            )?;
            Ok(rows
                .iter()
                .map(|row| Position::new(row.get("lat"), row.get("lng"), row.get("recorded_at")))
                .collect())
        })
        .await
    }

    async fn clear(&self, user_id: i64) -> Result<()> {
        blocking(&self.pool, move |db| {
            db.execute("DELETE FROM running_positions WHERE user_id = $1", &[&user_id])?;
            Ok(())
        })
        .await
    }

    async fn reset(&self, user_id: i64, position: Position) -> Result<()> {
        blocking(&self.pool, move |db| {
            let mut tx = db.transaction()?;
            tx.execute("DELETE FROM running_positions WHERE user_id = $1", &[&user_id])?;
            tx.execute(
                "INSERT INTO running_positions (user_id, lat, lng, recorded_at) VALUES ($1, $2, $3, $4)",
                &[&user_id, &position.lat, &position.lng, &position.time],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
