//! Drawing sessions: start, resume, checkpoint and complete a run.
//!
//! A drawing moves from started to completed through any number of
//! checkpoints. Saving and completing share one checkpoint procedure:
//! resolve the position sequence, have the trace processor derive its
//! metrics, then persist drawing, detail and health in one store write and
//! clear the buffer. Nothing is written before that write succeeds, so a
//! failed call can be retried as is. Everything touching a user's buffer runs
//! under that user's lock.

use chrono::prelude::*;
use chrono::Duration as ChronoDuration;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::buffer::PositionBuffer;
use crate::error::{Error, Result};
use crate::models::{
    Coordinate, Drawing, DrawingMode, NewDrawing, NewDrawingDetail, Position, TraceSummary,
    MAX_ROUTE_DRAWINGS_IN_PROGRESS,
};
use crate::processor::TraceProcessor;
use crate::store::Stores;

/// Where the positions of a checkpoint come from.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionSource {
    /// What the buffer collected since the last checkpoint, followed by the
    /// fix sent along with the call.
    Live(Option<Position>),
    /// A complete trace held by the client, e.g. rebuilt after an app restart.
    Supplied(Vec<Position>),
}

/// Rendered images sent with a checkpoint, as references to stored files.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawingImages {
    pub drawing_image: String,
    pub detail_image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedDrawing {
    pub drawing_id: i64,
    pub title: Option<String>,
    pub route_positions: Vec<Coordinate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartedDrawing {
    pub title: Option<String>,
    pub drawing_positions: Vec<Coordinate>,
    pub route_positions: Vec<Coordinate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedDrawing {
    pub drawing_image: String,
    pub detail_image: String,
    pub distance: i64,
    pub average_speed: f64,
    pub elapsed_time: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawingView {
    pub id: i64,
    pub title: Option<String>,
    pub route_id: Option<i64>,
    pub is_completed: bool,
    pub is_published: bool,
    pub accumulated_image: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// Mean over all checkpoints, meters per second.
    pub average_speed: f64,
    /// Length of the followed route, 0 for free drawings.
    pub distance: i64,
}

/// Distance and time per day over the last seven days, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekExercise {
    pub distance: [i64; 7],
    pub time: [i64; 7],
}

struct Completion {
    title: String,
    steps: i64,
}

/// One async mutex per key, created on first use.
#[derive(Default)]
struct KeyedLocks {
    slots: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    async fn lock(&self, key: i64) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            // nobody holds or waits on a slot we are the only owner of
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(key).or_default().clone()
        };
        slot.lock_owned().await
    }
}

pub struct DrawingEngine {
    stores: Stores,
    buffer: Arc<dyn PositionBuffer>,
    processor: Arc<dyn TraceProcessor>,
    processor_timeout: Duration,
    /// Serializes everything that touches a user's buffer or session count.
    user_locks: KeyedLocks,
}

impl DrawingEngine {
    pub fn new(
        stores: Stores,
        buffer: Arc<dyn PositionBuffer>,
        processor: Arc<dyn TraceProcessor>,
        processor_timeout: Duration,
    ) -> DrawingEngine {
        DrawingEngine {
            stores,
            buffer,
            processor,
            processor_timeout,
            user_locks: KeyedLocks::default(),
        }
    }

    pub async fn start_drawing(
        &self,
        user_id: i64,
        mode: &str,
        initial: Position,
        route_id: Option<i64>,
    ) -> Result<StartedDrawing> {
        let mode: DrawingMode = mode.parse()?;
        self.stores.users.find_user(user_id).await?.ok_or(Error::UserNotFound(user_id))?;
        // the cap check and the insert are one step, as is the buffer reset
        let _guard = self.user_locks.lock(user_id).await;

        let now = Utc::now();
        let (drawing, route_positions) = match mode {
            DrawingMode::Free => (self.stores.drawings.create_drawing(NewDrawing::free(user_id, now)).await?, Vec::new()),
            DrawingMode::Route => {
                let route_id = route_id.ok_or(Error::RouteRequired)?;
                let in_progress = self.stores.drawings.count_route_drawings_in_progress(user_id).await?;
                if in_progress >= MAX_ROUTE_DRAWINGS_IN_PROGRESS {
                    return Err(Error::SessionLimitExceeded { user_id, limit: MAX_ROUTE_DRAWINGS_IN_PROGRESS });
                }
                let route = self
                    .stores
                    .routes
                    .find_route(route_id)
                    .await?
                    .filter(|route| route.title.is_some())
                    .ok_or(Error::RouteNotFound(route_id))?;
                let drawing = self.stores.drawings.create_drawing(NewDrawing::on_route(user_id, &route, now)).await?;
                (drawing, self.stores.routes.positions(route.id).await?)
            }
        };

        self.buffer.reset(user_id, initial).await?;
        info!("user {} started {:?} drawing {}", user_id, mode, drawing.id);

        Ok(StartedDrawing { drawing_id: drawing.id, title: drawing.title, route_positions })
    }

    /// Rebuilds what was drawn so far so the client can pick up an
    /// interrupted run. Only the buffer is touched.
    pub async fn restart_drawing(&self, user_id: i64, drawing_id: i64, resume: Position) -> Result<RestartedDrawing> {
        let _guard = self.user_locks.lock(user_id).await;
        let drawing = self.owned_drawing(user_id, drawing_id).await?;
        self.buffer.reset(user_id, resume).await?;

        let details = self.stores.drawings.details(drawing.id);
        let route_positions = async {
            match drawing.route_id {
                Some(route_id) => self.stores.routes.positions(route_id).await,
                None => Ok(Vec::new()),
            }
        };
        let (details, route_positions) = futures::try_join!(details, route_positions)?;

        let drawing_positions: Vec<Coordinate> = details.into_iter().flat_map(|detail| detail.positions).collect();
        info!(
            "user {} restarted drawing {} with {} drawn positions",
            user_id,
            drawing.id,
            drawing_positions.len()
        );

        Ok(RestartedDrawing { title: drawing.title, drawing_positions, route_positions })
    }

    /// Buffers one GPS fix of the run the user has open on `drawing_id`.
    pub async fn record_position(&self, user_id: i64, drawing_id: i64, position: Position) -> Result<()> {
        let _guard = self.user_locks.lock(user_id).await;
        let drawing = self.owned_drawing(user_id, drawing_id).await?;
        if drawing.is_completed {
            return Err(Error::DrawingAlreadyCompleted(drawing_id));
        }
        self.buffer.append(user_id, position).await?;
        debug!("user {} buffered a position for drawing {}", user_id, drawing_id);
        Ok(())
    }

    pub async fn save_drawing(
        &self,
        user_id: i64,
        drawing_id: i64,
        source: PositionSource,
        images: DrawingImages,
    ) -> Result<SavedDrawing> {
        self.checkpoint(user_id, drawing_id, source, images, None).await
    }

    pub async fn complete_drawing(
        &self,
        user_id: i64,
        drawing_id: i64,
        title: &str,
        steps: i64,
        source: PositionSource,
        images: DrawingImages,
    ) -> Result<SavedDrawing> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::InvalidInput("title must not be empty".to_string()));
        }
        if steps < 0 {
            return Err(Error::InvalidInput(format!("step count must not be negative, got {}", steps)));
        }
        let completion = Completion { title: title.to_string(), steps };
        self.checkpoint(user_id, drawing_id, source, images, Some(completion)).await
    }

    pub async fn get_drawing(&self, user_id: i64, drawing_id: i64) -> Result<DrawingView> {
        self.stores.users.find_user(user_id).await?.ok_or(Error::UserNotFound(user_id))?;
        let drawing = self.owned_drawing(user_id, drawing_id).await?;

        let details = self.stores.drawings.details(drawing.id).await?;
        let average_speed = if details.is_empty() {
            0.0
        } else {
            details.iter().map(|d| d.average_speed).sum::<f64>() / details.len() as f64
        };

        let distance = match drawing.route_id {
            Some(route_id) => self.stores.routes.find_route(route_id).await?.map_or(0, |route| route.distance),
            None => 0,
        };

        Ok(DrawingView {
            id: drawing.id,
            title: drawing.title,
            route_id: drawing.route_id,
            is_completed: drawing.is_completed,
            is_published: drawing.is_published,
            accumulated_image: drawing.accumulated_image,
            created: drawing.created,
            updated: drawing.updated,
            average_speed,
            distance,
        })
    }

    /// Puts a completed drawing on the feed. There is no way back.
    pub async fn publish_drawing(&self, user_id: i64, drawing_id: i64) -> Result<()> {
        let _guard = self.user_locks.lock(user_id).await;
        let mut drawing = self.owned_drawing(user_id, drawing_id).await?;
        if !drawing.is_completed {
            return Err(Error::DrawingNotCompleted(drawing_id));
        }
        if drawing.is_published {
            return Err(Error::AlreadyPublished(drawing_id));
        }
        drawing.publish();
        self.stores.drawings.save_drawing(&drawing).await?;
        info!("user {} published drawing {}", user_id, drawing_id);
        Ok(())
    }

    pub async fn week_exercise(&self, user_id: i64, today: NaiveDate) -> Result<WeekExercise> {
        self.stores.users.find_user(user_id).await?.ok_or(Error::UserNotFound(user_id))?;

        let first_day = today - ChronoDuration::days(6);
        let from = first_day.and_time(NaiveTime::MIN).and_utc();
        let to = (today + ChronoDuration::days(1)).and_time(NaiveTime::MIN).and_utc();
        let details = self.stores.drawings.user_details_between(user_id, from, to).await?;

        let mut week = WeekExercise { distance: [0; 7], time: [0; 7] };
        for detail in details {
            let days_ago = (today - detail.created.date_naive()).num_days();
            if !(0..7).contains(&days_ago) {
                continue;
            }
            let slot = (6 - days_ago) as usize;
            week.distance[slot] += detail.distance;
            week.time[slot] += detail.elapsed_time;
        }
        Ok(week)
    }

    async fn owned_drawing(&self, user_id: i64, drawing_id: i64) -> Result<Drawing> {
        self.stores
            .drawings
            .find_drawing(drawing_id)
            .await?
            .filter(|drawing| drawing.user_id == user_id)
            .ok_or(Error::DrawingNotFound(drawing_id))
    }

    async fn checkpoint(
        &self,
        user_id: i64,
        drawing_id: i64,
        source: PositionSource,
        images: DrawingImages,
        completion: Option<Completion>,
    ) -> Result<SavedDrawing> {
        // held from reading the buffer until it is cleared
        let _guard = self.user_locks.lock(user_id).await;

        let mut drawing = self.owned_drawing(user_id, drawing_id).await?;
        if drawing.is_completed {
            return Err(Error::DrawingAlreadyCompleted(drawing_id));
        }
        let health = if completion.is_some() {
            let health = self.stores.health.find_health(user_id).await?;
            Some(health.ok_or(Error::HealthProfileNotFound(user_id))?)
        } else {
            None
        };

        let positions = self.resolve_positions(user_id, source).await?;
        let summary = self.process(drawing_id, &positions).await?;

        let health = match (&completion, health) {
            (Some(completion), Some(mut health)) => {
                // counts the checkpoint about to be written
                let running_count = self.stores.drawings.count_user_details(user_id).await? + 1;
                health.record_session(&summary, completion.steps, running_count);
                Some(health)
            }
            _ => None,
        };

        let now = Utc::now();
        match &completion {
            Some(completion) => drawing.complete(completion.title.clone(), images.drawing_image.clone(), now),
            None => drawing.change_accumulated_image(images.drawing_image.clone(), now),
        }
        let detail = NewDrawingDetail::from_summary(drawing.id, summary.clone(), images.detail_image.clone(), now);
        self.stores.drawings.record_checkpoint(&drawing, detail, health.as_ref()).await?;
        if completion.is_some() {
            info!("user {} completed drawing {}", user_id, drawing.id);
        }

        self.buffer.clear(user_id).await?;
        info!(
            "checkpoint on drawing {}: {} m over {} positions",
            drawing.id,
            summary.distance,
            positions.len()
        );

        Ok(SavedDrawing {
            drawing_image: images.drawing_image,
            detail_image: images.detail_image,
            distance: summary.distance,
            average_speed: summary.average_speed,
            elapsed_time: summary.elapsed_time,
        })
    }

    async fn resolve_positions(&self, user_id: i64, source: PositionSource) -> Result<Vec<Position>> {
        let positions = match source {
            PositionSource::Live(current) => {
                let mut positions = self.buffer.read_all(user_id).await?;
                positions.extend(current);
                positions
            }
            PositionSource::Supplied(positions) => positions,
        };
        if positions.is_empty() {
            return Err(Error::MissingPosition);
        }
        debug!("resolved {} positions for user {}", positions.len(), user_id);
        Ok(positions)
    }

    async fn process(&self, drawing_id: i64, positions: &[Position]) -> Result<TraceSummary> {
        match tokio::time::timeout(self.processor_timeout, self.processor.process(positions)).await {
            Ok(Ok(summary)) => Ok(summary),
            Ok(Err(err)) => {
                warn!("trace processor failed for drawing {}: {}", drawing_id, err);
                match err {
                    Error::ProcessingFailed(_) => Err(err),
                    other => Err(Error::ProcessingFailed(other.to_string())),
                }
            }
            Err(_) => {
                warn!(
                    "trace processor gave no answer for drawing {} within {:?}",
                    drawing_id, self.processor_timeout
                );
                Err(Error::ProcessingFailed(format!("no answer within {:?}", self.processor_timeout)))
            }
        }
    }
}
