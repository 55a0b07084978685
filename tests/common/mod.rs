#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rungogh::buffer::{MemoryPositionBuffer, PositionBuffer};
use rungogh::error::{Error, Result};
use rungogh::models::{Drawing, DrawingDetail, Health, NewDrawing, NewDrawingDetail, Position, TraceSummary};
use rungogh::processor::TraceProcessor;
use rungogh::session::{DrawingEngine, DrawingImages};
use rungogh::store::{DrawingStore, MemoryStore, Stores};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_714_554_000 + secs, 0).unwrap()
}

pub fn fix(lat: f64, lng: f64, secs: i64) -> Position {
    Position::new(lat, lng, at(secs))
}

pub fn images(n: u32) -> DrawingImages {
    DrawingImages {
        drawing_image: format!("https://img.rungogh.test/drawing-{}.png", n),
        detail_image: format!("https://img.rungogh.test/detail-{}.png", n),
    }
}

/// Always answers 120 m at 2.1 m/s and echoes the positions it was given.
#[derive(Default)]
pub struct ScriptedProcessor {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TraceProcessor for ScriptedProcessor {
    async fn process(&self, positions: &[Position]) -> Result<TraceSummary> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TraceSummary {
            average_speed: 2.1,
            distance: 120,
            elapsed_time: 57,
            normalized_positions: positions.iter().map(Position::coordinate).collect(),
        })
    }
}

pub struct FailingProcessor;

#[async_trait]
impl TraceProcessor for FailingProcessor {
    async fn process(&self, _: &[Position]) -> Result<TraceSummary> {
        Err(Error::ProcessingFailed("geometry service answered 503".to_string()))
    }
}

/// Answers like `ScriptedProcessor`, after the given delay.
pub struct SlowProcessor(pub Duration);

#[async_trait]
impl TraceProcessor for SlowProcessor {
    async fn process(&self, positions: &[Position]) -> Result<TraceSummary> {
        tokio::time::sleep(self.0).await;
        ScriptedProcessor::default().process(positions).await
    }
}

/// Drawing store whose next checkpoint write fails once.
pub struct FlakyCheckpoints {
    inner: Arc<MemoryStore>,
    fail_next: AtomicBool,
}

impl FlakyCheckpoints {
    pub fn new(inner: Arc<MemoryStore>) -> FlakyCheckpoints {
        FlakyCheckpoints { inner, fail_next: AtomicBool::new(true) }
    }
}

#[async_trait]
impl DrawingStore for FlakyCheckpoints {
    async fn create_drawing(&self, drawing: NewDrawing) -> Result<Drawing> {
        self.inner.create_drawing(drawing).await
    }

    async fn find_drawing(&self, id: i64) -> Result<Option<Drawing>> {
        self.inner.find_drawing(id).await
    }

    async fn save_drawing(&self, drawing: &Drawing) -> Result<()> {
        self.inner.save_drawing(drawing).await
    }

    async fn count_route_drawings_in_progress(&self, user_id: i64) -> Result<usize> {
        self.inner.count_route_drawings_in_progress(user_id).await
    }

    async fn add_detail(&self, detail: NewDrawingDetail) -> Result<DrawingDetail> {
        self.inner.add_detail(detail).await
    }

    async fn record_checkpoint(&self, drawing: &Drawing, detail: NewDrawingDetail, health: Option<&Health>) -> Result<DrawingDetail> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::Storage("connection reset by peer".to_string()));
        }
        self.inner.record_checkpoint(drawing, detail, health).await
    }

    async fn details(&self, drawing_id: i64) -> Result<Vec<DrawingDetail>> {
        self.inner.details(drawing_id).await
    }

    async fn count_user_details(&self, user_id: i64) -> Result<i64> {
        self.inner.count_user_details(user_id).await
    }

    async fn user_details_between(&self, user_id: i64, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<DrawingDetail>> {
        self.inner.user_details_between(user_id, from, to).await
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub buffer: Arc<MemoryPositionBuffer>,
    pub processor: Arc<ScriptedProcessor>,
    pub engine: DrawingEngine,
}

impl Harness {
    pub fn new() -> Harness {
        let processor = Arc::new(ScriptedProcessor::default());
        Harness::build(processor.clone(), processor, Duration::from_secs(1))
    }

    pub fn with_processor(processor: Arc<dyn TraceProcessor>, timeout: Duration) -> Harness {
        Harness::build(Arc::new(ScriptedProcessor::default()), processor, timeout)
    }

    fn build(scripted: Arc<ScriptedProcessor>, processor: Arc<dyn TraceProcessor>, timeout: Duration) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let buffer = Arc::new(MemoryPositionBuffer::new());
        let shared_buffer: Arc<dyn PositionBuffer> = buffer.clone();
        let engine = DrawingEngine::new(Stores::shared(store.clone()), shared_buffer, processor, timeout);
        Harness { store, buffer, processor: scripted, engine }
    }

    /// Engine whose first checkpoint write fails with a storage error.
    pub fn with_flaky_checkpoints() -> Harness {
        let processor = Arc::new(ScriptedProcessor::default());
        let store = Arc::new(MemoryStore::new());
        let buffer = Arc::new(MemoryPositionBuffer::new());
        let shared_buffer: Arc<dyn PositionBuffer> = buffer.clone();
        let mut stores = Stores::shared(store.clone());
        stores.drawings = Arc::new(FlakyCheckpoints::new(store.clone()));
        let engine = DrawingEngine::new(stores, shared_buffer, processor.clone(), Duration::from_secs(1));
        Harness { store, buffer, processor, engine }
    }

    pub fn stores(&self) -> Stores {
        Stores::shared(self.store.clone())
    }
}
