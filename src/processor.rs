//! Turning a raw position sequence into distance, speed and time.
//!
//! Production talks to the geometry service over HTTP. When no service is
//! configured, `GeoTraceProcessor` computes plain geodesic figures locally.

use async_trait::async_trait;
use geo::{HaversineLength, LineString};
use log::debug;
use serde::Serialize;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::{Coordinate, Position, TraceSummary};

#[async_trait]
pub trait TraceProcessor: Send + Sync {
    async fn process(&self, positions: &[Position]) -> Result<TraceSummary>;
}

#[derive(Serialize)]
struct TraceRequest<'a> {
    positions: &'a [Position],
}

pub struct HttpTraceProcessor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTraceProcessor {
    pub fn new(base_url: &str, timeout: Duration) -> Result<HttpTraceProcessor> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::Config(format!("trace processor client: {}", err)))?;
        Ok(HttpTraceProcessor {
            client,
            endpoint: format!("{}/trace", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl TraceProcessor for HttpTraceProcessor {
    async fn process(&self, positions: &[Position]) -> Result<TraceSummary> {
        debug!("posting {} positions to {}", positions.len(), self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&TraceRequest { positions })
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<TraceSummary>().await?)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GeoTraceProcessor;

impl GeoTraceProcessor {
    pub fn summarize(positions: &[Position]) -> TraceSummary {
        let line: LineString<f64> = positions.iter().map(|p| (p.lng, p.lat)).collect::<Vec<_>>().into();
        let distance = line.haversine_length().round() as i64;

        let elapsed_time = match (positions.first(), positions.last()) {
            (Some(first), Some(last)) => last.time.signed_duration_since(first.time).num_seconds().max(0),
            _ => 0,
        };
        let average_speed = if elapsed_time > 0 {
            distance as f64 / elapsed_time as f64
        } else {
            0.0
        };

        let mut normalized_positions: Vec<Coordinate> = Vec::with_capacity(positions.len());
        for position in positions {
            let coordinate = position.coordinate();
            if normalized_positions.last() != Some(&coordinate) {
                normalized_positions.push(coordinate);
            }
        }

        TraceSummary { average_speed, distance, elapsed_time, normalized_positions }
    }
}

#[async_trait]
impl TraceProcessor for GeoTraceProcessor {
    async fn process(&self, positions: &[Position]) -> Result<TraceSummary> {
        Ok(GeoTraceProcessor::summarize(positions))
    }
}
