use std::fs::File;
use std::io::{BufReader, Read};

use crate::error::{Error, Result};
use crate::models::Coordinate;

pub fn read_route_file(filename: &str) -> Result<Vec<Coordinate>> {
    let file = File::open(filename).map_err(|err| Error::InvalidInput(format!("cannot open {}: {}", filename, err)))?;
    parse_gpx(BufReader::new(file))
}

/// Reads the shape of a GPX document: every track point in order, or the
/// route points when the file carries no track.
pub fn parse_gpx<R: Read>(reader: R) -> Result<Vec<Coordinate>> {
    let gpx = gpx::read(reader).map_err(|err| Error::InvalidInput(format!("invalid GPX: {}", err)))?;

    let mut points: Vec<Coordinate> = gpx
        .tracks
        .iter()
        .flat_map(|trk| trk.segments.iter())
        .flat_map(|trkseg| trkseg.points.iter())
        .map(|trkpt| {
            let point = trkpt.point();
            Coordinate::new(point.y(), point.x())
        })
        .collect();

    if points.is_empty() {
        points = gpx
            .routes
            .iter()
            .flat_map(|rte| rte.points.iter())
            .map(|rtept| {
                let point = rtept.point();
                Coordinate::new(point.y(), point.x())
            })
            .collect();
    }

    Ok(points)
}
