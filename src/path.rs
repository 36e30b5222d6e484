//! SVG path data for already-projected geometry.
//!
//! Coordinates are written as-is: the county topology is pre-projected into
//! the 960x600 viewport.

use geo::{LineString, MultiLineString, MultiPolygon};
use std::fmt::Write;

pub fn polygons(mp: &MultiPolygon<f64>) -> String {
    let mut out = String::new();
    for polygon in mp {
        write_ring(&mut out, polygon.exterior());
        for interior in polygon.interiors() {
            write_ring(&mut out, interior);
        }
    }
    out
}

pub fn lines(ml: &MultiLineString<f64>) -> String {
    let mut out = String::new();
    for line in ml {
        write_points(&mut out, line.coords().map(|c| (c.x, c.y)));
    }
    out
}

/// Rings are closed with `Z`, so the repeated first point is left out.
fn write_ring(out: &mut String, ring: &LineString<f64>) {
    let coords = &ring.0;
    let open = match (coords.first(), coords.last()) {
        (Some(first), Some(last)) if coords.len() > 1 && first == last => &coords[..coords.len() - 1],
        _ => &coords[..],
    };
    if open.is_empty() {
        return;
    }
    write_points(out, open.iter().map(|c| (c.x, c.y)));
    out.push('Z');
}

fn write_points(out: &mut String, points: impl Iterator<Item = (f64, f64)>) {
    for (i, (x, y)) in points.enumerate() {
        let cmd = if i == 0 { 'M' } else { 'L' };
        let _ = write!(out, "{cmd}{x},{y}");
    }
}
