//! Decoded thermal frame and its upload encoding

use crate::protocol::{GRID_COLS, GRID_LEN, Grid};
use alloc::string::String;
use core::fmt::{self, Write};

/// Rough upper bound of the JSON body: "-40.00," per pixel plus envelope
pub const JSON_BODY_CAPACITY: usize = GRID_LEN * 7 + 64;

/// One validated 24x32 frame in °C with its acquisition time
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalFrame {
    temperatures: Grid,
    timestamp: u64,
}

/// Min/max/mean of a frame, used for logging
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSummary {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

impl ThermalFrame {
    /// Wrap a validated grid; `timestamp` is unix seconds
    pub fn new(temperatures: Grid, timestamp: u64) -> Self {
        Self {
            temperatures,
            timestamp,
        }
    }

    /// Row-major temperatures
    pub fn temperatures(&self) -> &Grid {
        &self.temperatures
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Temperature at `row`, `col`, if inside the grid
    pub fn pixel(&self, row: usize, col: usize) -> Option<f32> {
        if col >= GRID_COLS {
            return None;
        }
        self.temperatures.get(row * GRID_COLS + col).copied()
    }

    pub fn summary(&self) -> FrameSummary {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f32;
        for &t in self.temperatures.iter() {
            min = min.min(t);
            max = max.max(t);
            sum += t;
        }
        FrameSummary {
            min,
            max,
            mean: sum / GRID_LEN as f32,
        }
    }

    /// Write the collector body:
    /// `{"temperaturas":[t0,...,t767],"timestamp":<unix>}` with two decimals per value
    pub fn write_json<W: Write>(&self, out: &mut W) -> fmt::Result {
        out.write_str("{\"temperaturas\":[")?;
        for (i, t) in self.temperatures.iter().enumerate() {
            if i > 0 {
                out.write_char(',')?;
            }
            write!(out, "{:.2}", t)?;
        }
        write!(out, "],\"timestamp\":{}}}", self.timestamp)
    }

    /// Serialize to a heap string sized for the whole body
    pub fn to_json(&self) -> String {
        let mut body = String::with_capacity(JSON_BODY_CAPACITY);
        // Writing into a String cannot fail
        let _ = self.write_json(&mut body);
        body
    }
}
