use crate::scale::{LinearScale, ThresholdScale};

pub const CAPTION: &str = "Higher education holders";
pub const BAR_HEIGHT: f64 = 8.0;
pub const TICK_SIZE: f64 = 13.0;
/// Offset of the legend group from the top of the map.
pub const OFFSET_Y: f64 = 40.0;

#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub low: f64,
    pub high: f64,
    pub color: &'static str,
    pub x: f64,
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegendTick {
    pub value: f64,
    pub x: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Legend {
    pub entries: Vec<LegendEntry>,
    pub ticks: Vec<LegendTick>,
    pub caption: &'static str,
    pub caption_x: f64,
}

impl Legend {
    /// One bar per bucket in ascending order, open ends clamped to the pixel
    /// scale's domain, and a labelled tick at every breakpoint.
    pub fn build(color: &ThresholdScale, x: &LinearScale) -> Self {
        let (min, max) = x.domain;
        let entries = color
            .colors()
            .iter()
            .enumerate()
            .map(|(bucket, c)| {
                let (low, high) = color.invert_extent(bucket);
                let low = low.unwrap_or(min);
                let high = high.unwrap_or(max);
                let left = x.scale_round(low);
                LegendEntry {
                    low,
                    high,
                    color: *c,
                    x: left,
                    width: x.scale_round(high) - left,
                }
            })
            .collect();

        let ticks = color
            .breakpoints()
            .iter()
            .map(|&value| LegendTick {
                value,
                x: x.scale_round(value),
                label: format!("{}%", value.round()),
            })
            .collect();

        Self {
            entries,
            ticks,
            caption: CAPTION,
            caption_x: x.range.0,
        }
    }

    pub fn education() -> Self {
        Self::build(&ThresholdScale::education(), &LinearScale::legend())
    }
}
