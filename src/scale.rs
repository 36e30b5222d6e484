//! Threshold and linear scales for the attainment encoding.

/// Lowest attainment percentage the color encoding is designed for.
pub const DOMAIN_MIN: f64 = 2.6;
/// Highest attainment percentage the color encoding is designed for.
pub const DOMAIN_MAX: f64 = 75.1;
/// Number of interior breakpoints; one more bucket than this.
pub const BREAKPOINTS: usize = 8;

/// Nine-step sequential blues, light to dark.
pub const BLUES: [&str; BREAKPOINTS + 1] = [
    "#f7fbff", "#deebf7", "#c6dbef", "#9ecae1", "#6baed6", "#4292c6", "#2171b5", "#08519c",
    "#08306b",
];

/// Step function from a value to one of `breakpoints.len() + 1` colors.
///
/// Buckets are half-open: a value below `breakpoints[0]` is bucket 0, a value
/// in `[breakpoints[k], breakpoints[k + 1])` is bucket `k + 1`, and anything at
/// or above the last breakpoint lands in the last bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdScale {
    breakpoints: Vec<f64>,
    colors: Vec<&'static str>,
}

impl ThresholdScale {
    /// The fixed education scale: 8 breakpoints from 2.6 in steps of (75.1 - 2.6) / 8.
    pub fn education() -> Self {
        let step = (DOMAIN_MAX - DOMAIN_MIN) / BREAKPOINTS as f64;
        let breakpoints = (0..BREAKPOINTS)
            .map(|k| DOMAIN_MIN + k as f64 * step)
            .collect();
        Self {
            breakpoints,
            colors: BLUES.to_vec(),
        }
    }

    pub fn breakpoints(&self) -> &[f64] {
        &self.breakpoints
    }

    pub fn colors(&self) -> &[&'static str] {
        &self.colors
    }

    /// `None` only for NaN, which has no place on the scale.
    pub fn bucket_of(&self, value: f64) -> Option<usize> {
        if value.is_nan() {
            return None;
        }
        Some(self.breakpoints.partition_point(|b| *b <= value))
    }

    pub fn color_of(&self, value: f64) -> Option<&'static str> {
        self.bucket_of(value).map(|b| self.colors[b])
    }

    /// The `[low, high)` values mapping to `bucket`. The first bucket has no
    /// lower bound and the last has no upper bound.
    pub fn invert_extent(&self, bucket: usize) -> (Option<f64>, Option<f64>) {
        if bucket >= self.colors.len() {
            return (None, None);
        }
        let low = bucket.checked_sub(1).and_then(|i| self.breakpoints.get(i)).copied();
        let high = self.breakpoints.get(bucket).copied();
        (low, high)
    }
}

/// Continuous mapping from values to pixels, used to lay out the legend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    pub domain: (f64, f64),
    pub range: (f64, f64),
}

impl LinearScale {
    pub fn legend() -> Self {
        Self {
            domain: (DOMAIN_MIN, DOMAIN_MAX),
            range: (600.0, 860.0),
        }
    }

    pub fn scale(&self, value: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        let t = if d1 == d0 { 0.5 } else { (value - d0) / (d1 - d0) };
        r0 * (1.0 - t) + r1 * t
    }

    /// Pixel position rounded half-up.
    pub fn scale_round(&self, value: f64) -> f64 {
        (self.scale(value) + 0.5).floor()
    }
}
