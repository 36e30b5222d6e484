//! Hover resolution. Pointer events come in as plain values and the tooltip
//! state comes out; nothing here touches the page.

use crate::processing::RecordIndex;
use crate::types::AttainmentRecord;
use serde::{Deserialize, Serialize};

/// Tooltip box offset from the pointer, in page pixels.
pub const OFFSET_X: f64 = -110.0;
pub const OFFSET_Y: f64 = -28.0;
pub const VISIBLE_OPACITY: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct HoverEvent {
    pub feature_id: Option<u32>,
    pub pointer_x: f64,
    pub pointer_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tooltip {
    /// `None` when the hovered county has no record; the box shows up empty.
    pub text: Option<String>,
    pub left: f64,
    pub top: f64,
    pub opacity: f64,
}

impl Tooltip {
    /// State after the pointer leaves a county.
    pub fn hidden() -> Self {
        Self { text: None, left: 0.0, top: 0.0, opacity: 0.0 }
    }

    pub fn is_visible(&self) -> bool {
        self.opacity > 0.0
    }
}

/// `"{area_name}, {state}: {bachelorsOrHigher}%"`
pub fn tooltip_text(record: &AttainmentRecord) -> String {
    format!(
        "{}, {}: {}%",
        record.area_name, record.state, record.bachelors_or_higher
    )
}

pub fn resolve(event: &HoverEvent, index: &RecordIndex) -> Tooltip {
    Tooltip {
        text: event
            .feature_id
            .and_then(|fips| index.get(fips))
            .map(tooltip_text),
        left: event.pointer_x + OFFSET_X,
        top: event.pointer_y + OFFSET_Y,
        opacity: VISIBLE_OPACITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn autauga() -> AttainmentRecord {
        AttainmentRecord {
            fips: 1001,
            state: "AL".into(),
            area_name: "Autauga County".into(),
            bachelors_or_higher: 21.4,
        }
    }

    #[test]
    fn test_hover_on_matched_county() {
        let index = RecordIndex::build(&[autauga()]);
        let tip = resolve(
            &HoverEvent { feature_id: Some(1001), pointer_x: 300.0, pointer_y: 200.0 },
            &index,
        );
        assert_eq!(tip.text.as_deref(), Some("Autauga County, AL: 21.4%"));
        assert_eq!((tip.left, tip.top), (190.0, 172.0));
        assert!(tip.is_visible());
    }

    #[test]
    fn test_hover_on_unmatched_county_is_empty() {
        let index = RecordIndex::build(&[autauga()]);
        let tip = resolve(
            &HoverEvent { feature_id: Some(9999), pointer_x: 0.0, pointer_y: 0.0 },
            &index,
        );
        assert_eq!(tip.text, None);
        assert!(tip.is_visible());
        assert!(!Tooltip::hidden().is_visible());
    }

    #[test]
    fn test_whole_percentages_have_no_decimal() {
        let mut record = autauga();
        record.bachelors_or_higher = 8.0;
        assert_eq!(tooltip_text(&record), "Autauga County, AL: 8%");
    }
}
