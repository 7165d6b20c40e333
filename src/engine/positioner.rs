//! Lane and offset layout for the items of one period
//!
//! Items are sorted by timestamp (stable) and dealt round-robin onto
//! `floor(height / line_height)` lanes. Horizontal offset is proportional to
//! the item's distance from the period start.
//!
//! Malformed geometry never errors:
//! - zero lanes (viewport shorter than a line) puts every item in lane 0
//! - an empty or inverted period puts every item at offset 0

use std::sync::Arc;

use super::{PositionedItem, RawItem};

/// Number of lanes that fit in `height`
pub fn lane_count(height: f64, line_height: f64) -> usize {
    if !(line_height > 0.0) || !(height > 0.0) {
        return 0;
    }
    // Float-to-int casts saturate, NaN/inf are handled above
    (height / line_height).floor() as usize
}

/// Compute lane and horizontal offset for every item of a period
///
/// `width` is the width of the surface the period is drawn on. Output order
/// is the timestamp sort order; use `item.id` to recover identity.
pub fn position<C>(
    items: &[Arc<RawItem<C>>],
    period_start: i64,
    period_end: i64,
    width: f64,
    height: f64,
    line_height: f64,
    font_size: f64,
) -> Vec<PositionedItem<C>> {
    let lanes = lane_count(height, line_height);
    let span = period_end - period_start;
    let px_per_ms = if span > 0 { width / span as f64 } else { 0.0 };

    let mut sorted: Vec<&Arc<RawItem<C>>> = items.iter().collect();
    sorted.sort_by_key(|item| item.timestamp);

    sorted
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let lane = if lanes == 0 { 0 } else { i % lanes };
            PositionedItem {
                item: Arc::clone(item),
                lane,
                horizontal_offset: (item.timestamp - period_start) as f64 * px_per_ms,
                top: lane as f64 * line_height,
                line_height,
                font_size,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(timestamps: &[i64]) -> Vec<Arc<RawItem<String>>> {
        timestamps
            .iter()
            .enumerate()
            .map(|(i, ts)| Arc::new(RawItem::new(i as i64, *ts, format!("item {}", i))))
            .collect()
    }

    #[test]
    fn test_lanes_round_robin_after_sort() {
        let input = items(&[300, 100, 200, 0]);
        // 75 / 25 = 3 lanes, so the fourth item wraps
        let out = position(&input, 0, 1000, 1000.0, 75.0, 25.0, 16.0);

        let ts: Vec<i64> = out.iter().map(|p| p.item.timestamp).collect();
        assert_eq!(ts, vec![0, 100, 200, 300]);
        let lanes: Vec<usize> = out.iter().map(|p| p.lane).collect();
        assert_eq!(lanes, vec![0, 1, 2, 0]);
        assert_eq!(out[2].top, 50.0);
    }

    #[test]
    fn test_horizontal_offset_is_time_proportional() {
        let input = items(&[10_500, 12_000]);
        let out = position(&input, 10_000, 20_000, 3000.0, 100.0, 20.0, 14.0);
        assert_eq!(out[0].horizontal_offset, 150.0);
        assert_eq!(out[1].horizontal_offset, 600.0);
    }

    #[test]
    fn test_ties_keep_original_order() {
        let input = items(&[50, 50, 50]);
        let out = position(&input, 0, 100, 100.0, 100.0, 10.0, 10.0);
        let ids: Vec<i64> = out.iter().map(|p| p.item.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_zero_lanes_maps_everything_to_lane_zero() {
        let input = items(&[0, 1, 2]);
        let out = position(&input, 0, 100, 100.0, 10.0, 20.0, 10.0);
        assert!(out.iter().all(|p| p.lane == 0));
    }

    #[test]
    fn test_degenerate_geometry_does_not_panic() {
        let input = items(&[5, 1]);
        let out = position(&input, 100, 100, f64::NAN, -5.0, 0.0, 0.0);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|p| p.lane == 0 && p.horizontal_offset == 0.0));
    }

    #[test]
    fn test_lane_count() {
        assert_eq!(lane_count(100.0, 30.0), 3);
        assert_eq!(lane_count(29.0, 30.0), 0);
        assert_eq!(lane_count(100.0, 0.0), 0);
        assert_eq!(lane_count(f64::NAN, 10.0), 0);
    }
}
