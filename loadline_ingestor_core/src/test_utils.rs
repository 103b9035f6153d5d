use chrono::{DateTime, Duration};
use loadline_storage::Point;

/// Generate `num_points` points, one second apart.
/// Point `i` has tag id `p{i:04}` and value `i`.
pub fn generate_points(num_points: usize) -> Vec<Point> {
    let start = DateTime::from_timestamp_millis(1633046400000).expect("valid timestamp");
    (0..num_points)
        .map(|i| {
            Point::new(
                "temperature",
                format!("p{i:04}"),
                i as f64,
                start + Duration::seconds(i as i64),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_points() {
        let points = generate_points(3);
        assert_eq!(points.len(), 3);
        assert_eq!(points[2].tag_id, "p0002");
        assert_eq!(points[2].value, 2.0);
        assert_eq!(
            (points[2].timestamp - points[0].timestamp).num_seconds(),
            2
        );
    }
}
