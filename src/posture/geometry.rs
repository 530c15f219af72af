/// Euclidean distance between two pixel points.
pub fn find_distance(p1: (i32, i32), p2: (i32, i32)) -> f64 {
    let dx = f64::from(p2.0 - p1.0);
    let dy = f64::from(p2.1 - p1.1);
    (dx * dx + dy * dy).sqrt()
}

/// Inclination in degrees of the segment `p1 -> p2` against the vertical
/// through `p1`:
///
/// `acos(((y2 - y1) * -y1) / (|p1 p2| * y1))`
///
/// The reference vertical is anchored at the image origin, so the result is
/// only meaningful for pixel coordinates and near-vertical segments. Returns
/// `None` when `y1` is zero or the points coincide.
pub fn inclination(p1: (i32, i32), p2: (i32, i32)) -> Option<f64> {
    let y1 = f64::from(p1.1);
    let y2 = f64::from(p2.1);
    let denominator = find_distance(p1, p2) * y1;
    if denominator == 0.0 {
        return None;
    }

    let cosine = ((y2 - y1) * -y1) / denominator;
    Some(cosine.clamp(-1.0, 1.0).acos().to_degrees())
}
