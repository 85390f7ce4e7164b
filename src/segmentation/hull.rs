//! Convex hull and point-to-hull distance for the point-prompt region of interest

pub(crate) type Point = (f64, f64);

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Counter-clockwise hull (Andrew's monotone chain), collinear points dropped
pub(crate) fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts: Vec<Point> = points.to_vec();
    pts.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    pts.dedup();

    if pts.len() < 3 {
        return pts;
    }

    let mut lower: Vec<Point> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<Point> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt()
}

/// Euclidean distance from `p` to a counter-clockwise hull; zero inside
pub(crate) fn distance_to_hull(hull: &[Point], p: Point) -> f64 {
    match hull {
        [] => f64::INFINITY,
        [a] => ((p.0 - a.0).powi(2) + (p.1 - a.1).powi(2)).sqrt(),
        [a, b] => distance_to_segment(p, *a, *b),
        _ => {
            let n = hull.len();
            let inside = (0..n).all(|i| cross(hull[i], hull[(i + 1) % n], p) >= 0.0);
            if inside {
                return 0.0;
            }
            (0..n)
                .map(|i| distance_to_segment(p, hull[i], hull[(i + 1) % n]))
                .fold(f64::INFINITY, f64::min)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hull_of_square_with_interior_point() {
        let pts = [(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (2.0, 2.0), (2.0, 0.0)];
        let hull = convex_hull(&pts);
        assert_eq!(hull.len(), 4);
        assert!(!hull.contains(&(2.0, 2.0)));
        assert!(!hull.contains(&(2.0, 0.0)));
    }

    #[test]
    fn test_degenerate_hulls() {
        assert_eq!(convex_hull(&[(1.0, 1.0), (1.0, 1.0)]), vec![(1.0, 1.0)]);
        assert_eq!(convex_hull(&[(3.0, 1.0), (1.0, 1.0)]).len(), 2);
        // collinear triple collapses to its endpoints
        let line = convex_hull(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
        assert_eq!(line, vec![(0.0, 0.0), (2.0, 2.0)]);
    }

    #[test]
    fn test_distance_to_hull() {
        let hull = convex_hull(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        assert!(distance_to_hull(&hull, (5.0, 5.0)).abs() < 1e-12);
        assert!((distance_to_hull(&hull, (13.0, 5.0)) - 3.0).abs() < 1e-12);
        assert!((distance_to_hull(&hull, (13.0, 14.0)) - 5.0).abs() < 1e-12);

        let single = [(2.0, 2.0)];
        assert!((distance_to_hull(&single, (5.0, 6.0)) - 5.0).abs() < 1e-12);

        let segment = [(0.0, 0.0), (10.0, 0.0)];
        assert!((distance_to_hull(&segment, (4.0, 2.0)) - 2.0).abs() < 1e-12);
    }
}
