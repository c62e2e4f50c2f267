use crate::module::Configuration;

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn lerp(a: &[f64], b: &[f64], frac: f64) -> Configuration {
    a.iter().zip(b).map(|(x, y)| x + (y - x) * frac).collect()
}

/// Resamples a raw waypoint path to exactly `count` waypoints spaced evenly in arc
/// length. First and last waypoints are kept exactly; a path that already has `count`
/// waypoints is copied unchanged. With `count == 1` only the first waypoint is kept.
#[must_use]
pub fn resample_path(raw: &[Configuration], count: usize) -> Vec<Configuration> {
    if count == 0 || raw.is_empty() {
        return Vec::new();
    }
    if raw.len() == count {
        return raw.to_vec();
    }
    let first = &raw[0];
    let last = &raw[raw.len() - 1];
    if count == 1 {
        return vec![first.clone()];
    }

    let mut cumulative = Vec::with_capacity(raw.len());
    let mut total = 0.0;
    cumulative.push(0.0);
    for pair in raw.windows(2) {
        total += distance(&pair[0], &pair[1]);
        cumulative.push(total);
    }

    let mut out = Vec::with_capacity(count);
    out.push(first.clone());
    if total <= f64::EPSILON {
        out.extend((1..count - 1).map(|_| first.clone()));
        out.push(last.clone());
        return out;
    }

    #[allow(clippy::cast_precision_loss)]
    let step = total / (count - 1) as f64;
    let mut segment = 0;
    for k in 1..count - 1 {
        #[allow(clippy::cast_precision_loss)]
        let target = step * k as f64;
        while segment + 2 < cumulative.len() && cumulative[segment + 1] < target {
            segment += 1;
        }
        let length = cumulative[segment + 1] - cumulative[segment];
        let frac = if length > 0.0 {
            ((target - cumulative[segment]) / length).clamp(0.0, 1.0)
        } else {
            0.0
        };
        out.push(lerp(&raw[segment], &raw[segment + 1], frac));
    }
    out.push(last.clone());
    out
}

/// Straight line from `start` to `end` in `steps` equal increments; returns
/// `steps + 1` configurations, both endpoints included.
#[must_use]
pub fn linear_interpolation(start: &[f64], end: &[f64], steps: usize) -> Vec<Configuration> {
    if steps == 0 {
        return vec![start.to_vec()];
    }
    (0..=steps)
        .map(|i| {
            if i == steps {
                end.to_vec()
            } else {
                #[allow(clippy::cast_precision_loss)]
                let frac = i as f64 / steps as f64;
                lerp(start, end, frac)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: &[f64], b: &[f64]) -> bool {
        distance(a, b) < 1e-9
    }

    fn raw() -> Vec<Configuration> {
        vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![1.0, 0.5],
            vec![1.0, 3.0],
        ]
    }

    #[test]
    fn returns_exact_count_and_keeps_endpoints() {
        let raw = raw();
        for count in [2, 3, 5, 7, 20] {
            let out = resample_path(&raw, count);
            assert_eq!(out.len(), count);
            assert_eq!(out[0], raw[0]);
            assert_eq!(out[count - 1], raw[3]);
        }
    }

    #[test]
    fn copies_when_count_matches() {
        let raw = raw();
        assert_eq!(resample_path(&raw, raw.len()), raw);
    }

    #[test]
    fn spacing_is_uniform_in_arc_length() {
        let out = resample_path(&raw(), 5);
        // total length 4.0, one unit per step
        assert!(close(&out[1], &[1.0, 0.0]));
        assert!(close(&out[2], &[1.0, 1.0]));
        assert!(close(&out[3], &[1.0, 2.0]));
    }

    #[test]
    fn upsamples_two_point_path() {
        let out = resample_path(&[vec![0.0], vec![1.0]], 5);
        let values: Vec<f64> = out.iter().map(|c| c[0]).collect();
        for (got, want) in values.iter().zip([0.0, 0.25, 0.5, 0.75, 1.0]) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn degenerate_inputs() {
        assert!(resample_path(&[], 4).is_empty());
        assert!(resample_path(&raw(), 0).is_empty());
        assert_eq!(resample_path(&raw(), 1), vec![vec![0.0, 0.0]]);
        let still = resample_path(&[vec![2.0], vec![2.0], vec![2.0]], 5);
        assert_eq!(still.len(), 5);
        assert!(still.iter().all(|c| c[0] == 2.0));
        let single = resample_path(&[vec![1.0]], 3);
        assert_eq!(single, vec![vec![1.0]; 3]);
    }

    #[test]
    fn interpolation_includes_both_ends() {
        let line = linear_interpolation(&[0.0, 2.0], &[1.0, 0.0], 4);
        assert_eq!(line.len(), 5);
        assert_eq!(line[0], vec![0.0, 2.0]);
        assert_eq!(line[4], vec![1.0, 0.0]);
        assert!(close(&line[2], &[0.5, 1.0]));
        assert_eq!(linear_interpolation(&[3.0], &[4.0], 0), vec![vec![3.0]]);
    }
}
