use crate::config::Metric;

/// Distance under the configured metric. Both assume equal-length vectors;
/// callers (embeddings, all same model) guarantee this.
pub fn distance(metric: Metric, a: &[f32], b: &[f32]) -> f64 {
    match metric {
        Metric::Euclidean => euclidean(a, b),
        Metric::Angular => angular(a, b),
    }
}

fn euclidean(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = (*x - *y) as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// `1 - cosine_similarity`, clamped to `[0, 2]` to absorb floating-point
/// overshoot at the extremes.
fn angular(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_of_identical_vectors_is_zero() {
        assert_eq!(euclidean(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn angular_distance_of_identical_unit_vectors_is_zero() {
        let v = [1.0f32, 0.0, 0.0];
        assert!(angular(&v, &v) < 1e-9);
    }

    #[test]
    fn angular_distance_of_orthogonal_vectors_is_one() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        assert!((angular(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn distance_dispatches_on_metric() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        assert!((distance(Metric::Euclidean, &a, &b) - std::f64::consts::SQRT_2).abs() < 1e-9);
        assert!((distance(Metric::Angular, &a, &b) - 1.0).abs() < 1e-9);
    }
}
