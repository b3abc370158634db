//! Cosine similarity.

use ndarray::Array1;

/// `dot(a, b) / (‖a‖ · ‖b‖)`, clamped to `[-1, 1]`.
///
/// Accumulates in f64 so tiny and huge f32 components neither underflow nor
/// overflow. Returns 0 when either vector has zero norm or the lengths differ.
pub fn cosine_similarity(a: &Array1<f32>, b: &Array1<f32>) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut sq_a, mut sq_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        sq_a += x * x;
        sq_b += y * y;
    }
    if sq_a == 0.0 || sq_b == 0.0 {
        return 0.0;
    }
    let score = dot / (sq_a.sqrt() * sq_b.sqrt());
    if !score.is_finite() {
        return 0.0;
    }
    score.clamp(-1.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_self_similarity_is_one() {
        for v in [array![1.0, 2.0, 3.0], array![-0.5, 0.0, 7.25], array![1e-3, 4e3]] {
            assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_self_similarity_extreme_magnitudes() {
        let tiny = array![1e-13, 0.0];
        assert!((cosine_similarity(&tiny, &tiny) - 1.0).abs() < 1e-6);

        let huge = array![1e20, 1e20];
        assert!((cosine_similarity(&huge, &huge) - 1.0).abs() < 1e-6);

        let subnormal = array![f32::MIN_POSITIVE / 4.0, 0.0];
        assert!((cosine_similarity(&subnormal, &subnormal) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_bounds() {
        let cases = [
            (array![1.0, 0.0], array![-1.0, 0.0]),
            (array![1.0, 0.0], array![0.0, 1.0]),
            (array![3.0, -4.0, 1.0], array![-2.0, 9.0, 0.5]),
            (array![1e3, 1e-3], array![1e3, 1e-3]),
        ];
        for (a, b) in cases {
            let s = cosine_similarity(&a, &b);
            assert!((-1.0..=1.0).contains(&s), "{} out of range", s);
        }
        assert!((cosine_similarity(&array![1.0, 0.0], &array![-2.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&array![1.0, 0.0], &array![0.0, 5.0]), 0.0);
    }

    #[test]
    fn test_magnitude_independent() {
        let a = array![1.0, 2.0, 2.0];
        let b = array![10.0, 20.0, 20.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_is_zero() {
        let zero = Array1::<f32>::zeros(3);
        assert_eq!(cosine_similarity(&zero, &array![1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&array![1.0, 2.0, 3.0], &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_length_mismatch_is_zero() {
        assert_eq!(cosine_similarity(&array![1.0, 0.0], &array![1.0, 0.0, 0.0]), 0.0);
    }
}
