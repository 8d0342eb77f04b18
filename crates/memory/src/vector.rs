//! Vector math for embeddings.
//!
//! Accumulation happens in `f64` so long, sparse hashing vectors do not lose
//! precision before the final cast.

const NEAR_ZERO: f64 = 1e-10;

fn magnitude(v: &[f32]) -> f64 {
    v.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt()
}

/// Cosine of the angle between `a` and `b`, in [-1, 1].
///
/// Mismatched lengths, empty input and zero vectors all yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let denom = magnitude(a) * magnitude(b);
    if denom < NEAR_ZERO {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum();

    (dot / denom).clamp(-1.0, 1.0) as f32
}

/// Scale `v` to unit length in place. Zero vectors are left as they are.
pub fn normalize(v: &mut [f32]) {
    let norm = magnitude(v);
    if norm < NEAR_ZERO {
        return;
    }
    v.iter_mut()
        .for_each(|x| *x = (f64::from(*x) / norm) as f32);
}
