//! Scalar interpolation helpers shared by the noise modifiers

/// Linear interpolation between `a` and `b`
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Hermite smoothstep of `x` over `[edge0, edge1]`.
///
/// A degenerate range (`edge0 == edge1`) acts as a step function instead of
/// dividing by zero.
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let span = edge1 - edge0;
    if span.abs() <= f32::EPSILON {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / span).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Smoothstep with tunable steepness.
///
/// Maps `weight` in `[0, 1]` through `w^n / (w^n + (1 - w)^n)` and remaps the
/// result onto `[minimum, maximum]`. Higher `n` flattens both ends and
/// concentrates the transition around `w = 0.5`.
pub fn tunable_smoothstep(minimum: f32, maximum: f32, weight: f32, n: i32) -> f32 {
    let w = weight.clamp(0.0, 1.0);
    let a = w.powi(n);
    let b = (1.0 - w).powi(n);
    let denom = a + b;
    let mapped = if denom > 0.0 { a / denom } else { w };
    minimum + (maximum - minimum) * mapped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lerp() {
        assert_eq!(lerp(2.0, 4.0, 0.0), 2.0);
        assert_eq!(lerp(2.0, 4.0, 1.0), 4.0);
        assert_eq!(lerp(2.0, 4.0, 0.5), 3.0);
    }

    #[test]
    fn test_smoothstep() {
        assert_eq!(smoothstep(0.0, 1.0, -1.0), 0.0);
        assert_eq!(smoothstep(0.0, 1.0, 2.0), 1.0);
        assert!((smoothstep(0.0, 1.0, 0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_smoothstep_degenerate_range() {
        assert_eq!(smoothstep(0.0, 0.0, -0.1), 0.0);
        assert_eq!(smoothstep(0.0, 0.0, 0.3), 1.0);
        assert!(smoothstep(0.0, 0.0, 0.0).is_finite());
    }

    #[test]
    fn test_tunable_smoothstep_endpoints() {
        assert_eq!(tunable_smoothstep(3.0, 4.0, 0.0, 7), 3.0);
        assert_eq!(tunable_smoothstep(3.0, 4.0, 1.0, 7), 4.0);
        assert!((tunable_smoothstep(3.0, 4.0, 0.5, 7) - 3.5).abs() < 1e-6);
    }

    #[test]
    fn test_tunable_smoothstep_flattens_with_exponent() {
        // Higher exponents stay closer to the lower step for small weights
        let soft = tunable_smoothstep(0.0, 1.0, 0.25, 2);
        let hard = tunable_smoothstep(0.0, 1.0, 0.25, 7);
        assert!(hard < soft);
        assert!(hard > 0.0);
    }
}
