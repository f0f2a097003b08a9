//! Fractal Brownian motion with optional warping, carving, cliff and terrace modifiers

use glam::{Vec2, Vec2Swizzles, Vec3, Vec3Swizzles};
use noise::{NoiseFn, Perlin, Simplex};

use super::params::{Carving, NoiseParams, Terracing, Warping};
use crate::math::{lerp, smoothstep, tunable_smoothstep};

/// Seed for an auxiliary noise channel, decorrelated from the base channel.
fn channel_seed(seed: u32, channel: u32) -> u32 {
    let mixed = (seed as u64)
        .wrapping_add(channel as u64)
        .wrapping_mul(0x9e37_79b9_7f4a_7c15);
    (mixed >> 32) as u32
}

/// Remap coherent noise from `[-1, 1]` into `[0, 1]`.
#[inline]
fn unit(n: f64) -> f32 {
    ((n as f32 + 1.0) * 0.5).clamp(0.0, 1.0)
}

/// Seeded FBM evaluator for a fixed parameter set
pub struct FractalNoise {
    params: NoiseParams,
    base: Simplex,
    warp: Perlin,
    carve: Perlin,
    max: f32,
}

impl FractalNoise {
    pub fn new(params: NoiseParams) -> Self {
        Self {
            base: Simplex::new(params.seed),
            warp: Perlin::new(channel_seed(params.seed, 1)),
            carve: Perlin::new(channel_seed(params.seed, 2)),
            max: params.theoretical_max(),
            params,
        }
    }

    pub fn params(&self) -> &NoiseParams {
        &self.params
    }

    /// Analytic envelope of the values this generator produces
    pub fn height_bounds(&self) -> (f32, f32) {
        compute_height_bounds(&self.params)
    }

    /// Evaluate 2D FBM, typically a height at world `(x, z)`.
    pub fn sample_2d(&self, position: Vec2) -> f32 {
        let p = &self.params;
        let mut pos = position;
        let mut frequency = p.frequency;
        let mut amplitude = p.amplitude;
        let mut total = 0.0;

        for _ in 0..p.octaves {
            if let Some(warping) = p.warping {
                pos += self.warp_offset_2d(pos, &warping);
            }

            let q = pos * frequency;
            let mut layer = unit(self.base.get([q.x as f64, q.y as f64])) * amplitude;

            if let Some(carving) = p.carving {
                let c = pos * carving.frequency;
                let n = self.carve.get([c.x as f64, c.y as f64]) as f32;
                layer -= carve_mask(n, &carving) * carving.depth;
            }

            total += layer;
            frequency *= p.lacunarity;
            amplitude *= p.gain;
        }

        self.finish(total)
    }

    /// Evaluate 3D FBM, used as a density for volumetric terrain.
    pub fn sample_3d(&self, position: Vec3) -> f32 {
        let p = &self.params;
        let mut pos = position;
        let mut frequency = p.frequency;
        let mut amplitude = p.amplitude;
        let mut total = 0.0;

        for _ in 0..p.octaves {
            if let Some(warping) = p.warping {
                pos += self.warp_offset_3d(pos, &warping);
            }

            let q = pos * frequency;
            let mut layer =
                unit(self.base.get([q.x as f64, q.y as f64, q.z as f64])) * amplitude;

            if let Some(carving) = p.carving {
                let c = pos * carving.frequency;
                let n = self.carve.get([c.x as f64, c.y as f64, c.z as f64]) as f32;
                layer -= carve_mask(n, &carving) * carving.depth;
            }

            total += layer;
            frequency *= p.lacunarity;
            amplitude *= p.gain;
        }

        self.finish(total)
    }

    fn warp_offset_2d(&self, pos: Vec2, warping: &Warping) -> Vec2 {
        let a = pos * warping.frequency;
        let b = pos.yx() * warping.frequency;
        Vec2::new(
            self.warp.get([a.x as f64, a.y as f64]) as f32,
            self.warp.get([b.x as f64, b.y as f64]) as f32,
        ) * warping.strength
    }

    fn warp_offset_3d(&self, pos: Vec3, warping: &Warping) -> Vec3 {
        let a = pos * warping.frequency;
        let b = pos.yzx() * warping.frequency;
        let c = pos.zxy() * warping.frequency;
        Vec3::new(
            self.warp.get([a.x as f64, a.y as f64, a.z as f64]) as f32,
            self.warp.get([b.x as f64, b.y as f64, b.z as f64]) as f32,
            self.warp.get([c.x as f64, c.y as f64, c.z as f64]) as f32,
        ) * warping.strength
    }

    /// Post-loop modifiers and bias
    fn finish(&self, mut total: f32) -> f32 {
        let max = self.max;

        if let Some(cliff) = self.params.cliff {
            if max != 0.0 {
                let ratio = total / max;
                let exponent = lerp(1.0, cliff.sharpness, ratio.clamp(0.0, 1.0));
                total = ratio.signum() * ratio.abs().powf(exponent) * max;
            }
        }

        if let Some(terracing) = self.params.terracing {
            total = terrace(total, max, &terracing);
        }

        total + self.params.bias
    }
}

/// River mask for raw carve noise `n` in `[-1, 1]`; zero on the river line
/// (`n == 0.25`), saturating at `width` away from it
fn carve_mask(n: f32, carving: &Carving) -> f32 {
    if carving.width <= 0.0 {
        return 0.0;
    }
    let river = ((1.0 - n) * 2.0 - 1.0).abs();
    let distance = (river - 0.5).abs() * 2.0;
    lerp(0.0, carving.width, smoothstep(0.0, carving.width, distance))
}

fn terrace(total: f32, max: f32, terracing: &Terracing) -> f32 {
    if terracing.steps == 0 || max == 0.0 {
        return total;
    }
    let steps = terracing.steps as f32;
    let v = total / max * steps;
    let step = v.floor();
    tunable_smoothstep(step, step + 1.0, v - step, terracing.exponent) / steps * max
}

/// Conservative `(min, max)` envelope for FBM values under `params`.
///
/// Warping and terracing are not accounted for; carving lowers the minimum by
/// its depth.
pub fn compute_height_bounds(params: &NoiseParams) -> (f32, f32) {
    let mut min = 0.0f32;
    let mut max = 0.0f32;
    let mut amplitude = params.amplitude;

    for _ in 0..params.octaves {
        max += amplitude.max(0.0);
        min += amplitude.min(0.0);
        amplitude *= params.gain;
    }

    if let Some(carving) = params.carving {
        min -= carving.depth;
    }

    (min + params.bias, max + params.bias)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::params::CliffSharpening;

    fn grid_2d() -> impl Iterator<Item = Vec2> {
        (-8..8).flat_map(|x| (-8..8).map(move |z| Vec2::new(x as f32 * 37.3, z as f32 * 41.9)))
    }

    #[test]
    fn test_zero_octaves_yields_bias() {
        let params = NoiseParams {
            octaves: 0,
            bias: 3.5,
            cliff: Some(CliffSharpening::default()),
            terracing: Some(Terracing::default()),
            ..Default::default()
        };
        let fbm = FractalNoise::new(params);

        for p in grid_2d() {
            assert_eq!(fbm.sample_2d(p), 3.5);
            assert_eq!(fbm.sample_3d(p.extend(1.0)), 3.5);
        }
    }

    #[test]
    fn test_deterministic() {
        let params = NoiseParams {
            warping: Some(Warping::default()),
            carving: Some(Carving::default()),
            ..Default::default()
        };
        let a = FractalNoise::new(params);
        let b = FractalNoise::new(params);

        for p in grid_2d() {
            assert_eq!(a.sample_2d(p), b.sample_2d(p));
            assert_eq!(a.sample_3d(p.extend(-5.0)), b.sample_3d(p.extend(-5.0)));
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = FractalNoise::new(NoiseParams { seed: 1, ..Default::default() });
        let b = FractalNoise::new(NoiseParams { seed: 2, ..Default::default() });
        assert!(grid_2d().any(|p| a.sample_2d(p) != b.sample_2d(p)));
    }

    #[test]
    fn test_base_values_within_bounds() {
        let params = NoiseParams { bias: -10.0, ..Default::default() };
        let fbm = FractalNoise::new(params);
        let (min, max) = fbm.height_bounds();

        for p in grid_2d() {
            let h = fbm.sample_2d(p);
            assert!(h >= min - 1e-3 && h <= max + 1e-3, "{h} outside [{min}, {max}]");
            let d = fbm.sample_3d(Vec3::new(p.x, h, p.y));
            assert!(d >= min - 1e-3 && d <= max + 1e-3, "{d} outside [{min}, {max}]");
        }
    }

    #[test]
    fn test_cliff_and_single_octave_carving_within_bounds() {
        let params = NoiseParams {
            octaves: 1,
            carving: Some(Carving { frequency: 0.01, width: 0.5, depth: 6.0 }),
            cliff: Some(CliffSharpening { sharpness: 3.0 }),
            ..Default::default()
        };
        let fbm = FractalNoise::new(params);
        let (min, max) = fbm.height_bounds();

        for p in grid_2d() {
            let h = fbm.sample_2d(p);
            assert!(h >= min - 1e-3 && h <= max + 1e-3, "{h} outside [{min}, {max}]");
        }
    }

    #[test]
    fn test_gain_zero_uses_first_octave_only() {
        let one = FractalNoise::new(NoiseParams { octaves: 1, gain: 0.0, ..Default::default() });
        let many = FractalNoise::new(NoiseParams { octaves: 6, gain: 0.0, ..Default::default() });

        for p in grid_2d() {
            assert_eq!(one.sample_2d(p), many.sample_2d(p));
        }
    }

    #[test]
    fn test_zero_width_carving_is_finite() {
        let fbm = FractalNoise::new(NoiseParams {
            carving: Some(Carving { frequency: 0.01, width: 0.0, depth: 10.0 }),
            ..Default::default()
        });
        let plain = FractalNoise::new(NoiseParams::default());

        for p in grid_2d() {
            let h = fbm.sample_2d(p);
            assert!(h.is_finite());
            assert_eq!(h, plain.sample_2d(p));
        }
    }

    #[test]
    fn test_carve_mask_band() {
        let carving = Carving { frequency: 1.0, width: 0.5, depth: 1.0 };
        assert_eq!(carve_mask(0.25, &carving), 0.0);
        // Far side of the noise range saturates at the width
        assert!((carve_mask(-1.0, &carving) - 0.5).abs() < 1e-6);
        assert!((carve_mask(1.0, &carving) - 0.5).abs() < 1e-6);

        let wide = Carving { width: 2.0, ..carving };
        // river = 1, distance = 1: halfway up the smoothstep
        assert!((carve_mask(1.0, &wide) - 1.0).abs() < 1e-6);
        assert!(carve_mask(0.3, &wide) < carve_mask(0.5, &wide));
    }

    #[test]
    fn test_terracing_stays_in_range() {
        let params = NoiseParams {
            terracing: Some(Terracing { steps: 4, exponent: 7 }),
            ..Default::default()
        };
        let fbm = FractalNoise::new(params);
        let max = params.theoretical_max();

        for p in grid_2d() {
            let h = fbm.sample_2d(p);
            assert!(h.is_finite());
            assert!(h >= -1e-3 && h <= max + 1e-3);
        }
    }

    #[test]
    fn test_compute_height_bounds() {
        let params = NoiseParams {
            amplitude: 8.0,
            octaves: 3,
            gain: 0.5,
            bias: 1.0,
            ..Default::default()
        };
        assert_eq!(compute_height_bounds(&params), (1.0, 15.0));

        let negative = NoiseParams { amplitude: -4.0, octaves: 2, gain: 0.5, ..Default::default() };
        assert_eq!(compute_height_bounds(&negative), (-6.0, 0.0));

        let carved = NoiseParams {
            amplitude: 2.0,
            octaves: 1,
            carving: Some(Carving { frequency: 0.1, width: 0.2, depth: 5.0 }),
            ..Default::default()
        };
        assert_eq!(compute_height_bounds(&carved), (-5.0, 2.0));
    }
}
