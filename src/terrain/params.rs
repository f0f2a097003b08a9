//! Fractal noise parameters
//!
//! Every optional modifier carries its own parameter block, so a disabled
//! feature has no tunables to read by mistake.

use serde::{Deserialize, Serialize};

/// Domain warping: perturbs the sample position by low-frequency noise.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Warping {
    pub frequency: f32,
    pub strength: f32,
}

impl Default for Warping {
    fn default() -> Self {
        Self { frequency: 0.005, strength: 20.0 }
    }
}

/// River carving: subtracts a smoothed channel mask from every octave.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Carving {
    pub frequency: f32,
    /// Width of the smoothing band, also the maximum mask value
    pub width: f32,
    pub depth: f32,
}

impl Default for Carving {
    fn default() -> Self {
        Self { frequency: 0.002, width: 0.2, depth: 8.0 }
    }
}

/// Raises high terrain to a steeper power to reward cliffs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CliffSharpening {
    pub sharpness: f32,
}

impl Default for CliffSharpening {
    fn default() -> Self {
        Self { sharpness: 2.0 }
    }
}

/// Quantizes heights into smoothly blended steps.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Terracing {
    pub steps: u32,
    /// Steepness of the step transition (see `tunable_smoothstep`)
    #[serde(default = "default_terrace_exponent")]
    pub exponent: i32,
}

fn default_terrace_exponent() -> i32 {
    7
}

impl Default for Terracing {
    fn default() -> Self {
        Self { steps: 8, exponent: default_terrace_exponent() }
    }
}

/// Parameters controlling fractal Brownian motion evaluation
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParams {
    pub seed: u32,
    pub frequency: f32,
    pub amplitude: f32,
    pub octaves: u32,    // FBM octaves (detail levels)
    pub lacunarity: f32, // Frequency multiplier per octave (2.0 typical)
    pub gain: f32,       // Amplitude multiplier per octave (0.5 typical)
    pub bias: f32,
    pub warping: Option<Warping>,
    pub carving: Option<Carving>,
    pub cliff: Option<CliffSharpening>,
    pub terracing: Option<Terracing>,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            frequency: 0.01,
            amplitude: 64.0,
            octaves: 5,
            lacunarity: 2.0,
            gain: 0.5,
            bias: 0.0,
            warping: None,
            carving: None,
            cliff: None,
            terracing: None,
        }
    }
}

impl NoiseParams {
    /// Whether any modifier beyond plain octave summation is configured
    pub fn has_modifiers(&self) -> bool {
        self.warping.is_some()
            || self.carving.is_some()
            || self.cliff.is_some()
            || self.terracing.is_some()
    }

    /// Sum of the geometric amplitude series over all octaves.
    ///
    /// Used to normalize the accumulated noise before cliff sharpening and
    /// terracing.
    pub fn theoretical_max(&self) -> f32 {
        let n = self.octaves as i32;
        if n == 0 {
            return 0.0;
        }
        if (1.0 - self.gain).abs() <= f32::EPSILON {
            return self.amplitude * n as f32;
        }
        self.amplitude * (1.0 - self.gain.powi(n)) / (1.0 - self.gain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_params_default() {
        let params = NoiseParams::default();
        assert_eq!(params.seed, 12345);
        assert_eq!(params.octaves, 5);
        assert_eq!(params.lacunarity, 2.0);
        assert_eq!(params.gain, 0.5);
        assert!(!params.has_modifiers());
    }

    #[test]
    fn test_theoretical_max() {
        let params = NoiseParams { amplitude: 1.0, octaves: 3, gain: 0.5, ..Default::default() };
        assert!((params.theoretical_max() - 1.75).abs() < 1e-6);

        let flat_gain = NoiseParams { amplitude: 2.0, octaves: 4, gain: 1.0, ..Default::default() };
        assert_eq!(flat_gain.theoretical_max(), 8.0);

        let no_octaves = NoiseParams { octaves: 0, ..Default::default() };
        assert_eq!(no_octaves.theoretical_max(), 0.0);
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{
            "amplitude": 32.0,
            "octaves": 3,
            "carving": { "frequency": 0.01, "width": 0.5, "depth": 4.0 },
            "terracing": { "steps": 5 }
        }"#;
        let params: NoiseParams = serde_json::from_str(json).unwrap();

        assert_eq!(params.amplitude, 32.0);
        assert_eq!(params.octaves, 3);
        assert_eq!(params.gain, 0.5);
        assert_eq!(params.carving.unwrap().depth, 4.0);
        assert_eq!(params.terracing.unwrap().exponent, 7);
        assert!(params.warping.is_none());
        assert!(params.has_modifiers());
    }
}
