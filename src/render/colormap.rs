use serde::{Deserialize, Serialize};

/// Perceptual and diverging palettes used for the six views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Colormap {
    Viridis,
    Plasma,
    Inferno,
    Magma,
    /// Red-yellow-blue, reversed so high values are red
    RdYlBuR,
    Hot,
}

type Stop = (f32, [u8; 3]);

const VIRIDIS: &[Stop] = &[
    (0.000, [68, 1, 84]),
    (0.125, [71, 45, 123]),
    (0.250, [59, 82, 139]),
    (0.375, [44, 114, 142]),
    (0.500, [33, 145, 140]),
    (0.625, [40, 174, 128]),
    (0.750, [94, 201, 98]),
    (0.875, [173, 220, 48]),
    (1.000, [253, 231, 37]),
];

const PLASMA: &[Stop] = &[
    (0.000, [13, 8, 135]),
    (0.125, [76, 2, 161]),
    (0.250, [126, 3, 168]),
    (0.375, [169, 35, 149]),
    (0.500, [204, 71, 120]),
    (0.625, [230, 108, 92]),
    (0.750, [248, 149, 64]),
    (0.875, [253, 197, 39]),
    (1.000, [240, 249, 33]),
];

const INFERNO: &[Stop] = &[
    (0.000, [0, 0, 4]),
    (0.125, [31, 12, 72]),
    (0.250, [85, 15, 109]),
    (0.375, [136, 34, 106]),
    (0.500, [186, 54, 85]),
    (0.625, [227, 89, 51]),
    (0.750, [249, 142, 9]),
    (0.875, [249, 203, 53]),
    (1.000, [252, 255, 164]),
];

const MAGMA: &[Stop] = &[
    (0.000, [0, 0, 4]),
    (0.125, [28, 16, 68]),
    (0.250, [79, 18, 123]),
    (0.375, [129, 37, 129]),
    (0.500, [181, 54, 122]),
    (0.625, [229, 80, 100]),
    (0.750, [251, 135, 97]),
    (0.875, [254, 194, 135]),
    (1.000, [252, 253, 191]),
];

const RDYLBU_R: &[Stop] = &[
    (0.0, [49, 54, 149]),
    (0.1, [69, 117, 180]),
    (0.2, [116, 173, 209]),
    (0.3, [171, 217, 233]),
    (0.4, [224, 243, 248]),
    (0.5, [255, 255, 191]),
    (0.6, [254, 224, 144]),
    (0.7, [253, 174, 97]),
    (0.8, [244, 109, 67]),
    (0.9, [215, 48, 39]),
    (1.0, [165, 0, 38]),
];

const HOT: &[Stop] = &[
    (0.000, [10, 0, 0]),
    (0.365, [255, 0, 0]),
    (0.746, [255, 255, 0]),
    (1.000, [255, 255, 255]),
];

impl Colormap {
    fn stops(&self) -> &'static [Stop] {
        match self {
            Self::Viridis => VIRIDIS,
            Self::Plasma => PLASMA,
            Self::Inferno => INFERNO,
            Self::Magma => MAGMA,
            Self::RdYlBuR => RDYLBU_R,
            Self::Hot => HOT,
        }
    }

    /// Colour at `t`, clamped to [0, 1]; NaN maps to the low end
    pub fn sample(&self, t: f32) -> [u8; 3] {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let stops = self.stops();

        let upper = stops.iter().position(|&(at, _)| at >= t).unwrap_or(stops.len() - 1);
        if upper == 0 {
            return stops[0].1;
        }

        let (t0, c0) = stops[upper - 1];
        let (t1, c1) = stops[upper];
        let f = (t - t0) / (t1 - t0);
        let mut rgb = [0u8; 3];
        for (channel, out) in rgb.iter_mut().enumerate() {
            let value = c0[channel] as f32 + f * (c1[channel] as f32 - c0[channel] as f32);
            *out = value.round().clamp(0.0, 255.0) as u8;
        }
        rgb
    }
}
