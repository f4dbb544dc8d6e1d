//! Colour mapping of correlation times.

use serde::{Deserialize, Serialize};

use super::palette;
use super::ConfigError;

/// How correlation times are turned into output pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizerMode {
    /// Palette colour only, scaled by `color_scale`.
    #[default]
    Direct,
    /// Palette colour blended with `alpha` over the raw luminance image.
    Overlay,
}

/// Maps correlation times onto the fixed palette.
#[derive(Debug, Clone)]
pub struct Visualizer {
    mode: VisualizerMode,
    color_scale: f64,
    alpha: f64,
}

impl Visualizer {
    /// Creates a visualizer.
    ///
    /// `color_scale` is the correlation time that maps to the top of the
    /// palette in direct mode; `alpha` is the overlay opacity.
    pub fn new(mode: VisualizerMode, color_scale: f64, alpha: f64) -> Result<Self, ConfigError> {
        if !color_scale.is_finite() || color_scale <= 0.0 {
            return Err(ConfigError::InvalidColorScale(color_scale));
        }
        if !(0.0..=1.0).contains(&alpha) {
            return Err(ConfigError::InvalidAlpha(alpha));
        }
        Ok(Self {
            mode,
            color_scale,
            alpha,
        })
    }

    /// Returns the output mode.
    #[inline]
    pub fn mode(&self) -> VisualizerMode {
        self.mode
    }

    /// Returns the palette index for correlation time `t`.
    ///
    /// Always within `0..=255`; `t → 0` saturates at 255 and `t → ∞` at 0.
    #[inline]
    pub fn palette_index(&self, t: f64) -> u8 {
        if t <= 0.0 {
            return u8::MAX;
        }
        let scale = match self.mode {
            VisualizerMode::Direct => self.color_scale,
            VisualizerMode::Overlay => 1.0,
        };
        // Saturating cast; NaN maps to 0.
        (256.0 * scale / t).round() as u8
    }

    /// Returns the palette colour for correlation time `t`.
    #[inline]
    pub fn color(&self, t: f64) -> [u8; 3] {
        palette::color(self.palette_index(t))
    }

    /// Paints the raw luminance of a sample into `pixel`.
    ///
    /// Only meaningful in overlay mode; the pipeline skips it otherwise.
    #[inline]
    pub fn paint_background(&self, pixel: &mut [u8], sample: u32, bits_per_sample: u32) {
        let gray = luminance(sample, bits_per_sample);
        pixel[..3].fill(gray);
        if let Some(alpha) = pixel.get_mut(3) {
            *alpha = u8::MAX;
        }
    }

    /// Paints the colour for correlation time `t` into `pixel`.
    ///
    /// In overlay mode the colour is blended over what `pixel` already
    /// holds. The fourth channel, if any, is set fully opaque.
    #[inline]
    pub fn paint(&self, pixel: &mut [u8], t: f64) {
        let color = self.color(t);
        match self.mode {
            VisualizerMode::Direct => pixel[..3].copy_from_slice(&color),
            VisualizerMode::Overlay => {
                for (channel, &c) in pixel[..3].iter_mut().zip(&color) {
                    *channel = blend(*channel, c, self.alpha);
                }
            }
        }
        if let Some(alpha) = pixel.get_mut(3) {
            *alpha = u8::MAX;
        }
    }
}

/// Reduces a sample to 8 bits.
#[inline]
pub fn luminance(sample: u32, bits_per_sample: u32) -> u8 {
    if bits_per_sample >= 8 {
        (sample >> (bits_per_sample - 8)) as u8
    } else {
        (sample << (8 - bits_per_sample)) as u8
    }
}

#[inline]
fn blend(background: u8, foreground: u8, alpha: f64) -> u8 {
    (f64::from(background) * (1.0 - alpha) + f64::from(foreground) * alpha).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(scale: f64) -> Visualizer {
        Visualizer::new(VisualizerMode::Direct, scale, 1.0).unwrap()
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(matches!(
            Visualizer::new(VisualizerMode::Direct, 0.0, 1.0),
            Err(ConfigError::InvalidColorScale(_))
        ));
        assert!(matches!(
            Visualizer::new(VisualizerMode::Overlay, 30.0, 1.5),
            Err(ConfigError::InvalidAlpha(_))
        ));
    }

    #[test]
    fn test_index_clamps() {
        let vis = direct(30.0);
        assert_eq!(vis.palette_index(0.0), 255);
        assert_eq!(vis.palette_index(1e-300), 255);
        assert_eq!(vis.palette_index(f64::MIN_POSITIVE), 255);
        assert_eq!(vis.palette_index(f64::INFINITY), 0);
        assert_eq!(vis.palette_index(f64::MAX), 0);
        assert_eq!(vis.palette_index(f64::NAN), 0);
        assert_eq!(vis.palette_index(-3.0), 255);
    }

    #[test]
    fn test_direct_index_uses_scale() {
        assert_eq!(direct(1.0).palette_index(2.0), 128);
        assert_eq!(direct(30.0).palette_index(60.0), 128);
        assert_eq!(direct(30.0).palette_index(7680.0), 1);
    }

    #[test]
    fn test_overlay_index_ignores_scale() {
        let vis = Visualizer::new(VisualizerMode::Overlay, 30.0, 0.5).unwrap();
        assert_eq!(vis.palette_index(2.0), 128);
    }

    #[test]
    fn test_direct_paint_rgba() {
        let vis = direct(30.0);
        let mut pixel = [1, 2, 3, 4];
        vis.paint(&mut pixel, f64::INFINITY);
        let expected = palette::color(0);
        assert_eq!(pixel, [expected[0], expected[1], expected[2], 255]);
    }

    #[test]
    fn test_overlay_blend() {
        let vis = Visualizer::new(VisualizerMode::Overlay, 30.0, 0.5).unwrap();
        let mut pixel = [0u8; 3];
        vis.paint_background(&mut pixel, 400, 10);
        assert_eq!(pixel, [100, 100, 100]);

        vis.paint(&mut pixel, 2.0);
        let c = palette::color(128);
        let expected: Vec<u8> = c
            .iter()
            .map(|&v| ((100.0 + f64::from(v)) / 2.0).round() as u8)
            .collect();
        assert_eq!(pixel.to_vec(), expected);
    }

    #[test]
    fn test_opaque_overlay_replaces_background() {
        let vis = Visualizer::new(VisualizerMode::Overlay, 30.0, 1.0).unwrap();
        let mut pixel = [50u8; 4];
        vis.paint(&mut pixel, 1.0);
        let c = palette::color(255);
        assert_eq!(pixel, [c[0], c[1], c[2], 255]);
    }

    #[test]
    fn test_luminance_scaling() {
        assert_eq!(luminance(1023, 10), 255);
        assert_eq!(luminance(0xABCD, 16), 0xAB);
        assert_eq!(luminance(200, 8), 200);
        assert_eq!(luminance(0b1010, 4), 0b1010_0000);
    }
}
