//! Brush color

use serde::{Deserialize, Serialize};

/// RGB brush color with f32 components (0.0 to 1.0)
///
/// Brush opacity is carried separately on the stroke, so there is no alpha.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };
    pub const RED: Color = Color {
        r: 1.0,
        g: 0.0,
        b: 0.0,
    };
    /// The default tegaki ink (maroon)
    pub const INK: Color = Color {
        r: 128.0 / 255.0,
        g: 0.0,
        b: 0.0,
    };

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Create from u8 components (0-255)
    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
        }
    }

    /// Create from hex value (0xRRGGBB)
    pub fn from_hex(hex: u32) -> Self {
        Self::from_rgb8(
            ((hex >> 16) & 0xFF) as u8,
            ((hex >> 8) & 0xFF) as u8,
            (hex & 0xFF) as u8,
        )
    }

    /// Clamp every component into [0, 1], mapping NaN to 0
    pub fn clamped(self) -> Self {
        let c = |v: f32| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        Self::rgb(c(self.r), c(self.g), c(self.b))
    }

    pub fn to_array(&self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    /// Premultiplied RGBA for the given alpha
    pub fn premultiplied(&self, alpha: f32) -> [f32; 4] {
        [self.r * alpha, self.g * alpha, self.b * alpha, alpha]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex() {
        let c = Color::from_hex(0xFF5500);
        assert_eq!(c.r, 1.0);
        assert!((c.g - 85.0 / 255.0).abs() < 0.001);
        assert_eq!(c.b, 0.0);
        assert_eq!(Color::from_hex(0x800000), Color::INK);
    }

    #[test]
    fn test_clamped() {
        let c = Color::rgb(1.5, -0.2, f32::NAN).clamped();
        assert_eq!(c, Color::rgb(1.0, 0.0, 0.0));
    }
}
