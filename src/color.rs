// sRGB <-> OKLCH conversion for accent colors

/// A color in the OKLCH space: lightness (0..1), chroma, hue in degrees (0..360)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Oklch {
    pub l: f64,
    pub c: f64,
    pub h: f64,
}

impl Oklch {
    pub fn from_srgb(rgb: [u8; 3]) -> Self {
        let [r, g, b] = rgb.map(|v| srgb_to_linear(v as f64 / 255.0));

        let l = 0.4122214708 * r + 0.5363325363 * g + 0.0514459929 * b;
        let m = 0.2119034982 * r + 0.6806995451 * g + 0.1073969566 * b;
        let s = 0.0883024619 * r + 0.2817188376 * g + 0.6299787005 * b;

        let (l, m, s) = (l.cbrt(), m.cbrt(), s.cbrt());

        let lightness = 0.2104542553 * l + 0.7936177850 * m - 0.0040720468 * s;
        let a = 1.9779984951 * l - 2.4285922050 * m + 0.4505937099 * s;
        let bb = 0.0259040371 * l + 0.7827717662 * m - 0.8086757660 * s;

        let chroma = (a * a + bb * bb).sqrt();
        let hue = bb.atan2(a).to_degrees().rem_euclid(360.0);

        Self {
            l: lightness,
            c: chroma,
            h: hue,
        }
    }

    /// Convert back to 8-bit sRGB, clamping out-of-gamut channels
    pub fn to_srgb(&self) -> [u8; 3] {
        let hue = self.h.to_radians();
        let a = self.c * hue.cos();
        let b = self.c * hue.sin();

        let l = self.l + 0.3963377774 * a + 0.2158037573 * b;
        let m = self.l - 0.1055613458 * a - 0.0638541728 * b;
        let s = self.l - 0.0894841775 * a - 1.2914855480 * b;

        let (l, m, s) = (l * l * l, m * m * m, s * s * s);

        let r = 4.0767416621 * l - 3.3077115913 * m + 0.2309699292 * s;
        let g = -1.2684380046 * l + 2.6097574011 * m - 0.3413193965 * s;
        let bl = -0.0041960863 * l - 0.7034186147 * m + 1.7076147010 * s;

        [r, g, bl].map(|v| (linear_to_srgb(v).clamp(0.0, 1.0) * 255.0).round() as u8)
    }

    /// CSS `oklch()` notation
    pub fn to_css(&self) -> String {
        format!("oklch({:.3} {:.3} {:.1})", self.l, self.c, self.h)
    }
}

fn srgb_to_linear(c: f64) -> f64 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f64) -> f64 {
    if c <= 0.0031308 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Parse `#rrggbb` (case-insensitive)
pub fn parse_hex(s: &str) -> Option<[u8; 3]> {
    let hex = s.strip_prefix('#')?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b])
}

/// Format as lowercase `#rrggbb`
pub fn to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("#ff8000"), Some([255, 128, 0]));
        assert_eq!(parse_hex("#FF8000"), Some([255, 128, 0]));
        assert_eq!(parse_hex("ff8000"), None);
        assert_eq!(parse_hex("#ff80"), None);
        assert_eq!(parse_hex("#gg8000"), None);
        assert_eq!(to_hex([255, 128, 0]), "#ff8000");
    }

    #[test]
    fn test_known_values() {
        let white = Oklch::from_srgb([255, 255, 255]);
        assert!(close(white.l, 1.0, 1e-3));
        assert!(white.c < 1e-3);

        let black = Oklch::from_srgb([0, 0, 0]);
        assert!(close(black.l, 0.0, 1e-6));

        let red = Oklch::from_srgb([255, 0, 0]);
        assert!(close(red.l, 0.628, 1e-3));
        assert!(close(red.c, 0.258, 1e-3));
        assert!(close(red.h, 29.23, 0.1));
    }

    #[test]
    fn test_round_trip_is_approximate_inverse() {
        for hex in ["#3b82f6", "#10b981", "#f59e0b", "#ef4444", "#8b5cf6", "#ec4899", "#000000", "#ffffff"] {
            let rgb = parse_hex(hex).unwrap();
            let back = Oklch::from_srgb(rgb).to_srgb();
            for i in 0..3 {
                assert!(
                    (rgb[i] as i32 - back[i] as i32).abs() <= 1,
                    "{} round-tripped to {}",
                    hex,
                    to_hex(back)
                );
            }
        }
    }

    #[test]
    fn test_out_of_gamut_clamps() {
        let extreme = Oklch {
            l: 0.9,
            c: 0.5,
            h: 140.0,
        };
        // Must not panic or wrap
        let rgb = extreme.to_srgb();
        assert_eq!(rgb[1], 255);
    }

    #[test]
    fn test_css_notation() {
        let red = Oklch::from_srgb([255, 0, 0]);
        assert_eq!(red.to_css(), "oklch(0.628 0.258 29.2)");
    }
}
