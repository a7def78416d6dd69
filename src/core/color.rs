//! Deterministic overlay colors
//!
//! Both functions hash their input with the 32-bit string hash used by web
//! maps (`h = h * 31 + unit` over UTF-16 code units, wrapping), so the same
//! query always gets the same color across runs and front ends.

use serde::Serialize;

/// Opacity applied to query overlay colors
pub const OVERLAY_ALPHA: f64 = 0.65;

/// Lightness (percent) for regular overlays
const LIGHTNESS: f64 = 55.0;

/// Lightness (percent) for overlays drawn with degraded geometry
const FIXED_LIGHTNESS: f64 = 45.0;

/// RGB channel bounds for [`unique_color`]
const CHANNEL_MIN: u8 = 50;
const CHANNEL_MAX: u8 = 200;

/// An RGB color with opacity
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub alpha: f64,
}

impl Color {
    /// CSS `rgba(...)` notation
    pub fn to_css(&self) -> String {
        format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, self.alpha)
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

fn string_hash(text: &str) -> i32 {
    text.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(i32::from(unit)))
}

/// Color for an overlay id.
///
/// Hue is `|h| mod 360`, saturation `70 + |7h| mod 20` (so 70..=89) and
/// lightness 55, or 45 when `fixed` is set; opacity is always 0.65.
pub fn query_color(overlay_id: &str, fixed: bool) -> Color {
    let hash = i64::from(string_hash(overlay_id));

    let hue = (hash.abs() % 360) as f64;
    let saturation = (70 + (hash * 7).abs() % 20) as f64;
    let lightness = if fixed { FIXED_LIGHTNESS } else { LIGHTNESS };

    let (r, g, b) = hsl_to_rgb(hue, saturation, lightness);
    Color { r, g, b, alpha: OVERLAY_ALPHA }
}

/// Opaque color for a key/value pair, every channel within 50..=200.
///
/// A missing value hashes as `generic`.
pub fn unique_color(key: &str, value: Option<&str>) -> Color {
    let combined = format!("{key}:{}", value.unwrap_or("generic"));
    let hash = string_hash(&combined);

    let channel = |shifted: i32| -> u8 {
        let raw = i64::from(shifted).abs() % 255;
        // raw < 255, so the cast is lossless
        (raw as u8).clamp(CHANNEL_MIN, CHANNEL_MAX)
    };

    Color {
        r: channel(hash),
        g: channel(hash >> 8),
        b: channel(hash >> 16),
        alpha: 1.0,
    }
}

/// Convert hue (degrees), saturation and lightness (percent) to RGB
fn hsl_to_rgb(hue: f64, saturation: f64, lightness: f64) -> (u8, u8, u8) {
    let h = hue / 360.0;
    let s = saturation / 100.0;
    let l = lightness / 100.0;

    if s == 0.0 {
        let gray = to_channel(l);
        return (gray, gray, gray);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    (
        to_channel(hue_to_rgb(p, q, h + 1.0 / 3.0)),
        to_channel(hue_to_rgb(p, q, h)),
        to_channel(hue_to_rgb(p, q, h - 1.0 / 3.0)),
    )
}

fn hue_to_rgb(p: f64, q: f64, mut t: f64) -> f64 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

fn to_channel(component: f64) -> u8 {
    (component * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_hash_matches_reference_values() {
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("a"), 97);
        assert_eq!(string_hash("ab"), 97 * 31 + 98);
        // Long inputs wrap instead of overflowing
        let long = "amenity".repeat(50);
        let _ = string_hash(&long);
    }

    #[test]
    fn test_query_color_is_stable() {
        let first = query_color("tag_amenity_fuel", false);
        let second = query_color("tag_amenity_fuel", false);
        assert_eq!(first, second);
        assert_ne!(query_color("tag_amenity_fuel", false), query_color("tag_amenity_cafe", false));
    }

    #[test]
    fn test_query_color_ranges() {
        for id in ["tag_amenity_fuel", "key_shop_any", "tag_highway_bus_stop", "", "ç·ñ"] {
            let color = query_color(id, false);
            assert_eq!(color.alpha, OVERLAY_ALPHA);

            // With s in 70..=89% and l = 55%, no channel can be fully dark or saturated
            let max = color.r.max(color.g).max(color.b);
            let min = color.r.min(color.g).min(color.b);
            assert!(max > 180, "{id}: {color:?}");
            assert!(min < 100, "{id}: {color:?}");
        }
    }

    #[test]
    fn test_fixed_geometry_is_darker() {
        let regular = query_color("tag_amenity_fuel", false);
        let fixed = query_color("tag_amenity_fuel", true);
        let brightness = |c: Color| u32::from(c.r) + u32::from(c.g) + u32::from(c.b);
        assert!(brightness(fixed) < brightness(regular));
    }

    #[test]
    fn test_query_color_known_value() {
        // "a" hashes to 97: hue 97, saturation 70 + 679 % 20 = 89, lightness 55
        let color = query_color("a", false);
        assert_eq!(hsl_to_rgb(97.0, 89.0, 55.0), (color.r, color.g, color.b));
        assert!(color.g > color.r && color.g > color.b);
    }

    #[test]
    fn test_hsl_to_rgb_primaries() {
        assert_eq!(hsl_to_rgb(0.0, 100.0, 50.0), (255, 0, 0));
        assert_eq!(hsl_to_rgb(120.0, 100.0, 50.0), (0, 255, 0));
        assert_eq!(hsl_to_rgb(240.0, 100.0, 50.0), (0, 0, 255));
        assert_eq!(hsl_to_rgb(0.0, 0.0, 50.0), (128, 128, 128));
    }

    #[test]
    fn test_unique_color_channels_clamped() {
        for (key, value) in [("amenity", Some("fuel")), ("shop", None), ("a", Some("b")), ("", None)] {
            let color = unique_color(key, value);
            for channel in [color.r, color.g, color.b] {
                assert!((CHANNEL_MIN..=CHANNEL_MAX).contains(&channel));
            }
            assert_eq!(color.alpha, 1.0);
        }
    }

    #[test]
    fn test_unique_color_generic_value() {
        assert_eq!(unique_color("shop", None), unique_color("shop", Some("generic")));
        assert_eq!(unique_color("amenity", Some("fuel")), unique_color("amenity", Some("fuel")));
    }

    #[test]
    fn test_css_and_hex_output() {
        let color = Color { r: 255, g: 0, b: 16, alpha: 0.65 };
        assert_eq!(color.to_css(), "rgba(255, 0, 16, 0.65)");
        assert_eq!(color.to_hex(), "#ff0010");
    }
}
