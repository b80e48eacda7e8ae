//! Score-to-color gradient helpers.
//!
//! Leaderboard scores and participant markers are tinted by linearly interpolating
//! between two palette colors per RGB channel.

/// Light end of the score gradient (score 0).
pub const SCORE_LIGHT: &str = "#E8E6FF";
/// Dark end of the score gradient (score 100).
pub const SCORE_DARK: &str = "#1A237E";
/// Returned when a palette entry cannot be parsed.
pub const SCORE_FALLBACK: &str = "#8884D8";

/// Marker colors handed out to participants in join order.
pub const PARTICIPANT_PALETTE: [&str; 6] = [
    "#FF6B6B", "#4ECDC4", "#FFD93D", "#6C5CE7", "#00B894", "#E17055",
];

/// Parse `#RRGGBB` (the `#` is optional, hex digits are case-insensitive).
///
/// ```
/// use rendezvous_engine::color::hex_to_rgb;
/// assert_eq!(hex_to_rgb("#1a237e"), Some([0x1A, 0x23, 0x7E]));
/// assert_eq!(hex_to_rgb("nope"), None);
/// ```
pub fn hex_to_rgb(hex: &str) -> Option<[u8; 3]> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

/// Format channels as upper-case `#RRGGBB`.
///
/// Channels outside `0..=255` (from an unclamped interpolation) are clamped when
/// formatting.
pub fn rgb_to_hex(rgb: [i32; 3]) -> String {
    let [r, g, b] = rgb.map(|c| c.clamp(0, 255));
    format!("#{:02X}{:02X}{:02X}", r, g, b)
}

/// Per-channel linear interpolation `round(c1 + factor * (c2 - c1))`.
///
/// `factor` is deliberately not clamped; values outside `[0, 1]` extrapolate past the
/// endpoints.
pub fn interpolate_color(c1: [u8; 3], c2: [u8; 3], factor: f64) -> [i32; 3] {
    let mut out = [0i32; 3];
    for i in 0..3 {
        let start = c1[i] as f64;
        let end = c2[i] as f64;
        // Halves round up, also below zero
        out[i] = (start + factor * (end - start) + 0.5).floor() as i32;
    }
    out
}

/// Gradient color for a 0-100 score.
///
/// ```
/// use rendezvous_engine::color::score_color;
/// assert_eq!(score_color(0.0), "#E8E6FF");
/// assert_eq!(score_color(100.0), "#1A237E");
/// ```
pub fn score_color(score: f64) -> String {
    match (hex_to_rgb(SCORE_LIGHT), hex_to_rgb(SCORE_DARK)) {
        (Some(light), Some(dark)) => rgb_to_hex(interpolate_color(light, dark, score / 100.0)),
        _ => SCORE_FALLBACK.to_string(),
    }
}

/// Palette color for the n-th participant, cycling.
pub fn participant_color(index: usize) -> &'static str {
    PARTICIPANT_PALETTE[index % PARTICIPANT_PALETTE.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_without_hash() {
        assert_eq!(hex_to_rgb("FF6B6B"), Some([255, 107, 107]));
        assert_eq!(hex_to_rgb("#FF6B6"), None);
        assert_eq!(hex_to_rgb("#GG0000"), None);
    }

    #[test]
    fn test_midpoint_interpolation() {
        let mid = interpolate_color([0, 0, 0], [255, 255, 255], 0.5);
        assert_eq!(mid, [128, 128, 128]);
        assert_eq!(rgb_to_hex(mid), "#808080");
    }

    #[test]
    fn test_out_of_range_scores_do_not_panic() {
        // Past the dark end, channels extrapolate below zero and get clamped
        let over = interpolate_color([0xE8, 0xE6, 0xFF], [0x1A, 0x23, 0x7E], 2.0);
        assert!(over[0] < 0);
        assert_eq!(score_color(200.0).len(), 7);
        assert_eq!(score_color(-50.0), "#FFFFFF");
    }

    #[test]
    fn test_half_channels_round_up() {
        assert_eq!(interpolate_color([0, 0, 0], [1, 1, 255], -0.5), [0, 0, -127]);
        assert_eq!(interpolate_color([0, 0, 0], [1, 1, 255], 0.5), [1, 1, 128]);
    }

    #[test]
    fn test_participant_palette_cycles() {
        assert_eq!(participant_color(0), participant_color(PARTICIPANT_PALETTE.len()));
    }
}
