/// Lowest z that still earns bands 1..=8, in band order. Below the last floor is band 9.
const Z_BAND_FLOORS: [f64; 8] = [1.5, 1.0, 0.5, 0.0, -0.5, -1.0, -1.5, -2.0];

pub const LOWEST_BAND: u8 = 9;

pub fn z_band(z: f64) -> u8 {
    Z_BAND_FLOORS
        .iter()
        .position(|floor| z >= *floor)
        .map(|i| i as u8 + 1)
        .unwrap_or(LOWEST_BAND)
}

/// `None` when the distribution is unusable (non-finite, or `std <= 0`).
pub fn score_to_z_band(score: f64, mean: f64, std: f64) -> Option<u8> {
    if !score.is_finite() || !mean.is_finite() || !std.is_finite() || std <= 0.0 {
        return None;
    }
    Some(z_band((score - mean) / std))
}

/// `Math.round(x * 100) / 100`, i.e. half away from zero at the 2nd decimal for the
/// positive values grades take.
pub fn round_off_2_decimal(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Strict numeric acceptance for a grade cell: the whole trimmed text must be a finite number.
pub fn parse_finite(raw: &str) -> Option<f64> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    t.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Leading integer of a numeric cell ("3.7" -> 3, "-2" -> -2, ".5" -> None).
pub fn parse_int_prefix(raw: &str) -> Option<i64> {
    let t = raw.trim();
    let (negative, digits) = match t.as_bytes().first() {
        Some(b'-') => (true, &t[1..]),
        Some(b'+') => (false, &t[1..]),
        _ => (false, t),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}
