//! Locale-free number formatting and label helpers.
//!
//! Game text must read the same in every locale: no thousands separators,
//! always `.` as the decimal point.

/// Format a `[0, 1]` ratio as a percentage with up to two decimals (`0.##%`).
///
/// `0.5` → `"50%"`, `0.125` → `"12.5%"`, `0.33333` → `"33.33%"`.
pub fn format_percent(ratio: f64) -> String {
    if !ratio.is_finite() {
        return String::new();
    }
    let mut text = format_fixed(ratio * 100.0, 2);
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    text.push('%');
    text
}

/// Upper bound on decimals for [`format_fixed`]; templates pick the count.
pub const MAX_FIXED_DIGITS: usize = 12;

/// Fixed-point formatting with `digits` decimals (at most
/// [`MAX_FIXED_DIGITS`]), rounding half away from zero.
pub fn format_fixed(value: f64, digits: usize) -> String {
    if !value.is_finite() {
        return String::new();
    }
    let digits = digits.min(MAX_FIXED_DIGITS);
    let factor = 10f64.powi(digits as i32);
    let mut rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        // Avoid "-0".
        rounded = 0.0;
    }
    format!("{:.*}", digits, rounded)
}

/// Relationship tier for an affinity score.
pub fn affinity_tier(affinity: f64) -> &'static str {
    if affinity >= 90.0 {
        "Soulmate"
    } else if affinity >= 60.0 {
        "Partner"
    } else if affinity >= 20.0 {
        "Friend"
    } else {
        "Neutral"
    }
}

/// Time-of-day period for an in-game hour.
pub fn time_of_day(hour: u32) -> &'static str {
    match hour {
        0..=5 => "Night",
        6..=11 => "Morning",
        12..=17 => "Afternoon",
        _ => "Evening",
    }
}

/// Energy label for a `[0, 100]` energy reading.
pub fn energy_label(energy: f64) -> &'static str {
    if energy > 80.0 {
        "Energetic"
    } else if energy > 40.0 {
        "Normal"
    } else if energy > 20.0 {
        "Tired"
    } else {
        "Exhausted"
    }
}
