//! Shared formatting helpers for CLI output

use chrono::Duration;

const UNITS: [(f64, &str); 4] = [(1e12, "T"), (1e9, "G"), (1e6, "M"), (1e3, "K")];

/// Format a quantity with a decimal SI suffix ("12.50M")
pub fn format_units(value: f64) -> String {
    for (quant, unit) in UNITS {
        if value > quant {
            return format!("{:3.2}{}", value / quant, unit);
        }
    }

    format!("{:3.2} ", value)
}

/// Percentage of `total`, or blank when there is no total
pub fn format_percentage(num: f64, total: f64) -> String {
    if total > 0.0 {
        format!("{:3.2}", num / total * 100.0)
    } else {
        " ".to_string()
    }
}

/// Seconds of a run with an SI suffix
pub fn format_duration(duration: Duration) -> String {
    format_units(duration.num_milliseconds() as f64 / 1000.0)
}
