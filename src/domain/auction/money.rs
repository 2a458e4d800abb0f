//! Minor-unit currency conversion.
//!
//! All auction arithmetic happens on integer minor units (cents). Floating
//! point only appears at the HTTP boundary, where clients submit prices in
//! major units; the conversion rounds half-up once and never again.

/// Converts a major-unit amount (e.g. dollars) to integer minor units (cents),
/// rounding half-up.
pub fn to_cents(major: f64) -> i64 {
    (major * 100.0 + 0.5).floor() as i64
}

/// Converts integer minor units back to a major-unit amount.
pub fn from_cents(cents: i64) -> f64 {
    cents as f64 / 100.0
}
