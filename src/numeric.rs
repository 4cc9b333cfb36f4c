//! Integer and float parsing/formatting helpers shared by the string,
//! hash, and sorted-set command families.

use crate::error::EngineError;

/// Parses a byte string as a canonical signed 64-bit integer the way Redis
/// does: optional leading `-`, no leading `+`, no leading zeros other than
/// a bare `0`, no surrounding whitespace.
pub fn parse_i64(bytes: &[u8]) -> Result<i64, EngineError> {
    let s = std::str::from_utf8(bytes).map_err(|_| EngineError::NotAnInteger)?;
    s.parse::<i64>().map_err(|_| EngineError::NotAnInteger)
}

/// Parses a byte string as an `f64`, rejecting `NaN` and anything that
/// doesn't round-trip through Rust's float parser (leading/trailing
/// garbage, empty string).
pub fn parse_f64(bytes: &[u8]) -> Result<f64, EngineError> {
    let s = std::str::from_utf8(bytes).map_err(|_| EngineError::NotAFloat)?;
    let value: f64 = s.trim().parse().map_err(|_| EngineError::NotAFloat)?;
    if value.is_nan() {
        return Err(EngineError::NotAFloat);
    }
    Ok(value)
}

/// Parses a zset score, which additionally accepts `+inf`/`-inf` spelled
/// several ways and rejects `NaN`.
pub fn parse_score(bytes: &[u8]) -> Result<f64, EngineError> {
    let s = std::str::from_utf8(bytes).map_err(|_| EngineError::NotAValidFloat)?;
    let trimmed = s.trim();
    let value: f64 = match trimmed.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" | "+infinity" => f64::INFINITY,
        "-inf" | "-infinity" => f64::NEG_INFINITY,
        _ => trimmed
            .parse()
            .map_err(|_| EngineError::NotAValidFloat)?,
    };
    if value.is_nan() {
        return Err(EngineError::NotAValidFloat);
    }
    Ok(value)
}

/// Formats a float the way Redis emits scores and `INCRBYFLOAT` results:
/// no trailing zeros, no decimal point for integer values, `inf`/`-inf`
/// literally, never `NaN` (callers must reject `NaN` before formatting).
pub fn format_float(value: f64) -> String {
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    if value == value.trunc() && value.abs() < 1e17 {
        #[allow(clippy::cast_possible_truncation)]
        return format!("{}", value as i64);
    }
    let mut formatted = format!("{value:.17}");
    while formatted.ends_with('0') {
        formatted.pop();
    }
    if formatted.ends_with('.') {
        formatted.pop();
    }
    // `{:.17}` sometimes over-shoots precision; fall back to the shortest
    // round-tripping representation when that happens.
    if formatted.parse::<f64>() != Ok(value) {
        formatted = format!("{value}");
    }
    formatted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers() {
        assert_eq!(parse_i64(b"123").unwrap(), 123);
        assert_eq!(parse_i64(b"-123").unwrap(), -123);
        assert!(parse_i64(b"").is_err());
        assert!(parse_i64(b"1.0").is_err());
        assert!(parse_i64(b" 1").is_err());
    }

    #[test]
    fn floats() {
        assert_eq!(parse_f64(b"3.0").unwrap(), 3.0);
        assert!(parse_f64(b"nan").is_err());
    }

    #[test]
    fn scores() {
        assert_eq!(parse_score(b"+inf").unwrap(), f64::INFINITY);
        assert_eq!(parse_score(b"-inf").unwrap(), f64::NEG_INFINITY);
        assert!(parse_score(b"nan").is_err());
    }

    #[test]
    fn formatting() {
        assert_eq!(format_float(3.0), "3");
        assert_eq!(format_float(3.5), "3.5");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NEG_INFINITY), "-inf");
        assert_eq!(format_float(-0.0_f64.abs()), "0");
    }
}
