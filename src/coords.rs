// Coordinate parsing - free-form latitude/longitude text to decimal degrees
//
// Accepts three input forms, tried in order (first match wins):
// - exactly six digits, read as DDMMSS ("282030")
// - compact DMS with a hemisphere suffix ("1233045E", "123045W")
// - plain decimal degrees ("28.614", "-77.2")
//
// Anything else is rejected by returning None; parse failure is never an error
// condition here, callers re-prompt the user.

/// Parse free-form coordinate text into signed decimal degrees.
///
/// The six-digit DDMMSS form carries no hemisphere indicator and therefore
/// never produces a negative value; southern/western coordinates must use the
/// suffixed form or a signed decimal. No range check is applied here - that
/// happens at the store/query boundary (see [`in_range`]).
pub fn parse_lat_lon(input: &str) -> Option<f64> {
    let normalized: String = input
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if normalized.is_empty() {
        return None;
    }

    if normalized.len() == 6 && normalized.bytes().all(|b| b.is_ascii_digit()) {
        return dms_to_degrees(&normalized[0..2], &normalized[2..4], &normalized[4..6]);
    }

    if let Some(value) = parse_compact_dms(&normalized) {
        return Some(value);
    }

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Range check against the axis the text was entered for.
/// Applied by callers after parsing, before a value reaches the store or a query.
pub fn in_range(value: f64, is_latitude: bool) -> bool {
    if !value.is_finite() {
        return false;
    }
    if is_latitude {
        (-90.0..=90.0).contains(&value)
    } else {
        (-180.0..=180.0).contains(&value)
    }
}

/// Parse then range-validate in one step. Used by the search/locate path,
/// where the axis of the input box is known.
pub fn parse_validated(input: &str, is_latitude: bool) -> Option<f64> {
    parse_lat_lon(input).filter(|&v| in_range(v, is_latitude))
}

/// Compact DMS with hemisphere suffix: a 2-3 digit degree field, two minute
/// digits, two second digits, then one of N/S/E/W. S and W negate.
///
/// A six-digit body with an N/S suffix is rejected: it is indistinguishable
/// from the bare DDMMSS latitude form, so accepting it would fold the two
/// rules together.
fn parse_compact_dms(s: &str) -> Option<f64> {
    if !s.is_ascii() || s.len() < 7 || s.len() > 8 {
        return None;
    }

    let (body, suffix) = s.split_at(s.len() - 1);
    let suffix = suffix.bytes().next()?;
    if !matches!(suffix, b'N' | b'S' | b'E' | b'W') {
        return None;
    }
    if !body.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if body.len() == 6 && matches!(suffix, b'N' | b'S') {
        return None;
    }

    let deg_width = body.len() - 4;
    let value = dms_to_degrees(
        &body[..deg_width],
        &body[deg_width..deg_width + 2],
        &body[deg_width + 2..],
    )?;

    if matches!(suffix, b'S' | b'W') {
        Some(-value)
    } else {
        Some(value)
    }
}

fn dms_to_degrees(deg: &str, min: &str, sec: &str) -> Option<f64> {
    let d: f64 = deg.parse().ok()?;
    let m: f64 = min.parse().ok()?;
    let s: f64 = sec.parse().ok()?;
    Some(d + m / 60.0 + s / 3600.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-4;

    #[test]
    fn test_six_digit_ddmmss() {
        let v = parse_lat_lon("282030").unwrap();
        assert!((v - (28.0 + 20.0 / 60.0 + 30.0 / 3600.0)).abs() < EPSILON);
        assert!((v - 28.3417).abs() < EPSILON);
    }

    #[test]
    fn test_six_digit_never_negative() {
        // No hemisphere indicator in this form, so the result is always >= 0.
        assert!(parse_lat_lon("000000").unwrap() >= 0.0);
        assert!(parse_lat_lon("893050").unwrap() > 0.0);
    }

    #[test]
    fn test_six_digit_ns_suffix_rejected() {
        // Boundary case: a 6-digit body with a latitude hemisphere collides
        // with the bare DDMMSS form and must not parse.
        assert_eq!(parse_lat_lon("282030S"), None);
        assert_eq!(parse_lat_lon("282030N"), None);
    }

    #[test]
    fn test_compact_dms_west() {
        let v = parse_lat_lon("123045W").unwrap();
        assert!((v - -(12.0 + 30.0 / 60.0 + 45.0 / 3600.0)).abs() < EPSILON);
    }

    #[test]
    fn test_compact_dms_three_digit_degrees() {
        let v = parse_lat_lon("1233045E").unwrap();
        assert!((v - (123.0 + 30.0 / 60.0 + 45.0 / 3600.0)).abs() < EPSILON);

        let v = parse_lat_lon("0282030S").unwrap();
        assert!((v - -(28.0 + 20.0 / 60.0 + 30.0 / 3600.0)).abs() < EPSILON);
    }

    #[test]
    fn test_plain_decimal() {
        assert!((parse_lat_lon("28.614").unwrap() - 28.614).abs() < 1e-9);
        assert!((parse_lat_lon("-77.2").unwrap() - -77.2).abs() < 1e-9);
    }

    #[test]
    fn test_whitespace_normalization() {
        let v = parse_lat_lon("  12 30 45 W ").unwrap();
        assert!((v - -12.5125).abs() < EPSILON);
    }

    #[test]
    fn test_invalid_input() {
        assert_eq!(parse_lat_lon("not-a-coord"), None);
        assert_eq!(parse_lat_lon(""), None);
        assert_eq!(parse_lat_lon("   "), None);
        assert_eq!(parse_lat_lon("28.6.1"), None);
        assert_eq!(parse_lat_lon("282030X"), None);
        assert_eq!(parse_lat_lon("nan"), None);
        assert_eq!(parse_lat_lon("inf"), None);
    }

    #[test]
    fn test_in_range() {
        assert!(in_range(90.0, true));
        assert!(!in_range(90.5, true));
        assert!(in_range(-180.0, false));
        assert!(!in_range(180.5, false));
        assert!(!in_range(f64::NAN, true));
    }

    #[test]
    fn test_parse_validated() {
        // Parses, but 123.5125 degrees is out of range for a latitude.
        assert!(parse_validated("1233045E", false).is_some());
        assert_eq!(parse_validated("1233045N", true), None);
        assert!(parse_validated("28.614", true).is_some());
    }
}
