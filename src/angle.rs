//! Convert decimal hours/degrees to and from the sexagesimal strings used
//! on the mount protocol.
//!
//! Hour valued fields (right ascension, sidereal time) are encoded as
//! `HH:MM:SS.ss`, signed degree fields (declination, altitude) as
//! `sDD:MM:SS.ss` and azimuth as the unsigned `DDD:MM:SS.ss`.

use crate::error::{ObservatoryError, ObservatoryResult};

/// Split a decimal value into whole units, whole minutes and seconds
/// rounded to centiseconds, carrying a rounded 60.00 into the minutes.
fn split_sexagesimal(value: f64) -> (i64, i64, f64) {
    let mut whole = value.trunc() as i64;
    let minutes_fract = (value - whole as f64) * 60.0;
    let mut minutes = minutes_fract.trunc() as i64;
    let mut seconds = ((value - whole as f64 - minutes as f64 / 60.0) * 3600.0 * 100.0).round()
        / 100.0;

    if seconds >= 60.0 {
        seconds -= 60.0;
        minutes += 1;
    }
    if minutes >= 60 {
        minutes -= 60;
        whole += 1;
    }
    (whole, minutes, seconds.abs())
}

/// Encode hours as `HH:MM:SS.ss`, wrapped into [0, 24).
pub fn hours_to_hms(hours: f64) -> String {
    let (h, m, s) = split_sexagesimal(normalize_hours(hours));
    format!("{:02}:{m:02}:{s:05.2}", h % 24)
}

/// Encode degrees as `sDD:MM:SS.ss`, or unsigned as `DDD:MM:SS.ss`
/// wrapped into [0, 360).
pub fn degrees_to_dms(degrees: f64, signed: bool) -> String {
    if signed {
        let sign = if degrees < 0.0 { "-" } else { "+" };
        let (d, m, s) = split_sexagesimal(degrees.abs());
        format!("{sign}{d:02}:{m:02}:{s:05.2}")
    } else {
        let (d, m, s) = split_sexagesimal(normalize_degrees(degrees));
        format!("{:03}:{m:02}:{s:05.2}", d % 360)
    }
}

fn parse_fields(text: &str) -> ObservatoryResult<[f64; 3]> {
    let tokens: Vec<&str> = text.split(':').collect();
    if tokens.len() != 3 {
        return Err(ObservatoryError::format(format!(
            "expected 3 ':' separated fields, got {} in '{text}'",
            tokens.len()
        )));
    }
    let mut fields = [0.0; 3];
    for (field, token) in fields.iter_mut().zip(tokens) {
        *field = token
            .trim()
            .parse::<f64>()
            .map_err(|_| ObservatoryError::format(format!("non-numeric field '{token}' in '{text}'")))?;
    }
    Ok(fields)
}

pub fn hms_to_hours(text: &str) -> ObservatoryResult<f64> {
    let trimmed = text.trim();
    let sign = if trimmed.starts_with('-') { -1.0 } else { 1.0 };
    let [h, m, s] = parse_fields(trimmed.trim_start_matches(['+', '-']))?;
    Ok(sign * (h.abs() + m / 60.0 + s / 3600.0))
}

pub fn dms_to_degrees(text: &str) -> ObservatoryResult<f64> {
    let trimmed = text.trim();
    let sign = if trimmed.starts_with('-') { -1.0 } else { 1.0 };
    let [d, m, s] = parse_fields(trimmed.trim_start_matches(['+', '-']))?;
    Ok(sign * (d.abs() + m / 60.0 + s / 3600.0))
}

/// Wrap an angle into [0, 360).
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Signed shortest rotation from `from` to `to`, in (-180, 180].
pub fn shortest_delta_degrees(from: f64, to: f64) -> f64 {
    let delta = normalize_degrees(to - from);
    if delta > 180.0 {
        delta - 360.0
    } else {
        delta
    }
}

/// Signed shortest hour difference from `from` to `to`, in (-12, 12].
pub fn shortest_delta_hours(from: f64, to: f64) -> f64 {
    shortest_delta_degrees(from * 15.0, to * 15.0) / 15.0
}

pub fn normalize_hours(hours: f64) -> f64 {
    normalize_degrees(hours * 15.0) / 15.0
}
