//! Time scales and coordinate transforms for the simulated mount.
//!
//! Low precision (no precession, nutation or refraction); good to a
//! fraction of a degree, which is all the simulator needs.

use chrono::{DateTime, Utc};

use crate::angle::{normalize_degrees, normalize_hours, shortest_delta_hours};

pub const J2000_JULIAN_DATE: f64 = 2451545.0;
const UNIX_EPOCH_JULIAN_DATE: f64 = 2440587.5;
const SECONDS_PER_DAY: f64 = 86400.0;

pub fn julian_date(time: &DateTime<Utc>) -> f64 {
    let seconds = time.timestamp() as f64 + time.timestamp_subsec_nanos() as f64 * 1e-9;
    UNIX_EPOCH_JULIAN_DATE + seconds / SECONDS_PER_DAY
}

/// Greenwich mean sidereal time in hours.
pub fn greenwich_sidereal_hours(julian_date: f64) -> f64 {
    let days = julian_date - J2000_JULIAN_DATE;
    normalize_hours(18.697374558 + 24.06570982441908 * days)
}

/// Local mean sidereal time in hours, longitude east positive.
pub fn local_sidereal_hours(time: &DateTime<Utc>, longitude: f64) -> f64 {
    normalize_hours(greenwich_sidereal_hours(julian_date(time)) + longitude / 15.0)
}

/// Altitude and azimuth (north through east) in degrees.
pub fn equatorial_to_horizontal(
    ra_hours: f64,
    dec_degrees: f64,
    sidereal_hours: f64,
    latitude: f64,
) -> (f64, f64) {
    let hour_angle = ((sidereal_hours - ra_hours) * 15.0).to_radians();
    let dec = dec_degrees.to_radians();
    let lat = latitude.to_radians();

    let sin_alt = dec.sin() * lat.sin() + dec.cos() * lat.cos() * hour_angle.cos();
    let alt = sin_alt.clamp(-1.0, 1.0).asin();
    let az = (-dec.cos() * hour_angle.sin())
        .atan2(dec.sin() * lat.cos() - dec.cos() * lat.sin() * hour_angle.cos());

    (alt.to_degrees(), normalize_degrees(az.to_degrees()))
}

/// Right ascension (hours) and declination (degrees) of a horizontal position.
pub fn horizontal_to_equatorial(
    alt_degrees: f64,
    az_degrees: f64,
    sidereal_hours: f64,
    latitude: f64,
) -> (f64, f64) {
    let alt = alt_degrees.to_radians();
    let az = az_degrees.to_radians();
    let lat = latitude.to_radians();

    let sin_dec = alt.sin() * lat.sin() + alt.cos() * lat.cos() * az.cos();
    let dec = sin_dec.clamp(-1.0, 1.0).asin();
    let hour_angle = (-az.sin() * alt.cos())
        .atan2(alt.sin() * lat.cos() - alt.cos() * lat.sin() * az.cos());

    let ra_hours = normalize_hours(sidereal_hours - hour_angle.to_degrees() / 15.0);
    (ra_hours, dec.to_degrees())
}

/// Great circle separation in degrees.
pub fn angular_separation(ra1_hours: f64, dec1: f64, ra2_hours: f64, dec2: f64) -> f64 {
    let delta_ra = ((ra2_hours - ra1_hours) * 15.0).to_radians();
    let (dec1, dec2) = (dec1.to_radians(), dec2.to_radians());

    // Vincenty form, stable for small and antipodal separations.
    let numerator = ((dec2.cos() * delta_ra.sin()).powi(2)
        + (dec1.cos() * dec2.sin() - dec1.sin() * dec2.cos() * delta_ra.cos()).powi(2))
    .sqrt();
    let denominator = dec1.sin() * dec2.sin() + dec1.cos() * dec2.cos() * delta_ra.cos();
    numerator.atan2(denominator).to_degrees()
}

/// Point a `fraction` of the way from origin to target, RA along the short way.
pub fn interpolate_equatorial(
    origin: (f64, f64),
    target: (f64, f64),
    fraction: f64,
) -> (f64, f64) {
    let fraction = fraction.clamp(0.0, 1.0);
    let ra = normalize_hours(origin.0 + shortest_delta_hours(origin.0, target.0) * fraction);
    let dec = origin.1 + (target.1 - origin.1) * fraction;
    (ra, dec)
}
