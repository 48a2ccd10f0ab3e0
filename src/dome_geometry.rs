//! Compute the dome azimuth that keeps the slit in front of an off-axis
//! German equatorial mount.
//!
//! Positions are expressed in a local horizon frame centered on the dome
//! floor: +X east, +Y up, +Z south.

use serde::{Deserialize, Serialize};

use crate::{angle::normalize_degrees, mount_status::PierSide};

type Vector3 = [f64; 3];
type Matrix3 = [[f64; 3]; 3];

/// Observatory and mount dimensions. Lengths in meters, angles in degrees.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DomeGeometryConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub dome_radius: f64,
    /// North-south offset of the RA pivot from the dome axis, south positive.
    pub mount_offset_ns: f64,
    /// East-west offset of the RA pivot from the dome axis, east positive.
    pub mount_offset_ew: f64,
    /// Height of the RA axis pivot above the floor.
    pub mount_pier_height: f64,
    pub polar_axis_to_dec_axis: f64,
    pub dec_axis_to_telescope: f64,
}

impl Default for DomeGeometryConfig {
    fn default() -> Self {
        DomeGeometryConfig {
            latitude: -33.8559799094,
            longitude: 151.20666584,
            elevation: 46.0,
            dome_radius: 2.5,
            mount_offset_ns: 0.0,
            mount_offset_ew: 0.0,
            mount_pier_height: 1.2,
            polar_axis_to_dec_axis: 0.25,
            dec_axis_to_telescope: 0.35,
        }
    }
}

impl DomeGeometryConfig {
    /// Every dimension zero: a telescope at the dome center.
    pub fn centered() -> DomeGeometryConfig {
        DomeGeometryConfig {
            latitude: 0.0,
            longitude: 0.0,
            elevation: 0.0,
            dome_radius: 0.0,
            mount_offset_ns: 0.0,
            mount_offset_ew: 0.0,
            mount_pier_height: 0.0,
            polar_axis_to_dec_axis: 0.0,
            dec_axis_to_telescope: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DomeGeometry {
    config: DomeGeometryConfig,
    latitude_rotation: Matrix3,
}

impl DomeGeometry {
    pub fn new(config: DomeGeometryConfig) -> DomeGeometry {
        let latitude_rotation = rotation_about_x(-config.latitude.to_radians());
        DomeGeometry {
            config,
            latitude_rotation,
        }
    }

    pub fn config(&self) -> &DomeGeometryConfig {
        &self.config
    }

    /// Telescope position inside the dome for the given pointing.
    pub fn telescope_position(
        &self,
        ra_hours: f64,
        dec_degrees: f64,
        sidereal_hours: f64,
        pier_side: PierSide,
    ) -> Vector3 {
        let hour_angle = ((sidereal_hours - ra_hours) * 15.0).to_radians();
        let dec = dec_degrees.to_radians();
        let pier_flip = match pier_side {
            PierSide::East => std::f64::consts::PI,
            PierSide::West => 0.0,
        };

        let ra_pivot = [
            self.config.mount_offset_ew,
            self.config.mount_pier_height,
            self.config.mount_offset_ns,
        ];

        let hour_angle_rotation = rotation_about_y(hour_angle);

        let polar_axis = [0.0, self.config.polar_axis_to_dec_axis, 0.0];
        let dec_pivot = apply(
            &hour_angle_rotation,
            &apply(&self.latitude_rotation, &polar_axis),
        );

        // Perpendicular to the polar axis, turning with declination.
        let dec_to_tube = scale(
            &[(dec + pier_flip).cos(), 0.0, (dec + pier_flip).sin()],
            self.config.dec_axis_to_telescope,
        );
        let tube_offset = apply(
            &self.latitude_rotation,
            &apply(&hour_angle_rotation, &dec_to_tube),
        );

        add(&add(&ra_pivot, &dec_pivot), &tube_offset)
    }

    /// Dome azimuth in [0, 360), measured from north through east.
    pub fn calculate_dome_azimuth(
        &self,
        ra_hours: f64,
        dec_degrees: f64,
        sidereal_hours: f64,
        pier_side: PierSide,
    ) -> f64 {
        let [x, _, z] = self.telescope_position(ra_hours, dec_degrees, sidereal_hours, pier_side);
        normalize_degrees(x.atan2(-z).to_degrees())
    }
}

fn rotation_about_x(angle: f64) -> Matrix3 {
    let (sin, cos) = angle.sin_cos();
    [[1.0, 0.0, 0.0], [0.0, cos, -sin], [0.0, sin, cos]]
}

fn rotation_about_y(angle: f64) -> Matrix3 {
    let (sin, cos) = angle.sin_cos();
    [[cos, 0.0, sin], [0.0, 1.0, 0.0], [-sin, 0.0, cos]]
}

fn apply(matrix: &Matrix3, vector: &Vector3) -> Vector3 {
    let mut result = [0.0; 3];
    for (row, value) in matrix.iter().zip(result.iter_mut()) {
        *value = row.iter().zip(vector).map(|(m, v)| m * v).sum();
    }
    result
}

fn add(a: &Vector3, b: &Vector3) -> Vector3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

fn scale(vector: &Vector3, factor: f64) -> Vector3 {
    [vector[0] * factor, vector[1] * factor, vector[2] * factor]
}
