//! What the dome sync loop needs to know about the telescope.

use async_trait::async_trait;

use crate::{error::ObservatoryResult, mount_status::PierSide};

/// One consistent read of the telescope pointing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pointing {
    pub ra_hours: f64,
    pub dec_degrees: f64,
    pub sidereal_hours: f64,
    pub pier_side: PierSide,
}

#[async_trait]
pub trait PointingSource: Send + Sync {
    /// Current right ascension (hours) and declination (degrees).
    async fn ra_dec_decimal(&self) -> ObservatoryResult<(f64, f64)>;

    /// Local sidereal time in hours.
    async fn sidereal_hours(&self) -> ObservatoryResult<f64>;

    async fn pier_side(&self) -> ObservatoryResult<PierSide>;

    async fn read_pointing(&self) -> ObservatoryResult<Pointing> {
        let (ra_hours, dec_degrees) = self.ra_dec_decimal().await?;
        let sidereal_hours = self.sidereal_hours().await?;
        let pier_side = self.pier_side().await?;
        Ok(Pointing {
            ra_hours,
            dec_degrees,
            sidereal_hours,
            pier_side,
        })
    }
}
