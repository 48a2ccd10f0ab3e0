//! Provide the domain interface to the mount.
//!
//! Every operation is a thin mapping from a [`MountCmd`] to its reply
//! interpretation. The driver keeps no copy of mount state; the mount is
//! always asked.

use std::{io, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task,
    time::sleep,
};

use crate::{
    angle::{degrees_to_dms, dms_to_degrees, hms_to_hours, hours_to_hms},
    command_channel::{CommandChannel, MountConnection},
    error::{ObservatoryError, ObservatoryResult},
    mount_cmd::{Command, Framing, MountCmd, ReplyExpectation},
    mount_status::{
        ConnectionType, Direction, ElementTemperature, HomeStatus, JulianPrecision, MountStatus,
        NetworkInfo, PierSide, SlewResult, WirelessScan,
    },
    pointing::PointingSource,
};

/// Reply the mount gives for a temperature sensor it cannot read.
pub const TEMPERATURE_UNAVAILABLE: &str = "Unavailable";

pub const MIN_ALTITUDE_LIMIT: i32 = 0;
pub const MAX_ALTITUDE_LIMIT: i32 = 90;

/// Largest clock adjustment `:AT` accepts, in milliseconds.
pub const MAX_TIME_ADJUST_MS: i32 = 999;

/// Per axis acceptance of a two-axis equatorial target.
///
/// The axes are sent as two independent commands, so one may be accepted
/// while the other is not. No rollback is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EquatorialTargetAck {
    pub ra: bool,
    pub dec: bool,
}

impl EquatorialTargetAck {
    pub fn accepted(&self) -> bool {
        self.ra && self.dec
    }
}

/// Per axis acceptance of a two-axis horizontal target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HorizontalTargetAck {
    pub alt: bool,
    pub az: bool,
}

impl HorizontalTargetAck {
    pub fn accepted(&self) -> bool {
        self.alt && self.az
    }
}

#[derive(Debug)]
pub struct MountDriver {
    channel: CommandChannel,
}

impl MountDriver {
    pub fn new(connection: MountConnection) -> MountDriver {
        MountDriver {
            channel: CommandChannel::new(connection),
        }
    }

    pub fn connection(&self) -> &MountConnection {
        self.channel.connection()
    }

    /// Connect and switch the mount to ultra precision coordinates.
    pub async fn connect(&self) -> ObservatoryResult<()> {
        self.channel.connect().await?;
        self.send(MountCmd::UltraPrecision).await?;
        log::info!(
            "Connected to mount at {}:{}.",
            self.connection().host,
            self.connection().port
        );
        Ok(())
    }

    /// Drive the mount over an already open stream.
    pub async fn connect_stream<S>(&self, stream: S) -> ObservatoryResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.channel.attach_stream(stream).await;
        self.send(MountCmd::UltraPrecision).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.channel.close().await;
    }

    pub async fn is_connected(&self) -> bool {
        self.channel.is_connected().await
    }

    async fn send(&self, mount_cmd: MountCmd) -> ObservatoryResult<String> {
        self.channel.send(&mount_cmd.command(), None).await
    }

    /// Send an arbitrary mnemonic, for debugging.
    pub async fn send_raw(
        &self,
        mnemonic: &str,
        framing: Framing,
        reply: ReplyExpectation,
        timeout: Option<Duration>,
    ) -> ObservatoryResult<String> {
        self.channel
            .send(&Command::new(mnemonic, framing, reply), timeout)
            .await
    }

    // Status

    pub async fn get_status_code(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetStatus).await
    }

    pub async fn get_status(&self) -> ObservatoryResult<String> {
        let code = self.get_status_code().await?;
        Ok(MountStatus::describe(&code))
    }

    /// Typed status, `None` for codes outside the known table.
    pub async fn get_mount_status(&self) -> ObservatoryResult<Option<MountStatus>> {
        let code = self.get_status_code().await?;
        Ok(code.parse::<u8>().ok().and_then(MountStatus::from_code))
    }

    /// True when the mount can accept a slew (tracking or idle).
    pub async fn is_ready(&self) -> ObservatoryResult<bool> {
        Ok(matches!(
            self.get_mount_status().await?,
            Some(MountStatus::Tracking) | Some(MountStatus::Idle)
        ))
    }

    pub async fn is_tracking(&self) -> ObservatoryResult<bool> {
        Ok(self.send(MountCmd::GetTracking).await? == "1")
    }

    pub async fn target_trackable(&self) -> ObservatoryResult<bool> {
        Ok(self.send(MountCmd::GetTargetTrackable).await? == "1")
    }

    pub async fn start_tracking(&self) -> ObservatoryResult<()> {
        self.send(MountCmd::StartTracking).await.map(|_| ())
    }

    pub async fn stop_tracking(&self) -> ObservatoryResult<()> {
        self.send(MountCmd::StopTracking).await.map(|_| ())
    }

    pub async fn set_tracking(&self, enabled: bool) -> ObservatoryResult<()> {
        if enabled {
            self.start_tracking().await
        } else {
            self.stop_tracking().await
        }
    }

    pub async fn pier_side(&self) -> ObservatoryResult<PierSide> {
        self.send(MountCmd::GetPierSide).await?.parse()
    }

    pub async fn get_element_temperature(
        &self,
        element: u8,
    ) -> ObservatoryResult<ElementTemperature> {
        let reply = self.send(MountCmd::GetElementTemperature(element)).await?;
        parse_temperature(&reply)
    }

    // Identity

    pub async fn firmware_date(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetFirmwareDate).await
    }

    pub async fn firmware_number(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetFirmwareNumber).await
    }

    pub async fn product_name(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetProductName).await
    }

    pub async fn firmware_time(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetFirmwareTime).await
    }

    pub async fn hardware_version(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetHardwareVersion).await
    }

    // Position

    pub async fn get_mount_ra(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetRa).await
    }

    pub async fn get_mount_dec(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetDec).await
    }

    pub async fn get_mount_ra_dec(&self) -> ObservatoryResult<(String, String)> {
        Ok((self.get_mount_ra().await?, self.get_mount_dec().await?))
    }

    /// Current RA in hours and Dec in degrees.
    pub async fn get_mount_ra_dec_decimal(&self) -> ObservatoryResult<(f64, f64)> {
        let (ra, dec) = self.get_mount_ra_dec().await?;
        Ok((parse_hours(&ra)?, parse_degrees(&dec)?))
    }

    pub async fn get_mount_alt(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetAlt).await
    }

    pub async fn get_mount_az(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetAz).await
    }

    pub async fn get_mount_alt_az(&self) -> ObservatoryResult<(String, String)> {
        Ok((self.get_mount_alt().await?, self.get_mount_az().await?))
    }

    pub async fn get_mount_alt_az_decimal(&self) -> ObservatoryResult<(f64, f64)> {
        let (alt, az) = self.get_mount_alt_az().await?;
        Ok((parse_degrees(&alt)?, parse_degrees(&az)?))
    }

    // Target

    pub async fn get_target_ra(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetTargetRa).await
    }

    pub async fn get_target_dec(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetTargetDec).await
    }

    pub async fn get_target_ra_dec(&self) -> ObservatoryResult<(String, String)> {
        Ok((self.get_target_ra().await?, self.get_target_dec().await?))
    }

    pub async fn get_target_ra_dec_decimal(&self) -> ObservatoryResult<(f64, f64)> {
        let (ra, dec) = self.get_target_ra_dec().await?;
        Ok((parse_hours(&ra)?, parse_degrees(&dec)?))
    }

    pub async fn get_target_alt(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetTargetAlt).await
    }

    pub async fn get_target_az(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetTargetAz).await
    }

    pub async fn get_target_alt_az(&self) -> ObservatoryResult<(String, String)> {
        Ok((self.get_target_alt().await?, self.get_target_az().await?))
    }

    pub async fn get_target_alt_az_decimal(&self) -> ObservatoryResult<(f64, f64)> {
        let (alt, az) = self.get_target_alt_az().await?;
        Ok((parse_degrees(&alt)?, parse_degrees(&az)?))
    }

    pub async fn set_target_ra(&self, ra_hours: f64) -> ObservatoryResult<bool> {
        let reply = self
            .send(MountCmd::SetTargetRa(hours_to_hms(ra_hours)))
            .await?;
        Ok(reply == "1")
    }

    pub async fn set_target_dec(&self, dec_degrees: f64) -> ObservatoryResult<bool> {
        let reply = self
            .send(MountCmd::SetTargetDec(degrees_to_dms(dec_degrees, true)))
            .await?;
        Ok(reply == "1")
    }

    /// Set RA then Dec. A failure on Dec leaves the new RA in place.
    pub async fn set_target_ra_dec(
        &self,
        ra_hours: f64,
        dec_degrees: f64,
    ) -> ObservatoryResult<EquatorialTargetAck> {
        let ra = self.set_target_ra(ra_hours).await?;
        let dec = self.set_target_dec(dec_degrees).await?;
        Ok(EquatorialTargetAck { ra, dec })
    }

    pub async fn set_target_alt(&self, alt_degrees: f64) -> ObservatoryResult<bool> {
        let reply = self
            .send(MountCmd::SetTargetAlt(degrees_to_dms(alt_degrees, true)))
            .await?;
        Ok(reply == "1")
    }

    pub async fn set_target_az(&self, az_degrees: f64) -> ObservatoryResult<bool> {
        let reply = self
            .send(MountCmd::SetTargetAz(degrees_to_dms(az_degrees, false)))
            .await?;
        Ok(reply == "1")
    }

    /// Set Alt then Az. A failure on Az leaves the new Alt in place.
    pub async fn set_target_alt_az(
        &self,
        alt_degrees: f64,
        az_degrees: f64,
    ) -> ObservatoryResult<HorizontalTargetAck> {
        let alt = self.set_target_alt(alt_degrees).await?;
        let az = self.set_target_az(az_degrees).await?;
        Ok(HorizontalTargetAck { alt, az })
    }

    // Slew

    /// Slew to the equatorial target.
    ///
    /// With a pier side the qualified slew is sent instead; the mount does
    /// not answer it, so the result is [`SlewResult::Requested`].
    pub async fn slew_to_target_equatorial(
        &self,
        pier_side: Option<PierSide>,
    ) -> ObservatoryResult<SlewResult> {
        match pier_side {
            Some(pier_side) => {
                self.send(MountCmd::SlewEquatorialPierSide(pier_side))
                    .await?;
                log::info!("Requested slew to target on pier {pier_side}.");
                Ok(SlewResult::Requested)
            }
            None => {
                let reply = self.send(MountCmd::SlewEquatorial).await?;
                let result = SlewResult::from_reply(&reply);
                log::info!("Slew to target: {result:?}.");
                Ok(result)
            }
        }
    }

    pub async fn slew_to_target_altaz(&self) -> ObservatoryResult<()> {
        self.send(MountCmd::SlewAltAz).await.map(|_| ())
    }

    pub async fn set_max_slew_rate(&self, rate: u32) -> ObservatoryResult<bool> {
        Ok(self.send(MountCmd::SetMaxSlewRate(rate)).await? == "1")
    }

    // Motion

    pub async fn stop_all_movement(&self) -> ObservatoryResult<()> {
        self.send(MountCmd::StopAll).await.map(|_| ())
    }

    /// Halt motion in one direction, or in all directions with `None`.
    pub async fn halt_movement(&self, direction: Option<Direction>) -> ObservatoryResult<()> {
        self.send(MountCmd::Halt(direction)).await.map(|_| ())
    }

    pub async fn move_direction(&self, direction: Direction) -> ObservatoryResult<()> {
        self.send(MountCmd::Move(direction)).await.map(|_| ())
    }

    /// Move in `direction` for `duration_ms` then halt that direction.
    ///
    /// The halt runs on its own task, so it is still sent if the caller
    /// drops this future while waiting.
    pub async fn nudge(&self, direction: Direction, duration_ms: u64) -> ObservatoryResult<()> {
        if duration_ms == 0 {
            return Err(ObservatoryError::validation(
                "nudge duration must be a positive number of milliseconds",
            ));
        }
        let sender = self.channel.sender().await?;
        self.move_direction(direction).await?;

        let halt = MountCmd::Halt(Some(direction)).command();
        let halt_task = task::spawn(async move {
            sleep(Duration::from_millis(duration_ms)).await;
            sender.send(&halt, None).await
        });
        match halt_task.await {
            Ok(reply) => reply.map(|_| ()),
            Err(error) => Err(ObservatoryError::Transport(io::Error::other(format!(
                "nudge halt task failed: {error}"
            )))),
        }
    }

    /// Ask for a meridian flip; true when the mount accepted it.
    pub async fn flip(&self) -> ObservatoryResult<bool> {
        Ok(self.send(MountCmd::Flip).await? == "1")
    }

    pub async fn park(&self) -> ObservatoryResult<()> {
        self.send(MountCmd::Park).await.map(|_| ())
    }

    pub async fn unpark(&self) -> ObservatoryResult<()> {
        self.send(MountCmd::Unpark).await.map(|_| ())
    }

    pub async fn seek_home(&self) -> ObservatoryResult<()> {
        self.send(MountCmd::SeekHome).await.map(|_| ())
    }

    pub async fn home_status(&self) -> ObservatoryResult<HomeStatus> {
        HomeStatus::from_reply(&self.send(MountCmd::GetHomeStatus).await?)
    }

    // Limits

    pub async fn get_lower_limit(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetLowerLimit).await
    }

    pub async fn get_upper_limit(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetUpperLimit).await
    }

    /// Set the high altitude limit, in whole degrees within [0, 90].
    pub async fn set_high_alt_limit(&self, degrees: i32) -> ObservatoryResult<bool> {
        if !(MIN_ALTITUDE_LIMIT..=MAX_ALTITUDE_LIMIT).contains(&degrees) {
            return Err(ObservatoryError::validation(format!(
                "altitude limit must be between {MIN_ALTITUDE_LIMIT} and {MAX_ALTITUDE_LIMIT} degrees, got {degrees}"
            )));
        }
        let reply = self.send(MountCmd::SetUpperLimit(degrees as u8)).await?;
        Ok(reply == "1")
    }

    // Time

    pub async fn get_local_time(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetLocalTime).await
    }

    pub async fn get_current_date(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetDate).await
    }

    /// Local `(date, time)` as `(YYYY-MM-DD, HH:MM:SS.SS)`.
    pub async fn get_local_date_time(&self) -> ObservatoryResult<(String, String)> {
        split_date_time(&self.send(MountCmd::GetLocalDateTime).await?)
    }

    pub async fn get_utc_date_time(&self) -> ObservatoryResult<(String, String)> {
        split_date_time(&self.send(MountCmd::GetUtcDateTime).await?)
    }

    pub async fn get_utc_offset(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetUtcOffset).await
    }

    pub async fn get_sidereal_time(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetSiderealTime).await
    }

    pub async fn get_sidereal_hours(&self) -> ObservatoryResult<f64> {
        parse_hours(&self.get_sidereal_time().await?)
    }

    pub async fn get_julian_date(&self, precision: JulianPrecision) -> ObservatoryResult<String> {
        self.send(MountCmd::GetJulianDate(precision)).await
    }

    pub async fn set_local_time(&self, time_hms: &str) -> ObservatoryResult<bool> {
        Ok(self.send(MountCmd::SetLocalTime(time_hms.to_owned())).await? == "1")
    }

    pub async fn set_local_date_time(&self, date: &str, time_hms: &str) -> ObservatoryResult<bool> {
        let reply = self
            .send(MountCmd::SetLocalDateTime(
                date.to_owned(),
                time_hms.to_owned(),
            ))
            .await?;
        Ok(reply == "1")
    }

    pub async fn set_utc_date_time(&self, date: &str, time_hms: &str) -> ObservatoryResult<bool> {
        let reply = self
            .send(MountCmd::SetUtcDateTime(date.to_owned(), time_hms.to_owned()))
            .await?;
        Ok(reply == "1")
    }

    pub async fn set_julian_date(&self, julian_date: &str) -> ObservatoryResult<bool> {
        Ok(self
            .send(MountCmd::SetJulianDate(julian_date.to_owned()))
            .await?
            == "1")
    }

    /// Nudge the mount clock by `ms` milliseconds.
    pub async fn adjust_mount_time(&self, ms: i32) -> ObservatoryResult<bool> {
        if !(-MAX_TIME_ADJUST_MS..=MAX_TIME_ADJUST_MS).contains(&ms) {
            return Err(ObservatoryError::validation(format!(
                "time adjustment must be within ±{MAX_TIME_ADJUST_MS} ms, got {ms}"
            )));
        }
        Ok(self.send(MountCmd::AdjustTime(ms)).await? == "1")
    }

    // Network

    pub async fn get_connection_type(&self) -> ObservatoryResult<ConnectionType> {
        ConnectionType::from_reply(&self.send(MountCmd::GetConnectionType).await?)
    }

    pub async fn get_ip_info(&self, wireless: bool) -> ObservatoryResult<NetworkInfo> {
        NetworkInfo::from_reply(&self.send(MountCmd::GetIpInfo { wireless }).await?)
    }

    /// Start an access point scan; false when there is no wireless adapter.
    pub async fn scan_wireless(&self) -> ObservatoryResult<bool> {
        Ok(self.send(MountCmd::ScanWireless).await? == "1")
    }

    /// Poll the access point scan.
    ///
    /// [`WirelessScan::InProgress`] is not an error; poll again later.
    pub async fn wireless_access_points(&self) -> ObservatoryResult<WirelessScan> {
        WirelessScan::from_reply(&self.send(MountCmd::GetAccessPoints).await?)
    }

    // Event log

    pub async fn start_log(&self) -> ObservatoryResult<()> {
        self.send(MountCmd::StartLog).await.map(|_| ())
    }

    pub async fn stop_log(&self) -> ObservatoryResult<()> {
        self.send(MountCmd::StopLog).await.map(|_| ())
    }

    pub async fn get_event_log(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetEventLog).await
    }

    pub async fn get_communication_log(&self) -> ObservatoryResult<String> {
        self.send(MountCmd::GetCommunicationLog).await
    }
}

#[async_trait]
impl PointingSource for MountDriver {
    async fn ra_dec_decimal(&self) -> ObservatoryResult<(f64, f64)> {
        self.get_mount_ra_dec_decimal().await
    }

    async fn sidereal_hours(&self) -> ObservatoryResult<f64> {
        self.get_sidereal_hours().await
    }

    async fn pier_side(&self) -> ObservatoryResult<PierSide> {
        MountDriver::pier_side(self).await
    }
}

/// Mounts may separate degrees with '*' or the degree sign.
fn normalize_separators(text: &str) -> String {
    text.replace(['*', '°'], ":")
}

fn parse_hours(text: &str) -> ObservatoryResult<f64> {
    hms_to_hours(&normalize_separators(text))
}

fn parse_degrees(text: &str) -> ObservatoryResult<f64> {
    dms_to_degrees(&normalize_separators(text))
}

fn parse_temperature(reply: &str) -> ObservatoryResult<ElementTemperature> {
    if reply == TEMPERATURE_UNAVAILABLE {
        return Ok(ElementTemperature::Unavailable);
    }
    reply
        .parse::<f64>()
        .map(ElementTemperature::Celsius)
        .map_err(|_| ObservatoryError::protocol(format!("unknown temperature format '{reply}'")))
}

fn split_date_time(reply: &str) -> ObservatoryResult<(String, String)> {
    match reply.split_once(',') {
        Some((date, time)) => Ok((date.to_owned(), time.to_owned())),
        None => Err(ObservatoryError::protocol(format!(
            "expected 'date,time', got '{reply}'"
        ))),
    }
}
