//! Simulated mount state answering the command vocabulary.

use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeDelta, Timelike, Utc};
use tokio::time::{Duration, Instant};

use crate::{
    angle::{degrees_to_dms, dms_to_degrees, hms_to_hours, hours_to_hms},
    mount_cmd::MountCmd,
    mount_model::MAX_TIME_ADJUST_MS,
    mount_status::{JulianPrecision, MountStatus, PierSide},
    sidereal::{
        angular_separation, equatorial_to_horizontal, horizontal_to_equatorial,
        interpolate_equatorial, julian_date, local_sidereal_hours,
    },
};

pub const SITE_LATITUDE: f64 = -33.8559799094;
pub const SITE_LONGITUDE: f64 = 151.20666584;

/// Starting pointing, 14:39:36.5 -60:50:02.
pub const INITIAL_RA_HOURS: f64 = 14.0 + 39.0 / 60.0 + 36.5 / 3600.0;
pub const INITIAL_DEC_DEGREES: f64 = -(60.0 + 50.0 / 60.0 + 2.0 / 3600.0);

pub const DEFAULT_SLEW_RATE: f64 = 10.0;
const MIN_SLEW_RATE: u32 = 2;
const MAX_SLEW_RATE: u32 = 15;

const LOWER_LIMIT: &str = "+05";
const UNAVAILABLE_ELEMENTS: [u8; 3] = [11, 12, 13];

#[derive(Debug, Clone, Copy)]
struct Slew {
    origin: (f64, f64),
    target: (f64, f64),
    start: Instant,
    duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WirelessScanState {
    Idle,
    Scanning,
    Done,
}

#[derive(Debug)]
pub struct MountState {
    latitude: f64,
    longitude: f64,
    current: (f64, f64),
    target_ra: Option<f64>,
    target_dec: Option<f64>,
    target_alt: Option<f64>,
    target_az: Option<f64>,
    pier_side: PierSide,
    parked: bool,
    tracking: bool,
    slew: Option<Slew>,
    slew_rate: f64,
    upper_limit: u8,
    clock_offset: TimeDelta,
    wireless_scan: WirelessScanState,
    logging: bool,
    event_log: Vec<String>,
    communication_log: Vec<String>,
}

impl Default for MountState {
    fn default() -> Self {
        MountState::new(SITE_LATITUDE, SITE_LONGITUDE)
    }
}

impl MountState {
    pub fn new(latitude: f64, longitude: f64) -> MountState {
        MountState {
            latitude,
            longitude,
            current: (INITIAL_RA_HOURS, INITIAL_DEC_DEGREES),
            target_ra: None,
            target_dec: None,
            target_alt: None,
            target_az: None,
            pier_side: PierSide::West,
            parked: true,
            tracking: false,
            slew: None,
            slew_rate: DEFAULT_SLEW_RATE,
            upper_limit: 89,
            clock_offset: TimeDelta::zero(),
            wireless_scan: WirelessScanState::Idle,
            logging: false,
            event_log: Vec::new(),
            communication_log: Vec::new(),
        }
    }

    pub fn is_parked(&self) -> bool {
        self.parked
    }

    pub fn is_slewing(&self) -> bool {
        self.slew.is_some()
    }

    pub fn pier_side(&self) -> PierSide {
        self.pier_side
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        Utc::now() + self.clock_offset
    }

    pub fn sidereal_hours(&self) -> f64 {
        local_sidereal_hours(&self.now_utc(), self.longitude)
    }

    /// Current pointing after resolving any slew at `now`.
    pub fn pointing(&mut self, now: Instant) -> (f64, f64) {
        self.update_slew(now);
        self.current
    }

    fn target(&self) -> Option<(f64, f64)> {
        Some((self.target_ra?, self.target_dec?))
    }

    fn update_slew(&mut self, now: Instant) {
        let Some(slew) = self.slew else {
            return;
        };
        let elapsed = now.saturating_duration_since(slew.start);
        if elapsed >= slew.duration {
            self.current = slew.target;
            self.slew = None;
            self.record_event(format!(
                "Slew complete at {} {}",
                hours_to_hms(slew.target.0),
                degrees_to_dms(slew.target.1, true)
            ));
        } else {
            let fraction = elapsed.as_secs_f64() / slew.duration.as_secs_f64();
            self.current = interpolate_equatorial(slew.origin, slew.target, fraction);
        }
    }

    /// End a slew where it currently is.
    fn halt_slew(&mut self, now: Instant) {
        self.update_slew(now);
        if self.slew.take().is_some() {
            self.record_event("Slew halted".to_owned());
        }
    }

    fn status(&self) -> MountStatus {
        if self.slew.is_some() {
            MountStatus::Slewing
        } else if self.parked {
            MountStatus::Parked
        } else if self.tracking {
            MountStatus::Tracking
        } else {
            MountStatus::Idle
        }
    }

    fn start_slew(&mut self, target: (f64, f64), now: Instant) -> Result<(), &'static str> {
        if self.parked {
            return Err("Mount is Parked");
        }
        self.update_slew(now);
        let separation = angular_separation(self.current.0, self.current.1, target.0, target.1);
        self.slew = Some(Slew {
            origin: self.current,
            target,
            start: now,
            duration: Duration::from_secs_f64(separation / self.slew_rate),
        });
        self.record_event(format!(
            "Slew started to {} {}",
            hours_to_hms(target.0),
            degrees_to_dms(target.1, true)
        ));
        Ok(())
    }

    fn record_event(&mut self, event: String) {
        log::debug!("Mock mount: {event}");
        if self.logging {
            self.event_log.push(event);
        }
    }

    fn set_clock(&mut self, time: DateTime<Utc>) {
        self.clock_offset = time - Utc::now();
    }

    /// Apply one command. Returns the reply payload, without framing, or
    /// `None` for commands the mount does not answer.
    pub fn handle(&mut self, mount_cmd: &MountCmd, now: Instant) -> Option<String> {
        if self.logging {
            self.communication_log.push(mount_cmd.get_command());
        }
        self.update_slew(now);

        let reply = match mount_cmd {
            MountCmd::UltraPrecision => return None,
            MountCmd::GetStatus => self.status().code().to_string(),
            MountCmd::GetTracking => bool_reply(self.tracking),
            MountCmd::GetTargetTrackable => {
                let trackable = self.target().is_some_and(|(ra, dec)| {
                    let (alt, _) =
                        equatorial_to_horizontal(ra, dec, self.sidereal_hours(), self.latitude);
                    alt > 0.0
                });
                bool_reply(trackable)
            }
            MountCmd::StartTracking => {
                if !self.parked {
                    self.tracking = true;
                }
                return None;
            }
            MountCmd::StopTracking => {
                self.tracking = false;
                return None;
            }
            MountCmd::GetPierSide => self.pier_side.to_string(),
            MountCmd::GetElementTemperature(element) => {
                if UNAVAILABLE_ELEMENTS.contains(element) {
                    "Unavailable".to_owned()
                } else {
                    format!("{:+06.1}", 20.0 + *element as f64 * 0.5)
                }
            }
            MountCmd::GetFirmwareDate => "Oct 26 2023".to_owned(),
            MountCmd::GetFirmwareNumber => "3.0.0".to_owned(),
            MountCmd::GetProductName => "10micron GM2000HPS (mock)".to_owned(),
            MountCmd::GetFirmwareTime => "10:00:00".to_owned(),
            MountCmd::GetHardwareVersion => "Mock HW v1.0".to_owned(),
            MountCmd::GetRa => hours_to_hms(self.current.0),
            MountCmd::GetDec => dec_reply(self.current.1),
            MountCmd::GetAlt => {
                let (alt, _) = self.current_horizontal();
                dec_reply(alt)
            }
            MountCmd::GetAz => {
                let (_, az) = self.current_horizontal();
                az_reply(az)
            }
            MountCmd::GetTargetRa => self.target_ra.map(hours_to_hms).unwrap_or_default(),
            MountCmd::GetTargetDec => self.target_dec.map(dec_reply).unwrap_or_default(),
            MountCmd::GetTargetAlt => self
                .target_horizontal()
                .map(|(alt, _)| dec_reply(alt))
                .unwrap_or_default(),
            MountCmd::GetTargetAz => self
                .target_horizontal()
                .map(|(_, az)| az_reply(az))
                .unwrap_or_default(),
            MountCmd::SetTargetRa(value) => {
                let parsed = hms_to_hours(value).ok().filter(|ra| (0.0..24.0).contains(ra));
                if parsed.is_some() {
                    self.target_ra = parsed;
                }
                bool_reply(parsed.is_some())
            }
            MountCmd::SetTargetDec(value) => {
                let parsed = parse_dms(value).filter(|dec| (-90.0..=90.0).contains(dec));
                if parsed.is_some() {
                    self.target_dec = parsed;
                }
                bool_reply(parsed.is_some())
            }
            MountCmd::SetTargetAlt(value) => {
                let parsed = parse_dms(value).filter(|alt| (-90.0..=90.0).contains(alt));
                if parsed.is_some() {
                    self.target_alt = parsed;
                }
                bool_reply(parsed.is_some())
            }
            MountCmd::SetTargetAz(value) => {
                let parsed = parse_dms(value).filter(|az| (0.0..360.0).contains(az));
                if parsed.is_some() {
                    self.target_az = parsed;
                }
                bool_reply(parsed.is_some())
            }
            MountCmd::SlewEquatorial => {
                let result = match self.target() {
                    _ if self.parked => Err("Mount is Parked"),
                    None => Err("No Object Set"),
                    Some(target) => self.start_slew(target, now),
                };
                match result {
                    Ok(()) => "0".to_owned(),
                    Err(reason) => format!("1{reason}#"),
                }
            }
            MountCmd::SlewEquatorialPierSide(pier_side) => {
                if let Some(target) = self.target() {
                    if self.start_slew(target, now).is_ok() {
                        self.pier_side = *pier_side;
                    }
                }
                return None;
            }
            MountCmd::SlewAltAz => {
                if let (Some(alt), Some(az)) = (self.target_alt, self.target_az) {
                    let target =
                        horizontal_to_equatorial(alt, az, self.sidereal_hours(), self.latitude);
                    if self.start_slew(target, now).is_ok() {
                        self.target_ra = Some(target.0);
                        self.target_dec = Some(target.1);
                    }
                }
                return None;
            }
            MountCmd::SetMaxSlewRate(rate) => {
                let valid = (MIN_SLEW_RATE..=MAX_SLEW_RATE).contains(rate);
                if valid {
                    self.slew_rate = *rate as f64;
                }
                bool_reply(valid)
            }
            MountCmd::StopAll => {
                self.halt_slew(now);
                self.tracking = false;
                return None;
            }
            MountCmd::Halt(_) => {
                self.halt_slew(now);
                return None;
            }
            MountCmd::Move(direction) => {
                log::debug!("Mock mount: manual move {direction:?}.");
                return None;
            }
            MountCmd::Flip => {
                let accepted = !self.parked && self.slew.is_none();
                if accepted {
                    self.pier_side = self.pier_side.flipped();
                    self.record_event(format!("Flipped to pier {}", self.pier_side));
                }
                bool_reply(accepted)
            }
            MountCmd::Park => {
                self.halt_slew(now);
                self.parked = true;
                self.tracking = false;
                self.record_event("Parked".to_owned());
                return None;
            }
            MountCmd::Unpark => {
                self.parked = false;
                self.record_event("Unparked".to_owned());
                return None;
            }
            MountCmd::SeekHome => {
                self.halt_slew(now);
                return None;
            }
            MountCmd::GetHomeStatus => "1".to_owned(),
            MountCmd::GetLowerLimit => LOWER_LIMIT.to_owned(),
            MountCmd::GetUpperLimit => format!("+{:02}", self.upper_limit),
            MountCmd::SetUpperLimit(degrees) => {
                let valid = *degrees <= 90;
                if valid {
                    self.upper_limit = *degrees;
                }
                bool_reply(valid)
            }
            MountCmd::GetLocalTime => format_time(&self.now_utc()),
            MountCmd::GetDate => self.now_utc().format("%Y-%m-%d").to_string(),
            MountCmd::GetLocalDateTime | MountCmd::GetUtcDateTime => {
                let now = self.now_utc();
                format!("{},{}", now.format("%Y-%m-%d"), format_time(&now))
            }
            MountCmd::GetUtcOffset => "+00:00:00.0".to_owned(),
            MountCmd::GetSiderealTime => hours_to_hms(self.sidereal_hours()),
            MountCmd::GetJulianDate(precision) => {
                let jd = julian_date(&self.now_utc());
                match precision {
                    JulianPrecision::Normal => format!("{jd:.8}"),
                    JulianPrecision::Extra | JulianPrecision::LeapSeconds => format!("{jd:.10}"),
                }
            }
            MountCmd::SetLocalTime(time) => {
                let today = self.now_utc().date_naive();
                let parsed = NaiveTime::parse_from_str(time, "%H:%M:%S%.f")
                    .ok()
                    .map(|time| today.and_time(time).and_utc());
                if let Some(time) = parsed {
                    self.set_clock(time);
                }
                bool_reply(parsed.is_some())
            }
            MountCmd::SetLocalDateTime(date, time) | MountCmd::SetUtcDateTime(date, time) => {
                let parsed =
                    NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S%.f")
                        .ok()
                        .map(|date_time| date_time.and_utc());
                if let Some(time) = parsed {
                    self.set_clock(time);
                }
                bool_reply(parsed.is_some())
            }
            MountCmd::SetJulianDate(jd) => {
                let parsed = jd.parse::<f64>().ok().filter(|jd| jd.is_finite()).and_then(|jd| {
                    let millis = ((jd - 2440587.5) * 86_400_000.0).round() as i64;
                    DateTime::<Utc>::from_timestamp_millis(millis)
                });
                if let Some(time) = parsed {
                    self.set_clock(time);
                }
                bool_reply(parsed.is_some())
            }
            MountCmd::AdjustTime(ms) => {
                let valid = ms.unsigned_abs() <= MAX_TIME_ADJUST_MS.unsigned_abs();
                if valid {
                    self.clock_offset = self.clock_offset + TimeDelta::milliseconds(*ms as i64);
                }
                bool_reply(valid)
            }
            MountCmd::GetConnectionType => "2".to_owned(),
            MountCmd::GetIpInfo { wireless: false } => "127.0.0.1,255.255.255.0,127.0.0.1,D".to_owned(),
            MountCmd::GetIpInfo { wireless: true } => "192.168.4.20,255.255.255.0,192.168.4.1,M".to_owned(),
            MountCmd::ScanWireless => {
                self.wireless_scan = WirelessScanState::Scanning;
                "1".to_owned()
            }
            MountCmd::GetAccessPoints => match self.wireless_scan {
                WirelessScanState::Idle => "0".to_owned(),
                WirelessScanState::Scanning => {
                    self.wireless_scan = WirelessScanState::Done;
                    "1".to_owned()
                }
                WirelessScanState::Done => "22MockNet,oGuest".to_owned(),
            },
            MountCmd::StartLog => {
                self.logging = true;
                return None;
            }
            MountCmd::StopLog => {
                self.logging = false;
                return None;
            }
            MountCmd::GetEventLog => self.event_log.drain(..).collect::<Vec<_>>().join("\n"),
            MountCmd::GetCommunicationLog => self
                .communication_log
                .drain(..)
                .collect::<Vec<_>>()
                .join("\n"),
            MountCmd::Unknown(text) => {
                log::warn!("Mock mount ignoring unknown command {text:?}.");
                return None;
            }
        };
        Some(reply)
    }

    fn current_horizontal(&self) -> (f64, f64) {
        equatorial_to_horizontal(
            self.current.0,
            self.current.1,
            self.sidereal_hours(),
            self.latitude,
        )
    }

    fn target_horizontal(&self) -> Option<(f64, f64)> {
        match self.target() {
            Some((ra, dec)) => Some(equatorial_to_horizontal(
                ra,
                dec,
                self.sidereal_hours(),
                self.latitude,
            )),
            None => Some((self.target_alt?, self.target_az?)),
        }
    }
}

fn bool_reply(value: bool) -> String {
    let reply = if value { "1" } else { "0" };
    reply.to_owned()
}

/// `HH:MM:SS.ss`, seconds truncated to centiseconds.
fn format_time(time: &DateTime<Utc>) -> String {
    let seconds = time.second() as f64 + time.nanosecond().min(999_999_999) as f64 * 1e-9;
    format!("{}{:05.2}", time.format("%H:%M:"), (seconds * 100.0).floor() / 100.0)
}

/// Signed degrees the way the mount prints them, `sDD*MM:SS.ss`.
fn dec_reply(degrees: f64) -> String {
    degrees_to_dms(degrees, true).replacen(':', "*", 1)
}

fn az_reply(degrees: f64) -> String {
    degrees_to_dms(degrees, false).replacen(':', "*", 1)
}

fn parse_dms(value: &str) -> Option<f64> {
    dms_to_degrees(&value.replacen('*', ":", 1)).ok()
}
