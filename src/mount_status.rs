//! Typed views of the values the mount reports.
//!
//! The mount owns its state; these types only decode what it says. No
//! local copy of the mount status is kept by the driver.

use std::{fmt, str::FromStr};

use crate::error::{ObservatoryError, ObservatoryResult};

/// Mount status as reported by `:Gstat#`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStatus {
    Tracking,
    Stopped,
    SlewingToPark,
    Unparking,
    SlewingToHome,
    Parked,
    Slewing,
    Idle,
    MotorsInhibited,
    TrackingOutsideLimits,
    SatelliteTracking,
    AwaitingConfirmation,
    Unknown,
    Error,
}

impl MountStatus {
    pub fn from_code(code: u8) -> Option<MountStatus> {
        match code {
            0 => Some(MountStatus::Tracking),
            1 => Some(MountStatus::Stopped),
            2 => Some(MountStatus::SlewingToPark),
            3 => Some(MountStatus::Unparking),
            4 => Some(MountStatus::SlewingToHome),
            5 => Some(MountStatus::Parked),
            6 => Some(MountStatus::Slewing),
            7 => Some(MountStatus::Idle),
            8 => Some(MountStatus::MotorsInhibited),
            9 => Some(MountStatus::TrackingOutsideLimits),
            10 => Some(MountStatus::SatelliteTracking),
            11 => Some(MountStatus::AwaitingConfirmation),
            98 => Some(MountStatus::Unknown),
            99 => Some(MountStatus::Error),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            MountStatus::Tracking => 0,
            MountStatus::Stopped => 1,
            MountStatus::SlewingToPark => 2,
            MountStatus::Unparking => 3,
            MountStatus::SlewingToHome => 4,
            MountStatus::Parked => 5,
            MountStatus::Slewing => 6,
            MountStatus::Idle => 7,
            MountStatus::MotorsInhibited => 8,
            MountStatus::TrackingOutsideLimits => 9,
            MountStatus::SatelliteTracking => 10,
            MountStatus::AwaitingConfirmation => 11,
            MountStatus::Unknown => 98,
            MountStatus::Error => 99,
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            MountStatus::Tracking => "Tracking",
            MountStatus::Stopped => "Stopped",
            MountStatus::SlewingToPark => "Slewing to Park",
            MountStatus::Unparking => "Unparking",
            MountStatus::SlewingToHome => "Slewing to Home",
            MountStatus::Parked => "Parked",
            MountStatus::Slewing => "Slewing",
            MountStatus::Idle => "Idle (Tracking Off)",
            MountStatus::MotorsInhibited => "Motors Inhibited (Low Temp)",
            MountStatus::TrackingOutsideLimits => "Tracking Outside Limits",
            MountStatus::SatelliteTracking => "Satellite Tracking",
            MountStatus::AwaitingConfirmation => "Awaiting User Confirmation",
            MountStatus::Unknown => "Unknown",
            MountStatus::Error => "Error",
        }
    }

    /// Human readable text for a raw status code, known or not.
    pub fn describe(raw_code: &str) -> String {
        match raw_code.trim().parse::<u8>().ok().and_then(MountStatus::from_code) {
            Some(status) => status.text().to_owned(),
            None => format!("Unknown ({raw_code})"),
        }
    }
}

/// Text for a numeric `:MS#` refusal code.
pub fn slew_result_text(code: &str) -> String {
    let text = match code {
        "0" => "Slew OK",
        "1" => "Below Horizon",
        "2" => "Limit Error",
        "3" => "Object is Below Horizon",
        "4" => "Object is Beyond Limits",
        "5" => "Mount is Parked",
        "6" => "Mount is Not Aligned",
        "7" => "No Object Set",
        "8" => "Tracking Disabled",
        "9" => "Mount Busy",
        "10" => "Refraction Disabled",
        "99" => "Unknown Slew Error",
        _ => return format!("Unknown ({code})"),
    };
    text.to_owned()
}

/// Outcome of a slew request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlewResult {
    /// The mount accepted the slew.
    Started,
    /// The slew was sent with a pier side request, which has no reply.
    Requested,
    Rejected(String),
}

impl SlewResult {
    pub fn from_reply(reply: &str) -> SlewResult {
        if reply == "0" {
            return SlewResult::Started;
        }
        if let Some(message) = reply.strip_prefix('1') {
            if !message.is_empty() && !message.chars().all(|c| c.is_ascii_digit()) {
                return SlewResult::Rejected(message.trim().to_owned());
            }
        }
        SlewResult::Rejected(slew_result_text(reply))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PierSide {
    East,
    West,
}

impl PierSide {
    pub fn flipped(&self) -> PierSide {
        match self {
            PierSide::East => PierSide::West,
            PierSide::West => PierSide::East,
        }
    }
}

impl fmt::Display for PierSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PierSide::East => write!(f, "East"),
            PierSide::West => write!(f, "West"),
        }
    }
}

impl FromStr for PierSide {
    type Err = ObservatoryError;

    fn from_str(text: &str) -> ObservatoryResult<PierSide> {
        match text.trim().to_ascii_lowercase().as_str() {
            "east" | "e" => Ok(PierSide::East),
            "west" | "w" => Ok(PierSide::West),
            other => Err(ObservatoryError::protocol(format!(
                "unexpected pier side '{other}'"
            ))),
        }
    }
}

/// Cardinal direction for manual motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub fn letter(&self) -> char {
        match self {
            Direction::North => 'n',
            Direction::South => 's',
            Direction::East => 'e',
            Direction::West => 'w',
        }
    }

    pub fn from_letter(letter: char) -> Option<Direction> {
        match letter.to_ascii_lowercase() {
            'n' => Some(Direction::North),
            's' => Some(Direction::South),
            'e' => Some(Direction::East),
            'w' => Some(Direction::West),
            _ => None,
        }
    }
}

impl FromStr for Direction {
    type Err = ObservatoryError;

    fn from_str(text: &str) -> ObservatoryResult<Direction> {
        let mut chars = text.trim().chars();
        let direction = match (chars.next(), chars.next()) {
            (Some(letter), None) => Direction::from_letter(letter),
            _ => None,
        };
        direction.ok_or_else(|| ObservatoryError::validation("direction must be one of N, S, E, W"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JulianPrecision {
    Normal,
    Extra,
    LeapSeconds,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementTemperature {
    Celsius(f64),
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomeStatus {
    Failed,
    Found,
    InProgress,
}

impl HomeStatus {
    pub fn from_reply(reply: &str) -> ObservatoryResult<HomeStatus> {
        match reply {
            "0" => Ok(HomeStatus::Failed),
            "1" => Ok(HomeStatus::Found),
            "2" => Ok(HomeStatus::InProgress),
            other => Err(ObservatoryError::protocol(format!(
                "unexpected home status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Serial,
    Gps,
    CabledLan,
    WirelessLan,
}

impl ConnectionType {
    pub fn from_reply(reply: &str) -> ObservatoryResult<ConnectionType> {
        match reply {
            "0" => Ok(ConnectionType::Serial),
            "1" => Ok(ConnectionType::Gps),
            "2" => Ok(ConnectionType::CabledLan),
            "3" => Ok(ConnectionType::WirelessLan),
            other => Err(ObservatoryError::protocol(format!(
                "unknown connection type code: {other}"
            ))),
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionType::Serial => "Serial RS-232",
            ConnectionType::Gps => "GPS or GPS/RS-232",
            ConnectionType::CabledLan => "Cabled LAN",
            ConnectionType::WirelessLan => "Wireless LAN",
        };
        write!(f, "{text}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub ip: String,
    pub subnet: String,
    pub gateway: String,
    pub dhcp: bool,
}

impl NetworkInfo {
    /// Parse `nnn.nnn.nnn.nnn,mmm.mmm.mmm.mmm,ggg.ggg.ggg.ggg,c`.
    pub fn from_reply(reply: &str) -> ObservatoryResult<NetworkInfo> {
        let fields: Vec<&str> = reply.split(',').collect();
        let [ip, subnet, gateway, flag] = fields.as_slice() else {
            return Err(ObservatoryError::protocol(format!(
                "expected 4 network fields, got '{reply}'"
            )));
        };
        let dhcp = match *flag {
            "D" => true,
            "M" => false,
            other => {
                return Err(ObservatoryError::protocol(format!(
                    "unexpected DHCP/Manual flag in response: {other}"
                )))
            }
        };
        Ok(NetworkInfo {
            ip: ip.to_string(),
            subnet: subnet.to_string(),
            gateway: gateway.to_string(),
            dhcp,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    Open,
    Wep,
    Wpa,
    Wpa2,
    Unsupported,
    Unknown,
}

impl Security {
    fn from_code(code: char) -> Security {
        match code {
            'o' => Security::Open,
            'w' => Security::Wep,
            '1' => Security::Wpa,
            '2' => Security::Wpa2,
            'x' => Security::Unsupported,
            _ => Security::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint {
    pub ssid: String,
    pub security: Security,
}

/// Result of polling the wireless access point scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WirelessScan {
    /// The scan has not finished; poll again later.
    InProgress,
    Complete(Vec<AccessPoint>),
}

impl WirelessScan {
    pub fn from_reply(reply: &str) -> ObservatoryResult<WirelessScan> {
        if reply == "0" {
            return Ok(WirelessScan::Complete(Vec::new()));
        }
        let mut chars = reply.chars();
        match chars.next() {
            Some('1') => Ok(WirelessScan::InProgress),
            Some('2') => {
                let access_points = chars
                    .as_str()
                    .split(',')
                    .filter(|entry| entry.chars().count() >= 2)
                    .filter_map(|entry| {
                        let mut entry_chars = entry.chars();
                        let code = entry_chars.next()?;
                        Some(AccessPoint {
                            ssid: entry_chars.as_str().to_owned(),
                            security: Security::from_code(code),
                        })
                    })
                    .collect();
                Ok(WirelessScan::Complete(access_points))
            }
            _ => Err(ObservatoryError::protocol(format!(
                "unexpected access point scan status in '{reply}'"
            ))),
        }
    }
}
