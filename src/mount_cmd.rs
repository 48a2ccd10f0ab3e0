//! Define the mount command vocabulary.
//!
//! Each command knows its wire mnemonic, how its reply is framed and
//! whether a reply is expected at all. Framing is fixed per command and
//! never negotiated at runtime.

use crate::mount_status::{Direction, JulianPrecision, PierSide};

/// Protocol terminator byte.
pub const TERMINATOR: u8 = b'#';

/// Default byte budget for unterminated replies.
pub const DEFAULT_MAX_BYTES: usize = 1024;
pub const EVENT_LOG_MAX_BYTES: usize = 3100;
pub const COMMUNICATION_LOG_MAX_BYTES: usize = 262144;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Reply ends with the terminator byte.
    Terminated,
    /// Reply is a single character with no terminator.
    SingleChar,
    /// Variable length reply with no guaranteed terminator.
    Unterminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyExpectation {
    NoReply,
    ExpectReply,
}

/// A command ready to be written to the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub mnemonic: String,
    pub framing: Framing,
    pub reply: ReplyExpectation,
    pub max_bytes: usize,
}

impl Command {
    pub fn new(mnemonic: &str, framing: Framing, reply: ReplyExpectation) -> Command {
        Command {
            mnemonic: mnemonic.to_owned(),
            framing,
            reply,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Command {
        self.max_bytes = max_bytes;
        self
    }

    /// Bytes written to the stream, terminator included.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.mnemonic.len() + 1);
        bytes.extend_from_slice(self.mnemonic.as_bytes());
        bytes.push(TERMINATOR);
        bytes
    }

    pub fn expects_reply(&self) -> bool {
        self.reply == ReplyExpectation::ExpectReply
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MountCmd {
    UltraPrecision,
    GetStatus,
    GetTracking,
    GetTargetTrackable,
    StartTracking,
    StopTracking,
    GetPierSide,
    GetElementTemperature(u8),
    GetFirmwareDate,
    GetFirmwareNumber,
    GetProductName,
    GetFirmwareTime,
    GetHardwareVersion,
    GetRa,
    GetDec,
    GetAlt,
    GetAz,
    GetTargetRa,
    GetTargetDec,
    GetTargetAlt,
    GetTargetAz,
    SetTargetRa(String),
    SetTargetDec(String),
    SetTargetAlt(String),
    SetTargetAz(String),
    SlewEquatorial,
    SlewEquatorialPierSide(PierSide),
    SlewAltAz,
    SetMaxSlewRate(u32),
    StopAll,
    Halt(Option<Direction>),
    Move(Direction),
    Flip,
    Park,
    Unpark,
    SeekHome,
    GetHomeStatus,
    GetLowerLimit,
    GetUpperLimit,
    SetUpperLimit(u8),
    GetLocalTime,
    GetDate,
    GetLocalDateTime,
    GetUtcDateTime,
    GetUtcOffset,
    GetSiderealTime,
    GetJulianDate(JulianPrecision),
    SetLocalTime(String),
    SetLocalDateTime(String, String),
    SetUtcDateTime(String, String),
    SetJulianDate(String),
    AdjustTime(i32),
    GetConnectionType,
    GetIpInfo { wireless: bool },
    ScanWireless,
    GetAccessPoints,
    StartLog,
    StopLog,
    GetEventLog,
    GetCommunicationLog,
    Unknown(String),
}

impl MountCmd {
    pub fn get_command(&self) -> String {
        match self {
            MountCmd::UltraPrecision => ":U2".to_string(),
            MountCmd::GetStatus => ":Gstat".to_string(),
            MountCmd::GetTracking => ":GTRK".to_string(),
            MountCmd::GetTargetTrackable => ":GTTRK".to_string(),
            MountCmd::StartTracking => ":AP".to_string(),
            MountCmd::StopTracking => ":AL".to_string(),
            MountCmd::GetPierSide => ":pS".to_string(),
            MountCmd::GetElementTemperature(element) => format!(":GTMP{element}"),
            MountCmd::GetFirmwareDate => ":GVD".to_string(),
            MountCmd::GetFirmwareNumber => ":GVN".to_string(),
            MountCmd::GetProductName => ":GVP".to_string(),
            MountCmd::GetFirmwareTime => ":GVT".to_string(),
            MountCmd::GetHardwareVersion => ":GVZ".to_string(),
            MountCmd::GetRa => ":GR".to_string(),
            MountCmd::GetDec => ":GD".to_string(),
            MountCmd::GetAlt => ":GA".to_string(),
            MountCmd::GetAz => ":GZ".to_string(),
            MountCmd::GetTargetRa => ":Gr".to_string(),
            MountCmd::GetTargetDec => ":Gd".to_string(),
            MountCmd::GetTargetAlt => ":Ga".to_string(),
            MountCmd::GetTargetAz => ":Gz".to_string(),
            MountCmd::SetTargetRa(ra) => format!(":Sr{ra}"),
            MountCmd::SetTargetDec(dec) => format!(":Sd{dec}"),
            MountCmd::SetTargetAlt(alt) => format!(":Sa{alt}"),
            MountCmd::SetTargetAz(az) => format!(":Sz{az}"),
            MountCmd::SlewEquatorial => ":MS".to_string(),
            MountCmd::SlewEquatorialPierSide(PierSide::East) => ":MSfs3".to_string(),
            MountCmd::SlewEquatorialPierSide(PierSide::West) => ":MSfs2".to_string(),
            MountCmd::SlewAltAz => ":MA".to_string(),
            MountCmd::SetMaxSlewRate(rate) => format!(":Sw{rate}"),
            MountCmd::StopAll => ":STOP".to_string(),
            MountCmd::Halt(None) => ":Q".to_string(),
            MountCmd::Halt(Some(direction)) => format!(":Q{}", direction.letter()),
            MountCmd::Move(direction) => format!(":M{}", direction.letter()),
            MountCmd::Flip => ":FLIP".to_string(),
            MountCmd::Park => ":hP".to_string(),
            MountCmd::Unpark => ":PO".to_string(),
            MountCmd::SeekHome => ":hS".to_string(),
            MountCmd::GetHomeStatus => ":h?".to_string(),
            MountCmd::GetLowerLimit => ":Go".to_string(),
            MountCmd::GetUpperLimit => ":Gh".to_string(),
            MountCmd::SetUpperLimit(degrees) => format!(":Sh+{degrees}"),
            MountCmd::GetLocalTime => ":GL".to_string(),
            MountCmd::GetDate => ":GC".to_string(),
            MountCmd::GetLocalDateTime => ":GLDT".to_string(),
            MountCmd::GetUtcDateTime => ":GUDT".to_string(),
            MountCmd::GetUtcOffset => ":GG".to_string(),
            MountCmd::GetSiderealTime => ":GS".to_string(),
            MountCmd::GetJulianDate(JulianPrecision::Normal) => ":GJD".to_string(),
            MountCmd::GetJulianDate(JulianPrecision::Extra) => ":GJD1".to_string(),
            MountCmd::GetJulianDate(JulianPrecision::LeapSeconds) => ":GJD2".to_string(),
            MountCmd::SetLocalTime(time) => format!(":SL{time}"),
            MountCmd::SetLocalDateTime(date, time) => format!(":SLDT{date},{time}"),
            MountCmd::SetUtcDateTime(date, time) => format!(":SUDT{date},{time}"),
            MountCmd::SetJulianDate(jd) => format!(":SJD{jd}"),
            MountCmd::AdjustTime(ms) => format!(":AT{ms}"),
            MountCmd::GetConnectionType => ":GINQ".to_string(),
            MountCmd::GetIpInfo { wireless: false } => ":GIP".to_string(),
            MountCmd::GetIpInfo { wireless: true } => ":GIPW".to_string(),
            MountCmd::ScanWireless => ":GWRSC".to_string(),
            MountCmd::GetAccessPoints => ":GWRAP2".to_string(),
            MountCmd::StartLog => ":startlog".to_string(),
            MountCmd::StopLog => ":stoplog".to_string(),
            MountCmd::GetEventLog => ":evlog".to_string(),
            MountCmd::GetCommunicationLog => ":getlog".to_string(),
            MountCmd::Unknown(text) => text.to_owned(),
        }
    }

    pub fn framing(&self) -> Framing {
        match self {
            MountCmd::GetTracking
            | MountCmd::GetTargetTrackable
            | MountCmd::SetTargetRa(_)
            | MountCmd::SetTargetDec(_)
            | MountCmd::SetTargetAlt(_)
            | MountCmd::SetTargetAz(_)
            | MountCmd::SetMaxSlewRate(_)
            | MountCmd::Flip
            | MountCmd::GetHomeStatus
            | MountCmd::SetUpperLimit(_)
            | MountCmd::SetLocalTime(_)
            | MountCmd::SetLocalDateTime(_, _)
            | MountCmd::SetUtcDateTime(_, _)
            | MountCmd::SetJulianDate(_) => Framing::SingleChar,
            MountCmd::SlewEquatorial
            | MountCmd::SlewEquatorialPierSide(_)
            | MountCmd::SlewAltAz
            | MountCmd::GetEventLog
            | MountCmd::GetCommunicationLog => Framing::Unterminated,
            _ => Framing::Terminated,
        }
    }

    pub fn reply(&self) -> ReplyExpectation {
        match self {
            MountCmd::UltraPrecision
            | MountCmd::StartTracking
            | MountCmd::StopTracking
            | MountCmd::SlewEquatorialPierSide(_)
            | MountCmd::SlewAltAz
            | MountCmd::StopAll
            | MountCmd::Halt(_)
            | MountCmd::Move(_)
            | MountCmd::Park
            | MountCmd::Unpark
            | MountCmd::SeekHome
            | MountCmd::StartLog
            | MountCmd::StopLog => ReplyExpectation::NoReply,
            _ => ReplyExpectation::ExpectReply,
        }
    }

    pub fn max_bytes(&self) -> usize {
        match self {
            MountCmd::GetEventLog => EVENT_LOG_MAX_BYTES,
            MountCmd::GetCommunicationLog => COMMUNICATION_LOG_MAX_BYTES,
            _ => DEFAULT_MAX_BYTES,
        }
    }

    pub fn command(&self) -> Command {
        Command::new(&self.get_command(), self.framing(), self.reply())
            .with_max_bytes(self.max_bytes())
    }
}
