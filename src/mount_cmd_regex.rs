//! Parse LX200 command text, as received by a mount, into [`MountCmd`].

use regex::{Captures, Regex, RegexSet};

use crate::{
    error::ObservatoryResult,
    mount_cmd::MountCmd,
    mount_status::{Direction, JulianPrecision, PierSide},
};

const PATTERNS: [&str; 60] = [
    r"^:U2$",
    r"^:Gstat$",
    r"^:GTRK$",
    r"^:GTTRK$",
    r"^:AP$",
    r"^:AL$",
    r"^:pS$",
    r"^:GTMP(?P<element>\d{1,3})$",
    r"^:GVD$",
    r"^:GVN$",
    r"^:GVP$",
    r"^:GVT$",
    r"^:GVZ$",
    r"^:GR$",
    r"^:GD$",
    r"^:GA$",
    r"^:GZ$",
    r"^:Gr$",
    r"^:Gd$",
    r"^:Ga$",
    r"^:Gz$",
    r"^:Sr(?P<value>\d{1,2}:\d{2}:\d{2}(\.\d+)?)$",
    r"^:Sd(?P<value>[+-]\d{1,2}[:*]\d{2}:\d{2}(\.\d+)?)$",
    r"^:Sa(?P<value>[+-]\d{1,2}[:*]\d{2}:\d{2}(\.\d+)?)$",
    r"^:Sz(?P<value>\d{1,3}[:*]\d{2}:\d{2}(\.\d+)?)$",
    r"^:MS$",
    r"^:MSfs(?P<side>[23])$",
    r"^:MA$",
    r"^:Sw(?P<rate>\d{1,2})$",
    r"^:STOP$",
    r"^:Q(?P<direction>[nsew]?)$",
    r"^:M(?P<direction>[nsew])$",
    r"^:FLIP$",
    r"^:hP$",
    r"^:PO$",
    r"^:hS$",
    r"^:h\?$",
    r"^:Go$",
    r"^:Gh$",
    r"^:Sh\+?(?P<degrees>\d{1,2})$",
    r"^:GL$",
    r"^:GC$",
    r"^:GLDT$",
    r"^:GUDT$",
    r"^:GG$",
    r"^:GS$",
    r"^:GJD(?P<precision>[12]?)$",
    r"^:SL(?P<time>\d{2}:\d{2}:\d{2}(\.\d+)?)$",
    r"^:SLDT(?P<date>\d{4}-\d{2}-\d{2}),(?P<time>\d{2}:\d{2}:\d{2}(\.\d+)?)$",
    r"^:SUDT(?P<date>\d{4}-\d{2}-\d{2}),(?P<time>\d{2}:\d{2}:\d{2}(\.\d+)?)$",
    r"^:SJD(?P<jd>\d+(\.\d+)?)$",
    r"^:AT(?P<ms>[+-]?\d+)$",
    r"^:GINQ$",
    r"^:GIP(?P<wireless>W?)$",
    r"^:GWRSC$",
    r"^:GWRAP2$",
    r"^:startlog$",
    r"^:stoplog$",
    r"^:evlog$",
    r"^:getlog$",
];

pub struct MountCmdRegex {
    regex_set: RegexSet,
    regex: Vec<Regex>,
}

impl MountCmdRegex {
    pub fn new() -> ObservatoryResult<MountCmdRegex> {
        let regex_set = RegexSet::new(PATTERNS)?;
        let regex = regex_set
            .patterns()
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<Regex>, regex::Error>>()?;

        Ok(MountCmdRegex { regex_set, regex })
    }

    fn get_match_index(&self, text: &str) -> Option<usize> {
        self.regex_set.matches(text).into_iter().next()
    }

    /// Map command text (with or without the terminator) to a command.
    pub fn into_mount_cmd(&self, text: &str) -> MountCmd {
        let text = text.trim().trim_end_matches('#');
        let unknown = || MountCmd::Unknown(text.to_owned());

        let Some(match_index) = self.get_match_index(text) else {
            return unknown();
        };
        let Some(capture) = self.regex[match_index].captures(text) else {
            return unknown();
        };

        let mount_cmd = match match_index {
            0 => Some(MountCmd::UltraPrecision),
            1 => Some(MountCmd::GetStatus),
            2 => Some(MountCmd::GetTracking),
            3 => Some(MountCmd::GetTargetTrackable),
            4 => Some(MountCmd::StartTracking),
            5 => Some(MountCmd::StopTracking),
            6 => Some(MountCmd::GetPierSide),
            7 => parse_capture(&capture, "element").map(MountCmd::GetElementTemperature),
            8 => Some(MountCmd::GetFirmwareDate),
            9 => Some(MountCmd::GetFirmwareNumber),
            10 => Some(MountCmd::GetProductName),
            11 => Some(MountCmd::GetFirmwareTime),
            12 => Some(MountCmd::GetHardwareVersion),
            13 => Some(MountCmd::GetRa),
            14 => Some(MountCmd::GetDec),
            15 => Some(MountCmd::GetAlt),
            16 => Some(MountCmd::GetAz),
            17 => Some(MountCmd::GetTargetRa),
            18 => Some(MountCmd::GetTargetDec),
            19 => Some(MountCmd::GetTargetAlt),
            20 => Some(MountCmd::GetTargetAz),
            21 => Some(MountCmd::SetTargetRa(capture["value"].to_owned())),
            22 => Some(MountCmd::SetTargetDec(capture["value"].to_owned())),
            23 => Some(MountCmd::SetTargetAlt(capture["value"].to_owned())),
            24 => Some(MountCmd::SetTargetAz(capture["value"].to_owned())),
            25 => Some(MountCmd::SlewEquatorial),
            26 => match &capture["side"] {
                "3" => Some(MountCmd::SlewEquatorialPierSide(PierSide::East)),
                _ => Some(MountCmd::SlewEquatorialPierSide(PierSide::West)),
            },
            27 => Some(MountCmd::SlewAltAz),
            28 => parse_capture(&capture, "rate").map(MountCmd::SetMaxSlewRate),
            29 => Some(MountCmd::StopAll),
            30 => Some(MountCmd::Halt(
                capture["direction"].chars().next().and_then(Direction::from_letter),
            )),
            31 => capture["direction"]
                .chars()
                .next()
                .and_then(Direction::from_letter)
                .map(MountCmd::Move),
            32 => Some(MountCmd::Flip),
            33 => Some(MountCmd::Park),
            34 => Some(MountCmd::Unpark),
            35 => Some(MountCmd::SeekHome),
            36 => Some(MountCmd::GetHomeStatus),
            37 => Some(MountCmd::GetLowerLimit),
            38 => Some(MountCmd::GetUpperLimit),
            39 => parse_capture(&capture, "degrees").map(MountCmd::SetUpperLimit),
            40 => Some(MountCmd::GetLocalTime),
            41 => Some(MountCmd::GetDate),
            42 => Some(MountCmd::GetLocalDateTime),
            43 => Some(MountCmd::GetUtcDateTime),
            44 => Some(MountCmd::GetUtcOffset),
            45 => Some(MountCmd::GetSiderealTime),
            46 => match &capture["precision"] {
                "1" => Some(MountCmd::GetJulianDate(JulianPrecision::Extra)),
                "2" => Some(MountCmd::GetJulianDate(JulianPrecision::LeapSeconds)),
                _ => Some(MountCmd::GetJulianDate(JulianPrecision::Normal)),
            },
            47 => Some(MountCmd::SetLocalTime(capture["time"].to_owned())),
            48 => Some(MountCmd::SetLocalDateTime(
                capture["date"].to_owned(),
                capture["time"].to_owned(),
            )),
            49 => Some(MountCmd::SetUtcDateTime(
                capture["date"].to_owned(),
                capture["time"].to_owned(),
            )),
            50 => Some(MountCmd::SetJulianDate(capture["jd"].to_owned())),
            51 => parse_capture(&capture, "ms").map(MountCmd::AdjustTime),
            52 => Some(MountCmd::GetConnectionType),
            53 => Some(MountCmd::GetIpInfo {
                wireless: &capture["wireless"] == "W",
            }),
            54 => Some(MountCmd::ScanWireless),
            55 => Some(MountCmd::GetAccessPoints),
            56 => Some(MountCmd::StartLog),
            57 => Some(MountCmd::StopLog),
            58 => Some(MountCmd::GetEventLog),
            59 => Some(MountCmd::GetCommunicationLog),
            _ => None,
        };
        mount_cmd.unwrap_or_else(unknown)
    }
}

fn parse_capture<T: std::str::FromStr>(capture: &Captures, name: &str) -> Option<T> {
    capture.name(name)?.as_str().parse().ok()
}
