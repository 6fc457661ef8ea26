//! Decoders for the semi-structured text the device prints.

use crate::state::{Channel, ChannelTable, CommandCatalog, LoraStatus};
use crate::{Error, Result};
use log::warn;

/// Prefix of every command listed by `help`.
pub const COMMAND_PREFIX: &str = "at+";

/// The device spells a disabled flag as `false` or `unconfirm`; anything else
/// is taken as enabled.
pub fn parse_flag(value: &str) -> bool {
    !matches!(value.trim(), "false" | "unconfirm")
}

/// Fold one `Key: Value` line of `lora:status` into `status`.
///
/// Returns false for lines with keys this library does not track.
pub fn apply_status_line(status: &mut LoraStatus, line: &str) -> bool {
    let (key, value) = match line.split_once(':') {
        Some((key, value)) => (key.trim(), value.trim()),
        None => return false,
    };
    match key {
        "Work Mode" => match value.parse() {
            Ok(mode) => status.work_mode = Some(mode),
            Err(err) => warn!("{}", err),
        },
        "Region" => status.region = Some(value.to_string()),
        "Send_interval" => {
            let digits = value.trim_end_matches(|c: char| !c.is_ascii_digit());
            match digits.parse() {
                Ok(seconds) => status.send_interval = Some(seconds),
                Err(_) => warn!("unreadable send interval '{}'", value),
            }
        }
        "Join_mode" => match value.parse() {
            Ok(mode) => status.join_mode = Some(mode),
            Err(err) => warn!("{}", err),
        },
        "DevEui" => status.dev_eui = Some(value.to_string()),
        "AppEui" => status.app_eui = Some(value.to_string()),
        "AppKey" => status.app_key = Some(value.to_string()),
        "Class" => match value.parse() {
            Ok(class) => status.class = Some(class),
            Err(err) => warn!("{}", err),
        },
        "IsConfirm" => status.confirm = Some(parse_flag(value)),
        "AdrEnable" => status.adr = Some(parse_flag(value)),
        _ => return false,
    }
    true
}

pub fn parse_lora_status<S: AsRef<str>>(lines: &[S]) -> LoraStatus {
    let mut status = LoraStatus::default();
    for line in lines {
        apply_status_line(&mut status, line.as_ref());
    }
    status
}

/// Turn a frequency code such as `9023` into MHz by placing the decimal point
/// after the third digit. A channel that is still coming up may print a bare `0`.
pub fn decode_frequency(code: &str) -> Result<f64> {
    let code = code.trim();
    if !code.is_empty() && code.bytes().all(|b| b == b'0') {
        return Ok(0.0);
    }
    if code.len() < 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Malformed(format!("frequency code '{}'", code)));
    }
    let (whole, fraction) = code.split_at(3);
    let text = if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    };
    text.parse()
        .map_err(|_| Error::Malformed(format!("frequency code '{}'", code)))
}

fn parse_data_rate(field: Option<&str>) -> Result<u8> {
    let field = match field {
        Some(field) => field.trim(),
        None => return Ok(0),
    };
    let digits = field.strip_prefix("DR").unwrap_or(field);
    digits
        .parse()
        .map_err(|_| Error::Malformed(format!("data rate '{}'", field)))
}

/// Decode one `[*]<n>,<on|off>,<freq>,<dr_min>,<dr_max>` record.
pub fn parse_channel(record: &str) -> Result<Channel> {
    let fields: Vec<&str> = record.split(',').map(str::trim).collect();
    if fields.len() < 3 {
        return Err(Error::Malformed(format!("channel record '{}'", record)));
    }
    let (initializing, number) = match fields[0].strip_prefix('*') {
        Some(number) => (true, number),
        None => (false, fields[0]),
    };
    let number: u8 = number
        .trim()
        .parse()
        .map_err(|_| Error::Malformed(format!("channel number '{}'", fields[0])))?;
    let frequency_mhz = decode_frequency(fields[2])?;
    if frequency_mhz == 0.0 {
        return Err(Error::NotReady(number));
    }
    Ok(Channel {
        number,
        open: fields[1].eq_ignore_ascii_case("on"),
        frequency_mhz,
        dr_min: parse_data_rate(fields.get(3).copied())?,
        dr_max: parse_data_rate(fields.get(4).copied())?,
        initializing,
    })
}

/// Decode the `lora:channel` payload: `;`-separated records, normally on one line.
pub fn parse_channels<S: AsRef<str>>(lines: &[S]) -> Result<ChannelTable> {
    let mut table = ChannelTable::new();
    for line in lines {
        for record in line.as_ref().split(';').map(str::trim) {
            if record.is_empty() {
                continue;
            }
            let channel = parse_channel(record)?;
            table.insert(channel.number, channel);
        }
    }
    Ok(table)
}

fn is_placeholder(segment: &str) -> bool {
    segment.starts_with(['X', 'Y']) && !segment.chars().any(|c| c.is_ascii_lowercase())
}

/// Parse one `help` line into its catalog key and argument count.
pub fn parse_help_line(line: &str) -> Option<(String, usize)> {
    let token = line.split_whitespace().next()?;
    let prefix = token.get(..COMMAND_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(COMMAND_PREFIX) {
        return None;
    }
    let mut arguments = 0;
    let mut name = Vec::new();
    for segment in token[COMMAND_PREFIX.len()..].split(':') {
        if is_placeholder(segment) {
            arguments += 1;
        } else {
            name.push(segment);
        }
    }
    Some((name.join(":"), arguments))
}

pub fn parse_help<S: AsRef<str>>(lines: &[S]) -> CommandCatalog {
    lines
        .iter()
        .filter_map(|line| parse_help_line(line.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Class, JoinMode, WorkMode};

    #[test]
    fn flags() {
        assert!(!parse_flag("unconfirm"));
        assert!(!parse_flag("false"));
        assert!(parse_flag("true"));
        assert!(parse_flag("confirm"));
    }

    #[test]
    fn lora_status_block() {
        let status = parse_lora_status(&[
            "Work Mode: LoRaWAN",
            "Region: EU868",
            "Send_interval: 600s",
            "Auto send status: true.",
            "Join_mode: OTAA",
            "DevEui: 60C5A8FFFE000001",
            "AppEui: 70B3D57ED0000001",
            "AppKey: 00112233445566778899AABBCCDDEEFF",
            "Class: A",
            "Joined Network: false",
            "IsConfirm: unconfirm",
            "AdrEnable: true",
        ]);
        assert_eq!(status.work_mode, Some(WorkMode::LoRaWan));
        assert_eq!(status.region.as_deref(), Some("EU868"));
        assert_eq!(status.send_interval, Some(600));
        assert_eq!(status.join_mode, Some(JoinMode::Otaa));
        assert_eq!(status.dev_eui.as_deref(), Some("60C5A8FFFE000001"));
        assert_eq!(status.app_key.as_deref(), Some("00112233445566778899AABBCCDDEEFF"));
        assert_eq!(status.class, Some(Class::A));
        assert_eq!(status.confirm, Some(false));
        assert_eq!(status.adr, Some(true));
    }

    #[test]
    fn confirm_true() {
        let mut status = LoraStatus::default();
        assert!(apply_status_line(&mut status, "IsConfirm: true"));
        assert_eq!(status.confirm, Some(true));
        assert!(!apply_status_line(&mut status, "Battery: 4.1V"));
        assert!(!apply_status_line(&mut status, "no separator"));
    }

    #[test]
    fn frequency_codes() {
        assert_eq!(decode_frequency("9023").unwrap(), 902.3);
        assert_eq!(decode_frequency("868").unwrap(), 868.0);
        assert_eq!(decode_frequency("0000").unwrap(), 0.0);
        assert!(decode_frequency("90").is_err());
        assert!(decode_frequency("9a23").is_err());
    }

    #[test]
    fn channel_records() {
        let table = parse_channels(&["*0,on,9023,0,3; 1,off,9025,0,3; 2,on,9027,DR0,DR3;"]).unwrap();
        assert_eq!(table.len(), 3);
        let first = &table[&0];
        assert!(first.initializing);
        assert!(first.open);
        assert_eq!(first.frequency_mhz, 902.3);
        assert_eq!((first.dr_min, first.dr_max), (0, 3));
        assert!(!table[&1].open);
        assert!(!table[&1].initializing);
        assert_eq!(table[&2].dr_max, 3);
    }

    #[test]
    fn zero_frequency_means_not_ready() {
        assert!(matches!(
            parse_channels(&["0,on,9023,0,3; 1,on,0000,0,3"]),
            Err(Error::NotReady(1))
        ));
        assert!(matches!(
            parse_channels(&["*0,off,0,0,0; *1,off,0,0,0"]),
            Err(Error::NotReady(0))
        ));
        assert_eq!(decode_frequency("00").unwrap(), 0.0);
        assert!(matches!(decode_frequency(""), Err(Error::Malformed(_))));
    }

    #[test]
    fn broken_channel_records() {
        assert!(matches!(parse_channel("x,on,9023"), Err(Error::Malformed(_))));
        assert!(matches!(parse_channel("1,on"), Err(Error::Malformed(_))));
    }

    #[test]
    fn help_lines() {
        assert_eq!(
            parse_help_line("at+set_config=lora:ch_mask:X:Y"),
            Some(("set_config=lora:ch_mask".to_string(), 2))
        );
        assert_eq!(
            parse_help_line("  at+set_config=lora:dev_eui:XXXX  "),
            Some(("set_config=lora:dev_eui".to_string(), 1))
        );
        assert_eq!(parse_help_line("at+version"), Some(("version".to_string(), 0)));
        assert_eq!(parse_help_line("Device AT commands:"), None);
        assert_eq!(parse_help_line(""), None);

        let catalog = parse_help(&["LoRaWAN AT commands:", "at+join", "at+get_config=lora:status"]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("get_config=lora:status"), Some(&0));
    }
}
