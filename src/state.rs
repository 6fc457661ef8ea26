//! Typed device state, cached by the session for the lifetime of one run.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// LoRaWAN device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    A,
    B,
    C,
}

impl Class {
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'A' => Some(Class::A),
            'B' => Some(Class::B),
            'C' => Some(Class::C),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Class::A => 'A',
            Class::B => 'B',
            Class::C => 'C',
        }
    }

    /// The device numbers classes from zero, starting at `A`.
    pub fn wire_code(self) -> u8 {
        self.letter() as u8 - b'A'
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for Class {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        let class = match (chars.next(), chars.next()) {
            (Some(letter), None) => Class::from_letter(letter),
            _ => None,
        };
        class.ok_or_else(|| format!("invalid class '{}', expected A, B or C", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    Otaa,
    Abp,
}

impl JoinMode {
    pub fn wire_code(self) -> u8 {
        match self {
            JoinMode::Otaa => 0,
            JoinMode::Abp => 1,
        }
    }
}

impl fmt::Display for JoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinMode::Otaa => "OTAA",
            JoinMode::Abp => "ABP",
        })
    }
}

impl FromStr for JoinMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OTAA" => Ok(JoinMode::Otaa),
            "ABP" => Ok(JoinMode::Abp),
            _ => Err(format!("invalid join mode '{}', expected OTAA or ABP", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkMode {
    LoRaWan,
    P2p,
}

impl WorkMode {
    pub fn wire_code(self) -> u8 {
        match self {
            WorkMode::LoRaWan => 0,
            WorkMode::P2p => 1,
        }
    }
}

impl fmt::Display for WorkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkMode::LoRaWan => "LoRaWAN",
            WorkMode::P2p => "LoRaP2P",
        })
    }
}

impl FromStr for WorkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lorawan" => Ok(WorkMode::LoRaWan),
            "lorap2p" | "p2p" => Ok(WorkMode::P2p),
            _ => Err(format!("invalid work mode '{}', expected LoRaWAN or P2P", s)),
        }
    }
}

/// Tri-state for settings which can only be learned by setting them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Switch {
    #[default]
    Unknown,
    On,
    Off,
}

impl From<bool> for Switch {
    fn from(on: bool) -> Self {
        if on {
            Switch::On
        } else {
            Switch::Off
        }
    }
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Switch::Unknown => "unknown",
            Switch::On => "on",
            Switch::Off => "off",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
    Accelerometer,
    Gyro,
    Voltage,
    Magnetometer,
}

impl Sensor {
    /// Name used in the `sensor:<name>` configuration path.
    pub fn wire_name(self) -> &'static str {
        match self {
            Sensor::Accelerometer => "acc",
            Sensor::Gyro => "gyro",
            Sensor::Voltage => "voltage",
            Sensor::Magnetometer => "mag",
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Sensor::Accelerometer => "accelerometer",
            Sensor::Gyro => "gyro",
            Sensor::Voltage => "voltage",
            Sensor::Magnetometer => "magnetometer",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sensors {
    pub accelerometer: Switch,
    pub gyro: Switch,
    pub voltage: Switch,
    pub magnetometer: Switch,
}

impl Sensors {
    pub fn get(&self, sensor: Sensor) -> Switch {
        match sensor {
            Sensor::Accelerometer => self.accelerometer,
            Sensor::Gyro => self.gyro,
            Sensor::Voltage => self.voltage,
            Sensor::Magnetometer => self.magnetometer,
        }
    }

    pub fn set(&mut self, sensor: Sensor, state: Switch) {
        let slot = match sensor {
            Sensor::Accelerometer => &mut self.accelerometer,
            Sensor::Gyro => &mut self.gyro,
            Sensor::Voltage => &mut self.voltage,
            Sensor::Magnetometer => &mut self.magnetometer,
        };
        *slot = state;
    }
}

/// The `lora:status` block. Fields stay `None` until reported or set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoraStatus {
    pub work_mode: Option<WorkMode>,
    pub region: Option<String>,
    pub send_interval: Option<u32>,
    pub join_mode: Option<JoinMode>,
    pub dev_eui: Option<String>,
    pub app_eui: Option<String>,
    pub app_key: Option<String>,
    pub class: Option<Class>,
    pub confirm: Option<bool>,
    pub adr: Option<bool>,
}

/// One entry of the channel plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub number: u8,
    /// `on` in the channel list; masked channels read `off`.
    pub open: bool,
    pub frequency_mhz: f64,
    pub dr_min: u8,
    pub dr_max: u8,
    /// The device marks channels it is still bringing up with a `*`.
    pub initializing: bool,
}

pub type ChannelTable = BTreeMap<u8, Channel>;

/// Command name (e.g. `set_config=lora:ch_mask`) to required argument count.
pub type CommandCatalog = BTreeMap<String, usize>;

/// Everything learned about the device during this session.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    pub version: Option<String>,
    pub lora: LoraStatus,
    /// Set once `lora:status` has been read in full.
    pub lora_loaded: bool,
    pub sensors: Sensors,
    pub channels: Option<ChannelTable>,
    pub catalog: Option<CommandCatalog>,
    pub device_status: Option<Vec<String>>,
}
