// The RAK7200 is a LoRaWAN tracker which exposes a textual AT-command interface over
// its USB serial link. This library speaks that protocol: it frames commands, reads
// the line-oriented replies, and turns the semi-structured status text into typed
// state. Because every operation talks to an external device which may disappear at
// any moment, everything which does such communication returns a
// `Result<T, rak7200::Error>`.
#[macro_use]
extern crate quick_error;
use std::io;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        /// The serial port could not be opened. Perhaps an invalid port was specified,
        /// or this program does not have permission to access it.
        ConnectionFailed(err: serialport::Error) {
            source(err)
            display("could not open serial port: {}", err)
            from()
        }
        /// The program has become disconnected from the device due to an I/O error.
        /// It is possible the device was physically unplugged.
        Disconnected(err: io::Error) {
            source(err)
            display("serial link failed: {}", err)
            from()
        }
        /// The device answered with a line which is neither `OK` nor informational.
        Device(command: String, message: String) {
            display("device rejected '{}': {}", command, message)
        }
        /// The line stream went idle before any status line arrived.
        NoResponse(command: String) {
            display("no response to '{}'", command)
        }
        UnknownChannel(channel: u8) {
            display("unknown channel {}", channel)
        }
        UnknownCommand(name: String) {
            display("unknown device command '{}'", name)
        }
        ArgumentCount(command: String, expected: usize, given: usize) {
            display("'{}' expects {} argument(s), {} given", command, expected, given)
        }
        /// A channel reported a zero frequency; the radio is still initializing.
        NotReady(channel: u8) {
            display("device not ready: channel {} has no frequency yet", channel)
        }
        Malformed(detail: String) {
            display("malformed response: {}", detail)
        }
        /// Raw mode or keystroke polling failed on the controlling terminal.
        Terminal(err: io::Error) {
            source(err)
            display("terminal error: {}", err)
        }
    }
}

impl Error {
    /// True for failures of the serial link itself, as opposed to anything the
    /// device or the caller said.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::ConnectionFailed(_) | Error::Disconnected(_))
    }
}

/// Universal `Result` wrapper for the RAK7200 interface.
pub type Result<T> = std::result::Result<T, Error>;

pub mod command;
pub mod config;
pub mod monitor;
pub mod options;
pub mod parse;
pub mod session;
pub mod state;
pub mod transport;

pub use command::Command;
pub use config::Settings;
pub use monitor::{Key, Keys, Monitor, RawTerminal};
pub use session::Session;
pub use state::{Channel, ChannelTable, Class, DeviceState, JoinMode, LoraStatus, Sensor, Switch, WorkMode};
pub use transport::{SerialTransport, Transport};
