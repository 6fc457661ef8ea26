// The transport owns the serial link. A command exchange is: open the port, write
// the framed command, read lines until the device says `OK` or complains, then
// close the port again. The monitor holds the port open instead and trickles lines
// out one at a time.

use crate::command::Command;
use crate::config::Settings;
use crate::{Error, Result};
use core::time::Duration;
use log::{debug, trace, warn};
use serialport::{ClearBuffer, SerialPort};
use std::io::prelude::*;
use std::io::ErrorKind;
use std::thread;
use std::time::Instant;

/// Lines starting with one of these are informational and never end a read.
pub const PASSTHROUGH: [&str; 4] = ["open ", "close ", "join ", "LoRaWAN Ack"];

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How a single response line affects the exchange in progress.
#[derive(Debug, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// `OK`, with whatever followed the marker on the same line.
    Ok(&'a str),
    Passthrough,
    Error,
}

pub fn classify(line: &str) -> LineKind<'_> {
    if let Some(rest) = line.strip_prefix("OK") {
        LineKind::Ok(rest.trim())
    } else if PASSTHROUGH.iter().any(|prefix| line.starts_with(prefix)) {
        LineKind::Passthrough
    } else {
        LineKind::Error
    }
}

/// Anything that yields decoded response lines, waiting at most `timeout` for
/// the next one.
pub trait LineSource {
    fn next_line(&mut self, timeout: Duration) -> Result<Option<String>>;
}

/// Read the reply to `command`.
///
/// Lines are collected until the `OK` marker; anything that is neither `OK` nor
/// informational before that point is the device's error message. Once `OK` has
/// been seen, body lines keep being collected until the stream is idle for
/// `settle`. The marker itself is never part of the result.
pub fn read_response<S: LineSource + ?Sized>(
    source: &mut S,
    command: &Command,
    timeout: Duration,
    settle: Duration,
) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    loop {
        let line = match source.next_line(timeout)? {
            Some(line) => line,
            None => return Err(Error::NoResponse(command.to_string())),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match classify(line) {
            LineKind::Ok(rest) => {
                if !rest.is_empty() {
                    lines.push(rest.to_string());
                }
                break;
            }
            LineKind::Passthrough => lines.push(line.to_string()),
            LineKind::Error => return Err(Error::Device(command.to_string(), line.to_string())),
        }
    }
    while let Some(line) = source.next_line(settle)? {
        let line = line.trim();
        if line.starts_with("ERROR") {
            warn!("late '{}' after OK to '{}', dropped", line, command);
        } else if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    Ok(lines)
}

/// Splits a raw byte stream into `\r`- or `\n`-terminated lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    pub fn extend(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// The next complete, non-empty line, if one is buffered.
    pub fn pop_line(&mut self) -> Option<String> {
        while let Some(end) = self.bytes.iter().position(|&b| b == b'\r' || b == b'\n') {
            let line: Vec<u8> = self.bytes.drain(..=end).take(end).collect();
            let line = String::from_utf8_lossy(&line).trim_end().to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
        None
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

/// The operations the session and monitor need from a link to the device.
pub trait Transport {
    /// Send `command` and collect its reply.
    fn execute(&mut self, command: &Command) -> Result<Vec<String>>;

    /// Send `command` without waiting for anything back.
    fn write(&mut self, command: &Command) -> Result<()>;

    /// Return a buffered line, waiting at most `timeout` for one to complete.
    fn poll_line(&mut self, timeout: Duration) -> Result<Option<String>>;

    /// Hold the link open across calls until `close`.
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {}
}

/// Opens the port named by the settings.
pub type Opener = Box<dyn FnMut(&Settings) -> Result<Box<dyn SerialPort>>>;

fn open_port(settings: &Settings) -> Result<Box<dyn SerialPort>> {
    Ok(settings.serial_config().open()?)
}

/// One open serial port plus its partially read line.
struct Connection {
    port: Box<dyn SerialPort>,
    buffer: LineBuffer,
}

impl Connection {
    fn new(port: Box<dyn SerialPort>) -> Result<Self> {
        let mut connection = Self {
            port,
            buffer: LineBuffer::default(),
        };
        connection.reset()?;
        Ok(connection)
    }

    /// Forget everything received so far, buffered or not.
    fn reset(&mut self) -> Result<()> {
        self.buffer.clear();
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn send(&mut self, command: &Command) -> Result<()> {
        debug!(">> {}", command);
        self.port.write_all(&command.frame())?;
        self.port.flush()?;
        Ok(())
    }
}

impl LineSource for Connection {
    fn next_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        let mut deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = self.buffer.pop_line() {
                debug!("<< {}", line);
                return Ok(Some(line));
            }
            let pending = self
                .port
                .bytes_to_read()
                .map_err(|err| Error::Disconnected(err.into()))? as usize;
            if pending > 0 {
                let mut chunk = vec![0; pending];
                match self.port.read(&mut chunk) {
                    Ok(n) => {
                        trace!("read {} bytes", n);
                        self.buffer.extend(&chunk[..n]);
                        deadline = Instant::now() + timeout;
                    }
                    Err(err) if err.kind() == ErrorKind::TimedOut => {}
                    Err(err) => return Err(err.into()),
                }
                continue;
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// A `Transport` over a real serial port.
///
/// The port is opened for each command exchange and closed when the exchange
/// ends, however it ends, unless `open` has been called to hold it.
pub struct SerialTransport {
    settings: Settings,
    opener: Opener,
    connection: Option<Connection>,
}

impl SerialTransport {
    pub fn new(settings: Settings) -> Self {
        Self::with_opener(settings, open_port)
    }

    /// Use `opener` instead of the system serial port, e.g. for a pty or a
    /// port configured by the caller.
    pub fn with_opener<F>(settings: Settings, opener: F) -> Self
    where
        F: FnMut(&Settings) -> Result<Box<dyn SerialPort>> + 'static,
    {
        Self {
            settings,
            opener: Box::new(opener),
            connection: None,
        }
    }

    fn connection(&mut self) -> Result<&mut Connection> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => {
                debug!("opening {} at {} baud", self.settings.port, self.settings.baud_rate);
                Connection::new((self.opener)(&self.settings)?)?
            }
        };
        Ok(self.connection.insert(connection))
    }
}

impl Transport for SerialTransport {
    fn execute(&mut self, command: &Command) -> Result<Vec<String>> {
        let held = self.connection.is_some();
        let (timeout, settle) = (self.settings.timeout, self.settings.settle);
        let result = self.connection().and_then(|connection| {
            connection.send(command)?;
            read_response(connection, command, timeout, settle)
        });
        if !held {
            self.connection = None;
        }
        result
    }

    fn write(&mut self, command: &Command) -> Result<()> {
        self.connection()?.send(command)
    }

    fn poll_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        self.connection()?.next_line(timeout)
    }

    fn open(&mut self) -> Result<()> {
        let held = self.connection.is_some();
        let connection = self.connection()?;
        if held {
            connection.reset()?;
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.connection.take().is_some() {
            debug!("closed {}", self.settings.port);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Script(VecDeque<String>);

    impl Script {
        fn new(lines: &[&str]) -> Self {
            Script(lines.iter().map(|l| l.to_string()).collect())
        }
    }

    impl LineSource for Script {
        fn next_line(&mut self, _timeout: Duration) -> Result<Option<String>> {
            Ok(self.0.pop_front())
        }
    }

    fn read(lines: &[&str]) -> Result<Vec<String>> {
        let command = Command::get_config("lora:status");
        read_response(
            &mut Script::new(lines),
            &command,
            Duration::from_millis(10),
            Duration::from_millis(1),
        )
    }

    #[test]
    fn classifies_lines() {
        assert_eq!(classify("OK"), LineKind::Ok(""));
        assert_eq!(classify("OK V3.0.0.14.H"), LineKind::Ok("V3.0.0.14.H"));
        assert_eq!(classify("join 1 times"), LineKind::Passthrough);
        assert_eq!(classify("LoRaWAN Ack received"), LineKind::Passthrough);
        assert_eq!(classify("ERROR: 2"), LineKind::Error);
    }

    #[test]
    fn payload_before_ok() {
        let lines = read(&["open channel 1", "join 1 times", "OK"]).unwrap();
        assert_eq!(lines, vec!["open channel 1", "join 1 times"]);
    }

    #[test]
    fn trailing_text_on_ok_line() {
        let lines = read(&["close channel 4", "OK some-trailing-data"]).unwrap();
        assert_eq!(lines, vec!["close channel 4", "some-trailing-data"]);
    }

    #[test]
    fn body_after_ok_is_collected() {
        let lines = read(&["", "OK Work Mode: LoRaWAN", "Region: EU868", "", "Class: A"]).unwrap();
        assert_eq!(lines, vec!["Work Mode: LoRaWAN", "Region: EU868", "Class: A"]);
    }

    #[test]
    fn late_error_after_ok_is_not_payload() {
        let lines = read(&["OK", "Region: EU868", "ERROR: 99"]).unwrap();
        assert_eq!(lines, vec!["Region: EU868"]);
    }

    #[test]
    fn device_error_carries_line() {
        match read(&["ERROR: bad thing", "OK"]) {
            Err(Error::Device(command, message)) => {
                assert_eq!(command, "AT+get_config=lora:status");
                assert_eq!(message, "ERROR: bad thing");
            }
            other => panic!("expected device error, got {:?}", other),
        }
    }

    #[test]
    fn silence_is_no_response() {
        assert!(matches!(read(&[]), Err(Error::NoResponse(_))));
        assert!(matches!(read(&["join 1 times"]), Err(Error::NoResponse(_))));
    }

    #[test]
    fn line_buffer_splits_on_either_terminator() {
        let mut buffer = LineBuffer::default();
        buffer.extend(b"OK V3\r\nRegion: EU");
        assert_eq!(buffer.pop_line().as_deref(), Some("OK V3"));
        assert_eq!(buffer.pop_line(), None);
        buffer.extend(b"868\nClass: A\r");
        assert_eq!(buffer.pop_line().as_deref(), Some("Region: EU868"));
        assert_eq!(buffer.pop_line().as_deref(), Some("Class: A"));
        assert_eq!(buffer.pop_line(), None);
        buffer.extend(b"\r\n\r\npartial");
        assert_eq!(buffer.pop_line(), None);
        buffer.clear();
        buffer.extend(b"\n");
        assert_eq!(buffer.pop_line(), None);
    }

    #[cfg(unix)]
    mod serial {
        use super::*;
        use serialport::TTYPort;
        use std::io;
        use std::thread::JoinHandle;

        /// The device end of a pty pair: waits for one command, then plays
        /// `replies` as (delay in ms, bytes).
        fn device(mut far: TTYPort, replies: Vec<(u64, &'static [u8])>) -> JoinHandle<TTYPort> {
            thread::spawn(move || {
                let mut seen = Vec::new();
                let mut chunk = [0u8; 64];
                for _ in 0..50 {
                    if seen.contains(&b'\r') {
                        break;
                    }
                    if let Ok(n) = far.read(&mut chunk) {
                        seen.extend_from_slice(&chunk[..n]);
                    }
                }
                for (delay, bytes) in replies {
                    thread::sleep(Duration::from_millis(delay));
                    far.write_all(bytes).unwrap();
                    far.flush().unwrap();
                }
                far
            })
        }

        /// A transport whose opener hands out the near end of a pty exactly once.
        fn pty_transport(timeout_ms: u64) -> (SerialTransport, TTYPort) {
            let (far, near) = TTYPort::pair().expect("pty pair");
            let mut near = Some(near);
            let mut settings = Settings::new("pty").timeout(Duration::from_millis(timeout_ms));
            settings.settle = Duration::from_millis(50);
            let transport = SerialTransport::with_opener(settings, move |_: &Settings| match near.take() {
                Some(port) => Ok(Box::new(port) as Box<dyn SerialPort>),
                None => Err(Error::Disconnected(io::Error::new(
                    io::ErrorKind::NotFound,
                    "pty already taken",
                ))),
            });
            (transport, far)
        }

        #[test]
        fn exchange_releases_the_port() {
            let (mut transport, far) = pty_transport(1000);
            let far = device(far, vec![(0, b"OK V3.0.0.14.H\r\n")]);
            let lines = transport.execute(&Command::new("version")).unwrap();
            assert_eq!(lines, vec!["V3.0.0.14.H"]);
            assert!(transport.connection.is_none());
            far.join().unwrap();
        }

        #[test]
        fn device_error_still_releases_the_port() {
            let (mut transport, far) = pty_transport(1000);
            let far = device(far, vec![(0, b"ERROR: 5\r\n")]);
            match transport.execute(&Command::set_config("lora:class").arg(7)) {
                Err(Error::Device(_, message)) => assert_eq!(message, "ERROR: 5"),
                other => panic!("expected device error, got {:?}", other),
            }
            assert!(transport.connection.is_none());
            far.join().unwrap();

            // The next exchange has to open the port again.
            let err = transport.execute(&Command::new("version")).unwrap_err();
            assert!(err.is_transport());
        }

        #[test]
        fn idle_line_is_no_response() {
            let (mut transport, far) = pty_transport(100);
            let far = device(far, vec![]);
            assert!(matches!(
                transport.execute(&Command::new("join")),
                Err(Error::NoResponse(_))
            ));
            assert!(transport.connection.is_none());
            far.join().unwrap();
        }

        #[test]
        fn idle_deadline_restarts_with_each_chunk() {
            let (mut transport, far) = pty_transport(300);
            let far = device(far, vec![(0, b"O"), (200, b"K V"), (200, b"3\r\n")]);
            let lines = transport.execute(&Command::new("version")).unwrap();
            assert_eq!(lines, vec!["V3"]);
            far.join().unwrap();
        }

        #[test]
        fn reopening_a_held_port_drops_a_partial_line() {
            let (mut transport, mut far) = pty_transport(1000);
            transport.open().unwrap();
            far.write_all(b"Regi").unwrap();
            far.flush().unwrap();
            thread::sleep(Duration::from_millis(50));
            assert_eq!(transport.poll_line(Duration::from_millis(50)).unwrap(), None);

            transport.open().unwrap();
            far.write_all(b"on: EU868\r\n").unwrap();
            far.flush().unwrap();
            assert_eq!(
                transport.poll_line(Duration::from_millis(500)).unwrap().as_deref(),
                Some("on: EU868")
            );
            transport.close();
            assert!(transport.connection.is_none());
        }
    }
}
