// Interactive monitor: stream whatever the device prints while the operator fires
// canned commands with single keystrokes. Everything happens on one thread. Each
// pass through the loop checks the serial side first and only looks at the
// keyboard when no device line was waiting, so neither source can starve the
// loop.

use crate::command::Command;
use crate::session::Session;
use crate::transport::Transport;
use crate::{Error, Result};
use chrono::Local;
use core::time::Duration;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use log::{debug, warn};
use std::collections::VecDeque;
use std::io::Write;

/// How long each pass waits for a keystroke when the device is quiet.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

const KEY_HELP: &[(&str, &str)] = &[
    ("c", "list channels"),
    ("l", "list device commands"),
    ("j", "join network"),
    ("s", "LoRa status"),
    ("r", "restart device"),
    ("d", "device status"),
    ("v", "firmware version"),
    ("h", "this help"),
    ("q", "quit"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    /// Ctrl-C. In raw mode the terminal delivers it as a keystroke instead of
    /// a signal.
    Interrupt,
}

/// A source of operator keystrokes.
pub trait Keys {
    fn poll_key(&mut self, timeout: Duration) -> Result<Option<Key>>;
}

/// One log record as a terminal line. Raw mode does not translate `\n`, so
/// every record ends in an explicit carriage return.
pub fn log_line(record: &log::Record) -> String {
    format!("[{} {}] {}\r\n", record.level(), record.target(), record.args())
}

/// Puts the controlling terminal into raw mode for as long as it lives.
pub struct RawTerminal {
    _private: (),
}

impl RawTerminal {
    pub fn enter() -> Result<Self> {
        terminal::enable_raw_mode().map_err(Error::Terminal)?;
        debug!("terminal in raw mode");
        Ok(Self { _private: () })
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        match terminal::disable_raw_mode() {
            Ok(()) => debug!("terminal restored"),
            Err(err) => warn!("could not restore terminal: {}", err),
        }
    }
}

impl Keys for RawTerminal {
    fn poll_key(&mut self, timeout: Duration) -> Result<Option<Key>> {
        if !event::poll(timeout).map_err(Error::Terminal)? {
            return Ok(None);
        }
        match event::read().map_err(Error::Terminal)? {
            Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    Ok(Some(Key::Interrupt))
                }
                KeyCode::Char(c) => Ok(Some(Key::Char(c))),
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Send(Command),
    Help,
    Quit,
}

/// The canned command behind a keystroke, if any. Keys are case-insensitive.
pub fn action_for(key: char) -> Option<Action> {
    let action = match key.to_ascii_lowercase() {
        'c' => Action::Send(Command::get_config("lora:channel")),
        'l' => Action::Send(Command::new("help")),
        'j' => Action::Send(Command::new("join")),
        's' => Action::Send(Command::get_config("lora:status")),
        'r' => Action::Send(Command::set_config("device:restart")),
        'd' => Action::Send(Command::get_config("device:status")),
        'v' => Action::Send(Command::new("version")),
        'h' | '?' => Action::Help,
        'q' => Action::Quit,
        _ => return None,
    };
    Some(action)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    AwaitingInput,
    Quit,
}

pub struct Monitor<'a, T, K, W> {
    transport: &'a mut T,
    keys: K,
    out: W,
    queue: VecDeque<Command>,
    timestamps: bool,
}

impl<'a, T: Transport, K: Keys, W: Write> Monitor<'a, T, K, W> {
    pub fn new(transport: &'a mut T, keys: K, out: W) -> Self {
        Self {
            transport,
            keys,
            out,
            queue: VecDeque::new(),
            timestamps: false,
        }
    }

    pub fn timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    pub fn enqueue(&mut self, command: Command) {
        self.queue.push_back(command);
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn into_output(self) -> W {
        self.out
    }

    fn render(&mut self, line: &str) -> Result<()> {
        let stamp = if self.timestamps {
            format!("{} ", Local::now().format("%H:%M:%S%.3f"))
        } else {
            String::new()
        };
        // Raw mode: no implicit carriage return.
        write!(self.out, "{}{}\r\n", stamp, line)
            .and_then(|()| self.out.flush())
            .map_err(Error::Terminal)
    }

    fn render_help(&mut self) -> Result<()> {
        for (key, what) in KEY_HELP {
            self.render(&format!("  {}  {}", key, what))?;
        }
        Ok(())
    }

    /// One pass of the loop.
    pub fn step(&mut self) -> Result<Flow> {
        if let Some(line) = self.transport.poll_line(Duration::ZERO)? {
            self.render(&line)?;
            return Ok(Flow::AwaitingInput);
        }
        match self.keys.poll_key(POLL_INTERVAL)? {
            Some(Key::Interrupt) => return Ok(Flow::Quit),
            Some(Key::Char(c)) => match action_for(c) {
                Some(Action::Quit) => return Ok(Flow::Quit),
                Some(Action::Help) => self.render_help()?,
                Some(Action::Send(command)) => self.enqueue(command),
                None => warn!("unrecognized key '{}', press h for help", c.escape_default()),
            },
            None => {}
        }
        if let Some(command) = self.queue.pop_front() {
            self.render(&format!("> {}", command))?;
            self.transport.write(&command)?;
        }
        Ok(Flow::AwaitingInput)
    }

    /// Run until the operator quits. The link is held open for the duration
    /// and released on every exit path.
    pub fn run(&mut self) -> Result<()> {
        self.transport.open()?;
        let result = self.render("monitoring, press h for help, q to quit").and_then(|()| loop {
            match self.step() {
                Ok(Flow::AwaitingInput) => continue,
                Ok(Flow::Quit) => break Ok(()),
                Err(err) => break Err(err),
            }
        });
        self.transport.close();
        if self.pending() > 0 {
            debug!("dropping {} unsent command(s)", self.pending());
        }
        result
    }
}

impl<T: Transport> Session<T> {
    /// Stream device output to `out` while taking keystrokes from `keys`.
    pub fn monitor<K: Keys, W: Write>(&mut self, keys: K, out: W, timestamps: bool) -> Result<()> {
        Monitor::new(self.transport_mut(), keys, out)
            .timestamps(timestamps)
            .run()
    }
}
