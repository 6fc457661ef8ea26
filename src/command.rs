//! AT command framing.
//!
//! Every request to the device is a verb, an optional colon-separated path and up to
//! two positional arguments, rendered as `AT+<verb>[=<path>][:<arg1>[:<arg2>]]` and
//! terminated by a carriage return on the wire.

use core::fmt;

/// A single AT command, ready to be framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: String,
    path: Option<String>,
    args: Vec<String>,
}

impl Command {
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            path: None,
            args: Vec::new(),
        }
    }

    /// `get_config=<path>`
    pub fn get_config(path: impl Into<String>) -> Self {
        Self::new("get_config").path(path)
    }

    /// `set_config=<path>`
    pub fn set_config(path: impl Into<String>) -> Self {
        Self::new("set_config").path(path)
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn arg(mut self, arg: impl fmt::Display) -> Self {
        self.args.push(arg.to_string());
        self
    }

    /// Build a command from a catalog name such as `set_config=lora:ch_mask`.
    pub fn from_name<S: AsRef<str>>(name: &str, args: &[S]) -> Self {
        let mut command = match name.split_once('=') {
            Some((verb, path)) => Self::new(verb).path(path),
            None => Self::new(name),
        };
        for arg in args {
            command = command.arg(arg.as_ref());
        }
        command
    }

    /// The bytes written to the serial port, carriage return included.
    pub fn frame(&self) -> Vec<u8> {
        let mut bytes = self.to_string().into_bytes();
        bytes.push(b'\r');
        bytes
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AT+{}", self.verb)?;
        if let Some(path) = &self.path {
            write!(f, "={}", path)?;
        }
        for arg in &self.args {
            write!(f, ":{}", arg)?;
        }
        Ok(())
    }
}
