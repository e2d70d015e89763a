//! Line codec for the Tello text protocol
//!
//! Every datagram carries exactly one message:
//! ```text
//! request:  <name>[ <arg>]*          e.g. "up 50", "go 100 0 0 30 m1"
//! response: ok | <payload> | error ... | unknown command: <name>
//! ```
//!
//! There is no length prefix and no framing beyond "one packet = one message".

use bytes::Bytes;
use std::fmt;

/// Prefix the device uses when it does not recognise a command name
pub const UNKNOWN_COMMAND_PREFIX: &str = "unknown command: ";

/// Prefix the device uses for generic failures
pub const ERROR_PREFIX: &str = "error";

/// A positional command argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Int(i64),
    Text(String),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(value) => write!(f, "{}", value),
            Arg::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::Int(value.into())
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Arg::Int(value.into())
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Text(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Text(value)
    }
}

/// A decoded response line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Anything that is not one of the two error forms, including `""`
    Success(String),
    /// The device rejected the command name; carries the offending text
    UnknownCommand(String),
    /// The device reported a generic failure; carries the full line
    DeviceError(String),
}

impl Response {
    /// True for [`Response::Success`]
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    /// Success payload, if any
    pub fn payload(&self) -> Option<&str> {
        match self {
            Response::Success(payload) => Some(payload),
            _ => None,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Success(payload) => write!(f, "{}", payload),
            Response::UnknownCommand(name) => write!(f, "{}{}", UNKNOWN_COMMAND_PREFIX, name),
            Response::DeviceError(line) => f.write_str(line),
        }
    }
}

/// Encode a command name and its arguments into the transmitted line
///
/// Arguments are space-joined in order. Nothing is quoted or escaped, so text
/// arguments must not contain spaces or newlines.
pub fn encode(name: &str, args: &[Arg]) -> Bytes {
    if args.is_empty() {
        return Bytes::copy_from_slice(name.as_bytes());
    }

    let mut line = String::from(name);
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string());
    }

    Bytes::from(line)
}

/// Classify a raw response datagram
///
/// Invalid UTF-8 is replaced rather than rejected; the device only ever
/// answers in ASCII.
pub fn decode(datagram: &[u8]) -> Response {
    let text = String::from_utf8_lossy(datagram);
    let line = text.trim();

    if let Some(name) = line.strip_prefix(UNKNOWN_COMMAND_PREFIX) {
        Response::UnknownCommand(name.to_string())
    } else if line.starts_with(ERROR_PREFIX) {
        Response::DeviceError(line.to_string())
    } else {
        Response::Success(line.to_string())
    }
}
