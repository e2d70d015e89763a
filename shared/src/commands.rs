//! Tello SDK command catalog
//!
//! Each entry is a pure function from typed arguments to a [`Command`]: the
//! encoded line plus the format its success reply is expected in. Argument
//! ranges are checked here, before anything reaches the wire.

use crate::codec::{self, Arg};
use bytes::Bytes;
use std::fmt;
use std::ops::RangeInclusive;
use thiserror::Error;

/// Distance range for linear moves (cm)
pub const MOVE_RANGE: RangeInclusive<i64> = 20..=500;

/// Rotation range (degrees)
pub const ROTATE_RANGE: RangeInclusive<i64> = 1..=360;

/// Coordinate range for `go`/`curve`/`jump` (cm)
pub const COORD_RANGE: RangeInclusive<i64> = -500..=500;

/// `go` targets may not have x, y and z all inside this band
pub const COORD_DEAD_BAND: RangeInclusive<i64> = -20..=20;

/// Speed range (cm/s)
pub const SPEED_RANGE: RangeInclusive<i64> = 10..=100;

/// Mission pad ids
pub const MISSION_PAD_RANGE: RangeInclusive<i64> = 1..=8;

/// Remote control channel range
pub const RC_RANGE: RangeInclusive<i64> = -100..=100;

/// Mission pad detection direction (0 = down, 1 = forward, 2 = both)
pub const PAD_DIRECTION_RANGE: RangeInclusive<i64> = 0..=2;

/// Errors raised while building a command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("{command}: {argument}={value} is outside {min}..={max}")]
    OutOfRange {
        command: &'static str,
        argument: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("{command}: {reason}")]
    InvalidArguments {
        command: &'static str,
        reason: &'static str,
    },
}

/// Errors raised while interpreting a success payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Expected an integer reply, got '{0}'")]
    NotAnInteger(String),
}

/// How a success payload is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    /// Any success payload is accepted; the text is discarded
    Ack,
    /// The payload is an integer, e.g. `battery?`
    Integer,
    /// The payload is passed through, e.g. `sdk?`
    Text,
}

/// An interpreted success payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ack,
    Integer(i64),
    Text(String),
}

impl ReplyFormat {
    /// Interpret a success payload
    pub fn format(self, payload: &str) -> Result<Reply, FormatError> {
        match self {
            ReplyFormat::Ack => Ok(Reply::Ack),
            ReplyFormat::Integer => payload
                .trim()
                .parse()
                .map(Reply::Integer)
                .map_err(|_| FormatError::NotAnInteger(payload.to_string())),
            ReplyFormat::Text => Ok(Reply::Text(payload.to_string())),
        }
    }
}

impl Reply {
    /// Integer value, if this is an integer reply
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Text value, if this is a text reply
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Reply::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ack => write!(f, "ok"),
            Reply::Integer(value) => write!(f, "{}", value),
            Reply::Text(value) => write!(f, "{}", value),
        }
    }
}

/// An immutable command: name, positional arguments and reply format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: &'static str,
    args: Vec<Arg>,
    reply: ReplyFormat,
}

impl Command {
    fn new(name: &'static str, args: Vec<Arg>, reply: ReplyFormat) -> Self {
        Self { name, args, reply }
    }

    fn control(name: &'static str) -> Self {
        Self::new(name, Vec::new(), ReplyFormat::Ack)
    }

    pub fn reply_format(&self) -> ReplyFormat {
        self.reply
    }

    /// Wire form of this command
    pub fn encode(&self) -> Bytes {
        codec::encode(self.name, &self.args)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Flip directions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipDirection {
    Left,
    Right,
    Forward,
    Backward,
}

impl FlipDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            FlipDirection::Left => "l",
            FlipDirection::Right => "r",
            FlipDirection::Forward => "f",
            FlipDirection::Backward => "b",
        }
    }
}

fn check(
    command: &'static str,
    argument: &'static str,
    value: i64,
    range: &RangeInclusive<i64>,
) -> Result<(), CatalogError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(CatalogError::OutOfRange {
            command,
            argument,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

fn pad(mid: i64) -> Arg {
    Arg::Text(format!("m{}", mid))
}

/// Enter SDK mode
pub fn command() -> Command {
    Command::control("command")
}

/// Auto takeoff
pub fn takeoff() -> Command {
    Command::control("takeoff")
}

/// Auto landing
pub fn land() -> Command {
    Command::control("land")
}

/// Enable the video stream
pub fn streamon() -> Command {
    Command::control("streamon")
}

/// Disable the video stream
pub fn streamoff() -> Command {
    Command::control("streamoff")
}

/// Stop all motors immediately
pub fn emergency() -> Command {
    Command::control("emergency")
}

/// Hover in place
pub fn stop() -> Command {
    Command::control("stop")
}

fn linear(name: &'static str, cm: i64) -> Result<Command, CatalogError> {
    check(name, "x", cm, &MOVE_RANGE)?;
    Ok(Command::new(name, vec![cm.into()], ReplyFormat::Ack))
}

/// Ascend by `cm`
pub fn up(cm: i64) -> Result<Command, CatalogError> {
    linear("up", cm)
}

/// Descend by `cm`
pub fn down(cm: i64) -> Result<Command, CatalogError> {
    linear("down", cm)
}

/// Fly left by `cm`
pub fn left(cm: i64) -> Result<Command, CatalogError> {
    linear("left", cm)
}

/// Fly right by `cm`
pub fn right(cm: i64) -> Result<Command, CatalogError> {
    linear("right", cm)
}

/// Fly forward by `cm`
pub fn forward(cm: i64) -> Result<Command, CatalogError> {
    linear("forward", cm)
}

/// Fly backward by `cm`
pub fn back(cm: i64) -> Result<Command, CatalogError> {
    linear("back", cm)
}

/// Rotate clockwise by `degrees`
pub fn cw(degrees: i64) -> Result<Command, CatalogError> {
    check("cw", "x", degrees, &ROTATE_RANGE)?;
    Ok(Command::new("cw", vec![degrees.into()], ReplyFormat::Ack))
}

/// Rotate counterclockwise by `degrees`
pub fn ccw(degrees: i64) -> Result<Command, CatalogError> {
    check("ccw", "x", degrees, &ROTATE_RANGE)?;
    Ok(Command::new("ccw", vec![degrees.into()], ReplyFormat::Ack))
}

/// Flip in the given direction
pub fn flip(direction: FlipDirection) -> Command {
    Command::new("flip", vec![direction.as_str().into()], ReplyFormat::Ack)
}

/// Fly to `(x, y, z)` at `speed`, optionally relative to mission pad `mid`
pub fn go(x: i64, y: i64, z: i64, speed: i64, mid: Option<i64>) -> Result<Command, CatalogError> {
    check("go", "x", x, &COORD_RANGE)?;
    check("go", "y", y, &COORD_RANGE)?;
    check("go", "z", z, &COORD_RANGE)?;
    if [x, y, z].iter().all(|v| COORD_DEAD_BAND.contains(v)) {
        return Err(CatalogError::InvalidArguments {
            command: "go",
            reason: "x, y and z cannot all be within -20..=20",
        });
    }
    check("go", "speed", speed, &SPEED_RANGE)?;

    let mut args: Vec<Arg> = vec![x.into(), y.into(), z.into(), speed.into()];
    if let Some(mid) = mid {
        check("go", "mid", mid, &MISSION_PAD_RANGE)?;
        args.push(pad(mid));
    }

    Ok(Command::new("go", args, ReplyFormat::Ack))
}

/// Fly a curve through `(x1, y1, z1)` to `(x2, y2, z2)`
#[allow(clippy::too_many_arguments)]
pub fn curve(
    x1: i64,
    y1: i64,
    z1: i64,
    x2: i64,
    y2: i64,
    z2: i64,
    speed: i64,
    mid: Option<i64>,
) -> Result<Command, CatalogError> {
    for (argument, value) in [("x1", x1), ("y1", y1), ("z1", z1), ("x2", x2), ("y2", y2), ("z2", z2)] {
        check("curve", argument, value, &COORD_RANGE)?;
    }
    check("curve", "speed", speed, &SPEED_RANGE)?;

    let mut args: Vec<Arg> = vec![
        x1.into(),
        y1.into(),
        z1.into(),
        x2.into(),
        y2.into(),
        z2.into(),
        speed.into(),
    ];
    if let Some(mid) = mid {
        check("curve", "mid", mid, &MISSION_PAD_RANGE)?;
        args.push(pad(mid));
    }

    Ok(Command::new("curve", args, ReplyFormat::Ack))
}

/// Fly to `(x, y, z)` over pad `mid1`, then recognise pad `mid2` and turn to `yaw`
pub fn jump(
    x: i64,
    y: i64,
    z: i64,
    speed: i64,
    yaw: i64,
    mid1: i64,
    mid2: i64,
) -> Result<Command, CatalogError> {
    check("jump", "x", x, &COORD_RANGE)?;
    check("jump", "y", y, &COORD_RANGE)?;
    check("jump", "z", z, &COORD_RANGE)?;
    check("jump", "speed", speed, &SPEED_RANGE)?;
    check("jump", "mid1", mid1, &MISSION_PAD_RANGE)?;
    check("jump", "mid2", mid2, &MISSION_PAD_RANGE)?;

    Ok(Command::new(
        "jump",
        vec![x.into(), y.into(), z.into(), speed.into(), yaw.into(), pad(mid1), pad(mid2)],
        ReplyFormat::Ack,
    ))
}

/// Set the cruise speed
pub fn speed(cm_per_s: i64) -> Result<Command, CatalogError> {
    check("speed", "x", cm_per_s, &SPEED_RANGE)?;
    Ok(Command::new("speed", vec![cm_per_s.into()], ReplyFormat::Ack))
}

/// Remote control: left/right, forward/backward, up/down, yaw
pub fn rc(a: i64, b: i64, c: i64, d: i64) -> Result<Command, CatalogError> {
    for (argument, value) in [("a", a), ("b", b), ("c", c), ("d", d)] {
        check("rc", argument, value, &RC_RANGE)?;
    }
    Ok(Command::new(
        "rc",
        vec![a.into(), b.into(), c.into(), d.into()],
        ReplyFormat::Ack,
    ))
}

fn credentials(
    name: &'static str,
    ssid: &str,
    password: &str,
) -> Result<Command, CatalogError> {
    if ssid.is_empty() || [ssid, password].iter().any(|s| s.contains(char::is_whitespace)) {
        return Err(CatalogError::InvalidArguments {
            command: name,
            reason: "ssid and password must be non-empty and contain no whitespace",
        });
    }
    Ok(Command::new(name, vec![ssid.into(), password.into()], ReplyFormat::Ack))
}

/// Change the drone's own access point credentials
pub fn wifi(ssid: &str, password: &str) -> Result<Command, CatalogError> {
    credentials("wifi", ssid, password)
}

/// Join an existing access point (station mode)
pub fn ap(ssid: &str, password: &str) -> Result<Command, CatalogError> {
    credentials("ap", ssid, password)
}

/// Enable mission pad detection
pub fn mon() -> Command {
    Command::control("mon")
}

/// Disable mission pad detection
pub fn moff() -> Command {
    Command::control("moff")
}

/// Select mission pad detection direction
pub fn mdirection(direction: i64) -> Result<Command, CatalogError> {
    check("mdirection", "x", direction, &PAD_DIRECTION_RANGE)?;
    Ok(Command::new("mdirection", vec![direction.into()], ReplyFormat::Ack))
}

/// Query the current speed
pub fn get_speed() -> Command {
    Command::new("speed?", Vec::new(), ReplyFormat::Integer)
}

/// Query the battery percentage
pub fn get_battery() -> Command {
    Command::new("battery?", Vec::new(), ReplyFormat::Integer)
}

/// Query the motor on time
pub fn get_time() -> Command {
    Command::new("time?", Vec::new(), ReplyFormat::Text)
}

/// Query the Wi-Fi SNR
pub fn get_wifi() -> Command {
    Command::new("wifi?", Vec::new(), ReplyFormat::Text)
}

/// Query the SDK version
pub fn get_sdk() -> Command {
    Command::new("sdk?", Vec::new(), ReplyFormat::Text)
}

/// Query the serial number
pub fn get_sn() -> Command {
    Command::new("sn?", Vec::new(), ReplyFormat::Text)
}
