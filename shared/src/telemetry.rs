//! Telemetry line decoder
//!
//! The device pushes one state line per datagram, e.g.
//! ```text
//! mid:-1;x:0;y:0;z:0;mpry:0,0,0;pitch:0;roll:0;yaw:0;vgx:0;vgy:0;vgz:0;templ:79;
//! temph:82;tof:6553;h:0;bat:89;baro:51.81;time:0;agx:-8.00;agy:4.00;agz:-1050.00;
//! ```
//!
//! The schema is strict: every field must be present and unknown fields are
//! rejected.

use thiserror::Error;

/// Separator between `name:value` tokens
pub const FIELD_SEPARATOR: char = ';';

/// Separator between a field name and its value
pub const VALUE_SEPARATOR: char = ':';

/// Field names in the order the device sends them
pub const FIELD_NAMES: [&str; 21] = [
    "mid", "x", "y", "z", "mpry", "pitch", "roll", "yaw", "vgx", "vgy", "vgz", "templ", "temph",
    "tof", "h", "bat", "baro", "time", "agx", "agy", "agz",
];

/// Errors produced while decoding a telemetry line
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Token '{0}' has no ':' separator")]
    MissingSeparator(String),

    #[error("Unknown telemetry field: {0}")]
    UnknownField(String),

    #[error("Missing telemetry field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for {field}: '{value}'")]
    InvalidValue { field: String, value: String },

    #[error("Field {field} expects {expected}, got '{value}'")]
    WrongShape {
        field: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// A raw telemetry value, classified by its textual shape
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Tuple(Vec<i64>),
}

impl Value {
    /// Classify and parse a raw value: `,` means tuple, `.` means float,
    /// anything else is an integer
    pub fn parse(field: &str, raw: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
        };

        if raw.contains(',') {
            raw.split(',')
                .map(|part| part.trim().parse::<i64>().map_err(|_| invalid()))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Tuple)
        } else if raw.contains('.') {
            raw.trim().parse::<f64>().map(Value::Float).map_err(|_| invalid())
        } else {
            raw.trim().parse::<i64>().map(Value::Int).map_err(|_| invalid())
        }
    }
}

/// One decoded telemetry snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// Mission pad id, -1 when none detected
    pub mid: i64,
    /// Position relative to the mission pad (cm)
    pub x: i64,
    pub y: i64,
    pub z: i64,
    /// Pitch, roll and yaw relative to the mission pad
    pub mpry: (i64, i64, i64),
    /// Attitude (degrees)
    pub pitch: i64,
    pub roll: i64,
    pub yaw: i64,
    /// Speeds (dm/s)
    pub vgx: i64,
    pub vgy: i64,
    pub vgz: i64,
    /// Lowest and highest temperature (°C)
    pub templ: i64,
    pub temph: i64,
    /// Time-of-flight distance (cm)
    pub tof: i64,
    /// Height (cm)
    pub h: i64,
    /// Battery percentage
    pub bat: i64,
    /// Barometer altitude (m)
    pub baro: f64,
    /// Motor on time (s)
    pub time: i64,
    /// Accelerations (0.001g)
    pub agx: f64,
    pub agy: f64,
    pub agz: f64,
}

/// Collects parsed values before the record is assembled
#[derive(Default)]
struct RecordBuilder {
    values: [Option<Value>; FIELD_NAMES.len()],
}

impl RecordBuilder {
    fn set(&mut self, name: &str, value: Value) -> Result<(), ParseError> {
        let index = FIELD_NAMES
            .iter()
            .position(|field| *field == name)
            .ok_or_else(|| ParseError::UnknownField(name.to_string()))?;
        // Repeated fields: the last occurrence wins
        self.values[index] = Some(value);
        Ok(())
    }

    fn take(&mut self, field: &'static str) -> Result<Value, ParseError> {
        FIELD_NAMES
            .iter()
            .position(|name| *name == field)
            .and_then(|index| self.values[index].take())
            .ok_or(ParseError::MissingField(field))
    }

    fn int(&mut self, field: &'static str) -> Result<i64, ParseError> {
        match self.take(field)? {
            Value::Int(value) => Ok(value),
            other => Err(wrong_shape(field, "an integer", &other)),
        }
    }

    /// Integers are widened, e.g. `baro:0`
    fn float(&mut self, field: &'static str) -> Result<f64, ParseError> {
        match self.take(field)? {
            Value::Float(value) => Ok(value),
            Value::Int(value) => Ok(value as f64),
            other => Err(wrong_shape(field, "a number", &other)),
        }
    }

    fn triple(&mut self, field: &'static str) -> Result<(i64, i64, i64), ParseError> {
        match self.take(field)? {
            Value::Tuple(parts) if parts.len() == 3 => Ok((parts[0], parts[1], parts[2])),
            other => Err(wrong_shape(field, "three integers", &other)),
        }
    }

    fn build(mut self) -> Result<TelemetryRecord, ParseError> {
        Ok(TelemetryRecord {
            mid: self.int("mid")?,
            x: self.int("x")?,
            y: self.int("y")?,
            z: self.int("z")?,
            mpry: self.triple("mpry")?,
            pitch: self.int("pitch")?,
            roll: self.int("roll")?,
            yaw: self.int("yaw")?,
            vgx: self.int("vgx")?,
            vgy: self.int("vgy")?,
            vgz: self.int("vgz")?,
            templ: self.int("templ")?,
            temph: self.int("temph")?,
            tof: self.int("tof")?,
            h: self.int("h")?,
            bat: self.int("bat")?,
            baro: self.float("baro")?,
            time: self.int("time")?,
            agx: self.float("agx")?,
            agy: self.float("agy")?,
            agz: self.float("agz")?,
        })
    }
}

fn wrong_shape(field: &'static str, expected: &'static str, value: &Value) -> ParseError {
    ParseError::WrongShape {
        field,
        expected,
        value: format!("{:?}", value),
    }
}

/// Decode one telemetry line
///
/// Returns `Ok(None)` for an empty (or whitespace-only) line: no telemetry is
/// not the same thing as malformed telemetry.
pub fn decode(line: &str) -> Result<Option<TelemetryRecord>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let mut builder = RecordBuilder::default();
    for token in line.trim_matches(FIELD_SEPARATOR).split(FIELD_SEPARATOR) {
        let (name, raw) = token
            .split_once(VALUE_SEPARATOR)
            .ok_or_else(|| ParseError::MissingSeparator(token.to_string()))?;
        let name = name.trim();
        let value = Value::parse(name, raw)?;
        builder.set(name, value)?;
    }

    builder.build().map(Some)
}

/// Decode a raw telemetry datagram
pub fn decode_datagram(datagram: &[u8]) -> Result<Option<TelemetryRecord>, ParseError> {
    decode(&String::from_utf8_lossy(datagram))
}
