//! # Text Frame Codec
//!
//! Text commands are fields joined by SOH; bundles are a timestamp followed
//! by commands, all joined by STX.
//!
//! ```text
//! command:  makeObject \x01 {"cH":101,...}
//! bundle:   1712000000123 \x02 cmd1 \x01 a \x02 cmd2 \x01 b
//! ```
//!
//! Numbers are written with Rust's shortest round-trip float formatting, so
//! `parse::<f64>()` on the receiving side recovers the exact value.

use std::fmt::Write as _;

use tether_shared::constants::{BUNDLE_SEPARATOR_CHAR, FIELD_SEPARATOR_CHAR};
use tether_shared::{ObjectHandle, Quaternion, Vec3};

use crate::error::DecodeError;

/// One positional argument of an outbound command.
///
/// Arguments keep their type until flush; only then are arrays joined with
/// commas.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    /// Verbatim text.
    Text(String),
    /// A single number.
    Number(f64),
    /// A numeric array, written comma-joined.
    Numbers(Vec<f64>),
}

impl Arg {
    /// Appends this argument's wire form to `out`.
    pub fn write_to(&self, out: &mut String) {
        match self {
            Self::Text(text) => out.push_str(text),
            Self::Number(value) => write_number(out, *value),
            Self::Numbers(values) => {
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_number(out, *value);
                }
            }
        }
    }

    /// Returns this argument's wire form.
    #[must_use]
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }
}

fn write_number(out: &mut String, value: f64) {
    // Display for f64 is the shortest representation that parses back exactly.
    let _ = write!(out, "{value}");
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for Arg {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<f32> for Arg {
    fn from(value: f32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<ObjectHandle> for Arg {
    fn from(value: ObjectHandle) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<f64>> for Arg {
    fn from(value: Vec<f64>) -> Self {
        Self::Numbers(value)
    }
}

impl From<&[f32]> for Arg {
    fn from(value: &[f32]) -> Self {
        Self::Numbers(value.iter().copied().map(f64::from).collect())
    }
}

impl From<Vec3> for Arg {
    fn from(value: Vec3) -> Self {
        Self::from(&value.to_array()[..])
    }
}

impl From<Quaternion> for Arg {
    fn from(value: Quaternion) -> Self {
        Self::from(&value.to_array()[..])
    }
}

/// Encodes a command name and its arguments as one text command.
#[must_use]
pub fn encode_command(name: &str, args: &[Arg]) -> String {
    let mut out = String::with_capacity(name.len() + args.len() * 8);
    out.push_str(name);
    for arg in args {
        out.push(FIELD_SEPARATOR_CHAR);
        arg.write_to(&mut out);
    }
    out
}

/// Joins already-encoded commands into a bundle stamped with `timestamp`.
#[must_use]
pub fn encode_bundle<S: AsRef<str>>(timestamp: i64, commands: &[S]) -> String {
    let mut out = timestamp.to_string();
    for command in commands {
        out.push(BUNDLE_SEPARATOR_CHAR);
        out.push_str(command.as_ref());
    }
    out
}

/// A decoded text command. Arguments stay strings until a handler
/// interprets them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    /// Command name.
    pub name: String,
    /// Positional arguments.
    pub args: Vec<String>,
}

impl Command {
    /// Creates a command from its parts.
    #[must_use]
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Returns argument `index`, if present.
    #[inline]
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Fails with [`DecodeError::MissingArguments`] unless at least
    /// `expected` arguments are present.
    pub fn require(&self, expected: usize) -> Result<(), DecodeError> {
        if self.args.len() < expected {
            return Err(DecodeError::MissingArguments {
                command: self.name.clone(),
                expected,
                got: self.args.len(),
            });
        }
        Ok(())
    }

    /// Re-encodes the command.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = self.name.clone();
        for arg in &self.args {
            out.push(FIELD_SEPARATOR_CHAR);
            out.push_str(arg);
        }
        out
    }
}

/// A decoded text frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextFrame {
    /// A lone command.
    Single(Command),
    /// Several commands sharing the sender's timestamp.
    Bundle {
        /// Sender's virtual time when the bundle was composed.
        timestamp: i64,
        /// Bundled commands, in send order.
        commands: Vec<Command>,
    },
}

impl TextFrame {
    /// Consumes the frame, yielding its commands in order.
    #[must_use]
    pub fn into_commands(self) -> Vec<Command> {
        match self {
            Self::Single(command) => vec![command],
            Self::Bundle { commands, .. } => commands,
        }
    }

    /// Number of commands carried.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Bundle { commands, .. } => commands.len(),
        }
    }

    /// True only for a bundle that carried a bare timestamp.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decodes one text command (no bundle separators).
pub fn decode_command(text: &str) -> Result<Command, DecodeError> {
    let mut fields = text.split(FIELD_SEPARATOR_CHAR);
    let name = fields.next().unwrap_or_default();
    if name.is_empty() {
        return Err(DecodeError::EmptyCommand);
    }
    Ok(Command {
        name: name.to_owned(),
        args: fields.map(str::to_owned).collect(),
    })
}

/// Decodes a text frame: a bundle if it contains STX, otherwise a single
/// command.
pub fn decode_text(text: &str) -> Result<TextFrame, DecodeError> {
    if !text.contains(BUNDLE_SEPARATOR_CHAR) {
        return decode_command(text).map(TextFrame::Single);
    }
    let (timestamp, commands) = decode_bundle(text)?;
    Ok(TextFrame::Bundle {
        timestamp,
        commands,
    })
}

/// Decodes a bundle into its timestamp and commands.
pub fn decode_bundle(text: &str) -> Result<(i64, Vec<Command>), DecodeError> {
    let mut parts = text.split(BUNDLE_SEPARATOR_CHAR);
    let timestamp = parse_timestamp(parts.next().unwrap_or_default())?;
    let commands = parts.map(decode_command).collect::<Result<Vec<_>, _>>()?;
    Ok((timestamp, commands))
}

/// Parses a decimal timestamp. Fractional values are truncated.
pub fn parse_timestamp(text: &str) -> Result<i64, DecodeError> {
    let trimmed = text.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(value);
    }
    match trimmed.parse::<f64>() {
        #[allow(clippy::cast_possible_truncation)]
        Ok(value) if value.is_finite() => Ok(value.trunc() as i64),
        _ => Err(DecodeError::InvalidTimestamp(text.to_owned())),
    }
}

/// Parses a comma-joined numeric array. An empty string is an empty array.
pub fn parse_numbers(text: &str, context: &'static str) -> Result<Vec<f64>, DecodeError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split(',')
        .map(|part| parse_number(part, context))
        .collect()
}

/// Parses a comma-joined array of `f32`.
pub fn parse_floats(text: &str, context: &'static str) -> Result<Vec<f32>, DecodeError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|_| DecodeError::InvalidNumber {
                    context,
                    value: part.to_owned(),
                })
        })
        .collect()
}

/// Parses one number.
pub fn parse_number(text: &str, context: &'static str) -> Result<f64, DecodeError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| DecodeError::InvalidNumber {
            context,
            value: text.to_owned(),
        })
}
