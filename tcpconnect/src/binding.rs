//! The host-facing entry point.
//!
//! A scripting host calls `tcpConnect(host, port, message)` with
//! dynamically typed arguments. [`tcp_connect`] checks them, then starts
//! the request and hands back its promise. A malformed call fails
//! synchronously, before any socket or promise exists.

use crate::connection;
use crate::error::ArgumentError;
use crate::promise::Promise;
use crate::reactor::EventLoop;

use std::fmt;

/// The name the operation is exported under.
pub const EXPORT_NAME: &str = "tcpConnect";

/// A dynamically typed host argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Value {
    /// The host's name for this value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// `tcpConnect(host, port, message)`.
///
/// Arguments past the third are ignored. On success the request has been
/// started on `event_loop` and the returned promise is unsettled.
pub fn tcp_connect(event_loop: &mut EventLoop, args: &[Value]) -> Result<Promise, ArgumentError> {
    let (host, port, message) = parse_args(args)?;

    Ok(connection::tcp_connect(event_loop, host, port, message))
}

fn parse_args(args: &[Value]) -> Result<(&str, u16, &str), ArgumentError> {
    let [host, port, message, ..] = args else {
        return Err(ArgumentError::Count { got: args.len() });
    };

    let host = host.as_str().ok_or(ArgumentError::HostType)?;
    let port = port.as_number().ok_or(ArgumentError::PortType)?;
    let message = message.as_str().ok_or(ArgumentError::MessageType)?;

    Ok((host, port_from_number(port)?, message))
}

fn port_from_number(port: f64) -> Result<u16, ArgumentError> {
    if port.fract() != 0.0 || !(0.0..=f64::from(u16::MAX)).contains(&port) {
        return Err(ArgumentError::PortRange);
    }

    Ok(port as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[Value]) -> Result<(&str, u16, &str), ArgumentError> {
        parse_args(values)
    }

    #[test]
    fn accepts_three_well_typed_arguments() {
        let values: &[Value] = &["127.0.0.1".into(), 8080u16.into(), "ping".into()];
        assert_eq!(args(values), Ok(("127.0.0.1", 8080, "ping")));
    }

    #[test]
    fn extra_arguments_are_ignored() {
        let values: &[Value] = &[
            "::1".into(),
            Value::Number(0.0),
            "".into(),
            Value::Null,
            Value::Bool(true),
        ];
        assert_eq!(args(values), Ok(("::1", 0, "")));
    }

    #[test]
    fn too_few_arguments() {
        let values: &[Value] = &["127.0.0.1".into(), 80u16.into()];
        let err = args(values).unwrap_err();

        assert_eq!(err, ArgumentError::Count { got: 2 });
        assert_eq!(
            err.to_string(),
            "Wrong number of arguments. Expects 3 arguments."
        );
        assert_eq!(args(&[]), Err(ArgumentError::Count { got: 0 }));
    }

    #[test]
    fn checks_types_in_order() {
        let host_wrong: &[Value] = &[Value::Number(1.0), Value::Number(80.0), "x".into()];
        assert_eq!(args(host_wrong), Err(ArgumentError::HostType));
        assert_eq!(
            ArgumentError::HostType.to_string(),
            "Wrong type of arguments. The host must be a string."
        );

        let port_wrong: &[Value] = &["localhost".into(), "80".into(), "x".into()];
        assert_eq!(args(port_wrong), Err(ArgumentError::PortType));

        let message_wrong: &[Value] = &["localhost".into(), 80u16.into(), Value::Undefined];
        assert_eq!(args(message_wrong), Err(ArgumentError::MessageType));

        // Both host and port are wrong: host is reported.
        let both: &[Value] = &[Value::Null, Value::Null, Value::Null];
        assert_eq!(args(both), Err(ArgumentError::HostType));
    }

    #[test]
    fn port_must_be_an_integer_in_range() {
        for bad in [-1.0, 65536.0, 80.5, f64::NAN, f64::INFINITY] {
            let values: &[Value] = &["127.0.0.1".into(), Value::Number(bad), "x".into()];
            assert_eq!(args(values), Err(ArgumentError::PortRange), "port {bad}");
        }

        let values: &[Value] = &["127.0.0.1".into(), Value::Number(65535.0), "x".into()];
        assert_eq!(args(values).map(|(_, port, _)| port), Ok(65535));
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::Undefined.type_name(), "undefined");
        assert_eq!(Value::from(1.5).type_name(), "number");
        assert_eq!(Value::from("a").to_string(), "\"a\"");
    }
}
