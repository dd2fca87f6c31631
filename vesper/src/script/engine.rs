use crate::http::ServerExchange;
use crate::net::Connection;

use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a server created from a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerId(pub(crate) u64);

impl ServerId {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }
}

/// Native objects handed to scripts by handle.
///
/// The engine decides how to expose them (typically an object with a
/// hidden slot plus methods that call back into the
/// [`Runtime`](crate::runtime::Runtime)).
#[derive(Debug, Clone)]
pub enum HostObject {
    /// Result of `net.createServer`; exposes `listen(port)`.
    NetServer(ServerId),
    /// Result of `http.createServer`; exposes `listen(port)`.
    HttpServer(ServerId),
    /// An accepted `net` client; exposes `write(data)`.
    Socket(Connection),
    /// The `res` of an HTTP exchange; exposes `end()`.
    Response(ServerExchange),
}

/// A value crossing from native code into the script world.
#[derive(Debug, Clone)]
pub enum NativeValue {
    Undefined,
    Null,
    Number(f64),
    String(String),
    /// An error object carrying a message.
    Error(String),
    /// A string-to-string map, such as HTTP headers.
    StringMap(BTreeMap<String, String>),
    /// A plain record with fields in insertion order.
    Object(Vec<(String, NativeValue)>),
    Host(HostObject),
}

impl NativeValue {
    pub fn error(error: impl fmt::Display) -> Self {
        NativeValue::Error(error.to_string())
    }

    pub fn string(value: impl Into<String>) -> Self {
        NativeValue::String(value.into())
    }
}

impl From<f64> for NativeValue {
    fn from(value: f64) -> Self {
        NativeValue::Number(value)
    }
}

impl From<String> for NativeValue {
    fn from(value: String) -> Self {
        NativeValue::String(value)
    }
}

impl From<&str> for NativeValue {
    fn from(value: &str) -> Self {
        NativeValue::String(value.to_owned())
    }
}

/// The embedded script engine, as seen by the runtime.
///
/// Implementations wrap a single engine context. All methods are called on
/// the loop thread.
pub trait ScriptEngine: 'static {
    /// A script value. Cloning must not create a new engine-level root;
    /// use [`protect`](Self::protect) for that.
    type Value: Clone + 'static;

    /// Evaluates a program. `Err` carries the thrown exception.
    fn evaluate(&self, source: &str) -> Result<Self::Value, Self::Value>;

    /// Calls `function` with `args`. `Err` carries the thrown exception.
    fn call(&self, function: &Self::Value, args: &[Self::Value])
    -> Result<Self::Value, Self::Value>;

    fn is_function(&self, value: &Self::Value) -> bool;

    /// Converts a value to a string; `None` if the conversion throws.
    fn to_native_string(&self, value: &Self::Value) -> Option<String>;

    /// Converts a value to a number; `None` if the conversion throws.
    fn to_native_number(&self, value: &Self::Value) -> Option<f64>;

    fn to_script(&self, value: NativeValue) -> Self::Value;

    fn set_property(&self, object: &Self::Value, key: &str, value: NativeValue);

    /// Keeps `value` alive across garbage collections until the matching
    /// [`unprotect`](Self::unprotect).
    fn protect(&self, value: &Self::Value);

    fn unprotect(&self, value: &Self::Value);

    /// Reports an exception thrown by a callback or a top-level script.
    fn report_exception(&self, exception: &Self::Value) {
        match self.to_native_string(exception) {
            Some(message) => log::warn!("uncaught script exception: {message}"),
            None => log::warn!("uncaught script exception"),
        }
    }
}
