#![allow(dead_code)]

use vesper::reactor::Reactor;
use vesper::script::{HostObject, NativeValue, ScriptEngine};
use vesper::{Runtime, RuntimeBuilder};

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub type Callable = Rc<dyn Fn(&[Value]) -> Result<Value, Value>>;

/// A script value of the mock engine.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Number(f64),
    Str(String),
    Error(String),
    Object(Rc<RefCell<BTreeMap<String, Value>>>),
    Function(Callable),
    Host(HostObject),
}

impl Value {
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(fields) => fields.borrow().get(key).cloned(),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn host(&self) -> Option<&HostObject> {
        match self {
            Value::Host(host) => Some(host),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Error(m) => write!(f, "Error({m:?})"),
            Value::Object(fields) => f.debug_map().entries(fields.borrow().iter()).finish(),
            Value::Function(_) => write!(f, "[function]"),
            Value::Host(host) => write!(f, "{host:?}"),
        }
    }
}

/// A script engine double that counts retention calls and records
/// reported exceptions.
///
/// `evaluate` understands a single statement: `throw <message>`. Anything
/// else evaluates to `undefined`.
#[derive(Default)]
pub struct MockEngine {
    pub protects: Cell<usize>,
    pub unprotects: Cell<usize>,
    pub exceptions: RefCell<Vec<String>>,
}

impl MockEngine {
    pub fn balanced(&self) -> bool {
        self.protects.get() == self.unprotects.get()
    }

    pub fn outstanding(&self) -> usize {
        self.protects.get() - self.unprotects.get()
    }
}

impl ScriptEngine for MockEngine {
    type Value = Value;

    fn evaluate(&self, source: &str) -> Result<Value, Value> {
        match source.strip_prefix("throw ") {
            Some(message) => Err(Value::Error(message.to_owned())),
            None => Ok(Value::Undefined),
        }
    }

    fn call(&self, function: &Value, args: &[Value]) -> Result<Value, Value> {
        match function {
            Value::Function(f) => f(args),
            _ => Err(Value::Error("not a function".to_owned())),
        }
    }

    fn is_function(&self, value: &Value) -> bool {
        matches!(value, Value::Function(_))
    }

    fn to_native_string(&self, value: &Value) -> Option<String> {
        match value {
            Value::Undefined => Some("undefined".to_owned()),
            Value::Null => Some("null".to_owned()),
            Value::Number(n) => Some(n.to_string()),
            Value::Str(s) => Some(s.clone()),
            Value::Error(m) => Some(m.clone()),
            Value::Object(_) | Value::Host(_) => Some("[object Object]".to_owned()),
            Value::Function(_) => None,
        }
    }

    fn to_native_number(&self, value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => Some(*n),
            Value::Null => Some(0.0),
            Value::Str(s) => Some(s.trim().parse().unwrap_or(f64::NAN)),
            _ => Some(f64::NAN),
        }
    }

    fn to_script(&self, value: NativeValue) -> Value {
        match value {
            NativeValue::Undefined => Value::Undefined,
            NativeValue::Null => Value::Null,
            NativeValue::Number(n) => Value::Number(n),
            NativeValue::String(s) => Value::Str(s),
            NativeValue::Error(m) => Value::Error(m),
            NativeValue::StringMap(map) => object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::Str(v)))
                    .collect(),
            ),
            NativeValue::Object(fields) => object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, self.to_script(v)))
                    .collect(),
            ),
            NativeValue::Host(host) => Value::Host(host),
        }
    }

    fn set_property(&self, target: &Value, key: &str, value: NativeValue) {
        let value = self.to_script(value);
        if let Value::Object(fields) = target {
            fields.borrow_mut().insert(key.to_owned(), value);
        }
    }

    fn protect(&self, _value: &Value) {
        self.protects.set(self.protects.get() + 1);
    }

    fn unprotect(&self, _value: &Value) {
        self.unprotects.set(self.unprotects.get() + 1);
    }

    fn report_exception(&self, exception: &Value) {
        let message = self
            .to_native_string(exception)
            .unwrap_or_else(|| "<unprintable>".to_owned());
        self.exceptions.borrow_mut().push(message);
    }
}

fn object(fields: BTreeMap<String, Value>) -> Value {
    Value::Object(Rc::new(RefCell::new(fields)))
}

pub fn function(f: impl Fn(&[Value]) -> Result<Value, Value> + 'static) -> Value {
    Value::Function(Rc::new(f))
}

/// A function recording the arguments of every call.
pub fn recorder() -> (Value, Rc<RefCell<Vec<Vec<Value>>>>) {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let sink = calls.clone();

    let f = function(move |args| {
        sink.borrow_mut().push(args.to_vec());
        Ok(Value::Undefined)
    });

    (f, calls)
}

pub fn str(s: &str) -> Value {
    Value::Str(s.to_owned())
}

pub fn num(n: f64) -> Value {
    Value::Number(n)
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn runtime() -> Runtime<MockEngine> {
    init_logger();
    RuntimeBuilder::new()
        .worker_threads(2)
        .build(MockEngine::default())
        .expect("Failed to build runtime")
}

pub fn reactor() -> Reactor {
    init_logger();
    Reactor::new().expect("Failed to create reactor")
}

/// Stops the reactor from another thread if the test hangs.
pub fn watchdog(reactor: &Reactor, limit: Duration) {
    let handle = reactor.stop_handle();
    thread::spawn(move || {
        thread::sleep(limit);
        handle.stop();
    });
}

pub fn temp_path(name: &str) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock drift")
        .as_nanos();

    std::env::temp_dir().join(format!(
        "vesper-{name}-{}-{}.tmp",
        std::process::id(),
        unique
    ))
}

/// A local port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let port = listener
        .local_addr()
        .expect("Failed to get local address")
        .port();
    drop(listener);
    port
}
