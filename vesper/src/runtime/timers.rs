use super::Runtime;
use crate::error::Error;
use crate::reactor::TimerId;
use crate::script::{NativeValue, ScriptEngine};

use std::time::Duration;

impl<E: ScriptEngine> Runtime<E> {
    /// `setTimeout(fn, ms) -> id`
    pub fn set_timeout(&self, args: &[E::Value]) -> Result<E::Value, Error> {
        let [callback, delay, ..] = args else {
            return Err(Error::argument("setTimeout requires 2 arguments"));
        };

        let mut operation = self.operation(self.function_arg(callback, "setTimeout")?);
        let delay = self.delay_arg(delay);

        let id = self
            .reactor()
            .set_timeout(delay, move || operation.complete(Vec::new()));

        Ok(self.engine().to_script(NativeValue::Number(id.as_number())))
    }

    /// `setInterval(fn, ms) -> id`
    pub fn set_interval(&self, args: &[E::Value]) -> Result<E::Value, Error> {
        let [callback, period, ..] = args else {
            return Err(Error::argument("setInterval requires 2 arguments"));
        };

        let callback = self.function_arg(callback, "setInterval")?;
        let period = self.delay_arg(period);

        let id = self.reactor().set_interval(period, move || {
            callback.invoke(&[]);
        });

        Ok(self.engine().to_script(NativeValue::Number(id.as_number())))
    }

    /// `clearTimeout(id)`
    pub fn clear_timeout(&self, args: &[E::Value]) -> Result<E::Value, Error> {
        let [id, ..] = args else {
            return Err(Error::argument("clearTimeout requires 1 argument"));
        };

        self.clear_timer(id);
        Ok(self.undefined())
    }

    /// `clearInterval(id)`
    pub fn clear_interval(&self, args: &[E::Value]) -> Result<E::Value, Error> {
        let [id, ..] = args else {
            return Err(Error::argument("clearInterval requires 1 argument"));
        };

        self.clear_timer(id);
        Ok(self.undefined())
    }

    /// Unknown, stale and non-numeric ids are ignored.
    fn clear_timer(&self, id: &E::Value) {
        let id = self
            .engine()
            .to_native_number(id)
            .and_then(TimerId::from_number);

        if let Some(id) = id {
            self.reactor().clear_timer(id);
        }
    }

    /// NaN and negative delays become 0; delays are capped at `i32::MAX`
    /// milliseconds.
    fn delay_arg(&self, value: &E::Value) -> Duration {
        let millis = self.engine().to_native_number(value).unwrap_or(0.0);

        if millis.is_nan() || millis <= 0.0 {
            return Duration::ZERO;
        }

        Duration::from_millis(millis.min(i32::MAX as f64) as u64)
    }
}
