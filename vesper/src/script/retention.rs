use super::engine::{NativeValue, ScriptEngine};

use std::fmt;
use std::rc::Rc;

/// A script value kept alive for as long as the guard exists.
///
/// Creating the guard protects the value; dropping it unprotects it. The
/// two are therefore always balanced, whichever way the owning operation
/// ends.
pub struct Retained<E: ScriptEngine> {
    engine: Rc<E>,
    value: E::Value,
}

impl<E: ScriptEngine> Retained<E> {
    pub fn new(engine: Rc<E>, value: E::Value) -> Self {
        engine.protect(&value);
        Self { engine, value }
    }

    pub fn value(&self) -> &E::Value {
        &self.value
    }

    pub fn engine(&self) -> &Rc<E> {
        &self.engine
    }

    /// Calls the retained value as a function.
    ///
    /// A thrown exception is reported through the engine and `None` is
    /// returned; it never propagates into native code.
    pub fn invoke(&self, args: &[E::Value]) -> Option<E::Value> {
        match self.engine.call(&self.value, args) {
            Ok(result) => Some(result),
            Err(exception) => {
                self.engine.report_exception(&exception);
                None
            }
        }
    }

    /// Marshals `args` into script values, then [`invoke`](Self::invoke)s.
    pub fn invoke_native(&self, args: Vec<NativeValue>) -> Option<E::Value> {
        let args: Vec<E::Value> = args
            .into_iter()
            .map(|arg| self.engine.to_script(arg))
            .collect();

        self.invoke(&args)
    }
}

impl<E: ScriptEngine> Drop for Retained<E> {
    fn drop(&mut self) {
        self.engine.unprotect(&self.value);
    }
}

impl<E: ScriptEngine> fmt::Debug for Retained<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retained").finish_non_exhaustive()
    }
}
