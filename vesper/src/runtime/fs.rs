use super::{Runtime, completion_args};
use crate::error::Error;
use crate::fs;
use crate::script::{NativeValue, ScriptEngine};

impl<E: ScriptEngine> Runtime<E> {
    /// `fs.readFile(path, cb)`: `cb(err, contents)` with the contents
    /// decoded as UTF-8, lossily.
    pub fn read_file(&self, args: &[E::Value]) -> Result<E::Value, Error> {
        const USAGE: &str = "fs.readFile requires a path and callback";

        let [path, callback, ..] = args else {
            return Err(Error::argument(USAGE));
        };

        let path = self.string_arg(path, USAGE)?;
        let mut operation = self.operation(self.function_arg(callback, "fs.readFile")?);

        fs::read_file(self.reactor(), path, move |result| {
            let contents = result
                .map(|bytes| NativeValue::String(String::from_utf8_lossy(&bytes).into_owned()));
            operation.complete(completion_args(contents));
        });

        Ok(self.undefined())
    }

    /// `fs.writeFile(path, content, cb)`: creates or truncates the file.
    pub fn write_file(&self, args: &[E::Value]) -> Result<E::Value, Error> {
        const USAGE: &str = "fs.writeFile requires a path, content, and callback";

        let [path, content, callback, ..] = args else {
            return Err(Error::argument(USAGE));
        };

        let path = self.string_arg(path, USAGE)?;
        let content = self.string_arg(content, USAGE)?;
        let mut operation = self.operation(self.function_arg(callback, "fs.writeFile")?);

        fs::write_file(self.reactor(), path, content, move |result| {
            operation.complete(completion_args(result.map(|()| NativeValue::Undefined)));
        });

        Ok(self.undefined())
    }
}
