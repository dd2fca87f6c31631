use super::{Runtime, ServerSlot, completion_args};
use crate::error::Error;
use crate::http::{self, ClientRequest, Method, Response, ServerExchange, Url};
use crate::script::{HostObject, NativeValue, ScriptEngine};

use std::rc::Rc;

impl<E: ScriptEngine> Runtime<E> {
    /// `http.get(url, cb)`
    pub fn http_get(&self, args: &[E::Value]) -> Result<E::Value, Error> {
        let [url, callback, ..] = args else {
            return Err(Error::argument("http.get requires 2 arguments: url and callback"));
        };

        self.http_request(Method::Get, url, None, callback, "http.get")
    }

    /// `http.post(url, data, cb)`
    pub fn http_post(&self, args: &[E::Value]) -> Result<E::Value, Error> {
        let [url, data, callback, ..] = args else {
            return Err(Error::argument(
                "http.post requires 3 arguments: url, data, and callback",
            ));
        };

        self.http_request(Method::Post, url, Some(data), callback, "http.post")
    }

    /// `http.put(url, data, cb)`
    pub fn http_put(&self, args: &[E::Value]) -> Result<E::Value, Error> {
        let [url, data, callback, ..] = args else {
            return Err(Error::argument(
                "http.put requires 3 arguments: url, data, and callback",
            ));
        };

        self.http_request(Method::Put, url, Some(data), callback, "http.put")
    }

    /// `http.delete(url, cb)`
    pub fn http_delete(&self, args: &[E::Value]) -> Result<E::Value, Error> {
        let [url, callback, ..] = args else {
            return Err(Error::argument(
                "http.delete requires 2 arguments: url and callback",
            ));
        };

        self.http_request(Method::Delete, url, None, callback, "http.delete")
    }

    fn http_request(
        &self,
        method: Method,
        url: &E::Value,
        body: Option<&E::Value>,
        callback: &E::Value,
        name: &str,
    ) -> Result<E::Value, Error> {
        let url = self.string_arg(url, &format!("{name} requires a url string"))?;
        let url = Url::parse(&url).map_err(|e| Error::Argument(e.to_string()))?;

        let body = match body {
            Some(body) => Some(self.string_arg(body, &format!("{name} requires string data"))?),
            None => None,
        };

        let mut operation = self.operation(self.function_arg(callback, name)?);

        let request = ClientRequest { method, url, body };

        http::request(self.reactor(), request, move |result| {
            operation.complete(completion_args(result.map(response_value)));
        });

        Ok(self.undefined())
    }

    /// `http.createServer(onRequest) -> server`
    ///
    /// `onRequest(req, res)` runs once per accepted connection. `req.method`
    /// and `req.url` are filled in once the request line has arrived.
    pub fn http_create_server(&self, args: &[E::Value]) -> Result<E::Value, Error> {
        let callback =
            self.server_callback(args, "http.createServer requires a callback function")?;

        let id = self.insert_server(ServerSlot::Http {
            callback: Rc::new(callback),
            server: None,
        });

        Ok(self
            .engine()
            .to_script(NativeValue::Host(HostObject::HttpServer(id))))
    }

    /// `res.end()`
    ///
    /// Writes the fixed response once. Ending a response whose client is
    /// gone is not an error for the script.
    pub fn response_end(
        &self,
        response: &ServerExchange,
        _args: &[E::Value],
    ) -> Result<E::Value, Error> {
        if let Err(e) = response.end() {
            log::debug!("response not sent: {e}");
        }

        Ok(self.undefined())
    }
}

/// The script-visible `{statusCode, headers, body}` record.
fn response_value(response: Response) -> NativeValue {
    NativeValue::Object(vec![
        (
            "statusCode".to_owned(),
            NativeValue::Number(f64::from(response.status_code)),
        ),
        ("headers".to_owned(), NativeValue::StringMap(response.headers)),
        ("body".to_owned(), NativeValue::String(response.body)),
    ])
}
