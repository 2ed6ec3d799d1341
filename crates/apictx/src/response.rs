//! Response sink and the json writers built on it.
//!
//! [`ResponseWriter`] behaves like a server side response writer: headers can be changed until
//! the status is written, the status is written once, and body bytes are appended.

use crate::body::ResponseBody;
use crate::error::{ErrorPayload, TypedError};
use crate::report::ErrorReporter;
use bytes::{BufMut, BytesMut};
use http::header::CONTENT_TYPE;
use http::status::InvalidStatusCode;
use http::{HeaderMap, HeaderValue, Method, Response, StatusCode, Uri};
use serde::Serialize;
use std::error::Error;
use thiserror::Error;
use tracing::{error, warn};

/// `Content-Type` of every json response.
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=utf-8";

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("invalid status code {status}: {source}")]
    InvalidStatus {
        status: u16,
        #[source]
        source: InvalidStatusCode,
    },

    #[error("failed to encode JSON payload: {source}")]
    Serialize {
        #[from]
        source: serde_json::Error,
    },
}

#[derive(Debug, Default)]
pub struct ResponseWriter {
    headers: HeaderMap,
    sent: Option<(StatusCode, HeaderMap)>,
    body: BytesMut,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header changes made after [`write_header`](Self::write_header) have no effect.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The status written so far, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.sent.as_ref().map(|(status, _)| *status)
    }

    pub fn is_header_written(&self) -> bool {
        self.sent.is_some()
    }

    /// Writes the status line, freezing the headers. Only the first call takes effect, later
    /// ones are logged and ignored, returning `false`.
    pub fn write_header(&mut self, status: StatusCode) -> bool {
        if let Some((written, _)) = &self.sent {
            warn!(%written, ignored = %status, "superfluous response status write");
            return false;
        }
        self.sent = Some((status, self.headers.clone()));
        true
    }

    /// Appends to the body, implicitly writing a `200` status first if none was written.
    pub fn write(&mut self, bytes: &[u8]) {
        if self.sent.is_none() {
            self.write_header(StatusCode::OK);
        }
        self.body.put_slice(bytes);
    }

    /// Writes `payload` as json. A `status` of `0` means `200`.
    ///
    /// The payload is encoded before anything is written, so on error the writer is unchanged.
    pub fn write_json<T>(&mut self, status: u16, payload: &T) -> Result<(), WriteError>
    where
        T: Serialize + ?Sized,
    {
        let status = match status {
            0 => StatusCode::OK,
            other => StatusCode::from_u16(other).map_err(|source| WriteError::InvalidStatus { status, source })?,
        };
        let encoded = encode(payload)?;
        self.send_json(status, &encoded);
        Ok(())
    }

    /// Renders `err` as an error payload.
    ///
    /// A [`TypedError`] found in the error or its source chain keeps its status and message,
    /// anything else becomes `500` with a generic message. The cause is only handed to `reporter`.
    pub fn write_error(&mut self, method: &Method, uri: &Uri, err: &(dyn Error + 'static), reporter: &dyn ErrorReporter) {
        let (status, encoded) = match TypedError::find(err) {
            Some(typed) => {
                reporter.classified(method, uri, typed);
                (typed.status(), encode(&ErrorPayload::classified(typed)))
            }
            None => {
                reporter.internal(method, uri, err);
                (StatusCode::INTERNAL_SERVER_ERROR, encode(&ErrorPayload::internal()))
            }
        };

        match encoded {
            Ok(encoded) => self.send_json(status, &encoded),
            Err(e) => error!(cause = %e, "failed to encode error payload"),
        }
    }

    pub fn into_response(self) -> Response<ResponseBody> {
        let (status, headers) = self.sent.unwrap_or((StatusCode::OK, self.headers));

        let mut response = Response::new(ResponseBody::from(self.body.freeze()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }

    fn send_json(&mut self, status: StatusCode, encoded: &[u8]) {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        self.write_header(status);
        self.write(encoded);
    }
}

fn encode<T: Serialize + ?Sized>(payload: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut encoded = serde_json::to_vec(payload)?;
    encoded.push(b'\n');
    Ok(encoded)
}
