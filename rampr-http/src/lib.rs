#![forbid(unsafe_code)]

mod client;
mod error;
mod transport;
mod types;

pub use client::HttpClient;
pub use error::{Error, Result, TransportErrorKind};
pub use transport::{BoxFuture, Transport};
pub use types::{HttpRequest, HttpResponse};
pub use http::Method;
