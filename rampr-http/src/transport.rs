use std::future::Future;
use std::pin::Pin;

use crate::{HttpRequest, HttpResponse, Result};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The request-issuing capability handed to virtual users.
///
/// Implementations must be safe to call from many VUs at once and report per-call latency
/// in [`HttpResponse::latency`].
pub trait Transport: Send + Sync + 'static {
    fn issue(&self, req: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>>;
}
