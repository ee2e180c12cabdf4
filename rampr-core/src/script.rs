use std::future::Future;

use rampr_http::BoxFuture;

use crate::session::Session;

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error(transparent)]
    Http(#[from] rampr_http::Error),

    #[error("{0}")]
    Message(String),
}

impl ScriptError {
    pub fn msg(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

/// The user-supplied body of one VU iteration.
///
/// The returned future is spawned onto its own task, so it must own everything it uses.
pub trait Script: Send + Sync + 'static {
    fn iteration(&self, session: Session) -> BoxFuture<'static, Result<(), ScriptError>>;
}

/// A [`Script`] backed by a closure; see [`script_fn`].
pub struct FnScript<F>(F);

/// Adapts `Fn(Session) -> impl Future<Output = Result<(), ScriptError>>` into a [`Script`].
pub fn script_fn<F, Fut>(f: F) -> FnScript<F>
where
    F: Fn(Session) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ScriptError>> + Send + 'static,
{
    FnScript(f)
}

impl<F, Fut> Script for FnScript<F>
where
    F: Fn(Session) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ScriptError>> + Send + 'static,
{
    fn iteration(&self, session: Session) -> BoxFuture<'static, Result<(), ScriptError>> {
        Box::pin((self.0)(session))
    }
}
