//! Scoped use of a connection

use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::FutureExt;

use vmshell_core::traits::Transport;
use vmshell_core::ConnectionError;

use super::Connection;

impl<T: Transport> Connection<T> {
    /// Connect, run `body`, then disconnect.
    ///
    /// The session is released on every exit path: when `body` returns an
    /// error, when it panics (the panic is resumed afterwards) and when the
    /// connect itself fails.
    ///
    /// ```ignore
    /// let status = conn
    ///     .scoped(|conn| Box::pin(async move { conn.run("uname -a").await }))
    ///     .await?;
    /// ```
    pub async fn scoped<F, R>(&mut self, body: F) -> Result<R, ConnectionError>
    where
        F: for<'c> FnOnce(&'c mut Connection<T>) -> BoxFuture<'c, Result<R, ConnectionError>>,
    {
        if let Err(e) = self.connect(self.config.connect_timeout).await {
            self.disconnect().await;
            return Err(e);
        }

        let outcome = AssertUnwindSafe(body(self)).catch_unwind().await;
        self.disconnect().await;

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
