//! Self-rescheduling background tasks.
//!
//! A [`RepeatingTask`] sleeps for its period, runs its body on the blocking
//! pool and only then re-arms, so a slow body delays the next firing instead
//! of overlapping with it. The period is re-read before every sleep.
//!
//! Failures never end the loop: errors and panics from the body are logged
//! and the task re-arms. Cancelling suppresses the next firing; a body that
//! is already running completes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct RepeatingTask {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl RepeatingTask {
    /// Spawn on the current tokio runtime. A zero period ends the task.
    pub fn spawn<P, F>(name: &'static str, period: P, body: F) -> Self
    where
        P: Fn() -> Duration + Send + 'static,
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        let (shutdown, mut rx) = watch::channel(false);
        let body = Arc::new(body);

        let handle = tokio::spawn(async move {
            loop {
                if *rx.borrow() {
                    break;
                }
                let delay = period();
                if delay.is_zero() {
                    debug!(task = name, "period is zero; task disabled");
                    break;
                }
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    _ = rx.changed() => break,
                }
                if *rx.borrow() {
                    break;
                }

                let body = Arc::clone(&body);
                match tokio::task::spawn_blocking(move || body()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!(task = name, error = %err, "task body failed"),
                    Err(join) if join.is_panic() => error!(task = name, "task body panicked"),
                    Err(join) => {
                        debug!(task = name, error = %join, "task body cancelled");
                        break;
                    }
                }
            }
            debug!(task = name, "task stopped");
        });

        Self {
            name,
            shutdown,
            handle: Some(handle),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Suppress every future firing.
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancel and wait for a running body to complete.
    pub async fn join(mut self) -> Result<()> {
        self.cancel();
        match self.handle.take() {
            Some(handle) => handle
                .await
                .map_err(|err| Error::Runtime(format!("task {} failed to join: {err}", self.name))),
            None => Ok(()),
        }
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
