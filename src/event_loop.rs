//! A sequential execution context for channel writes.
//!
//! An event loop is a single tokio task draining an unbounded queue of [`WriteTask`]s. Every task scheduled on the
//! same loop runs in the order it was scheduled, and never concurrently with another task of that loop, which is
//! what a channel needs to keep the bytes of one connection in order.

use std::{fmt, sync::Arc};

use tokio::sync::mpsc;
use tracing::trace;

use crate::task::WriteTask;

enum Signal {
    Run(WriteTask),
    Stop,
}

/// Error returned by [`EventLoop::execute`] when the loop has stopped.
///
/// Holds the rejected task so the caller decides what happens to it.
pub struct Rejected(pub WriteTask);

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Rejected").finish()
    }
}

/// A handle to a running event loop.
///
/// Cloning the handle is cheap; all clones schedule onto the same loop.
#[derive(Clone)]
pub struct EventLoop {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Signal>,
}

impl EventLoop {
    /// Spawns a new event loop on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    ///
    /// # Example
    ///
    /// ```
    /// use flowconn::event_loop::EventLoop;
    ///
    /// # tokio_test::block_on(async {
    /// let event_loop = EventLoop::spawn("segment-store-1");
    /// assert!(!event_loop.is_shutdown());
    /// event_loop.shutdown();
    /// # })
    /// ```
    pub fn spawn(name: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();

        #[cfg(not(tokio_unstable))]
        {
            tokio::spawn(run_event_loop(name.clone(), rx));
        }

        #[cfg(tokio_unstable)]
        {
            tokio::task::Builder::new()
                .name(&name)
                .spawn(run_event_loop(name.clone(), rx))
                .expect("failed to spawn event loop task");
        }

        EventLoop { name, tx }
    }

    /// The name the loop was spawned with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schedules a task to run on the loop.
    ///
    /// Returns as soon as the task is queued. If the loop has stopped, the task is handed back.
    pub fn execute(&self, task: WriteTask) -> Result<(), Rejected> {
        self.tx.send(Signal::Run(task)).map_err(|err| match err.0 {
            Signal::Run(task) => Rejected(task),
            Signal::Stop => unreachable!("only run signals are sent by execute"),
        })
    }

    /// Stops the loop once the tasks already queued ahead of the stop signal have run.
    ///
    /// Tasks queued after the signal are dropped, failing their write promises.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Signal::Stop);
    }

    /// Returns `true` once the loop is no longer running.
    pub fn is_shutdown(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("name", &self.name)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

async fn run_event_loop(name: Arc<str>, mut rx: mpsc::UnboundedReceiver<Signal>) {
    trace!(%name, "event loop started");

    while let Some(signal) = rx.recv().await {
        match signal {
            Signal::Run(task) => task.run(),
            Signal::Stop => break,
        }
    }

    rx.close();
    let mut dropped = 0usize;
    while let Ok(signal) = rx.try_recv() {
        if let Signal::Run(task) = signal {
            drop(task);
            dropped += 1;
        }
    }

    trace!(%name, dropped, "event loop stopped");
}
