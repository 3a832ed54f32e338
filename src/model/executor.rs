//! Queue of work that must run on the primary thread.
//!
//! Workers send publish tasks through a channel; the primary thread drains
//! them with [`PrimaryExecutor::run_pending`] once per tick, or blocks in
//! [`PrimaryExecutor::run_until`].

use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use super::host::HostContext;
use crate::core::{Error, Result};

/// Upper bound on a single wait inside `run_until`, so the predicate is
/// rechecked even when nothing is published.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

pub(crate) type PrimaryTask = Box<dyn FnOnce(&mut dyn HostContext) + Send + 'static>;

pub(crate) fn primary_channel() -> (Sender<PrimaryTask>, PrimaryExecutor) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    (
        sender,
        PrimaryExecutor {
            receiver,
            owner: thread::current().id(),
        },
    )
}

/// Runs queued publish tasks on the thread it is bound to.
pub struct PrimaryExecutor {
    receiver: Receiver<PrimaryTask>,
    owner: ThreadId,
}

impl PrimaryExecutor {
    /// Make the calling thread the primary thread.
    pub fn bind_to_current_thread(&mut self) {
        self.owner = thread::current().id();
    }

    pub fn is_primary_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn check_thread(&self) -> Result<()> {
        if self.is_primary_thread() {
            Ok(())
        } else {
            Err(Error::WrongThread)
        }
    }

    /// Tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Run every task queued so far. Returns how many ran.
    pub fn run_pending(&self, host: &mut dyn HostContext) -> Result<usize> {
        self.check_thread()?;
        let mut ran = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(task) => {
                    task(&mut *host);
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        Ok(ran)
    }

    /// Run tasks as they arrive until `done` returns true or `timeout`
    /// elapses. Returns the final value of `done`.
    pub fn run_until(
        &self,
        host: &mut dyn HostContext,
        timeout: Duration,
        mut done: impl FnMut() -> bool,
    ) -> Result<bool> {
        self.check_thread()?;
        let deadline = Instant::now() + timeout;
        loop {
            self.run_pending(&mut *host)?;
            if done() {
                return Ok(true);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            match self.receiver.recv_timeout(remaining.min(POLL_INTERVAL)) {
                Ok(task) => task(&mut *host),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(done()),
            }
        }
    }
}
