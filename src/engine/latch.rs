// src/engine/latch.rs

//! A countdown latch on top of `tokio::sync::watch`.
//!
//! Every running build holds one [`Countdown`] and consumes it when it is
//! done. The waiting side holds the [`Completion`]. If every countdown is
//! dropped before the count reaches zero, waiting fails instead of hanging.

use std::sync::Arc;

use tokio::sync::watch;

use crate::errors::{CompositeError, Result};

pub fn countdown(count: usize) -> (Countdown, Completion) {
    let (tx, rx) = watch::channel(count);
    (Countdown { tx: Arc::new(tx) }, Completion { rx })
}

#[derive(Clone)]
pub struct Countdown {
    tx: Arc<watch::Sender<usize>>,
}

impl Countdown {
    pub fn count_down(self) {
        self.tx.send_modify(|remaining| *remaining = remaining.saturating_sub(1));
    }
}

pub struct Completion {
    rx: watch::Receiver<usize>,
}

impl Completion {
    pub fn remaining(&self) -> usize {
        *self.rx.borrow()
    }

    /// Wait for the count to reach zero.
    ///
    /// Cancel safe: dropping the future and calling again resumes waiting.
    pub async fn wait(&mut self) -> Result<()> {
        if self.rx.wait_for(|remaining| *remaining == 0).await.is_ok() {
            return Ok(());
        }
        Err(CompositeError::InterruptedWait(format!(
            "{} build(s) stopped without reporting completion",
            self.remaining()
        )))
    }
}
