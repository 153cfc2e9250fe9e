//! Unlock state machine
//!
//! ```text
//! Locked --begin_unlock--> Unlocking --confirmed--> Unlocked
//!    ^                         |
//!    +--- rejected / timeout / cancelled
//! ```
//!
//! Secure operations check [`UnlockGate::require_unlocked`] before building
//! any frame, so a locked handle never touches the transport for them.

use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use vial_transport::command::{HidResponse, QueryUnlockStatus, UnlockStatusResponse};
use vial_transport::protocol::{cmd, unlock_state};
use vial_transport::Dispatcher;

use crate::error::KeyboardError;

/// Host-side view of the firmware security state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockState {
    Locked,
    Unlocking,
    Unlocked,
}

/// Shared unlock state for one device handle
#[derive(Debug)]
pub struct UnlockGate {
    state: Mutex<UnlockState>,
}

impl Default for UnlockGate {
    fn default() -> Self {
        Self::new()
    }
}

impl UnlockGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(UnlockState::Locked),
        }
    }

    pub fn state(&self) -> UnlockState {
        *self.state.lock()
    }

    pub fn is_unlocked(&self) -> bool {
        self.state() == UnlockState::Unlocked
    }

    /// Fail with `NotUnlocked` unless the handle is unlocked
    pub fn require_unlocked(&self) -> Result<(), KeyboardError> {
        if self.is_unlocked() {
            Ok(())
        } else {
            Err(KeyboardError::NotUnlocked)
        }
    }

    /// Move to `Unlocking`; `Ok(false)` means already unlocked
    fn try_begin(&self) -> Result<bool, KeyboardError> {
        let mut state = self.state.lock();
        match *state {
            UnlockState::Unlocked => Ok(false),
            UnlockState::Unlocking => Err(KeyboardError::UnlockInProgress),
            UnlockState::Locked => {
                *state = UnlockState::Unlocking;
                Ok(true)
            }
        }
    }

    fn set(&self, new: UnlockState) {
        let mut state = self.state.lock();
        if *state != new {
            debug!("Unlock state {:?} -> {:?}", *state, new);
            *state = new;
        }
    }
}

/// Reverts an unfinished unlock to `Locked` when dropped
struct UnlockAttempt<'a> {
    gate: &'a UnlockGate,
    finished: bool,
}

impl UnlockAttempt<'_> {
    fn succeed(mut self) {
        self.gate.set(UnlockState::Unlocked);
        self.finished = true;
    }
}

impl Drop for UnlockAttempt<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.gate.set(UnlockState::Locked);
        }
    }
}

/// Run the unlock challenge to completion
///
/// Sends `UNLOCK_BEGIN`, then polls `UNLOCK_STATUS` every `poll_interval`
/// until the keyboard confirms, rejects, or `window` elapses. Dropping the
/// returned future cancels the attempt and returns the gate to `Locked`.
pub(crate) async fn run_unlock(
    dispatcher: &Dispatcher,
    gate: &UnlockGate,
    poll_interval: Duration,
    window: Duration,
) -> Result<(), KeyboardError> {
    if !gate.try_begin()? {
        debug!("Already unlocked");
        return Ok(());
    }
    let attempt = UnlockAttempt {
        gate,
        finished: false,
    };

    dispatcher.query(cmd::UNLOCK_BEGIN, &[]).await?;
    info!("Unlock started; hold the unlock keys on the keyboard");

    let deadline = Instant::now() + window;
    loop {
        let now = Instant::now();
        if now >= deadline {
            warn!("Unlock not confirmed within {:?}", window);
            return Err(KeyboardError::UnlockTimeout(window.as_millis() as u64));
        }
        tokio::time::sleep(poll_interval.min(deadline - now)).await;

        let resp = dispatcher.send(&QueryUnlockStatus::default()).await?;
        let status = UnlockStatusResponse::parse(&resp)?;
        match status.state {
            unlock_state::CONFIRMED => {
                attempt.succeed();
                info!("Keyboard unlocked");
                return Ok(());
            }
            unlock_state::PENDING => {
                debug!("Unlock pending, progress {}", status.progress);
            }
            unlock_state::REJECTED | unlock_state::LOCKED => {
                warn!("Unlock rejected by keyboard");
                return Err(KeyboardError::UnlockRejected);
            }
            other => {
                return Err(KeyboardError::UnexpectedResponse(format!(
                    "unlock state {other}"
                )));
            }
        }
    }
}

/// Send `LOCK` and return the gate to `Locked`
pub(crate) async fn run_lock(dispatcher: &Dispatcher, gate: &UnlockGate) -> Result<(), KeyboardError> {
    if gate.state() == UnlockState::Unlocking {
        return Err(KeyboardError::UnlockInProgress);
    }
    let result = dispatcher.query(cmd::LOCK, &[]).await;
    // A lock the firmware may not have applied still locks the host side
    gate.set(UnlockState::Locked);
    result?;
    info!("Keyboard locked");
    Ok(())
}
