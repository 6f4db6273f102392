use crate::Result;

/// Platform hook that keeps the display awake while a metronome is audible.
pub trait WakeLock: Send {
    fn acquire(&mut self) -> Result<()>;
    fn release(&mut self) -> Result<()>;
}

/// Wake lock for hosts without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWakeLock;

impl WakeLock for NoWakeLock {
    fn acquire(&mut self) -> Result<()> {
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Best-effort holder: failures are logged, never surfaced.
pub(crate) struct WakeGuard {
    lock: Box<dyn WakeLock>,
    held: bool,
}

impl WakeGuard {
    pub(crate) fn new(lock: Box<dyn WakeLock>) -> Self {
        Self { lock, held: false }
    }

    pub(crate) fn request(&mut self) {
        match self.lock.acquire() {
            Ok(()) => self.held = true,
            Err(err) => tracing::warn!(%err, "wake lock request failed"),
        }
    }

    pub(crate) fn release(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        if let Err(err) = self.lock.release() {
            tracing::warn!(%err, "wake lock release failed");
        }
    }

    /// Marks the lock as gone without calling `release`; the host already
    /// dropped it.
    pub(crate) fn forget(&mut self) {
        self.held = false;
    }

    pub(crate) fn is_held(&self) -> bool {
        self.held
    }
}
