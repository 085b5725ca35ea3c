//! Single-slot cancellable timer for deferred bot turns.

use tokio::task::JoinHandle;

/// Holds at most one scheduled bot turn.
///
/// Every arm gets a fresh generation. A firing task must
/// [`settle`](Self::settle) its own generation before acting; a task that was
/// canceled or superseded while already running fails that check.
#[derive(Debug, Default)]
pub(crate) struct BotTimer {
    generation: u64,
    armed: Option<(u64, JoinHandle<()>)>,
}

impl BotTimer {
    /// Reserve the generation for the next [`arm`](Self::arm).
    pub(crate) fn next_generation(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    /// Store `task`, aborting whatever was armed before.
    pub(crate) fn arm(&mut self, generation: u64, task: JoinHandle<()>) {
        self.cancel();
        self.armed = Some((generation, task));
    }

    /// Abort the armed task, if any. Returns `true` if one was armed.
    pub(crate) fn cancel(&mut self) -> bool {
        match self.armed.take() {
            Some((_, task)) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Claim the slot for a firing task. `false` means it was superseded.
    pub(crate) fn settle(&mut self, generation: u64) -> bool {
        match &self.armed {
            Some((armed, _)) if *armed == generation => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}

impl Drop for BotTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
