//! Sweeper state types.
//!
//! # State Transitions
//!
//! ```text
//!                 start()
//! Created ─────────────────→ Running
//!    │                          │
//!    │ shutdown()               │ shutdown()
//!    ↓                          ↓
//! Stopped ←──────────────── ShuttingDown
//!
//! Created ──(invalid config)──→ Failed
//! ```
//!
//! - **Created**: After `UpdateSweeper::new()`. `run_once()` is allowed here.
//! - **Running**: The sweep loop task is alive.
//! - **ShuttingDown**: Shutdown signalled; the in-flight entry of each location
//!   finishes, then the loop exits.
//! - **Stopped**: Loop joined, queue connections closed.
//! - **Failed**: `start()` rejected the config; the loop never ran.

/// State of the update sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweeperState {
    Created,
    Running,
    ShuttingDown,
    Stopped,
    Failed,
}

impl SweeperState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweeperState::Created => "Created",
            SweeperState::Running => "Running",
            SweeperState::ShuttingDown => "ShuttingDown",
            SweeperState::Stopped => "Stopped",
            SweeperState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SweeperState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single location pass ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationOutcome {
    /// Every key in the namespace was visited.
    Completed,
    /// Shutdown was observed between entries.
    Interrupted,
}
