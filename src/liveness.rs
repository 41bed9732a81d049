// Hook for hosts that must stay awake while a session plays

use tracing::info;

pub trait LivenessKeeper: Send {
    fn session_started(&mut self);
    fn session_stopped(&mut self);
}

/// Keeper that only logs the session boundaries.
#[derive(Debug, Default)]
pub struct LoggingKeeper;

impl LivenessKeeper for LoggingKeeper {
    fn session_started(&mut self) {
        info!("Session started, keeping host alive");
    }

    fn session_stopped(&mut self) {
        info!("Session stopped, host may sleep");
    }
}
