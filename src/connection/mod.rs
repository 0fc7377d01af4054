mod notify;

pub use notify::{Notifier, TerminalNotifier};

use async_trait::async_trait;

/// Outcome of the last login or connect attempt.
///
/// State and message can only be replaced together, so a caller never sees a
/// successful state paired with a failure description or the other way round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    state: bool,
    message: String,
}

impl ConnectionStatus {
    pub fn connected(message: impl Into<String>) -> Self {
        Self {
            state: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: false,
            message: message.into(),
        }
    }

    pub fn state(&self) -> bool {
        self.state
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::failed("Not connected.")
    }
}

/// A provider integration the front end can poll and (re)connect.
///
/// None of the operations return errors: every failure is folded into the
/// connection's [`ConnectionStatus`]. Each call may block on file I/O, a
/// network round trip or, for `connect`, an interactive browser flow, so front
/// ends should drive them away from their event loop.
#[async_trait]
pub trait Connection: Send {
    /// Display name of the provider
    fn name(&self) -> &str;

    /// Result of the last attempt, without contacting the provider
    fn status(&self) -> &ConnectionStatus;

    /// Check the stored credential without prompting the user
    async fn login(&mut self);

    /// Log in, running the provider's recovery flow when that fails
    async fn connect(&mut self);

    async fn get_state(&mut self) -> bool {
        self.login().await;
        self.status().state()
    }

    async fn get_message(&mut self) -> String {
        self.login().await;
        self.status().message().to_string()
    }
}
