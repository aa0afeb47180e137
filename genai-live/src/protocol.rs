//! Session state machine, independent of the transport.
//!
//! `Unconnected -> AwaitingSetupAck -> Active -> Closed`. The socket layer
//! feeds every outgoing and incoming envelope through [`Protocol`] before it
//! is transmitted or handed to the caller.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::{LiveError, Result};
use crate::messages::{ClientMessage, ServerMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    AwaitingSetupAck,
    Active,
    Closed,
}

#[derive(Debug)]
pub struct Protocol {
    state: SessionState,
    /// Tool call ids issued by the server and not yet answered or cancelled.
    pending_calls: HashSet<String>,
}

impl Default for Protocol {
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol {
    pub fn new() -> Self {
        Self { state: SessionState::Unconnected, pending_calls: HashSet::new() }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_pending(&self, call_id: &str) -> bool {
        self.pending_calls.contains(call_id)
    }

    pub fn pending_calls(&self) -> usize {
        self.pending_calls.len()
    }

    /// Validates an outgoing message and advances the state.
    pub fn on_send(&mut self, message: &ClientMessage) -> Result<()> {
        match (self.state, message) {
            (SessionState::Unconnected, ClientMessage::Setup { .. }) => {
                self.state = SessionState::AwaitingSetupAck;
                Ok(())
            }
            (SessionState::Unconnected, other) => {
                Err(LiveError::protocol(format!("the first message must be setup, not {}", other.kind())))
            }
            (SessionState::Active, ClientMessage::Setup { .. }) => {
                Err(LiveError::protocol("setup may only be sent once per session"))
            }
            (SessionState::Active, ClientMessage::ToolResponse { function_responses }) => {
                for response in function_responses {
                    let Some(id) = &response.id else {
                        continue;
                    };
                    if !self.pending_calls.remove(id) {
                        debug!(id = %id, "responding to a tool call that is not pending");
                    }
                }
                Ok(())
            }
            (SessionState::Active, _) => Ok(()),
            (state, _) => Err(LiveError::NotActive(state)),
        }
    }

    /// Validates an incoming message and advances the state. A violation
    /// closes the session.
    pub fn on_receive(&mut self, message: &ServerMessage) -> Result<()> {
        match (self.state, message) {
            (SessionState::AwaitingSetupAck, ServerMessage::SetupComplete) => {
                self.state = SessionState::Active;
                Ok(())
            }
            (SessionState::AwaitingSetupAck, other) => {
                self.state = SessionState::Closed;
                Err(LiveError::protocol(format!("received {} before setupComplete", other.kind())))
            }
            (SessionState::Active, ServerMessage::SetupComplete) => {
                warn!("ignoring duplicate setupComplete");
                Ok(())
            }
            (SessionState::Active, ServerMessage::ToolCall(call)) => {
                self.pending_calls.extend(call.function_calls.iter().filter_map(|call| call.id.clone()));
                Ok(())
            }
            (SessionState::Active, ServerMessage::ToolCallCancellation { ids }) => {
                for id in ids {
                    if !self.pending_calls.remove(id) {
                        debug!(id = %id, "cancellation for an unknown tool call");
                    }
                }
                Ok(())
            }
            (SessionState::Active, _) => Ok(()),
            (SessionState::Unconnected, other) => {
                self.state = SessionState::Closed;
                Err(LiveError::protocol(format!("received {} before setup was sent", other.kind())))
            }
            (SessionState::Closed, _) => Err(LiveError::NotActive(SessionState::Closed)),
        }
    }

    /// Records the end of the connection. Closing before the setup
    /// acknowledgment is an error; any later closure is a normal end.
    pub fn on_close(&mut self) -> Result<()> {
        let previous = std::mem::replace(&mut self.state, SessionState::Closed);
        self.pending_calls.clear();
        match previous {
            SessionState::Active | SessionState::Closed => Ok(()),
            SessionState::Unconnected | SessionState::AwaitingSetupAck => Err(LiveError::ClosedBeforeSetup),
        }
    }
}
