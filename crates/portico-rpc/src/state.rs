// crates/portico-rpc/src/state.rs
//
// Listener lifecycle state machine, shared by the RPC server and the gateway.
//
// Valid transitions:
//   Created -> Configured -> Listening -> Draining -> Stopped
//   Created | Configured -> Stopped   (stop before start)

use std::fmt;

use thiserror::Error;

/// Lifecycle states of a listener-owning component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    /// Constructed; nothing attached yet.
    Created,
    /// Handlers and interceptors attached; no socket bound.
    Configured,
    /// Socket bound and accept loop running.
    Listening,
    /// No new work accepted; in-flight work finishing.
    Draining,
    /// Listener released. Terminal.
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerState::Created => write!(f, "Created"),
            ServerState::Configured => write!(f, "Configured"),
            ServerState::Listening => write!(f, "Listening"),
            ServerState::Draining => write!(f, "Draining"),
            ServerState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// A rejected state transition.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Invalid {component} state transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub component: &'static str,
    pub from: ServerState,
    pub to: ServerState,
}

/// State machine guarding a component's lifecycle transitions.
#[derive(Debug, Clone)]
pub struct ServerStateMachine {
    component: &'static str,
    current: ServerState,
}

impl ServerStateMachine {
    /// Create a state machine in the Created state. `component` labels log
    /// lines and errors ("rpc", "gateway").
    pub fn new(component: &'static str) -> Self {
        Self {
            component,
            current: ServerState::Created,
        }
    }

    pub fn current(&self) -> ServerState {
        self.current
    }

    /// Whether moving to `to` would be accepted, without moving.
    pub fn check(&self, to: ServerState) -> Result<(), InvalidTransition> {
        let valid = matches!(
            (self.current, to),
            (ServerState::Created, ServerState::Configured)
                | (ServerState::Configured, ServerState::Listening)
                | (ServerState::Listening, ServerState::Draining)
                | (ServerState::Draining, ServerState::Stopped)
                | (ServerState::Created, ServerState::Stopped)
                | (ServerState::Configured, ServerState::Stopped)
        );
        if valid {
            Ok(())
        } else {
            Err(InvalidTransition {
                component: self.component,
                from: self.current,
                to,
            })
        }
    }

    /// Attempt to transition to a new state.
    pub fn transition(&mut self, to: ServerState) -> Result<(), InvalidTransition> {
        self.check(to)?;
        tracing::debug!(
            "{} state transition: {} -> {}",
            self.component,
            self.current,
            to
        );
        self.current = to;
        Ok(())
    }
}
