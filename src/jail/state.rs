//! Jail state machine
//!
//! Legal transitions are declared with the state-machines crate; the
//! serializable [`State`] enum is what jail records carry between runs.

use serde::{Deserialize, Serialize};
use state_machines::state_machine;
use std::fmt;

state_machine! {
    name: JailMachine,
    dynamic: true,
    initial: Created,
    states: [Created, Running, Stopped],
    events {
        start {
            transition: { from: [Created, Stopped], to: Running }
        }
        stop {
            transition: { from: Running, to: Stopped }
        }
    }
}

/// Lifecycle state of a jail record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Created,
    Running,
    Stopped,
}

impl State {
    /// Parse state from the machine's string representation
    fn from_machine(s: &str) -> Option<Self> {
        match s {
            "Created" => Some(State::Created),
            "Running" => Some(State::Running),
            "Stopped" => Some(State::Stopped),
            _ => None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Created => "Created",
            State::Running => "Running",
            State::Stopped => "Stopped",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start,
    Stop,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Start => write!(f, "start"),
            Event::Stop => write!(f, "stop"),
        }
    }
}

/// Machine positioned at `state`, reached by replaying events from `Created`
fn machine_at(state: State) -> DynamicJailMachine<()> {
    let mut machine = JailMachine::new(()).into_dynamic();
    // Replayed sequences are always legal
    match state {
        State::Created => {}
        State::Running => {
            let _ = machine.handle(JailMachineEvent::Start);
        }
        State::Stopped => {
            let _ = machine.handle(JailMachineEvent::Start);
            let _ = machine.handle(JailMachineEvent::Stop);
        }
    }
    machine
}

/// State reached by applying `event` to `state`, or `None` if illegal
pub fn next(state: State, event: Event) -> Option<State> {
    let mut machine = machine_at(state);
    let event = match event {
        Event::Start => JailMachineEvent::Start,
        Event::Stop => JailMachineEvent::Stop,
    };
    machine.handle(event).ok()?;
    State::from_machine(machine.current_state())
}
