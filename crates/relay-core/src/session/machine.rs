//! Conversation state machine.
//!
//! `transition` is a pure function from (state, input) to the next state plus
//! a list of effects. The orchestrator applies the effects; nothing here
//! touches the network, the engine, or the clock, so every row of the table
//! is testable on its own.
//!
//! | state            | input                 | next             | effects                          |
//! |------------------|-----------------------|------------------|----------------------------------|
//! | any              | `/start`              | AwaitingLocator  | release fetch, welcome           |
//! | any              | `/help`               | unchanged        | help text                        |
//! | any              | `/cancel`             | Idle             | release fetch, cancelled notice  |
//! | any              | other command         | unchanged        | unknown-command notice           |
//! | Idle             | locator               | AwaitingLocator  | release fetch, begin resolution  |
//! | Idle             | other text            | Idle             | send-a-locator prompt            |
//! | AwaitingLocator  | locator               | AwaitingLocator  | release fetch, begin resolution  |
//! | AwaitingLocator  | other text            | AwaitingLocator  | invalid-locator notice           |
//! | AwaitingLocator  | metadata resolved     | SelectingFiles   | present files                    |
//! | AwaitingLocator  | metadata failed       | AwaitingLocator  | release fetch                    |
//! | SelectingFiles   | valid selection       | Fetching         | start fetch                      |
//! | SelectingFiles   | invalid selection     | SelectingFiles   | parse error                      |
//! | Fetching         | any text              | Fetching         | busy notice                      |
//! | Fetching         | fetch ended           | Idle             | release fetch                    |
//!
//! Background inputs arriving in any other state are stale and ignored.

use std::collections::BTreeSet;

use relay_types::conversation::ConversationState;

use super::grammar::{is_locator, parse_selection};
use super::replies;

/// A recognised command name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Cancel,
    Unknown(String),
}

impl Command {
    /// Parse a command name (without the leading `/`).
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "cancel" => Command::Cancel,
            _ => Command::Unknown(name.to_string()),
        }
    }
}

/// Everything that can drive a conversation forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input<'a> {
    Command(Command),
    Text(&'a str),
    /// Background resolution finished.
    MetadataResolved,
    MetadataFailed,
    /// The transfer and delivery pipeline finished, successfully or not.
    FetchEnded,
}

/// Side effects for the orchestrator to perform, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Reply(String),
    /// Close the current fetch engine, install a fresh one, and clear the
    /// locator and file list.
    ReleaseFetch,
    BeginResolution { locator: String },
    PresentFiles,
    StartFetch { indices: BTreeSet<usize> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: ConversationState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: ConversationState, effects: Vec<Effect>) -> Self {
        Self { next, effects }
    }

    fn stay(state: ConversationState) -> Self {
        Self::to(state, Vec::new())
    }

    fn reply(state: ConversationState, text: impl Into<String>) -> Self {
        Self::to(state, vec![Effect::Reply(text.into())])
    }
}

/// Compute the next state and effects. `file_count` is the number of files
/// in the current resolution (0 when none).
pub fn transition(state: ConversationState, input: Input<'_>, file_count: usize) -> Transition {
    use ConversationState::*;

    match input {
        Input::Command(Command::Start) => Transition::to(
            AwaitingLocator,
            vec![Effect::ReleaseFetch, Effect::Reply(replies::WELCOME.into())],
        ),
        Input::Command(Command::Help) => Transition::reply(state, replies::HELP),
        Input::Command(Command::Cancel) => Transition::to(
            Idle,
            vec![Effect::ReleaseFetch, Effect::Reply(replies::CANCELLED.into())],
        ),
        Input::Command(Command::Unknown(_)) => Transition::reply(state, replies::UNKNOWN_COMMAND),

        Input::Text(text) => match state {
            Idle | AwaitingLocator if is_locator(text) => Transition::to(
                AwaitingLocator,
                vec![
                    Effect::ReleaseFetch,
                    Effect::BeginResolution {
                        locator: text.trim().to_string(),
                    },
                ],
            ),
            Idle => Transition::reply(Idle, replies::SEND_LOCATOR),
            AwaitingLocator => Transition::reply(AwaitingLocator, replies::INVALID_LOCATOR),
            SelectingFiles => match parse_selection(text, file_count) {
                Ok(indices) => Transition::to(Fetching, vec![Effect::StartFetch { indices }]),
                Err(e) => Transition::reply(SelectingFiles, e.to_string()),
            },
            Fetching => Transition::reply(Fetching, replies::BUSY),
        },

        Input::MetadataResolved if state == AwaitingLocator => {
            Transition::to(SelectingFiles, vec![Effect::PresentFiles])
        }
        Input::MetadataFailed if state == AwaitingLocator => {
            Transition::to(AwaitingLocator, vec![Effect::ReleaseFetch])
        }
        Input::FetchEnded if state == Fetching => Transition::to(Idle, vec![Effect::ReleaseFetch]),
        Input::MetadataResolved | Input::MetadataFailed | Input::FetchEnded => Transition::stay(state),
    }
}
