//! User confirmation capability consulted by the period-end gate.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Asks the user a yes/no question and blocks until they answer.
///
/// Called synchronously from [`MatchSession::can_add_events`](crate::MatchSession::can_add_events),
/// once per gated action. Implementations must not cache answers.
pub trait ConfirmPrompt: Send + Sync + 'static {
    fn confirm(&self, message: &str) -> bool;
}

/// Confirms everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

impl ConfirmPrompt for AlwaysConfirm {
    fn confirm(&self, _message: &str) -> bool {
        true
    }
}

/// Declines everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverConfirm;

impl ConfirmPrompt for NeverConfirm {
    fn confirm(&self, _message: &str) -> bool {
        false
    }
}

/// Replays scripted answers in order and records every prompt it was shown.
///
/// Once the script runs out it answers `fallback`.
#[derive(Debug, Default)]
pub struct ScriptedConfirm {
    answers: Mutex<VecDeque<bool>>,
    prompts: Mutex<Vec<String>>,
    fallback: bool,
}

impl ScriptedConfirm {
    pub fn new(answers: impl IntoIterator<Item = bool>, fallback: bool) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
            fallback,
        }
    }

    /// Prompts shown so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ConfirmPrompt for ScriptedConfirm {
    fn confirm(&self, message: &str) -> bool {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(self.fallback)
    }
}
