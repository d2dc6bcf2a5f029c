//! Multi-step guided flows.
//!
//! A flow owns the conversation while it is active: every message is treated
//! as an answer to the current step instead of being classified. Progress is
//! persisted in the session as a [`FlowState`] whose `step` is the index of
//! the step awaiting an answer.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::FlowState;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z0-9._%+\-]+@[a-z0-9\-]+(?:\.[a-z0-9\-]+)*\.[a-z]{2,}$")
        .expect("Invalid email regex")
});

const MIN_PASSWORD_LEN: usize = 12;
const CANCEL_WORDS: &[&str] = &["cancel", "stop"];
const YES_WORDS: &[&str] = &["yes", "y", "confirm"];
const NO_WORDS: &[&str] = &["no", "n"];

// =============================================================================
// FlowKind
// =============================================================================

/// Flows the engine knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    AccountRegistration,
}

impl FlowKind {
    pub const ALL: [FlowKind; 1] = [FlowKind::AccountRegistration];

    /// Name used as the session context while the flow is active.
    pub fn name(&self) -> &'static str {
        match self {
            FlowKind::AccountRegistration => "account_registration",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn initial_state(&self) -> FlowState {
        FlowState::new()
    }

    /// Prompt for the step recorded in `state`. For the terminal step this is
    /// the closing confirmation.
    pub fn prompt(&self, state: &FlowState) -> String {
        match self {
            FlowKind::AccountRegistration => RegistrationStep::from_state(state).prompt(state),
        }
    }

    /// Whether `state` sits on the flow's terminal step.
    pub fn is_complete(&self, state: &FlowState) -> bool {
        match self {
            FlowKind::AccountRegistration => {
                RegistrationStep::from_state(state) == RegistrationStep::Complete
            }
        }
    }

    /// Apply one answer to the current step.
    pub fn advance(&self, state: &FlowState, answer: &str) -> FlowTransition {
        let answer = answer.trim();
        if CANCEL_WORDS.contains(&answer.to_lowercase().as_str()) {
            return FlowTransition::Cancel;
        }
        match self {
            FlowKind::AccountRegistration => RegistrationStep::from_state(state).advance(answer),
        }
    }

    pub fn cancellation_message(&self) -> &'static str {
        match self {
            FlowKind::AccountRegistration => {
                "No problem, I've cancelled the account registration. \
                 Let me know if there's anything else I can help with."
            }
        }
    }
}

/// Result of feeding an answer to a flow.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowTransition {
    /// Answer accepted. Merge the update (which carries the next `step`).
    Advance(FlowState),
    /// Answer rejected; stay on the current step.
    Reject(String),
    /// Start over from the first step with a clean state.
    Restart,
    /// Abandon the flow.
    Cancel,
}

// =============================================================================
// Account registration
// =============================================================================

/// Steps of the account registration flow, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStep {
    Email,
    Password,
    FullName,
    Confirm,
    Complete,
}

impl RegistrationStep {
    pub fn index(&self) -> u64 {
        match self {
            RegistrationStep::Email => 0,
            RegistrationStep::Password => 1,
            RegistrationStep::FullName => 2,
            RegistrationStep::Confirm => 3,
            RegistrationStep::Complete => 4,
        }
    }

    /// Step for an index; anything past the last step is `Complete`.
    pub fn from_index(index: u64) -> Self {
        match index {
            0 => RegistrationStep::Email,
            1 => RegistrationStep::Password,
            2 => RegistrationStep::FullName,
            3 => RegistrationStep::Confirm,
            _ => RegistrationStep::Complete,
        }
    }

    fn from_state(state: &FlowState) -> Self {
        Self::from_index(state.step())
    }

    fn next(&self) -> Self {
        Self::from_index(self.index() + 1)
    }

    pub fn prompt(&self, state: &FlowState) -> String {
        match self {
            RegistrationStep::Email => {
                "Let's create your account. First, what email address would you like to use?"
                    .to_string()
            }
            RegistrationStep::Password => format!(
                "Great! Now choose a password. It must be at least {MIN_PASSWORD_LEN} \
                 characters long and include letters, numbers, and special characters."
            ),
            RegistrationStep::FullName => {
                "Thanks. What is your full name, as it appears on your ID?".to_string()
            }
            RegistrationStep::Confirm => format!(
                "Please confirm: create an account for {} with email {}? (yes/no)",
                state.get_str("full_name").unwrap_or("you"),
                state.get_str("email").unwrap_or("the address you gave"),
            ),
            RegistrationStep::Complete => format!(
                "Your account has been created, {}! We've sent a verification link to {}. \
                 Once you've verified your email, complete identity verification to unlock \
                 higher limits, and enable 2FA to keep your account secure.",
                state.get_str("full_name").unwrap_or("welcome aboard"),
                state.get_str("email").unwrap_or("your email"),
            ),
        }
    }

    /// Explicit transition table for one answer.
    pub fn advance(&self, answer: &str) -> FlowTransition {
        let next = FlowState::at_step(self.next().index());
        match self {
            RegistrationStep::Email => match validate_email(answer) {
                Ok(email) => FlowTransition::Advance(next.with("email", email)),
                Err(reason) => FlowTransition::Reject(reason),
            },
            // Only the fact that a password was accepted is recorded.
            RegistrationStep::Password => match validate_password(answer) {
                Ok(()) => FlowTransition::Advance(next.with("password_set", true)),
                Err(reason) => FlowTransition::Reject(reason),
            },
            RegistrationStep::FullName => match validate_full_name(answer) {
                Ok(name) => FlowTransition::Advance(next.with("full_name", name)),
                Err(reason) => FlowTransition::Reject(reason),
            },
            RegistrationStep::Confirm => {
                let lowered = answer.to_lowercase();
                if YES_WORDS.contains(&lowered.as_str()) {
                    FlowTransition::Advance(next)
                } else if NO_WORDS.contains(&lowered.as_str()) {
                    FlowTransition::Restart
                } else {
                    FlowTransition::Reject("Please answer yes or no.".to_string())
                }
            }
            RegistrationStep::Complete => FlowTransition::Advance(FlowState::at_step(self.index())),
        }
    }
}

// ---- validation ----

fn validate_email(answer: &str) -> Result<String, String> {
    if EMAIL_RE.is_match(answer) {
        Ok(answer.to_lowercase())
    } else {
        Err("That doesn't look like a valid email address.".to_string())
    }
}

fn validate_password(answer: &str) -> Result<(), String> {
    if answer.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Your password must be at least {MIN_PASSWORD_LEN} characters long."
        ));
    }
    if !answer.chars().any(char::is_alphabetic) {
        return Err("Your password must include at least one letter.".to_string());
    }
    if !answer.chars().any(|c| c.is_ascii_digit()) {
        return Err("Your password must include at least one number.".to_string());
    }
    if !answer
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
    {
        return Err("Your password must include at least one special character.".to_string());
    }
    Ok(())
}

fn validate_full_name(answer: &str) -> Result<String, String> {
    let name = answer.split_whitespace().collect::<Vec<_>>().join(" ");
    let allowed = name
        .chars()
        .all(|c| c.is_alphabetic() || c == ' ' || c == '\'' || c == '-');
    if name.chars().count() < 2 || !allowed || !name.chars().any(char::is_alphabetic) {
        return Err("Please enter your full name using letters only.".to_string());
    }
    Ok(name)
}
