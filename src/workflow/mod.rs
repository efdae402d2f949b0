//! Quote lifecycle: legacy status mapping, the transition table and the
//! margin-based approval gate.

use thiserror::Error;

use crate::auth::Role;

pub mod approval;
pub mod state;
pub mod transitions;

pub use approval::{
    admin_decision, can_approve_without_finance, check_finance_approval_required,
    finance_decision, margin_percent, Decision, DecisionInput, DecisionOutcome, MarginPolicy,
    QuoteFinancials, QuoteSnapshot,
};
pub use state::{
    derive_from_raw, derive_workflow_state, parse_status, status_for, QuoteStatus, WorkflowState,
};
pub use transitions::{allowed_actions, authorize, next_state, QuoteAction};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("unknown quote status '{0}'")]
    UnknownStatus(String),

    #[error("cannot {action} a quote in state {from}")]
    InvalidTransition {
        from: WorkflowState,
        action: QuoteAction,
    },

    #[error("role {role} may not {action} a quote in state {state}")]
    NotAuthorized {
        role: Role,
        action: QuoteAction,
        state: WorkflowState,
    },

    #[error("invalid discount: {0}")]
    InvalidDiscount(String),

    #[error("notes are required to {0} a quote")]
    MissingNotes(&'static str),
}
