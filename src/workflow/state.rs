use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

use super::WorkflowError;

/// Status strings stored on quotes before the workflow state column existed.
/// Several spellings are still written by older clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum QuoteStatus {
    #[strum(to_string = "draft")]
    Draft,
    #[strum(to_string = "submitted")]
    Submitted,
    #[strum(to_string = "pending_approval", serialize = "pending-approval")]
    PendingApproval,
    #[strum(to_string = "under-review", serialize = "under_review")]
    UnderReview,
    #[strum(to_string = "finance_review", serialize = "finance-review")]
    FinanceReview,
    #[strum(to_string = "approved")]
    Approved,
    #[strum(to_string = "rejected")]
    Rejected,
    #[strum(to_string = "needs_revision", serialize = "revision_requested")]
    NeedsRevision,
    #[strum(to_string = "closed", serialize = "expired", serialize = "cancelled")]
    Closed,
}

impl QuoteStatus {
    pub fn parse(raw: &str) -> Result<Self, WorkflowError> {
        QuoteStatus::from_str(raw.trim()).map_err(|_| WorkflowError::UnknownStatus(raw.to_string()))
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowState {
    Draft,
    Submitted,
    AdminReview,
    FinanceReview,
    Approved,
    Rejected,
    NeedsRevision,
    Closed,
}

impl WorkflowState {
    /// Status written alongside the state. Finance review is stored as
    /// `under-review` with the finance flag set.
    pub fn canonical_status(self) -> QuoteStatus {
        match self {
            WorkflowState::Draft => QuoteStatus::Draft,
            WorkflowState::Submitted => QuoteStatus::Submitted,
            WorkflowState::AdminReview => QuoteStatus::PendingApproval,
            WorkflowState::FinanceReview => QuoteStatus::UnderReview,
            WorkflowState::Approved => QuoteStatus::Approved,
            WorkflowState::Rejected => QuoteStatus::Rejected,
            WorkflowState::NeedsRevision => QuoteStatus::NeedsRevision,
            WorkflowState::Closed => QuoteStatus::Closed,
        }
    }

    /// Sales may edit line items and discounts only in these states
    pub fn is_editable(self) -> bool {
        matches!(self, WorkflowState::Draft | WorkflowState::NeedsRevision)
    }

    pub fn is_in_review(self) -> bool {
        matches!(
            self,
            WorkflowState::Submitted | WorkflowState::AdminReview | WorkflowState::FinanceReview
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Closed)
    }
}

/// Maps a legacy status plus the finance flag to a workflow state.
pub fn derive_workflow_state(status: QuoteStatus, requires_finance_approval: bool) -> WorkflowState {
    match status {
        QuoteStatus::Draft => WorkflowState::Draft,
        QuoteStatus::Submitted => WorkflowState::Submitted,
        QuoteStatus::PendingApproval => WorkflowState::AdminReview,
        QuoteStatus::UnderReview if requires_finance_approval => WorkflowState::FinanceReview,
        QuoteStatus::UnderReview => WorkflowState::AdminReview,
        QuoteStatus::FinanceReview => WorkflowState::FinanceReview,
        QuoteStatus::Approved => WorkflowState::Approved,
        QuoteStatus::Rejected => WorkflowState::Rejected,
        QuoteStatus::NeedsRevision => WorkflowState::NeedsRevision,
        QuoteStatus::Closed => WorkflowState::Closed,
    }
}

/// Same as [`derive_workflow_state`] for a raw stored status string.
pub fn derive_from_raw(
    status: &str,
    requires_finance_approval: bool,
) -> Result<WorkflowState, WorkflowError> {
    QuoteStatus::parse(status).map(|s| derive_workflow_state(s, requires_finance_approval))
}

/// Legacy status persisted for `state`
pub fn status_for(state: WorkflowState) -> QuoteStatus {
    state.canonical_status()
}

pub fn parse_status(raw: &str) -> Result<QuoteStatus, WorkflowError> {
    QuoteStatus::parse(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[rstest]
    #[case("draft", false, WorkflowState::Draft)]
    #[case("submitted", false, WorkflowState::Submitted)]
    #[case("pending_approval", false, WorkflowState::AdminReview)]
    #[case("pending_approval", true, WorkflowState::AdminReview)]
    #[case("under-review", false, WorkflowState::AdminReview)]
    #[case("under-review", true, WorkflowState::FinanceReview)]
    #[case("under_review", true, WorkflowState::FinanceReview)]
    #[case("finance_review", false, WorkflowState::FinanceReview)]
    #[case("approved", true, WorkflowState::Approved)]
    #[case("rejected", false, WorkflowState::Rejected)]
    #[case("revision_requested", false, WorkflowState::NeedsRevision)]
    #[case("expired", false, WorkflowState::Closed)]
    #[case("Cancelled", false, WorkflowState::Closed)]
    fn maps_legacy_status(
        #[case] status: &str,
        #[case] finance: bool,
        #[case] expected: WorkflowState,
    ) {
        assert_eq!(derive_from_raw(status, finance).unwrap(), expected);
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert_eq!(
            derive_from_raw("archived", false),
            Err(WorkflowError::UnknownStatus("archived".into()))
        );
    }

    #[test]
    fn canonical_status_derives_back_to_same_state() {
        for state in WorkflowState::iter() {
            let finance = state == WorkflowState::FinanceReview;
            assert_eq!(
                derive_workflow_state(state.canonical_status(), finance),
                state,
                "state {state} does not round-trip"
            );
        }
    }

    #[test]
    fn canonical_status_display_uses_stored_spelling() {
        assert_eq!(
            WorkflowState::FinanceReview.canonical_status().to_string(),
            "under-review"
        );
        assert_eq!(
            WorkflowState::AdminReview.canonical_status().to_string(),
            "pending_approval"
        );
    }
}
