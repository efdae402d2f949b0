use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};
use utoipa::ToSchema;

use super::{WorkflowError, WorkflowState};
use crate::auth::Role;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumIter, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuoteAction {
    Submit,
    StartReview,
    Approve,
    Reject,
    RequestRevision,
    Close,
}

/// Fixed transition table. `requires_finance` only matters for approvals
/// taken before finance has signed off.
pub fn next_state(
    current: WorkflowState,
    action: QuoteAction,
    requires_finance: bool,
) -> Result<WorkflowState, WorkflowError> {
    use QuoteAction::*;
    use WorkflowState::*;

    let next = match (current, action) {
        (Draft | NeedsRevision, Submit) => Submitted,
        (Submitted, StartReview) => AdminReview,
        (Submitted | AdminReview, Approve) if requires_finance => FinanceReview,
        (Submitted | AdminReview, Approve) => Approved,
        (FinanceReview, Approve) => Approved,
        (Submitted | AdminReview | FinanceReview, Reject) => Rejected,
        (Submitted | AdminReview | FinanceReview, RequestRevision) => NeedsRevision,
        (Approved | Rejected, Close) => Closed,
        (from, action) => return Err(WorkflowError::InvalidTransition { from, action }),
    };
    Ok(next)
}

/// Role gate for an action in a given state. Ownership of the quote is
/// checked by the caller.
pub fn authorize(role: Role, state: WorkflowState, action: QuoteAction) -> Result<(), WorkflowError> {
    let allowed = match action {
        QuoteAction::Submit => matches!(role, Role::Sales | Role::Admin),
        QuoteAction::StartReview => role == Role::Admin,
        QuoteAction::Approve | QuoteAction::Reject | QuoteAction::RequestRevision => {
            if state == WorkflowState::FinanceReview {
                role == Role::Finance
            } else {
                matches!(role, Role::Admin | Role::Finance)
            }
        }
        QuoteAction::Close => matches!(role, Role::Sales | Role::Admin),
    };

    if allowed {
        Ok(())
    } else {
        Err(WorkflowError::NotAuthorized {
            role,
            action,
            state,
        })
    }
}

/// Actions the role could take right now, used to drive review queues.
pub fn allowed_actions(state: WorkflowState, role: Role, requires_finance: bool) -> Vec<QuoteAction> {
    QuoteAction::iter()
        .filter(|action| next_state(state, *action, requires_finance).is_ok())
        .filter(|action| authorize(role, state, *action).is_ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case(WorkflowState::Draft, QuoteAction::Submit, false, WorkflowState::Submitted)]
    #[case(WorkflowState::NeedsRevision, QuoteAction::Submit, true, WorkflowState::Submitted)]
    #[case(WorkflowState::Submitted, QuoteAction::StartReview, false, WorkflowState::AdminReview)]
    #[case(WorkflowState::AdminReview, QuoteAction::Approve, false, WorkflowState::Approved)]
    #[case(WorkflowState::AdminReview, QuoteAction::Approve, true, WorkflowState::FinanceReview)]
    #[case(WorkflowState::Submitted, QuoteAction::Approve, true, WorkflowState::FinanceReview)]
    #[case(WorkflowState::FinanceReview, QuoteAction::Approve, true, WorkflowState::Approved)]
    #[case(WorkflowState::FinanceReview, QuoteAction::Reject, true, WorkflowState::Rejected)]
    #[case(WorkflowState::AdminReview, QuoteAction::RequestRevision, false, WorkflowState::NeedsRevision)]
    #[case(WorkflowState::Approved, QuoteAction::Close, false, WorkflowState::Closed)]
    #[case(WorkflowState::Rejected, QuoteAction::Close, false, WorkflowState::Closed)]
    fn valid_transitions(
        #[case] from: WorkflowState,
        #[case] action: QuoteAction,
        #[case] finance: bool,
        #[case] to: WorkflowState,
    ) {
        assert_eq!(next_state(from, action, finance).unwrap(), to);
    }

    #[rstest]
    #[case(WorkflowState::Draft, QuoteAction::Approve)]
    #[case(WorkflowState::Approved, QuoteAction::Submit)]
    #[case(WorkflowState::Closed, QuoteAction::Close)]
    #[case(WorkflowState::AdminReview, QuoteAction::StartReview)]
    #[case(WorkflowState::Draft, QuoteAction::Close)]
    fn invalid_transitions(#[case] from: WorkflowState, #[case] action: QuoteAction) {
        assert_matches!(
            next_state(from, action, false),
            Err(WorkflowError::InvalidTransition { .. })
        );
    }

    #[test]
    fn only_finance_acts_during_finance_review() {
        assert!(authorize(Role::Finance, WorkflowState::FinanceReview, QuoteAction::Approve).is_ok());
        assert_matches!(
            authorize(Role::Admin, WorkflowState::FinanceReview, QuoteAction::Approve),
            Err(WorkflowError::NotAuthorized { role: Role::Admin, .. })
        );
    }

    #[test]
    fn sales_cannot_review() {
        assert!(authorize(Role::Sales, WorkflowState::AdminReview, QuoteAction::Approve).is_err());
        assert!(authorize(Role::Sales, WorkflowState::Submitted, QuoteAction::StartReview).is_err());
    }

    #[test]
    fn allowed_actions_for_admin_queue() {
        let actions = allowed_actions(WorkflowState::Submitted, Role::Admin, false);
        assert_eq!(
            actions,
            vec![
                QuoteAction::StartReview,
                QuoteAction::Approve,
                QuoteAction::Reject,
                QuoteAction::RequestRevision
            ]
        );
        assert!(allowed_actions(WorkflowState::Closed, Role::Admin, false).is_empty());
    }
}
