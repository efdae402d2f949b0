//! Margin gate and the admin / finance decision handlers.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{authorize, next_state, QuoteAction, WorkflowError, WorkflowState};
use crate::auth::Role;

/// Default margin threshold (percent) below which finance must sign off
pub const DEFAULT_MARGIN_THRESHOLD: Decimal = dec!(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarginPolicy {
    pub threshold_percent: Decimal,
}

impl Default for MarginPolicy {
    fn default() -> Self {
        Self {
            threshold_percent: DEFAULT_MARGIN_THRESHOLD,
        }
    }
}

/// `(price - cost) / price` as a percentage, two decimal places.
/// A zero or negative price has no meaningful margin and yields zero.
pub fn margin_percent(price: Decimal, cost: Decimal) -> Decimal {
    if price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    ((price - cost) / price * Decimal::ONE_HUNDRED).round_dp(2)
}

pub fn apply_discount(value: Decimal, discount_percent: Decimal) -> Decimal {
    (value * (Decimal::ONE_HUNDRED - discount_percent) / Decimal::ONE_HUNDRED).round_dp(2)
}

/// Discount must be within 0..=100 and anything above zero needs a reason.
pub fn validate_discount(
    discount_percent: Decimal,
    justification: Option<&str>,
) -> Result<(), WorkflowError> {
    if discount_percent < Decimal::ZERO || discount_percent > Decimal::ONE_HUNDRED {
        return Err(WorkflowError::InvalidDiscount(format!(
            "{} is outside 0-100",
            discount_percent
        )));
    }
    let justified = justification.map(|j| !j.trim().is_empty()).unwrap_or(false);
    if discount_percent > Decimal::ZERO && !justified {
        return Err(WorkflowError::InvalidDiscount(
            "a justification is required for any discount".into(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuoteFinancials {
    pub original_value: Decimal,
    pub discount_percent: Decimal,
    pub discounted_value: Decimal,
    pub total_cost: Decimal,
    pub gross_profit: Decimal,
    pub original_margin: Decimal,
    pub discounted_margin: Decimal,
}

impl QuoteFinancials {
    pub fn compute(original_value: Decimal, total_cost: Decimal, discount_percent: Decimal) -> Self {
        let discounted_value = apply_discount(original_value, discount_percent);
        Self {
            original_value,
            discount_percent,
            discounted_value,
            total_cost,
            gross_profit: discounted_value - total_cost,
            original_margin: margin_percent(original_value, total_cost),
            discounted_margin: margin_percent(discounted_value, total_cost),
        }
    }
}

/// True when the discounted margin falls strictly below the threshold.
pub fn check_finance_approval_required(discounted_margin: Decimal, policy: &MarginPolicy) -> bool {
    discounted_margin < policy.threshold_percent
}

/// Finance can always give final sign-off; admins only when the margin
/// gate does not demand finance.
pub fn can_approve_without_finance(role: Role, requires_finance: bool) -> bool {
    match role {
        Role::Finance => true,
        Role::Admin => !requires_finance,
        Role::Sales => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
    RequestRevision,
}

impl Decision {
    pub fn action(self) -> QuoteAction {
        match self {
            Decision::Approve => QuoteAction::Approve,
            Decision::Reject => QuoteAction::Reject,
            Decision::RequestRevision => QuoteAction::RequestRevision,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionInput {
    pub decision: Decision,
    pub notes: Option<String>,
    /// Admin override of the requested discount
    pub approved_discount: Option<Decimal>,
    pub justification: Option<String>,
}

impl DecisionInput {
    pub fn new(decision: Decision) -> Self {
        Self {
            decision,
            notes: None,
            approved_discount: None,
            justification: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_discount(mut self, discount: Decimal, justification: impl Into<String>) -> Self {
        self.approved_discount = Some(discount);
        self.justification = Some(justification.into());
        self
    }
}

/// What a decision handler needs to know about the quote
#[derive(Debug, Clone)]
pub struct QuoteSnapshot {
    pub state: WorkflowState,
    pub financials: QuoteFinancials,
    pub requires_finance_approval: bool,
    pub discount_justification: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub next_state: WorkflowState,
    pub requires_finance_approval: bool,
    pub financials: QuoteFinancials,
    pub discount_justification: Option<String>,
    pub notes: Option<String>,
}

fn require_notes(input: &DecisionInput, decision: Decision) -> Result<String, WorkflowError> {
    match input.notes.as_deref().map(str::trim) {
        Some(notes) if !notes.is_empty() => Ok(notes.to_string()),
        _ => Err(WorkflowError::MissingNotes(match decision {
            Decision::Reject => "reject",
            _ => "request revision on",
        })),
    }
}

fn unchanged(
    snapshot: &QuoteSnapshot,
    next_state: WorkflowState,
    notes: Option<String>,
) -> DecisionOutcome {
    DecisionOutcome {
        next_state,
        requires_finance_approval: snapshot.requires_finance_approval,
        financials: snapshot.financials.clone(),
        discount_justification: snapshot.discount_justification.clone(),
        notes,
    }
}

/// Admin-stage decision. Approval re-runs the margin gate (with the
/// admin's discount override when given) and routes to finance when the
/// reviewer is not allowed to approve alone.
pub fn admin_decision(
    snapshot: &QuoteSnapshot,
    input: &DecisionInput,
    role: Role,
    policy: &MarginPolicy,
) -> Result<DecisionOutcome, WorkflowError> {
    let decision = input.decision;
    let action = decision.action();
    if !matches!(
        snapshot.state,
        WorkflowState::Submitted | WorkflowState::AdminReview
    ) {
        return Err(WorkflowError::InvalidTransition {
            from: snapshot.state,
            action,
        });
    }
    authorize(role, snapshot.state, action)?;

    match decision {
        Decision::Approve => {
            let (financials, justification) = match input.approved_discount {
                Some(discount) => {
                    let justification = input
                        .justification
                        .clone()
                        .or_else(|| snapshot.discount_justification.clone());
                    validate_discount(discount, justification.as_deref())?;
                    let financials = QuoteFinancials::compute(
                        snapshot.financials.original_value,
                        snapshot.financials.total_cost,
                        discount,
                    );
                    (financials, justification)
                }
                None => (
                    snapshot.financials.clone(),
                    snapshot.discount_justification.clone(),
                ),
            };

            let requires_finance =
                check_finance_approval_required(financials.discounted_margin, policy);
            let needs_finance_hop = !can_approve_without_finance(role, requires_finance);
            let next = next_state(snapshot.state, action, needs_finance_hop)?;

            Ok(DecisionOutcome {
                next_state: next,
                requires_finance_approval: requires_finance,
                financials,
                discount_justification: justification,
                notes: input.notes.clone(),
            })
        }
        Decision::Reject | Decision::RequestRevision => {
            let notes = require_notes(input, decision)?;
            let next = next_state(snapshot.state, action, snapshot.requires_finance_approval)?;
            Ok(unchanged(snapshot, next, Some(notes)))
        }
    }
}

/// Finance-stage decision; only valid while the quote waits on finance.
pub fn finance_decision(
    snapshot: &QuoteSnapshot,
    input: &DecisionInput,
    role: Role,
) -> Result<DecisionOutcome, WorkflowError> {
    let decision = input.decision;
    let action = decision.action();
    if snapshot.state != WorkflowState::FinanceReview {
        return Err(WorkflowError::InvalidTransition {
            from: snapshot.state,
            action,
        });
    }
    authorize(role, snapshot.state, action)?;

    let notes = match decision {
        Decision::Approve => input.notes.clone(),
        Decision::Reject | Decision::RequestRevision => Some(require_notes(input, decision)?),
    };
    let next = next_state(snapshot.state, action, snapshot.requires_finance_approval)?;
    Ok(unchanged(snapshot, next, notes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    fn snapshot(state: WorkflowState, value: Decimal, cost: Decimal, discount: Decimal) -> QuoteSnapshot {
        let financials = QuoteFinancials::compute(value, cost, discount);
        let requires = check_finance_approval_required(
            financials.discounted_margin,
            &MarginPolicy::default(),
        );
        QuoteSnapshot {
            state,
            financials,
            requires_finance_approval: requires,
            discount_justification: Some("competitive bid".into()),
        }
    }

    #[rstest]
    #[case(dec!(1000), dec!(600), dec!(40))]
    #[case(dec!(1000), dec!(1000), dec!(0))]
    #[case(dec!(1000), dec!(1250), dec!(-25))]
    #[case(dec!(0), dec!(100), dec!(0))]
    #[case(dec!(3), dec!(1), dec!(66.67))]
    fn margin_calculation(#[case] price: Decimal, #[case] cost: Decimal, #[case] expected: Decimal) {
        assert_eq!(margin_percent(price, cost), expected);
    }

    #[test]
    fn financials_apply_discount_before_margin() {
        let f = QuoteFinancials::compute(dec!(1000), dec!(600), dec!(10));
        assert_eq!(f.discounted_value, dec!(900));
        assert_eq!(f.gross_profit, dec!(300));
        assert_eq!(f.original_margin, dec!(40));
        assert_eq!(f.discounted_margin, dec!(33.33));
    }

    #[rstest]
    #[case(dec!(24.99), true)]
    #[case(dec!(25), false)]
    #[case(dec!(40), false)]
    #[case(dec!(-5), true)]
    fn finance_gate_is_strictly_below_threshold(#[case] margin: Decimal, #[case] required: bool) {
        assert_eq!(
            check_finance_approval_required(margin, &MarginPolicy::default()),
            required
        );
    }

    #[test]
    fn discount_requires_justification() {
        assert!(validate_discount(dec!(0), None).is_ok());
        assert_matches!(
            validate_discount(dec!(5), Some("  ")),
            Err(WorkflowError::InvalidDiscount(_))
        );
        assert_matches!(
            validate_discount(dec!(101), Some("why not")),
            Err(WorkflowError::InvalidDiscount(_))
        );
    }

    #[test]
    fn role_gate() {
        assert!(can_approve_without_finance(Role::Admin, false));
        assert!(!can_approve_without_finance(Role::Admin, true));
        assert!(can_approve_without_finance(Role::Finance, true));
        assert!(!can_approve_without_finance(Role::Sales, false));
    }

    #[test]
    fn admin_approval_with_healthy_margin_is_final() {
        let snap = snapshot(WorkflowState::AdminReview, dec!(1000), dec!(600), dec!(0));
        let outcome = admin_decision(
            &snap,
            &DecisionInput::new(Decision::Approve),
            Role::Admin,
            &MarginPolicy::default(),
        )
        .unwrap();
        assert_eq!(outcome.next_state, WorkflowState::Approved);
        assert!(!outcome.requires_finance_approval);
    }

    #[test]
    fn admin_discount_override_routes_to_finance() {
        let snap = snapshot(WorkflowState::AdminReview, dec!(1000), dec!(600), dec!(0));
        let input = DecisionInput::new(Decision::Approve).with_discount(dec!(30), "strategic account");
        let outcome = admin_decision(&snap, &input, Role::Admin, &MarginPolicy::default()).unwrap();

        assert_eq!(outcome.next_state, WorkflowState::FinanceReview);
        assert!(outcome.requires_finance_approval);
        assert_eq!(outcome.financials.discounted_value, dec!(700));
        assert_eq!(outcome.financials.discounted_margin, dec!(14.29));
    }

    #[test]
    fn finance_reviewer_at_admin_stage_approves_outright() {
        let snap = snapshot(WorkflowState::Submitted, dec!(1000), dec!(900), dec!(0));
        assert!(snap.requires_finance_approval);
        let outcome = admin_decision(
            &snap,
            &DecisionInput::new(Decision::Approve),
            Role::Finance,
            &MarginPolicy::default(),
        )
        .unwrap();
        assert_eq!(outcome.next_state, WorkflowState::Approved);
        assert!(outcome.requires_finance_approval);
    }

    #[test]
    fn rejection_requires_notes() {
        let snap = snapshot(WorkflowState::AdminReview, dec!(1000), dec!(600), dec!(0));
        assert_matches!(
            admin_decision(
                &snap,
                &DecisionInput::new(Decision::Reject),
                Role::Admin,
                &MarginPolicy::default()
            ),
            Err(WorkflowError::MissingNotes("reject"))
        );

        let outcome = admin_decision(
            &snap,
            &DecisionInput::new(Decision::RequestRevision).with_notes("add spare CTs"),
            Role::Admin,
            &MarginPolicy::default(),
        )
        .unwrap();
        assert_eq!(outcome.next_state, WorkflowState::NeedsRevision);
        assert_eq!(outcome.notes.as_deref(), Some("add spare CTs"));
    }

    #[test]
    fn admin_handler_refuses_finance_stage() {
        let snap = snapshot(WorkflowState::FinanceReview, dec!(1000), dec!(900), dec!(0));
        assert_matches!(
            admin_decision(
                &snap,
                &DecisionInput::new(Decision::Approve),
                Role::Admin,
                &MarginPolicy::default()
            ),
            Err(WorkflowError::InvalidTransition { .. })
        );
    }

    #[test]
    fn finance_decision_flow() {
        let snap = snapshot(WorkflowState::FinanceReview, dec!(1000), dec!(900), dec!(0));
        let outcome =
            finance_decision(&snap, &DecisionInput::new(Decision::Approve), Role::Finance).unwrap();
        assert_eq!(outcome.next_state, WorkflowState::Approved);

        assert_matches!(
            finance_decision(&snap, &DecisionInput::new(Decision::Approve), Role::Admin),
            Err(WorkflowError::NotAuthorized { .. })
        );

        let not_yet = snapshot(WorkflowState::AdminReview, dec!(1000), dec!(900), dec!(0));
        assert_matches!(
            finance_decision(&not_yet, &DecisionInput::new(Decision::Approve), Role::Finance),
            Err(WorkflowError::InvalidTransition { .. })
        );
    }
}
