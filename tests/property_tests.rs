//! Property-based tests for pricing, the margin gate, part numbers and quote
//! numbering.
//!
//! These use proptest to check invariants over generated catalogs and
//! discounts rather than a handful of hand-picked cases.

use proptest::prelude::*;
use quote_workflow_api::{
    bom::{
        self,
        part_number::{assemble_part_number, ChassisSpec, PartNumberOptions, SlotCard, TemplateValues},
        BomEntry, PricedItem,
    },
    services::quotes::{format_quote_number, next_quote_number, parse_quote_sequence},
    workflow::{check_finance_approval_required, margin_percent, MarginPolicy, QuoteFinancials},
};
use rust_decimal::Decimal;
use uuid::Uuid;

// Strategies for generating test data
fn money_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..5_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn price_strategy() -> impl Strategy<Value = Decimal> {
    (100i64..5_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

/// Up to 99%, so a discounted price never collapses to zero
fn discount_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=9_900).prop_map(|hundredths| Decimal::new(hundredths, 2))
}

fn item_strategy() -> impl Strategy<Value = PricedItem> {
    (0u128..4, 1i32..20, money_strategy(), money_strategy()).prop_map(
        |(id, quantity, unit_price, unit_cost)| PricedItem {
            product_id: Uuid::from_u128(id),
            name: format!("product {}", id),
            part_number: None,
            quantity,
            // identical ids must describe identical goods
            unit_price: unit_price + Decimal::from(id as u64),
            unit_cost: unit_cost.min(unit_price),
            configuration: None,
        },
    )
}

/// Single-slot cards at distinct slots of an `n`-slot chassis
fn layout_strategy() -> impl Strategy<Value = (u32, Vec<u32>)> {
    (1u32..16).prop_flat_map(|slots| {
        (
            Just(slots),
            proptest::sample::subsequence((1..=slots).collect::<Vec<_>>(), 0..=slots as usize),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn consolidation_preserves_quantity_and_value(items in prop::collection::vec(item_strategy(), 1..12)) {
        // normalise so that equal ids share a price, as catalog rows do
        let items: Vec<PricedItem> = items
            .iter()
            .map(|item| {
                let first = items.iter().find(|i| i.product_id == item.product_id).unwrap_or(item);
                PricedItem {
                    unit_price: first.unit_price,
                    unit_cost: first.unit_cost,
                    ..item.clone()
                }
            })
            .collect();
        let entries: Vec<BomEntry> = items.into_iter().map(BomEntry::Item).collect();
        let before = bom::totals(&entries);
        let quantity_before: i32 = entries.iter().map(BomEntry::quantity).sum();

        let merged = bom::consolidate(entries.clone())
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let after = bom::totals(&merged);
        let quantity_after: i32 = merged.iter().map(BomEntry::quantity).sum();

        prop_assert_eq!(before, after);
        prop_assert_eq!(quantity_before, quantity_after);
        prop_assert!(merged.len() <= 4);
        prop_assert_eq!(bom::consolidate(merged.clone()), Ok(merged));
    }

    #[test]
    fn margin_stays_within_bounds(price in money_strategy(), cost_share in 0u32..=100) {
        let cost = (price * Decimal::from(cost_share) / Decimal::ONE_HUNDRED).round_dp(2);
        let margin = margin_percent(price, cost);
        prop_assert!(margin >= Decimal::ZERO - Decimal::new(1, 2));
        prop_assert!(margin <= Decimal::ONE_HUNDRED);
        if price.is_zero() {
            prop_assert_eq!(margin, Decimal::ZERO);
        }
    }

    #[test]
    fn deeper_discount_never_raises_margin(
        price in price_strategy(),
        cost in money_strategy(),
        a in discount_strategy(),
        b in discount_strategy(),
    ) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let shallow = QuoteFinancials::compute(price, cost, low);
        let deep = QuoteFinancials::compute(price, cost, high);
        prop_assert!(deep.discounted_value <= shallow.discounted_value);
        prop_assert!(deep.discounted_margin <= shallow.discounted_margin);
        prop_assert_eq!(shallow.original_margin, deep.original_margin);
        prop_assert_eq!(deep.gross_profit, deep.discounted_value - cost);

        // the gate is monotone in the discount as well
        let policy = MarginPolicy::default();
        if check_finance_approval_required(shallow.discounted_margin, &policy) {
            prop_assert!(check_finance_approval_required(deep.discounted_margin, &policy));
        }
    }

    #[test]
    fn part_number_covers_every_slot((slots, seated) in layout_strategy(), remote in any::<bool>()) {
        let chassis = ChassisSpec { prefix: "QTMS-".into(), slot_count: slots };
        let cards: Vec<SlotCard> = seated
            .iter()
            .map(|&slot| SlotCard {
                slot,
                span: 1,
                code_template: "C".into(),
                values: TemplateValues::default(),
            })
            .collect();
        let options = PartNumberOptions::default();

        let part_number = assemble_part_number(&chassis, &cards, remote, &options)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let body = part_number.strip_prefix("QTMS-").unwrap_or_default();
        let body = if remote {
            prop_assert!(body.ends_with("-RD"));
            body.trim_end_matches("-RD")
        } else {
            body
        };
        prop_assert_eq!(body.len(), slots as usize);
        prop_assert_eq!(body.matches('C').count(), seated.len());
        prop_assert_eq!(body.matches('X').count(), slots as usize - seated.len());
    }

    #[test]
    fn quote_numbers_roundtrip_and_increase(year in 2000i32..2100, issued in prop::collection::vec(1u32..10_000, 0..20)) {
        let existing: Vec<String> = issued.iter().map(|&n| format_quote_number(year, n)).collect();
        for (number, sequence) in existing.iter().zip(&issued) {
            prop_assert_eq!(parse_quote_sequence(number, year), Some(*sequence));
            prop_assert_eq!(parse_quote_sequence(number, year + 1), None);
        }

        let next = next_quote_number(year, existing.iter().map(String::as_str));
        let next_sequence = parse_quote_sequence(&next, year);
        prop_assert_eq!(next_sequence, Some(issued.iter().copied().max().unwrap_or(0) + 1));
        prop_assert!(!existing.contains(&next));
    }
}
