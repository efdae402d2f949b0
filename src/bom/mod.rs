//! Bill-of-materials building blocks: priced lines, chassis assemblies,
//! validation and consolidation of duplicate lines.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

pub mod part_number;

use part_number::{slot_occupancy, PartNumberError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BomError {
    #[error("a quote needs at least one line item")]
    Empty,

    #[error("quantity for {name} must be a positive integer, got {quantity}")]
    NonPositiveQuantity { name: String, quantity: i32 },

    #[error("combined quantity for {name} is too large")]
    QuantityOverflow { name: String },

    #[error("chassis {name}: {source}")]
    Slots {
        name: String,
        #[source]
        source: PartNumberError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedItem {
    pub product_id: Uuid,
    pub name: String,
    pub part_number: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub unit_cost: Decimal,
    pub configuration: Option<serde_json::Value>,
}

impl PricedItem {
    fn check_quantity(&self) -> Result<(), BomError> {
        if self.quantity <= 0 {
            return Err(BomError::NonPositiveQuantity {
                name: self.name.clone(),
                quantity: self.quantity,
            });
        }
        Ok(())
    }

    fn configuration_key(&self) -> String {
        self.configuration
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_default()
    }
}

/// A card seated in a chassis. `item.quantity` is per chassis unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardPlacement {
    pub slot: u32,
    pub span: u32,
    pub item: PricedItem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChassisBuild {
    /// `chassis.quantity` counts identical assemblies
    pub chassis: PricedItem,
    pub slot_count: u32,
    pub cards: Vec<CardPlacement>,
    pub remote_display: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BomEntry {
    Item(PricedItem),
    Chassis(ChassisBuild),
}

impl BomEntry {
    pub fn quantity(&self) -> i32 {
        match self {
            BomEntry::Item(item) => item.quantity,
            BomEntry::Chassis(build) => build.chassis.quantity,
        }
    }

    fn head(&self) -> &PricedItem {
        match self {
            BomEntry::Item(item) => item,
            BomEntry::Chassis(build) => &build.chassis,
        }
    }

    fn quantity_mut(&mut self) -> &mut i32 {
        match self {
            BomEntry::Item(item) => &mut item.quantity,
            BomEntry::Chassis(build) => &mut build.chassis.quantity,
        }
    }

    /// Price of one unit; for a chassis this includes its seated cards
    pub fn unit_price(&self) -> Decimal {
        match self {
            BomEntry::Item(item) => item.unit_price,
            BomEntry::Chassis(build) => {
                build.chassis.unit_price
                    + build
                        .cards
                        .iter()
                        .map(|c| c.item.unit_price * Decimal::from(c.item.quantity))
                        .sum::<Decimal>()
            }
        }
    }

    pub fn unit_cost(&self) -> Decimal {
        match self {
            BomEntry::Item(item) => item.unit_cost,
            BomEntry::Chassis(build) => {
                build.chassis.unit_cost
                    + build
                        .cards
                        .iter()
                        .map(|c| c.item.unit_cost * Decimal::from(c.item.quantity))
                        .sum::<Decimal>()
            }
        }
    }

    pub fn extended_price(&self) -> Decimal {
        self.unit_price() * Decimal::from(self.quantity())
    }

    pub fn extended_cost(&self) -> Decimal {
        self.unit_cost() * Decimal::from(self.quantity())
    }

    /// Lines with equal keys describe the same goods and can be merged
    fn consolidation_key(&self) -> String {
        match self {
            BomEntry::Item(item) => format!("item:{}:{}", item.product_id, item.configuration_key()),
            BomEntry::Chassis(build) => {
                let mut cards: Vec<String> = build
                    .cards
                    .iter()
                    .map(|c| {
                        format!(
                            "{}@{}x{}:{}",
                            c.item.product_id,
                            c.slot,
                            c.item.quantity,
                            c.item.configuration_key()
                        )
                    })
                    .collect();
                cards.sort();
                format!(
                    "chassis:{}:{}:{}:{}",
                    build.chassis.product_id,
                    build.chassis.part_number.as_deref().unwrap_or_default(),
                    build.remote_display,
                    cards.join(",")
                )
            }
        }
    }
}

pub fn validate_entries(entries: &[BomEntry]) -> Result<(), BomError> {
    if entries.is_empty() {
        return Err(BomError::Empty);
    }

    for entry in entries {
        match entry {
            BomEntry::Item(item) => item.check_quantity()?,
            BomEntry::Chassis(build) => {
                build.chassis.check_quantity()?;
                for card in &build.cards {
                    card.item.check_quantity()?;
                }
                slot_occupancy(
                    build.slot_count,
                    build.cards.iter().map(|c| (c.slot, c.span)),
                )
                .map_err(|source| BomError::Slots {
                    name: build.chassis.name.clone(),
                    source,
                })?;
            }
        }
    }
    Ok(())
}

/// Merges entries describing identical goods, summing quantities. Output
/// keeps the order in which each distinct entry first appeared.
pub fn consolidate(entries: Vec<BomEntry>) -> Result<Vec<BomEntry>, BomError> {
    let mut merged: Vec<BomEntry> = Vec::with_capacity(entries.len());
    let mut seen: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        let key = entry.consolidation_key();
        match seen.get(&key) {
            Some(&index) => {
                let target = &mut merged[index];
                let quantity = target.quantity().checked_add(entry.quantity()).ok_or_else(|| {
                    BomError::QuantityOverflow {
                        name: target.head().name.clone(),
                    }
                })?;
                *target.quantity_mut() = quantity;
            }
            None => {
                seen.insert(key, merged.len());
                merged.push(entry);
            }
        }
    }

    Ok(merged)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BomTotals {
    pub total_price: Decimal,
    pub total_cost: Decimal,
}

pub fn totals(entries: &[BomEntry]) -> BomTotals {
    entries.iter().fold(BomTotals::default(), |acc, entry| BomTotals {
        total_price: acc.total_price + entry.extended_price(),
        total_cost: acc.total_cost + entry.extended_cost(),
    })
}

/// One persisted BOM row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatLine {
    pub item: PricedItem,
    /// Index (into the flattened list) of the chassis row a card sits in
    pub parent: Option<usize>,
    pub slot: Option<u32>,
    pub span: Option<u32>,
}

/// Expands chassis assemblies into a chassis row followed by one row per
/// seated card. Card quantities are multiplied out by the chassis count.
pub fn flatten(entries: &[BomEntry]) -> Result<Vec<FlatLine>, BomError> {
    let mut lines = Vec::new();

    for entry in entries {
        match entry {
            BomEntry::Item(item) => lines.push(FlatLine {
                item: item.clone(),
                parent: None,
                slot: None,
                span: None,
            }),
            BomEntry::Chassis(build) => {
                let parent = lines.len();
                lines.push(FlatLine {
                    item: build.chassis.clone(),
                    parent: None,
                    slot: None,
                    span: None,
                });
                let mut cards: Vec<&CardPlacement> = build.cards.iter().collect();
                cards.sort_by_key(|c| c.slot);
                for card in cards {
                    let mut item = card.item.clone();
                    item.quantity = item.quantity.checked_mul(build.chassis.quantity).ok_or_else(
                        || BomError::QuantityOverflow {
                            name: item.name.clone(),
                        },
                    )?;
                    lines.push(FlatLine {
                        item,
                        parent: Some(parent),
                        slot: Some(card.slot),
                        span: Some(card.span),
                    });
                }
            }
        }
    }

    Ok(lines)
}
