//! Part-number assembly for chassis-based products.
//!
//! A chassis contributes its prefix, then every slot contributes the code
//! of the card seated in it, in slot order. Card codes are templates that
//! may reference the card's configured `{inputs}` and `{bushings}` counts.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

pub const DEFAULT_EMPTY_SLOT_CODE: &str = "X";
pub const DEFAULT_REMOTE_DISPLAY_SUFFIX: &str = "-RD";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartNumberError {
    #[error("unknown placeholder '{{{0}}}' in code template '{1}'")]
    UnknownPlaceholder(String, String),

    #[error("unterminated placeholder in code template '{0}'")]
    UnterminatedPlaceholder(String),

    #[error("slot {slot} (span {span}) does not fit a {slot_count}-slot chassis")]
    SlotOutOfRange { slot: u32, span: u32, slot_count: u32 },

    #[error("slot {slot} is already occupied")]
    SlotConflict { slot: u32 },
}

/// Counts taken from a card's Level-4 configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TemplateValues {
    #[serde(default)]
    pub inputs: Option<u32>,
    #[serde(default)]
    pub bushings: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChassisSpec {
    pub prefix: String,
    pub slot_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotCard {
    /// First slot the card occupies (1-based)
    pub slot: u32,
    /// Number of consecutive slots the card covers
    pub span: u32,
    pub code_template: String,
    pub values: TemplateValues,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartNumberOptions {
    pub empty_slot_code: String,
    pub remote_display_suffix: String,
}

impl Default for PartNumberOptions {
    fn default() -> Self {
        Self {
            empty_slot_code: DEFAULT_EMPTY_SLOT_CODE.to_string(),
            remote_display_suffix: DEFAULT_REMOTE_DISPLAY_SUFFIX.to_string(),
        }
    }
}

/// Fills `{inputs}` / `{bushings}` placeholders. Missing counts render as 0.
pub fn render_code(template: &str, values: &TemplateValues) -> Result<String, PartNumberError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| PartNumberError::UnterminatedPlaceholder(template.to_string()))?;
        let value = match after[..end].trim() {
            "inputs" => values.inputs.unwrap_or(0),
            "bushings" => values.bushings.unwrap_or(0),
            other => {
                return Err(PartNumberError::UnknownPlaceholder(
                    other.to_string(),
                    template.to_string(),
                ))
            }
        };
        out.push_str(&value.to_string());
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Maps each slot (index 0 = slot 1) to the index of the card covering it.
/// Rejects cards that leave the chassis or overlap another card.
pub fn slot_occupancy<I>(slot_count: u32, placements: I) -> Result<Vec<Option<usize>>, PartNumberError>
where
    I: IntoIterator<Item = (u32, u32)>,
{
    let mut occupancy = vec![None; slot_count as usize];

    for (index, (slot, span)) in placements.into_iter().enumerate() {
        let span = span.max(1);
        let fits = slot
            .checked_add(span - 1)
            .map(|last| last <= slot_count)
            .unwrap_or(false);
        if slot == 0 || !fits {
            return Err(PartNumberError::SlotOutOfRange {
                slot,
                span,
                slot_count,
            });
        }
        for covered in slot..slot + span {
            let cell = &mut occupancy[(covered - 1) as usize];
            if cell.is_some() {
                return Err(PartNumberError::SlotConflict { slot: covered });
            }
            *cell = Some(index);
        }
    }

    Ok(occupancy)
}

pub fn assemble_part_number(
    chassis: &ChassisSpec,
    cards: &[SlotCard],
    remote_display: bool,
    options: &PartNumberOptions,
) -> Result<String, PartNumberError> {
    let occupancy = slot_occupancy(
        chassis.slot_count,
        cards.iter().map(|card| (card.slot, card.span)),
    )?;

    let mut part_number = chassis.prefix.clone();
    for (offset, cell) in occupancy.iter().enumerate() {
        let slot = offset as u32 + 1;
        match cell {
            Some(index) if cards[*index].slot == slot => {
                let card = &cards[*index];
                part_number.push_str(&render_code(&card.code_template, &card.values)?);
            }
            // covered by a multi-slot card seated to the left
            Some(_) => {}
            None => part_number.push_str(&options.empty_slot_code),
        }
    }

    if remote_display {
        part_number.push_str(&options.remote_display_suffix);
    }

    Ok(part_number)
}
