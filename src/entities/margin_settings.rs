use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bom::part_number::PartNumberOptions;
use crate::workflow::MarginPolicy;

/// Single-row table (id = 1) of admin-tunable quoting settings
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "margin_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub threshold_percent: Decimal,
    pub remote_display_suffix: String,
    pub empty_slot_code: String,
    pub updated_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

pub const SETTINGS_ROW_ID: i32 = 1;

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn policy(&self) -> MarginPolicy {
        MarginPolicy {
            threshold_percent: self.threshold_percent,
        }
    }

    pub fn part_number_options(&self) -> PartNumberOptions {
        PartNumberOptions {
            empty_slot_code: self.empty_slot_code.clone(),
            remote_display_suffix: self.remote_display_suffix.clone(),
        }
    }
}
