use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::workflow::{
    derive_from_raw, QuoteFinancials, QuoteSnapshot, WorkflowState,
};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "quotes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub quote_number: String,

    pub customer_name: String,
    pub customer_email: Option<String>,
    pub oracle_customer_id: Option<String>,
    pub sfdc_opportunity: Option<String>,

    /// Legacy status string; `workflow_state` is always derived from it
    pub status: String,
    pub workflow_state: String,
    pub requires_finance_approval: bool,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub original_value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discounted_value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub gross_profit: Decimal,
    #[sea_orm(column_type = "Decimal(Some((9, 2)))")]
    pub original_margin: Decimal,
    #[sea_orm(column_type = "Decimal(Some((9, 2)))")]
    pub discounted_margin: Decimal,
    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub requested_discount: Decimal,
    pub discount_justification: Option<String>,

    pub currency: String,
    pub shipping_terms: Option<String>,
    pub payment_terms: Option<String>,

    pub created_by: Uuid,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub finance_reviewed_by: Option<Uuid>,
    pub finance_reviewed_at: Option<DateTime<Utc>>,
    pub finance_notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::bom_item::Entity")]
    BomItems,
    #[sea_orm(
        belongs_to = "super::profile::Entity",
        from = "Column::CreatedBy",
        to = "super::profile::Column::Id"
    )]
    Creator,
}

impl Related<super::bom_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomItems.def()
    }
}

impl Related<super::profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Creator.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// State recomputed from the stored status, ignoring the cached column
    pub fn derived_state(&self) -> Result<WorkflowState, ServiceError> {
        Ok(derive_from_raw(&self.status, self.requires_finance_approval)?)
    }

    pub fn financials(&self) -> QuoteFinancials {
        QuoteFinancials {
            original_value: self.original_value,
            discount_percent: self.requested_discount,
            discounted_value: self.discounted_value,
            total_cost: self.total_cost,
            gross_profit: self.gross_profit,
            original_margin: self.original_margin,
            discounted_margin: self.discounted_margin,
        }
    }

    pub fn snapshot(&self) -> Result<QuoteSnapshot, ServiceError> {
        Ok(QuoteSnapshot {
            state: self.derived_state()?,
            financials: self.financials(),
            requires_finance_approval: self.requires_finance_approval,
            discount_justification: self.discount_justification.clone(),
        })
    }
}
