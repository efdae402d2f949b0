use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Catalog node. One table holds all four hierarchy levels:
/// 1 asset family, 2 chassis, 3 card, 4 configurable option set.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub parent_id: Option<Uuid>,

    #[validate(range(min = 1, max = 4, message = "Product level must be between 1 and 4"))]
    pub level: i32,

    #[validate(length(
        min = 1,
        max = 255,
        message = "Product name must be between 1 and 255 characters"
    ))]
    pub name: String,

    #[validate(length(max = 2000, message = "Description cannot exceed 2000 characters"))]
    pub description: Option<String>,

    /// Chassis prefix on level 2, slot code template on level 3
    pub part_number_code: Option<String>,

    /// Slots offered by a chassis
    pub slot_count: Option<i32>,

    /// Consecutive slots a card covers
    pub slot_span: Option<i32>,

    /// Counts contributed by a level-4 option to its card's code template
    pub input_count: Option<i32>,
    pub bushing_count: Option<i32>,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub cost: Decimal,

    pub enabled: bool,

    pub sort_order: i32,

    pub created_at: DateTime<Utc>,

    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(belongs_to = "Entity", from = "Column::ParentId", to = "Column::Id")]
    Parent,
    #[sea_orm(has_many = "super::bom_item::Entity")]
    BomItems,
}

impl Related<super::bom_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomItems.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        if insert {
            if let ActiveValue::NotSet = active_model.enabled {
                active_model.enabled = Set(true);
            }
            if let ActiveValue::NotSet = active_model.sort_order {
                active_model.sort_order = Set(0);
            }
            active_model.created_at = Set(Utc::now());
        }

        active_model.updated_at = Set(Some(Utc::now()));

        let model: Model = active_model.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;

        if let Err(err) = model.validate() {
            return Err(DbErr::Custom(format!("Validation error: {}", err)));
        }

        Ok(active_model)
    }
}
