//! Product hierarchy: asset families, chassis, cards and configurable
//! option sets, stored as one self-referencing table.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use strum::{Display, EnumIter};
use tracing::{error, info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{consts as perm, AuthUser},
    bom::part_number::{render_code, TemplateValues},
    db::DbPool,
    entities::product::{self, Column as ProductColumn, Entity as Product},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Upper bound on slots a chassis may declare
pub const MAX_SLOT_COUNT: i32 = 64;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProductLevel {
    AssetFamily,
    Chassis,
    Card,
    OptionSet,
}

impl ProductLevel {
    pub fn as_i32(self) -> i32 {
        match self {
            ProductLevel::AssetFamily => 1,
            ProductLevel::Chassis => 2,
            ProductLevel::Card => 3,
            ProductLevel::OptionSet => 4,
        }
    }

    pub fn from_i32(level: i32) -> Result<Self, ServiceError> {
        match level {
            1 => Ok(ProductLevel::AssetFamily),
            2 => Ok(ProductLevel::Chassis),
            3 => Ok(ProductLevel::Card),
            4 => Ok(ProductLevel::OptionSet),
            other => Err(ServiceError::ValidationError(format!(
                "product level must be between 1 and 4, got {}",
                other
            ))),
        }
    }

    /// Level a parent must have; asset families are roots
    pub fn parent_level(self) -> Option<ProductLevel> {
        match self {
            ProductLevel::AssetFamily => None,
            ProductLevel::Chassis => Some(ProductLevel::AssetFamily),
            ProductLevel::Card => Some(ProductLevel::Chassis),
            ProductLevel::OptionSet => Some(ProductLevel::Card),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateProductInput {
    pub parent_id: Option<Uuid>,
    #[validate(range(min = 1, max = 4))]
    pub level: i32,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    /// Chassis prefix (level 2) or slot code template (level 3)
    #[validate(length(min = 1, max = 64))]
    pub part_number_code: Option<String>,
    pub slot_count: Option<i32>,
    pub slot_span: Option<i32>,
    pub input_count: Option<i32>,
    pub bushing_count: Option<i32>,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub cost: Decimal,
    pub enabled: Option<bool>,
    pub sort_order: Option<i32>,
}

fn invalid(msg: impl Into<String>) -> ServiceError {
    ServiceError::ValidationError(msg.into())
}

/// Checks level-specific fields and the parent's level
pub fn validate_product_shape(
    input: &CreateProductInput,
    parent: Option<&product::Model>,
) -> Result<ProductLevel, ServiceError> {
    let level = ProductLevel::from_i32(input.level)?;

    match (level.parent_level(), parent) {
        (None, None) => {}
        (None, Some(_)) => return Err(invalid("asset families cannot have a parent")),
        (Some(expected), None) => {
            return Err(invalid(format!(
                "a {} product needs a {} parent",
                level, expected
            )))
        }
        (Some(expected), Some(p)) if p.level != expected.as_i32() => {
            return Err(invalid(format!(
                "a {} product needs a {} parent, '{}' is level {}",
                level, expected, p.name, p.level
            )))
        }
        (Some(_), Some(_)) => {}
    }

    if input.price < Decimal::ZERO || input.cost < Decimal::ZERO {
        return Err(invalid("price and cost cannot be negative"));
    }

    let only_on = |present: bool, field: &str, allowed: ProductLevel| {
        if present && level != allowed {
            Err(invalid(format!("{} only applies to {} products", field, allowed)))
        } else {
            Ok(())
        }
    };
    only_on(input.slot_count.is_some(), "slot_count", ProductLevel::Chassis)?;
    only_on(input.slot_span.is_some(), "slot_span", ProductLevel::Card)?;
    only_on(input.input_count.is_some(), "input_count", ProductLevel::OptionSet)?;
    only_on(input.bushing_count.is_some(), "bushing_count", ProductLevel::OptionSet)?;

    match level {
        ProductLevel::AssetFamily => {}
        ProductLevel::Chassis => {
            if input.part_number_code.is_none() {
                return Err(invalid("a chassis needs a part number prefix"));
            }
            match input.slot_count {
                Some(n) if (1..=MAX_SLOT_COUNT).contains(&n) => {}
                _ => {
                    return Err(invalid(format!(
                        "a chassis needs slot_count between 1 and {}",
                        MAX_SLOT_COUNT
                    )))
                }
            }
        }
        ProductLevel::Card => {
            let code = input
                .part_number_code
                .as_deref()
                .ok_or_else(|| invalid("a card needs a part number code"))?;
            render_code(code, &TemplateValues::default())?;
            if matches!(input.slot_span, Some(span) if span < 1) {
                return Err(invalid("slot_span must be at least 1"));
            }
        }
        ProductLevel::OptionSet => {
            if input.input_count.unwrap_or(0) < 0 || input.bushing_count.unwrap_or(0) < 0 {
                return Err(invalid("input and bushing counts cannot be negative"));
            }
        }
    }

    Ok(level)
}

/// A product is usable only when it and every ancestor are enabled
pub fn effective_enabled(id: Uuid, products: &HashMap<Uuid, product::Model>) -> bool {
    let mut current = Some(id);
    let mut seen = HashSet::new();
    while let Some(pid) = current {
        if !seen.insert(pid) {
            return false;
        }
        match products.get(&pid) {
            Some(p) if p.enabled => current = p.parent_id,
            _ => return false,
        }
    }
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductNode {
    pub product: product::Model,
    pub effective_enabled: bool,
    pub children: Vec<ProductNode>,
}

fn sort_products(products: &mut [product::Model]) {
    products.sort_by(|a, b| {
        a.sort_order
            .cmp(&b.sort_order)
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Assembles the hierarchy from a flat product list. Rows whose parent is
/// missing from `products` are dropped along with their subtree.
pub fn build_tree(mut products: Vec<product::Model>, include_disabled: bool) -> Vec<ProductNode> {
    sort_products(&mut products);
    let by_id: HashMap<Uuid, product::Model> =
        products.iter().map(|p| (p.id, p.clone())).collect();

    let mut children: HashMap<Option<Uuid>, Vec<product::Model>> = HashMap::new();
    for p in products {
        children.entry(p.parent_id).or_default().push(p);
    }

    fn attach(
        parent: Option<Uuid>,
        children: &mut HashMap<Option<Uuid>, Vec<product::Model>>,
        by_id: &HashMap<Uuid, product::Model>,
        include_disabled: bool,
    ) -> Vec<ProductNode> {
        let Some(level) = children.remove(&parent) else {
            return Vec::new();
        };
        level
            .into_iter()
            .filter_map(|product| {
                let enabled = effective_enabled(product.id, by_id);
                if !enabled && !include_disabled {
                    return None;
                }
                let id = product.id;
                Some(ProductNode {
                    product,
                    effective_enabled: enabled,
                    children: attach(Some(id), children, by_id, include_disabled),
                })
            })
            .collect()
    }

    attach(None, &mut children, &by_id, include_disabled)
}

/// Loads `ids` plus all of their ancestors
pub async fn load_with_ancestors<C>(
    conn: &C,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, product::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    let mut loaded: HashMap<Uuid, product::Model> = HashMap::new();
    let mut pending: Vec<Uuid> = ids.to_vec();

    // the hierarchy is at most four deep
    for _ in 0..4 {
        pending.retain(|id| !loaded.contains_key(id));
        pending.sort();
        pending.dedup();
        if pending.is_empty() {
            break;
        }
        let rows = Product::find()
            .filter(ProductColumn::Id.is_in(pending.clone()))
            .all(conn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load products");
                ServiceError::DatabaseError(e)
            })?;
        pending = rows.iter().filter_map(|p| p.parent_id).collect();
        loaded.extend(rows.into_iter().map(|p| (p.id, p)));
    }

    Ok(loaded)
}

/// Fails unless every id exists and is effectively enabled
pub fn ensure_usable(
    ids: &[Uuid],
    products: &HashMap<Uuid, product::Model>,
) -> Result<(), ServiceError> {
    for id in ids {
        let product = products
            .get(id)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;
        if !effective_enabled(*id, products) {
            return Err(invalid(format!(
                "product '{}' is disabled and cannot be quoted",
                product.name
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
pub struct ProductFilter {
    pub level: Option<i32>,
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub enabled_only: bool,
}

/// Service for browsing and curating the product catalog
#[derive(Clone)]
pub struct CatalogService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CatalogService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, actor, input), fields(user_id = %actor.user_id, level = input.level))]
    pub async fn create_product(
        &self,
        actor: &AuthUser,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        actor.require(perm::PRODUCTS_MANAGE)?;
        input.validate()?;

        let db = &*self.db_pool;
        let parent = match input.parent_id {
            Some(parent_id) => Some(self.find(parent_id).await?),
            None => None,
        };
        let level = validate_product_shape(&input, parent.as_ref())?;

        let slot_span = match level {
            ProductLevel::Card => Some(input.slot_span.unwrap_or(1)),
            _ => None,
        };

        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            parent_id: Set(input.parent_id),
            level: Set(level.as_i32()),
            name: Set(input.name.trim().to_string()),
            description: Set(input.description),
            part_number_code: Set(input.part_number_code),
            slot_count: Set(input.slot_count),
            slot_span: Set(slot_span),
            input_count: Set(input.input_count),
            bushing_count: Set(input.bushing_count),
            price: Set(input.price),
            cost: Set(input.cost),
            enabled: Set(input.enabled.unwrap_or(true)),
            sort_order: Set(input.sort_order.unwrap_or(0)),
            created_at: Set(Utc::now()),
            updated_at: Set(Some(Utc::now())),
        };

        let created = model.insert(db).await.map_err(|e| {
            error!(error = %e, "Failed to create product");
            ServiceError::DatabaseError(e)
        })?;

        info!(product_id = %created.id, name = %created.name, "Product created");
        self.event_sender
            .send_or_log(Event::ProductCreated {
                product_id: created.id,
                level: created.level,
            })
            .await;

        Ok(created)
    }

    async fn find(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        Product::find_by_id(id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(product_id = %id, error = %e, "Database error when fetching product");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    #[instrument(skip(self, actor))]
    pub async fn get_product(
        &self,
        actor: &AuthUser,
        id: Uuid,
    ) -> Result<(product::Model, bool), ServiceError> {
        actor.require(perm::PRODUCTS_READ)?;
        let chain = load_with_ancestors(&*self.db_pool, &[id]).await?;
        let product = chain
            .get(&id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;
        Ok((product, effective_enabled(id, &chain)))
    }

    #[instrument(skip(self, actor))]
    pub async fn list_products(
        &self,
        actor: &AuthUser,
        filter: ProductFilter,
    ) -> Result<Vec<product::Model>, ServiceError> {
        actor.require(perm::PRODUCTS_READ)?;

        let mut query = Product::find();
        if let Some(level) = filter.level {
            query = query.filter(ProductColumn::Level.eq(ProductLevel::from_i32(level)?.as_i32()));
        }
        if let Some(parent_id) = filter.parent_id {
            query = query.filter(ProductColumn::ParentId.eq(parent_id));
        }

        let mut products = query
            .order_by_asc(ProductColumn::SortOrder)
            .order_by_asc(ProductColumn::Name)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::DatabaseError)?;

        if filter.enabled_only {
            let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
            let chain = load_with_ancestors(&*self.db_pool, &ids).await?;
            products.retain(|p| effective_enabled(p.id, &chain));
        }

        Ok(products)
    }

    #[instrument(skip(self, actor))]
    pub async fn list_children(
        &self,
        actor: &AuthUser,
        id: Uuid,
    ) -> Result<Vec<product::Model>, ServiceError> {
        actor.require(perm::PRODUCTS_READ)?;
        self.find(id).await?;
        self.list_products(
            actor,
            ProductFilter {
                parent_id: Some(id),
                ..Default::default()
            },
        )
        .await
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn set_enabled(
        &self,
        actor: &AuthUser,
        id: Uuid,
        enabled: bool,
    ) -> Result<product::Model, ServiceError> {
        actor.require(perm::PRODUCTS_MANAGE)?;
        let existing = self.find(id).await?;
        if existing.enabled == enabled {
            return Ok(existing);
        }

        let mut active: product::ActiveModel = existing.into();
        active.enabled = Set(enabled);
        let updated = active.update(&*self.db_pool).await.map_err(|e| {
            error!(product_id = %id, error = %e, "Failed to toggle product");
            ServiceError::DatabaseError(e)
        })?;

        info!(product_id = %id, enabled, "Product enablement changed");
        self.event_sender
            .send_or_log(Event::ProductEnabledChanged {
                product_id: id,
                enabled,
            })
            .await;

        Ok(updated)
    }

    #[instrument(skip(self, actor))]
    pub async fn tree(
        &self,
        actor: &AuthUser,
        include_disabled: bool,
    ) -> Result<Vec<ProductNode>, ServiceError> {
        actor.require(perm::PRODUCTS_READ)?;
        let products = Product::find()
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::DatabaseError)?;
        Ok(build_tree(products, include_disabled))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    pub(crate) fn model(id: u128, parent: Option<u128>, level: i32, name: &str) -> product::Model {
        product::Model {
            id: Uuid::from_u128(id),
            parent_id: parent.map(Uuid::from_u128),
            level,
            name: name.to_string(),
            description: None,
            part_number_code: None,
            slot_count: None,
            slot_span: None,
            input_count: None,
            bushing_count: None,
            price: dec!(0),
            cost: dec!(0),
            enabled: true,
            sort_order: 0,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn input(level: i32) -> CreateProductInput {
        CreateProductInput {
            parent_id: None,
            level,
            name: "thing".into(),
            description: None,
            part_number_code: None,
            slot_count: None,
            slot_span: None,
            input_count: None,
            bushing_count: None,
            price: dec!(10),
            cost: dec!(5),
            enabled: None,
            sort_order: None,
        }
    }

    #[test]
    fn parent_must_be_one_level_up() {
        let family = model(1, None, 1, "Transformer monitoring");
        let mut card = input(3);
        card.part_number_code = Some("AN{inputs}".into());
        assert_matches!(
            validate_product_shape(&card, Some(&family)),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            validate_product_shape(&input(1), Some(&family)),
            Err(ServiceError::ValidationError(_))
        );
        assert_eq!(
            validate_product_shape(&input(1), None).unwrap(),
            ProductLevel::AssetFamily
        );
    }

    #[test]
    fn chassis_requires_slots_and_prefix() {
        let family = model(1, None, 1, "family");
        let mut chassis = input(2);
        chassis.part_number_code = Some("QTMS-".into());
        assert!(validate_product_shape(&chassis, Some(&family)).is_err());
        chassis.slot_count = Some(6);
        assert_eq!(
            validate_product_shape(&chassis, Some(&family)).unwrap(),
            ProductLevel::Chassis
        );
        chassis.slot_count = Some(MAX_SLOT_COUNT + 1);
        assert!(validate_product_shape(&chassis, Some(&family)).is_err());
    }

    #[test]
    fn card_template_is_checked() {
        let chassis = model(2, Some(1), 2, "chassis");
        let mut card = input(3);
        card.part_number_code = Some("AN{outputs}".into());
        assert_matches!(
            validate_product_shape(&card, Some(&chassis)),
            Err(ServiceError::ValidationError(_))
        );
        card.part_number_code = Some("AN{inputs}".into());
        assert!(validate_product_shape(&card, Some(&chassis)).is_ok());
    }

    #[test]
    fn level_specific_fields_are_rejected_elsewhere() {
        let mut family = input(1);
        family.slot_count = Some(4);
        assert!(validate_product_shape(&family, None).is_err());
    }

    #[test]
    fn disabled_ancestor_disables_descendants() {
        let mut family = model(1, None, 1, "family");
        let chassis = model(2, Some(1), 2, "chassis");
        let card = model(3, Some(2), 3, "card");
        family.enabled = false;
        let map: HashMap<_, _> = [family, chassis, card]
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        assert!(!effective_enabled(Uuid::from_u128(3), &map));
        assert!(!effective_enabled(Uuid::from_u128(99), &map));
        assert_matches!(
            ensure_usable(&[Uuid::from_u128(3)], &map),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn tree_nests_and_filters() {
        let family = model(1, None, 1, "family");
        let mut chassis_b = model(2, Some(1), 2, "B chassis");
        let chassis_a = model(3, Some(1), 2, "A chassis");
        let card = model(4, Some(2), 3, "card");
        chassis_b.enabled = false;

        let all = build_tree(vec![card.clone(), chassis_b.clone(), family.clone(), chassis_a.clone()], true);
        assert_eq!(all.len(), 1);
        let names: Vec<_> = all[0].children.iter().map(|n| n.product.name.as_str()).collect();
        assert_eq!(names, vec!["A chassis", "B chassis"]);
        assert!(!all[0].children[1].children[0].effective_enabled);

        let enabled = build_tree(vec![card, chassis_b, family, chassis_a], false);
        assert_eq!(enabled[0].children.len(), 1);
    }
}
