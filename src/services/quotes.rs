//! Quote persistence and workflow transitions.
//!
//! Every mutation runs in a transaction, writes the legacy status together
//! with the workflow state derived from it, bumps `version` under an
//! optimistic lock and emits an event once committed.

use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{consts as perm, AuthUser, Role},
    bom::{
        self,
        part_number::{
            assemble_part_number, render_code, ChassisSpec, PartNumberOptions, SlotCard,
            TemplateValues,
        },
        BomEntry, BomError, CardPlacement, ChassisBuild, PricedItem,
    },
    db::DbPool,
    entities::{
        bom_item::{self, Column as BomItemColumn, Entity as BomItem},
        product,
        quote::{self, Column as QuoteColumn, Entity as Quote},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        catalog::{ensure_usable, load_with_ancestors, ProductLevel},
        settings::load_settings,
    },
    workflow::{
        admin_decision, allowed_actions, approval::validate_discount, authorize,
        check_finance_approval_required, derive_workflow_state, finance_decision, next_state,
        status_for, Decision, DecisionInput, DecisionOutcome, QuoteAction, QuoteFinancials,
        WorkflowState,
    },
};

fn default_quantity() -> i32 {
    1
}

/// A card seated in a chassis line
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct CardInput {
    pub product_id: Uuid,
    /// First slot the card occupies (1-based)
    pub slot: u32,
    /// Level-4 options configured on the card
    #[serde(default)]
    pub option_ids: Vec<Uuid>,
}

/// One requested line: a chassis with seated cards, or a standalone card
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct QuoteLineInput {
    pub product_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    /// Level-4 options, only for standalone card lines
    #[serde(default)]
    pub option_ids: Vec<Uuid>,
    #[serde(default)]
    pub cards: Vec<CardInput>,
    #[serde(default)]
    pub remote_display: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateQuoteInput {
    #[validate(length(min = 1, max = 255))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: Option<String>,
    #[validate(length(max = 64))]
    pub oracle_customer_id: Option<String>,
    #[validate(length(max = 64))]
    pub sfdc_opportunity: Option<String>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    #[validate(length(max = 255))]
    pub shipping_terms: Option<String>,
    #[validate(length(max = 255))]
    pub payment_terms: Option<String>,
    #[serde(default)]
    pub requested_discount: Decimal,
    #[validate(length(max = 2000))]
    pub discount_justification: Option<String>,
    #[serde(default)]
    pub lines: Vec<QuoteLineInput>,
}

/// Partial update of an editable quote. `lines`, when given, replaces all
/// line items.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateQuoteInput {
    pub expected_version: Option<i32>,
    #[validate(length(min = 1, max = 255))]
    pub customer_name: Option<String>,
    #[validate(email)]
    pub customer_email: Option<String>,
    #[validate(length(max = 64))]
    pub oracle_customer_id: Option<String>,
    #[validate(length(max = 64))]
    pub sfdc_opportunity: Option<String>,
    #[validate(length(max = 255))]
    pub shipping_terms: Option<String>,
    #[validate(length(max = 255))]
    pub payment_terms: Option<String>,
    pub requested_discount: Option<Decimal>,
    #[validate(length(max = 2000))]
    pub discount_justification: Option<String>,
    pub lines: Option<Vec<QuoteLineInput>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct DecisionRequest {
    pub decision: Decision,
    pub notes: Option<String>,
    /// Admin override of the requested discount, percent
    pub approved_discount: Option<Decimal>,
    pub discount_justification: Option<String>,
    pub expected_version: Option<i32>,
}

impl DecisionRequest {
    fn to_input(&self) -> DecisionInput {
        DecisionInput {
            decision: self.decision,
            notes: self.notes.clone(),
            approved_discount: self.approved_discount,
            justification: self.discount_justification.clone(),
        }
    }
}

/// Quote with its line items and the actions the caller may take on it
#[derive(Debug, Clone)]
pub struct QuoteDetails {
    pub quote: quote::Model,
    pub workflow_state: WorkflowState,
    pub items: Vec<bom_item::Model>,
    pub allowed_actions: Vec<QuoteAction>,
}

/// Result of configuring a single line without saving it
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LinePreview {
    pub name: String,
    pub part_number: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub unit_cost: Decimal,
    pub extended_price: Decimal,
    pub components: Vec<PreviewComponent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PreviewComponent {
    pub name: String,
    pub part_number: Option<String>,
    pub slot: Option<u32>,
    pub span: Option<u32>,
    pub quantity: i32,
}

pub fn format_quote_number(year: i32, sequence: u32) -> String {
    format!("Q-{}-{:04}", year, sequence)
}

/// Sequence part of a quote number issued in `year`
pub fn parse_quote_sequence(quote_number: &str, year: i32) -> Option<u32> {
    quote_number
        .strip_prefix(&format!("Q-{}-", year))?
        .parse()
        .ok()
}

/// Next number after the highest one already issued this year
pub fn next_quote_number<'a, I>(year: i32, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let highest = existing
        .into_iter()
        .filter_map(|n| parse_quote_sequence(n, year))
        .max()
        .unwrap_or(0);
    format_quote_number(year, highest + 1)
}

fn lookup(
    products: &HashMap<Uuid, product::Model>,
    id: Uuid,
) -> Result<&product::Model, ServiceError> {
    products
        .get(&id)
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
}

fn count(value: Option<i32>) -> u32 {
    value.map(|v| v.max(0) as u32).unwrap_or(0)
}

/// Configured card: rendered code, price with options, configuration JSON
struct ConfiguredCard {
    code: String,
    unit_price: Decimal,
    unit_cost: Decimal,
    configuration: Option<serde_json::Value>,
}

fn configure_card(
    card: &product::Model,
    option_ids: &[Uuid],
    products: &HashMap<Uuid, product::Model>,
) -> Result<ConfiguredCard, ServiceError> {
    let mut unit_price = card.price;
    let mut unit_cost = card.cost;
    let mut inputs: Option<u32> = None;
    let mut bushings: Option<u32> = None;

    for option_id in option_ids {
        let option = lookup(products, *option_id)?;
        if option.level != ProductLevel::OptionSet.as_i32() || option.parent_id != Some(card.id) {
            return Err(ServiceError::ValidationError(format!(
                "'{}' is not an option of card '{}'",
                option.name, card.name
            )));
        }
        unit_price += option.price;
        unit_cost += option.cost;
        if option.input_count.is_some() {
            inputs = Some(inputs.unwrap_or(0).saturating_add(count(option.input_count)));
        }
        if option.bushing_count.is_some() {
            bushings = Some(bushings.unwrap_or(0).saturating_add(count(option.bushing_count)));
        }
    }

    let values = TemplateValues { inputs, bushings };
    let code = render_code(card.part_number_code.as_deref().unwrap_or_default(), &values)?;
    let configuration = (!option_ids.is_empty()).then(|| {
        json!({
            "options": option_ids,
            "inputs": inputs,
            "bushings": bushings,
        })
    });

    Ok(ConfiguredCard {
        code,
        unit_price,
        unit_cost,
        configuration,
    })
}

fn build_chassis(
    line: &QuoteLineInput,
    chassis: &product::Model,
    products: &HashMap<Uuid, product::Model>,
    options: &PartNumberOptions,
) -> Result<BomEntry, ServiceError> {
    if !line.option_ids.is_empty() {
        return Err(ServiceError::ValidationError(format!(
            "options belong to cards, not to chassis '{}'",
            chassis.name
        )));
    }

    let mut placements = Vec::with_capacity(line.cards.len());
    let mut slot_cards = Vec::with_capacity(line.cards.len());
    for card_input in &line.cards {
        let card = lookup(products, card_input.product_id)?;
        if card.level != ProductLevel::Card.as_i32() || card.parent_id != Some(chassis.id) {
            return Err(ServiceError::ValidationError(format!(
                "'{}' is not a card for chassis '{}'",
                card.name, chassis.name
            )));
        }
        let configured = configure_card(card, &card_input.option_ids, products)?;
        let span = count(card.slot_span).max(1);

        slot_cards.push(SlotCard {
            slot: card_input.slot,
            span,
            code_template: configured.code.clone(),
            values: TemplateValues::default(),
        });
        placements.push(CardPlacement {
            slot: card_input.slot,
            span,
            item: PricedItem {
                product_id: card.id,
                name: card.name.clone(),
                part_number: Some(configured.code),
                quantity: 1,
                unit_price: configured.unit_price,
                unit_cost: configured.unit_cost,
                configuration: configured.configuration,
            },
        });
    }

    let spec = ChassisSpec {
        prefix: chassis.part_number_code.clone().unwrap_or_default(),
        slot_count: count(chassis.slot_count),
    };
    let part_number = assemble_part_number(&spec, &slot_cards, line.remote_display, options)
        .map_err(|source| BomError::Slots {
            name: chassis.name.clone(),
            source,
        })?;

    Ok(BomEntry::Chassis(ChassisBuild {
        chassis: PricedItem {
            product_id: chassis.id,
            name: chassis.name.clone(),
            part_number: Some(part_number),
            quantity: line.quantity,
            unit_price: chassis.price,
            unit_cost: chassis.cost,
            configuration: line
                .remote_display
                .then(|| json!({ "remote_display": true })),
        },
        slot_count: spec.slot_count,
        cards: placements,
        remote_display: line.remote_display,
    }))
}

/// Turns requested lines into priced BOM entries. `products` must hold
/// every referenced product.
pub fn build_entries(
    lines: &[QuoteLineInput],
    products: &HashMap<Uuid, product::Model>,
    options: &PartNumberOptions,
) -> Result<Vec<BomEntry>, ServiceError> {
    lines
        .iter()
        .map(|line| {
            let product = lookup(products, line.product_id)?;
            match ProductLevel::from_i32(product.level)? {
                ProductLevel::Chassis => build_chassis(line, product, products, options),
                ProductLevel::Card => {
                    if !line.cards.is_empty() || line.remote_display {
                        return Err(ServiceError::ValidationError(format!(
                            "card '{}' cannot hold other cards or a remote display",
                            product.name
                        )));
                    }
                    let configured = configure_card(product, &line.option_ids, products)?;
                    Ok(BomEntry::Item(PricedItem {
                        product_id: product.id,
                        name: product.name.clone(),
                        part_number: Some(configured.code),
                        quantity: line.quantity,
                        unit_price: configured.unit_price,
                        unit_cost: configured.unit_cost,
                        configuration: configured.configuration,
                    }))
                }
                level => Err(ServiceError::ValidationError(format!(
                    "'{}' is a {} and cannot be quoted directly",
                    product.name, level
                ))),
            }
        })
        .collect()
}

/// Every product id a set of lines refers to
pub fn referenced_products(lines: &[QuoteLineInput]) -> Vec<Uuid> {
    let mut ids = Vec::new();
    for line in lines {
        ids.push(line.product_id);
        ids.extend(&line.option_ids);
        for card in &line.cards {
            ids.push(card.product_id);
            ids.extend(&card.option_ids);
        }
    }
    ids.sort();
    ids.dedup();
    ids
}

fn preview_of(entry: &BomEntry) -> Result<LinePreview, BomError> {
    let components = bom::flatten(std::slice::from_ref(entry))?
        .into_iter()
        .skip(1)
        .map(|line| PreviewComponent {
            name: line.item.name,
            part_number: line.item.part_number,
            slot: line.slot,
            span: line.span,
            quantity: line.item.quantity,
        })
        .collect();
    let head = match entry {
        BomEntry::Item(item) => item,
        BomEntry::Chassis(build) => &build.chassis,
    };
    Ok(LinePreview {
        name: head.name.clone(),
        part_number: head.part_number.clone(),
        quantity: entry.quantity(),
        unit_price: entry.unit_price(),
        unit_cost: entry.unit_cost(),
        extended_price: entry.extended_price(),
        components,
    })
}

fn db_err(context: &'static str) -> impl Fn(sea_orm::DbErr) -> ServiceError {
    move |e| {
        error!(error = %e, "{}", context);
        ServiceError::DatabaseError(e)
    }
}

fn check_version(quote: &quote::Model, expected: Option<i32>) -> Result<(), ServiceError> {
    match expected {
        Some(v) if v != quote.version => {
            warn!(quote_id = %quote.id, expected = v, actual = quote.version, "stale quote version");
            Err(ServiceError::ConcurrentModification(quote.id))
        }
        _ => Ok(()),
    }
}

fn can_read(actor: &AuthUser, quote: &quote::Model) -> bool {
    actor.has_permission(perm::QUOTES_READ_ALL)
        || (actor.has_permission(perm::QUOTES_READ_OWN) && quote.created_by == actor.user_id)
}

/// Sales act on their own quotes only; admins on any
fn ensure_owner(actor: &AuthUser, quote: &quote::Model) -> Result<(), ServiceError> {
    if actor.is_admin() || quote.created_by == actor.user_id {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "quote {} belongs to another user",
            quote.quote_number
        )))
    }
}

fn caller_actions(actor: &AuthUser, quote: &quote::Model, state: WorkflowState) -> Vec<QuoteAction> {
    let owns = actor.is_admin() || quote.created_by == actor.user_id;
    allowed_actions(state, actor.role, quote.requires_finance_approval)
        .into_iter()
        .filter(|action| {
            owns || !matches!(action, QuoteAction::Submit | QuoteAction::Close)
        })
        .collect()
}

/// Actions `actor` may take next on `quote`
pub fn actions_for(actor: &AuthUser, quote: &quote::Model) -> Result<Vec<QuoteAction>, ServiceError> {
    let state = quote.derived_state()?;
    Ok(caller_actions(actor, quote, state))
}

/// Deletes and rewrites the quote's line items
async fn replace_items(
    txn: &DatabaseTransaction,
    quote_id: Uuid,
    entries: &[BomEntry],
) -> Result<(), ServiceError> {
    BomItem::delete_many()
        .filter(BomItemColumn::QuoteId.eq(quote_id))
        .exec(txn)
        .await
        .map_err(db_err("Failed to clear quote items"))?;

    let lines = bom::flatten(entries)?;
    if lines.is_empty() {
        return Ok(());
    }

    let ids: Vec<Uuid> = lines.iter().map(|_| Uuid::new_v4()).collect();
    let now = Utc::now();
    let models: Vec<bom_item::ActiveModel> = lines
        .into_iter()
        .enumerate()
        .map(|(position, line)| {
            let total = line.item.unit_price * Decimal::from(line.item.quantity);
            bom_item::ActiveModel {
                id: Set(ids[position]),
                quote_id: Set(quote_id),
                parent_item_id: Set(line.parent.map(|p| ids[p])),
                product_id: Set(line.item.product_id),
                name: Set(line.item.name),
                part_number: Set(line.item.part_number),
                quantity: Set(line.item.quantity),
                unit_price: Set(line.item.unit_price),
                unit_cost: Set(line.item.unit_cost),
                total_price: Set(total),
                slot_number: Set(line.slot.map(|s| s as i32)),
                slot_span: Set(line.span.map(|s| s as i32)),
                configuration: Set(line.item.configuration),
                position: Set(position as i32),
                created_at: Set(now),
            }
        })
        .collect();

    BomItem::insert_many(models)
        .exec(txn)
        .await
        .map_err(db_err("Failed to insert quote items"))?;
    Ok(())
}

fn set_financials(active: &mut quote::ActiveModel, financials: &QuoteFinancials) {
    active.original_value = Set(financials.original_value);
    active.discounted_value = Set(financials.discounted_value);
    active.total_cost = Set(financials.total_cost);
    active.gross_profit = Set(financials.gross_profit);
    active.original_margin = Set(financials.original_margin);
    active.discounted_margin = Set(financials.discounted_margin);
    active.requested_discount = Set(financials.discount_percent);
}

/// Applies the financial side of a review decision
fn decided(current: &quote::Model, outcome: &DecisionOutcome) -> quote::ActiveModel {
    let mut active: quote::ActiveModel = current.clone().into();
    set_financials(&mut active, &outcome.financials);
    active.discount_justification = Set(outcome.discount_justification.clone());
    active
}

/// Writes `state` with its legacy status under the optimistic lock and
/// returns the stored row.
async fn persist_state(
    txn: &DatabaseTransaction,
    current: &quote::Model,
    state: WorkflowState,
    requires_finance_approval: bool,
    mut active: quote::ActiveModel,
) -> Result<quote::Model, ServiceError> {
    let status = status_for(state);
    let derived = derive_workflow_state(status, requires_finance_approval);
    if derived != state {
        return Err(ServiceError::InternalError(format!(
            "status {} with finance flag {} derives {}, not {}",
            status, requires_finance_approval, derived, state
        )));
    }

    active.status = Set(status.to_string());
    active.workflow_state = Set(state.to_string());
    active.requires_finance_approval = Set(requires_finance_approval);
    active.version = Set(current.version + 1);
    active.updated_at = Set(Utc::now());

    let result = Quote::update_many()
        .set(active)
        .filter(QuoteColumn::Id.eq(current.id))
        .filter(QuoteColumn::Version.eq(current.version))
        .exec(txn)
        .await
        .map_err(db_err("Failed to update quote"))?;
    if result.rows_affected != 1 {
        return Err(ServiceError::ConcurrentModification(current.id));
    }

    Quote::find_by_id(current.id)
        .one(txn)
        .await
        .map_err(db_err("Failed to reload quote"))?
        .ok_or_else(|| ServiceError::NotFound(format!("Quote {} not found", current.id)))
}

/// Service for creating quotes and moving them through review
#[derive(Clone)]
pub struct QuoteService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    default_threshold: Decimal,
    default_currency: String,
}

impl QuoteService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        default_threshold: Decimal,
        default_currency: String,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            default_threshold,
            default_currency,
        }
    }

    async fn begin(&self) -> Result<DatabaseTransaction, ServiceError> {
        self.db_pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))
    }

    async fn find<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<quote::Model, ServiceError> {
        Quote::find_by_id(id)
            .one(conn)
            .await
            .map_err(db_err("Failed to load quote"))?
            .ok_or_else(|| ServiceError::NotFound(format!("Quote {} not found", id)))
    }

    /// Validates lines against the catalog and prices them
    async fn price_lines<C: ConnectionTrait>(
        conn: &C,
        lines: &[QuoteLineInput],
        options: &PartNumberOptions,
    ) -> Result<Vec<BomEntry>, ServiceError> {
        if lines.is_empty() {
            return Ok(Vec::new());
        }
        let ids = referenced_products(lines);
        let products = load_with_ancestors(conn, &ids).await?;
        ensure_usable(&ids, &products)?;

        let entries = build_entries(lines, &products, options)?;
        bom::validate_entries(&entries)?;
        Ok(bom::consolidate(entries)?)
    }

    #[instrument(skip(self, actor, input), fields(user_id = %actor.user_id))]
    pub async fn create_quote(
        &self,
        actor: &AuthUser,
        input: CreateQuoteInput,
    ) -> Result<quote::Model, ServiceError> {
        actor.require(perm::QUOTES_CREATE)?;
        input.validate()?;
        validate_discount(input.requested_discount, input.discount_justification.as_deref())?;

        let txn = self.begin().await?;
        let settings = load_settings(&txn, self.default_threshold).await?;
        let entries = Self::price_lines(&txn, &input.lines, &settings.part_number_options()).await?;
        let totals = bom::totals(&entries);
        let financials =
            QuoteFinancials::compute(totals.total_price, totals.total_cost, input.requested_discount);
        let requires_finance =
            check_finance_approval_required(financials.discounted_margin, &settings.policy());

        let now = Utc::now();
        let year = now.year();
        let issued: Vec<String> = Quote::find()
            .select_only()
            .column(QuoteColumn::QuoteNumber)
            .filter(QuoteColumn::QuoteNumber.starts_with(format!("Q-{}-", year)))
            .into_tuple()
            .all(&txn)
            .await
            .map_err(db_err("Failed to read quote numbers"))?;
        let quote_number = next_quote_number(year, issued.iter().map(String::as_str));

        let state = WorkflowState::Draft;
        let quote_id = Uuid::new_v4();
        let model = quote::ActiveModel {
            id: Set(quote_id),
            quote_number: Set(quote_number.clone()),
            customer_name: Set(input.customer_name.trim().to_string()),
            customer_email: Set(input.customer_email),
            oracle_customer_id: Set(input.oracle_customer_id),
            sfdc_opportunity: Set(input.sfdc_opportunity),
            status: Set(status_for(state).to_string()),
            workflow_state: Set(state.to_string()),
            requires_finance_approval: Set(requires_finance),
            original_value: Set(financials.original_value),
            discounted_value: Set(financials.discounted_value),
            total_cost: Set(financials.total_cost),
            gross_profit: Set(financials.gross_profit),
            original_margin: Set(financials.original_margin),
            discounted_margin: Set(financials.discounted_margin),
            requested_discount: Set(financials.discount_percent),
            discount_justification: Set(input.discount_justification),
            currency: Set(input
                .currency
                .map(|c| c.to_uppercase())
                .unwrap_or_else(|| self.default_currency.clone())),
            shipping_terms: Set(input.shipping_terms),
            payment_terms: Set(input.payment_terms),
            created_by: Set(actor.user_id),
            submitted_at: Set(None),
            reviewed_by: Set(None),
            reviewed_at: Set(None),
            review_notes: Set(None),
            finance_reviewed_by: Set(None),
            finance_reviewed_at: Set(None),
            finance_notes: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            version: Set(1),
        };

        let created = model.insert(&txn).await.map_err(|e| {
            if let Some(SqlErr::UniqueConstraintViolation(_)) = e.sql_err() {
                return ServiceError::Conflict(format!(
                    "quote number {} was taken concurrently, retry",
                    quote_number
                ));
            }
            error!(error = %e, "Failed to create quote");
            ServiceError::DatabaseError(e)
        })?;
        replace_items(&txn, quote_id, &entries).await?;

        txn.commit()
            .await
            .map_err(db_err("Failed to commit quote"))?;

        info!(quote_id = %created.id, quote_number = %created.quote_number, "Quote created");
        self.event_sender
            .send_or_log(Event::QuoteCreated {
                quote_id: created.id,
                quote_number: created.quote_number.clone(),
                created_by: actor.user_id,
            })
            .await;

        Ok(created)
    }

    #[instrument(skip(self, actor, input), fields(user_id = %actor.user_id))]
    pub async fn update_quote(
        &self,
        actor: &AuthUser,
        id: Uuid,
        input: UpdateQuoteInput,
    ) -> Result<quote::Model, ServiceError> {
        actor.require(perm::QUOTES_CREATE)?;
        input.validate()?;

        let txn = self.begin().await?;
        let current = Self::find(&txn, id).await?;
        ensure_owner(actor, &current)?;
        check_version(&current, input.expected_version)?;

        let state = current.derived_state()?;
        if !state.is_editable() {
            return Err(ServiceError::InvalidOperation(format!(
                "quote {} cannot be edited in state {}",
                current.quote_number, state
            )));
        }

        let settings = load_settings(&txn, self.default_threshold).await?;
        let discount = input.requested_discount.unwrap_or(current.requested_discount);
        let justification = input
            .discount_justification
            .clone()
            .or_else(|| current.discount_justification.clone());
        validate_discount(discount, justification.as_deref())?;

        let (original_value, total_cost) = match &input.lines {
            Some(lines) => {
                let entries =
                    Self::price_lines(&txn, lines, &settings.part_number_options()).await?;
                replace_items(&txn, id, &entries).await?;
                let totals = bom::totals(&entries);
                (totals.total_price, totals.total_cost)
            }
            None => (current.original_value, current.total_cost),
        };
        let financials = QuoteFinancials::compute(original_value, total_cost, discount);
        let requires_finance =
            check_finance_approval_required(financials.discounted_margin, &settings.policy());

        let mut active: quote::ActiveModel = current.clone().into();
        set_financials(&mut active, &financials);
        active.discount_justification = Set(justification);
        if let Some(name) = input.customer_name {
            active.customer_name = Set(name.trim().to_string());
        }
        if input.customer_email.is_some() {
            active.customer_email = Set(input.customer_email);
        }
        if input.oracle_customer_id.is_some() {
            active.oracle_customer_id = Set(input.oracle_customer_id);
        }
        if input.sfdc_opportunity.is_some() {
            active.sfdc_opportunity = Set(input.sfdc_opportunity);
        }
        if input.shipping_terms.is_some() {
            active.shipping_terms = Set(input.shipping_terms);
        }
        if input.payment_terms.is_some() {
            active.payment_terms = Set(input.payment_terms);
        }

        let updated = persist_state(&txn, &current, state, requires_finance, active).await?;
        txn.commit()
            .await
            .map_err(db_err("Failed to commit quote update"))?;

        info!(quote_id = %id, version = updated.version, "Quote updated");
        self.event_sender
            .send_or_log(Event::QuoteUpdated {
                quote_id: id,
                version: updated.version,
            })
            .await;

        Ok(updated)
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn get_quote(&self, actor: &AuthUser, id: Uuid) -> Result<QuoteDetails, ServiceError> {
        let db = &*self.db_pool;
        let quote = Self::find(db, id).await?;
        if !can_read(actor, &quote) {
            return Err(ServiceError::Forbidden(format!(
                "quote {} is not visible to this user",
                quote.quote_number
            )));
        }

        let items = BomItem::find()
            .filter(BomItemColumn::QuoteId.eq(id))
            .order_by_asc(BomItemColumn::Position)
            .all(db)
            .await
            .map_err(db_err("Failed to load quote items"))?;

        let state = quote.derived_state()?;
        let allowed_actions = caller_actions(actor, &quote, state);
        Ok(QuoteDetails {
            quote,
            workflow_state: state,
            items,
            allowed_actions,
        })
    }

    /// Lists quotes, newest first. Users without read-all see only their own.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn list_quotes(
        &self,
        actor: &AuthUser,
        state: Option<WorkflowState>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<quote::Model>, u64), ServiceError> {
        let mut query = Quote::find();
        if !actor.has_permission(perm::QUOTES_READ_ALL) {
            actor.require(perm::QUOTES_READ_OWN)?;
            query = query.filter(QuoteColumn::CreatedBy.eq(actor.user_id));
        }
        if let Some(state) = state {
            query = query.filter(QuoteColumn::WorkflowState.eq(state.to_string()));
        }

        let paginator = query
            .order_by_desc(QuoteColumn::CreatedAt)
            .paginate(&*self.db_pool, limit.max(1));
        let total = paginator
            .num_items()
            .await
            .map_err(db_err("Failed to count quotes"))?;
        let quotes = paginator
            .fetch_page(page.max(1) - 1)
            .await
            .map_err(db_err("Failed to fetch quotes"))?;

        Ok((quotes, total))
    }

    async fn finish_transition(
        &self,
        txn: DatabaseTransaction,
        actor: &AuthUser,
        current: &quote::Model,
        to: WorkflowState,
        requires_finance_approval: bool,
        active: quote::ActiveModel,
    ) -> Result<quote::Model, ServiceError> {
        let from = current.derived_state()?;
        let updated = persist_state(&txn, current, to, requires_finance_approval, active).await?;
        txn.commit()
            .await
            .map_err(db_err("Failed to commit quote transition"))?;

        info!(
            quote_id = %updated.id,
            from = %from,
            to = %to,
            requires_finance_approval,
            "Quote state changed"
        );
        self.event_sender
            .send_or_log(Event::QuoteStateChanged {
                quote_id: updated.id,
                quote_number: updated.quote_number.clone(),
                from,
                to,
                actor: actor.user_id,
                requires_finance_approval,
            })
            .await;

        Ok(updated)
    }

    /// Sends a draft (or revised) quote for review. The margin gate is
    /// re-run against the current threshold.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn submit_quote(
        &self,
        actor: &AuthUser,
        id: Uuid,
        expected_version: Option<i32>,
    ) -> Result<quote::Model, ServiceError> {
        actor.require(perm::QUOTES_CREATE)?;
        let txn = self.begin().await?;
        let current = Self::find(&txn, id).await?;
        ensure_owner(actor, &current)?;
        check_version(&current, expected_version)?;

        let from = current.derived_state()?;
        authorize(actor.role, from, QuoteAction::Submit)?;
        let to = next_state(from, QuoteAction::Submit, current.requires_finance_approval)?;

        let item_count = BomItem::find()
            .filter(BomItemColumn::QuoteId.eq(id))
            .count(&txn)
            .await
            .map_err(db_err("Failed to count quote items"))?;
        if item_count == 0 {
            return Err(BomError::Empty.into());
        }
        validate_discount(
            current.requested_discount,
            current.discount_justification.as_deref(),
        )?;

        let settings = load_settings(&txn, self.default_threshold).await?;
        let financials = QuoteFinancials::compute(
            current.original_value,
            current.total_cost,
            current.requested_discount,
        );
        let requires_finance =
            check_finance_approval_required(financials.discounted_margin, &settings.policy());

        let mut active: quote::ActiveModel = current.clone().into();
        set_financials(&mut active, &financials);
        active.submitted_at = Set(Some(Utc::now()));

        self.finish_transition(txn, actor, &current, to, requires_finance, active)
            .await
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn start_review(
        &self,
        actor: &AuthUser,
        id: Uuid,
        expected_version: Option<i32>,
    ) -> Result<quote::Model, ServiceError> {
        actor.require(perm::QUOTES_REVIEW)?;
        let txn = self.begin().await?;
        let current = Self::find(&txn, id).await?;
        check_version(&current, expected_version)?;

        let from = current.derived_state()?;
        authorize(actor.role, from, QuoteAction::StartReview)?;
        let to = next_state(from, QuoteAction::StartReview, current.requires_finance_approval)?;

        let mut active: quote::ActiveModel = current.clone().into();
        active.reviewed_by = Set(Some(actor.user_id));

        let requires = current.requires_finance_approval;
        self.finish_transition(txn, actor, &current, to, requires, active)
            .await
    }

    /// Admin-stage decision; may route the quote on to finance
    #[instrument(skip(self, actor, request), fields(user_id = %actor.user_id, decision = ?request.decision))]
    pub async fn admin_decision(
        &self,
        actor: &AuthUser,
        id: Uuid,
        request: DecisionRequest,
    ) -> Result<quote::Model, ServiceError> {
        actor.require(perm::QUOTES_REVIEW)?;
        let txn = self.begin().await?;
        let current = Self::find(&txn, id).await?;
        check_version(&current, request.expected_version)?;

        let snapshot = current.snapshot()?;
        let settings = load_settings(&txn, self.default_threshold).await?;
        let outcome = admin_decision(&snapshot, &request.to_input(), actor.role, &settings.policy())?;

        let mut active = decided(&current, &outcome);
        active.reviewed_by = Set(Some(actor.user_id));
        active.reviewed_at = Set(Some(Utc::now()));
        active.review_notes = Set(outcome.notes.clone());
        if actor.role == Role::Finance && outcome.next_state == WorkflowState::Approved {
            // finance approving at the admin stage is also the finance sign-off
            active.finance_reviewed_by = Set(Some(actor.user_id));
            active.finance_reviewed_at = Set(Some(Utc::now()));
            active.finance_notes = Set(outcome.notes.clone());
        }

        self.finish_transition(
            txn,
            actor,
            &current,
            outcome.next_state,
            outcome.requires_finance_approval,
            active,
        )
        .await
    }

    /// Finance sign-off on a quote whose margin fell under the threshold
    #[instrument(skip(self, actor, request), fields(user_id = %actor.user_id, decision = ?request.decision))]
    pub async fn finance_decision(
        &self,
        actor: &AuthUser,
        id: Uuid,
        request: DecisionRequest,
    ) -> Result<quote::Model, ServiceError> {
        actor.require(perm::QUOTES_FINANCE)?;
        if request.approved_discount.is_some() {
            return Err(ServiceError::ValidationError(
                "finance cannot change the discount; request a revision instead".into(),
            ));
        }

        let txn = self.begin().await?;
        let current = Self::find(&txn, id).await?;
        check_version(&current, request.expected_version)?;

        let snapshot = current.snapshot()?;
        let outcome = finance_decision(&snapshot, &request.to_input(), actor.role)?;

        let mut active = decided(&current, &outcome);
        active.finance_reviewed_by = Set(Some(actor.user_id));
        active.finance_reviewed_at = Set(Some(Utc::now()));
        active.finance_notes = Set(outcome.notes.clone());

        self.finish_transition(
            txn,
            actor,
            &current,
            outcome.next_state,
            outcome.requires_finance_approval,
            active,
        )
        .await
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn close_quote(
        &self,
        actor: &AuthUser,
        id: Uuid,
        expected_version: Option<i32>,
    ) -> Result<quote::Model, ServiceError> {
        actor.require(perm::QUOTES_CREATE)?;
        let txn = self.begin().await?;
        let current = Self::find(&txn, id).await?;
        ensure_owner(actor, &current)?;
        check_version(&current, expected_version)?;

        let from = current.derived_state()?;
        authorize(actor.role, from, QuoteAction::Close)?;
        let to = next_state(from, QuoteAction::Close, current.requires_finance_approval)?;

        let active: quote::ActiveModel = current.clone().into();
        let requires = current.requires_finance_approval;
        self.finish_transition(txn, actor, &current, to, requires, active)
            .await
    }

    /// Removes a quote that never left draft
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn delete_quote(&self, actor: &AuthUser, id: Uuid) -> Result<(), ServiceError> {
        actor.require(perm::QUOTES_CREATE)?;
        let txn = self.begin().await?;
        let current = Self::find(&txn, id).await?;
        ensure_owner(actor, &current)?;

        let state = current.derived_state()?;
        if state != WorkflowState::Draft {
            return Err(ServiceError::InvalidOperation(format!(
                "only drafts can be deleted, quote {} is {}",
                current.quote_number, state
            )));
        }

        BomItem::delete_many()
            .filter(BomItemColumn::QuoteId.eq(id))
            .exec(&txn)
            .await
            .map_err(db_err("Failed to delete quote items"))?;
        Quote::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(db_err("Failed to delete quote"))?;
        txn.commit()
            .await
            .map_err(db_err("Failed to commit quote deletion"))?;

        info!(quote_id = %id, "Draft quote deleted");
        self.event_sender.send_or_log(Event::QuoteDeleted(id)).await;
        Ok(())
    }

    /// Prices and numbers one line against the live catalog without saving
    #[instrument(skip(self, actor, line), fields(user_id = %actor.user_id))]
    pub async fn preview_line(
        &self,
        actor: &AuthUser,
        line: QuoteLineInput,
    ) -> Result<LinePreview, ServiceError> {
        actor.require(perm::PRODUCTS_READ)?;
        let db = &*self.db_pool;
        let settings = load_settings(db, self.default_threshold).await?;
        let entries =
            Self::price_lines(db, std::slice::from_ref(&line), &settings.part_number_options())
                .await?;
        let entry = entries.first().ok_or(BomError::Empty)?;
        Ok(preview_of(entry)?)
    }
}
