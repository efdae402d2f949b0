use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::{consts as perm, AuthUser},
    bom::part_number::{DEFAULT_EMPTY_SLOT_CODE, DEFAULT_REMOTE_DISPLAY_SUFFIX},
    db::DbPool,
    entities::margin_settings::{self, Entity as MarginSettings, SETTINGS_ROW_ID},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateMarginSettings {
    /// Percent; quotes whose discounted margin is below it need finance sign-off
    pub threshold_percent: Decimal,
    #[validate(length(min = 1, max = 16))]
    pub remote_display_suffix: Option<String>,
    #[validate(length(min = 1, max = 8))]
    pub empty_slot_code: Option<String>,
}

/// Settings used when no admin has saved any yet
pub fn default_settings(threshold_percent: Decimal) -> margin_settings::Model {
    margin_settings::Model {
        id: SETTINGS_ROW_ID,
        threshold_percent,
        remote_display_suffix: DEFAULT_REMOTE_DISPLAY_SUFFIX.to_string(),
        empty_slot_code: DEFAULT_EMPTY_SLOT_CODE.to_string(),
        updated_by: None,
        updated_at: Utc::now(),
    }
}

/// Reads the settings row, falling back to defaults built from
/// `default_threshold`. Works inside or outside a transaction.
pub async fn load_settings<C>(
    conn: &C,
    default_threshold: Decimal,
) -> Result<margin_settings::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let stored = MarginSettings::find_by_id(SETTINGS_ROW_ID)
        .one(conn)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to load margin settings");
            ServiceError::DatabaseError(e)
        })?;
    Ok(stored.unwrap_or_else(|| default_settings(default_threshold)))
}

pub fn validate_threshold(threshold: Decimal) -> Result<(), ServiceError> {
    if threshold < Decimal::ZERO || threshold > Decimal::ONE_HUNDRED {
        return Err(ServiceError::ValidationError(format!(
            "threshold_percent must be between 0 and 100, got {}",
            threshold
        )));
    }
    Ok(())
}

/// Margin threshold and part-number formatting settings
#[derive(Clone)]
pub struct SettingsService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    default_threshold: Decimal,
}

impl SettingsService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        default_threshold: Decimal,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            default_threshold,
        }
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn get_margin_settings(
        &self,
        actor: &AuthUser,
    ) -> Result<margin_settings::Model, ServiceError> {
        actor.require(perm::SETTINGS_READ)?;
        load_settings(&*self.db_pool, self.default_threshold).await
    }

    #[instrument(skip(self, actor, input), fields(user_id = %actor.user_id))]
    pub async fn update_margin_settings(
        &self,
        actor: &AuthUser,
        input: UpdateMarginSettings,
    ) -> Result<margin_settings::Model, ServiceError> {
        actor.require(perm::SETTINGS_MANAGE)?;
        input.validate()?;
        validate_threshold(input.threshold_percent)?;

        let threshold = input.threshold_percent.round_dp(2);
        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let existing = MarginSettings::find_by_id(SETTINGS_ROW_ID)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        let saved = match existing {
            Some(current) => {
                let mut active: margin_settings::ActiveModel = current.into();
                active.threshold_percent = Set(threshold);
                if let Some(suffix) = input.remote_display_suffix {
                    active.remote_display_suffix = Set(suffix);
                }
                if let Some(code) = input.empty_slot_code {
                    active.empty_slot_code = Set(code);
                }
                active.updated_by = Set(Some(actor.user_id));
                active.updated_at = Set(Utc::now());
                active.update(&txn).await
            }
            None => {
                margin_settings::ActiveModel {
                    id: Set(SETTINGS_ROW_ID),
                    threshold_percent: Set(threshold),
                    remote_display_suffix: Set(input
                        .remote_display_suffix
                        .unwrap_or_else(|| DEFAULT_REMOTE_DISPLAY_SUFFIX.to_string())),
                    empty_slot_code: Set(input
                        .empty_slot_code
                        .unwrap_or_else(|| DEFAULT_EMPTY_SLOT_CODE.to_string())),
                    updated_by: Set(Some(actor.user_id)),
                    updated_at: Set(Utc::now()),
                }
                .insert(&txn)
                .await
            }
        }
        .map_err(|e| {
            error!(error = %e, "Failed to save margin settings");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(threshold = %saved.threshold_percent, "Margin settings updated");
        self.event_sender
            .send_or_log(Event::MarginSettingsUpdated {
                threshold_percent: saved.threshold_percent,
                updated_by: actor.user_id,
            })
            .await;

        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn threshold_bounds() {
        assert!(validate_threshold(dec!(0)).is_ok());
        assert!(validate_threshold(dec!(100)).is_ok());
        assert!(validate_threshold(dec!(-0.01)).is_err());
        assert!(validate_threshold(dec!(100.5)).is_err());
    }

    #[test]
    fn defaults_use_standard_codes() {
        let s = default_settings(dec!(25));
        assert_eq!(s.part_number_options().empty_slot_code, "X");
        assert_eq!(s.policy().threshold_percent, dec!(25));
    }
}
