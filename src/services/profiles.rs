use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{consts as perm, AuthUser, Role},
    db::DbPool,
    entities::profile::{self, Column as ProfileColumn, Entity as Profile},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct UpdateRoleInput {
    pub role: Role,
}

/// Directory of users known to the quoting tool. The token's role is what
/// authorizes requests; the stored role is what the identity provider
/// reads back when minting tokens.
#[derive(Clone)]
pub struct ProfileService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl ProfileService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Returns the caller's profile, creating it on first sight
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn me(&self, actor: &AuthUser) -> Result<profile::Model, ServiceError> {
        let db = &*self.db_pool;
        if let Some(existing) = Profile::find_by_id(actor.user_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
        {
            return Ok(existing);
        }

        let email = actor.email.clone().ok_or_else(|| {
            ServiceError::ValidationError("token carries no email to create a profile".into())
        })?;

        let created = profile::ActiveModel {
            id: Set(actor.user_id),
            email: Set(email.to_lowercase()),
            full_name: Set(None),
            role: Set(actor.role.to_string()),
            active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(db)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create profile");
            ServiceError::DatabaseError(e)
        })?;

        info!(profile_id = %created.id, role = %created.role, "Profile created");
        Ok(created)
    }

    #[instrument(skip(self, actor))]
    pub async fn list_profiles(&self, actor: &AuthUser) -> Result<Vec<profile::Model>, ServiceError> {
        actor.require(perm::PROFILES_MANAGE)?;
        Profile::find()
            .order_by_asc(ProfileColumn::Email)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn set_role(
        &self,
        actor: &AuthUser,
        id: Uuid,
        role: Role,
    ) -> Result<profile::Model, ServiceError> {
        actor.require(perm::PROFILES_MANAGE)?;
        if id == actor.user_id {
            return Err(ServiceError::InvalidOperation(
                "administrators cannot change their own role".into(),
            ));
        }

        let existing = Profile::find_by_id(id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Profile {} not found", id)))?;

        let mut active: profile::ActiveModel = existing.into();
        active.role = Set(role.to_string());
        let updated = active.update(&*self.db_pool).await.map_err(|e| {
            error!(profile_id = %id, error = %e, "Failed to update role");
            ServiceError::DatabaseError(e)
        })?;

        info!(profile_id = %id, %role, "Profile role changed");
        self.event_sender
            .send_or_log(Event::ProfileRoleChanged {
                profile_id: id,
                role,
            })
            .await;

        Ok(updated)
    }
}
