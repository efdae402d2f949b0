use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Role;
use crate::workflow::WorkflowState;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sender plus the receiving end to hand to [`process_events`]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Like [`send`](Self::send) but only logs failures. Used after a
    /// transaction has committed, when the caller can no longer roll back.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "dropping domain event");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    QuoteCreated {
        quote_id: Uuid,
        quote_number: String,
        created_by: Uuid,
    },
    QuoteUpdated {
        quote_id: Uuid,
        version: i32,
    },
    QuoteStateChanged {
        quote_id: Uuid,
        quote_number: String,
        from: WorkflowState,
        to: WorkflowState,
        actor: Uuid,
        requires_finance_approval: bool,
    },
    QuoteDeleted(Uuid),

    ProductCreated {
        product_id: Uuid,
        level: i32,
    },
    ProductEnabledChanged {
        product_id: Uuid,
        enabled: bool,
    },

    MarginSettingsUpdated {
        threshold_percent: Decimal,
        updated_by: Uuid,
    },

    ProfileRoleChanged {
        profile_id: Uuid,
        role: Role,
    },
}

/// Role that should hear about an event, if anyone does. Delivery itself
/// happens outside this service.
pub fn notification_audience(event: &Event) -> Option<Role> {
    match event {
        Event::QuoteStateChanged { to, .. } => match to {
            WorkflowState::Submitted | WorkflowState::AdminReview => Some(Role::Admin),
            WorkflowState::FinanceReview => Some(Role::Finance),
            WorkflowState::Approved | WorkflowState::Rejected | WorkflowState::NeedsRevision => {
                Some(Role::Sales)
            }
            WorkflowState::Draft | WorkflowState::Closed => None,
        },
        _ => None,
    }
}

/// Drains the event channel, logging each event and its notification
/// audience. Returns when every sender has been dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::QuoteStateChanged {
                quote_id,
                quote_number,
                from,
                to,
                actor,
                ..
            } => {
                info!(
                    %quote_id,
                    %quote_number,
                    %from,
                    %to,
                    %actor,
                    audience = ?notification_audience(&event),
                    "quote workflow transition"
                );
            }
            other => info!(event = ?other, "domain event"),
        }
    }

    info!("Event processing loop stopped");
}
