use crate::entities::{order, order_item, Order};
use crate::errors::ServiceError;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
    SqlErr, TransactionTrait,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub total_amount: Decimal,
    pub currency: String,
    pub checkout_session_id: String,
    pub items: Vec<NewOrderItem>,
}

/// Result of an idempotent order insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(Uuid),
    /// An order for this checkout session already exists.
    Exists(Uuid),
}

impl InsertOutcome {
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Inserted(id) | Self::Exists(id) => *id,
        }
    }
}

/// Persistence boundary for orders. Injected as a trait object so tests can
/// substitute an in-memory fake.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts the order unless one already exists for the same checkout
    /// session. Callers get the surviving order's id either way, so repeated
    /// reconciliation callbacks never create duplicates.
    async fn insert_if_absent(&self, order: NewOrder) -> Result<InsertOutcome, ServiceError>;

    async fn find_by_session(
        &self,
        checkout_session_id: &str,
    ) -> Result<Option<order::Model>, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct SeaOrmOrderStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmOrderStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn try_insert(&self, new: &NewOrder) -> Result<Uuid, DbErr> {
        let txn = self.db.begin().await?;

        let order_id = Uuid::new_v4();
        let model = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(new.user_id),
            total_amount: Set(new.total_amount),
            currency: Set(new.currency.clone()),
            checkout_session_id: Set(new.checkout_session_id.clone()),
            created_at: Set(Utc::now()),
        };
        model.insert(&txn).await?;

        for item in &new.items {
            let item_model = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                price: Set(item.price),
            };
            item_model.insert(&txn).await?;
        }

        txn.commit().await?;
        Ok(order_id)
    }
}

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    async fn insert_if_absent(&self, new: NewOrder) -> Result<InsertOutcome, ServiceError> {
        if let Some(existing) = self.find_by_session(&new.checkout_session_id).await? {
            return Ok(InsertOutcome::Exists(existing.id));
        }

        match self.try_insert(&new).await {
            Ok(order_id) => Ok(InsertOutcome::Inserted(order_id)),
            // A concurrent reconcile won the race; the unique index on
            // checkout_session_id is the source of truth.
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                info!(
                    session_id = %new.checkout_session_id,
                    "order insert lost a race, returning existing order"
                );
                let existing = self
                    .find_by_session(&new.checkout_session_id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(
                            "order vanished after unique-constraint conflict".to_string(),
                        )
                    })?;
                Ok(InsertOutcome::Exists(existing.id))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_by_session(
        &self,
        checkout_session_id: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        let found = Order::find()
            .filter(order::Column::CheckoutSessionId.eq(checkout_session_id))
            .one(&*self.db)
            .await?;
        Ok(found)
    }
}
