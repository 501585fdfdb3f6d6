use crate::entities::coupon::{self, Entity as Coupon};
use crate::errors::ServiceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

/// Payload for creating a coupon.
#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub code: String,
    pub user_id: Uuid,
    pub discount_percentage: i32,
    pub expiration_date: DateTime<Utc>,
}

/// Persistence boundary for the coupon ledger. Injected as a trait object so
/// tests can substitute an in-memory fake.
#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Looks up an active coupon by code for a specific user.
    async fn find_active(
        &self,
        code: &str,
        user_id: Uuid,
    ) -> Result<Option<coupon::Model>, ServiceError>;

    /// Returns the user's active coupon, if any.
    async fn find_active_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<coupon::Model>, ServiceError>;

    /// Deletes any coupon the user holds and inserts the new one, keeping the
    /// at-most-one-coupon-per-user invariant.
    async fn replace_for_user(&self, coupon: NewCoupon) -> Result<coupon::Model, ServiceError>;

    /// Marks the coupon inactive. Matching is on `{code, user_id}` only, so
    /// deactivating an already-inactive coupon is a no-op.
    async fn deactivate(&self, code: &str, user_id: Uuid) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone)]
pub struct SeaOrmCouponStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmCouponStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CouponStore for SeaOrmCouponStore {
    async fn find_active(
        &self,
        code: &str,
        user_id: Uuid,
    ) -> Result<Option<coupon::Model>, ServiceError> {
        let found = Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .filter(coupon::Column::UserId.eq(user_id))
            .filter(coupon::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?;
        Ok(found)
    }

    async fn find_active_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<coupon::Model>, ServiceError> {
        let found = Coupon::find()
            .filter(coupon::Column::UserId.eq(user_id))
            .filter(coupon::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?;
        Ok(found)
    }

    async fn replace_for_user(&self, new: NewCoupon) -> Result<coupon::Model, ServiceError> {
        let txn = self.db.begin().await?;

        Coupon::delete_many()
            .filter(coupon::Column::UserId.eq(new.user_id))
            .exec(&txn)
            .await?;

        let now = Utc::now();
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(new.code),
            user_id: Set(new.user_id),
            discount_percentage: Set(new.discount_percentage),
            is_active: Set(true),
            expiration_date: Set(new.expiration_date),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let inserted = model.insert(&txn).await?;

        txn.commit().await?;
        Ok(inserted)
    }

    async fn deactivate(&self, code: &str, user_id: Uuid) -> Result<(), ServiceError> {
        Coupon::update_many()
            .col_expr(coupon::Column::IsActive, Expr::value(false))
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Code.eq(code))
            .filter(coupon::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }
}
