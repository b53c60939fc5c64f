//! Purchased credits per owner. Daily credits are never stored, see [crate::pipeline::credits].
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ActiveValue::Set, IntoActiveModel, TransactionTrait, entity::prelude::*};

use crate::pipeline::UpdateError;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "credit_balances")]
/// Purchased balance for one owner
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    /// owner id
    pub owner_id: String,
    /// credits left from top-ups
    pub purchased: i64,
    /// last change
    pub updated_at: DateTime,
}

/// balances have no relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Purchased balance, 0 for owners who never topped up.
pub(crate) async fn purchased(db: &DatabaseConnection, owner: &str) -> Result<i64, DbErr> {
    Ok(Entity::find_by_id(owner.to_string())
        .one(db)
        .await?
        .map(|model| model.purchased.max(0))
        .unwrap_or(0))
}

/// Overwrites the purchased balance.
pub(crate) async fn set_purchased(
    db: &DatabaseConnection,
    owner: &str,
    value: i64,
) -> Result<(), DbErr> {
    let active = ActiveModel {
        owner_id: Set(owner.to_string()),
        purchased: Set(value.max(0)),
        updated_at: Set(Utc::now().naive_utc()),
    };
    Entity::insert(active)
        .on_conflict(
            OnConflict::column(Column::OwnerId)
                .update_columns([Column::Purchased, Column::UpdatedAt])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Adds purchased credits, creating the row on first top-up. Returns the new balance.
pub(crate) async fn top_up(
    db: &DatabaseConnection,
    owner: &str,
    amount: i64,
) -> Result<i64, DbErr> {
    let amount = amount.max(0);
    let active = ActiveModel {
        owner_id: Set(owner.to_string()),
        purchased: Set(amount),
        updated_at: Set(Utc::now().naive_utc()),
    };
    Entity::insert(active)
        .on_conflict(
            OnConflict::column(Column::OwnerId)
                .value(Column::Purchased, Expr::col(Column::Purchased).add(amount))
                .update_column(Column::UpdatedAt)
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    purchased(db, owner).await
}

/// Subtracts `amount`, never going below zero. Returns what is left.
pub(crate) async fn debit(
    db: &DatabaseConnection,
    owner: &str,
    amount: i64,
) -> Result<i64, UpdateError> {
    let db_txn = db.begin().await?;
    let Some(model) = Entity::find_by_id(owner.to_string()).one(&db_txn).await? else {
        db_txn.commit().await?;
        return Ok(0);
    };
    let remaining = model.purchased.saturating_sub(amount.max(0)).max(0);
    let mut am = model.into_active_model();
    am.purchased = Set(remaining);
    am.updated_at = Set(Utc::now().naive_utc());
    am.update(&db_txn).await?;
    db_txn.commit().await?;
    Ok(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm_migration::MigratorTrait;

    async fn setup_db() -> DatabaseConnection {
        let db = crate::db::connect_test_db()
            .await
            .expect("connect test db");
        crate::db::migrations::Migrator::up(&db, None)
            .await
            .expect("run migrations");
        db
    }

    #[tokio::test]
    async fn top_up_accumulates_and_debit_saturates() {
        let db = setup_db().await;
        assert_eq!(purchased(&db, "owner").await.expect("read"), 0);

        assert_eq!(top_up(&db, "owner", 10).await.expect("top up"), 10);
        assert_eq!(top_up(&db, "owner", 5).await.expect("top up"), 15);

        assert_eq!(debit(&db, "owner", 6).await.expect("debit"), 9);
        assert_eq!(debit(&db, "owner", 6).await.expect("debit"), 3);
        assert_eq!(debit(&db, "owner", 6).await.expect("debit"), 0);
        assert_eq!(purchased(&db, "owner").await.expect("read"), 0);
    }

    #[tokio::test]
    async fn debit_without_a_row_is_a_noop() {
        let db = setup_db().await;
        assert_eq!(debit(&db, "ghost", 6).await.expect("debit"), 0);
        assert!(
            Entity::find_by_id("ghost".to_string())
                .one(&db)
                .await
                .expect("fetch")
                .is_none()
        );
    }

    #[tokio::test]
    async fn set_overwrites() {
        let db = setup_db().await;
        set_purchased(&db, "owner", 42).await.expect("set");
        set_purchased(&db, "owner", 7).await.expect("set");
        assert_eq!(purchased(&db, "owner").await.expect("read"), 7);
    }
}
