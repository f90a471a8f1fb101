//! PostgreSQL 事务与事务工厂

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::traits::{StoreTx, TxProvider};
use crate::error::Result;

#[async_trait]
impl StoreTx for Transaction<'static, Postgres> {
    async fn commit(self) -> Result<()> {
        Transaction::commit(self).await?;
        Ok(())
    }
}

#[async_trait]
impl TxProvider for PgPool {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(PgPool::begin(self).await?)
    }
}
