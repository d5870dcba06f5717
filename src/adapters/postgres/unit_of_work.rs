use crate::domain::{book::Book, value_objects::BookId};
use crate::ports::{Result, StoreError, Transaction, UnitOfWork as UnitOfWorkTrait};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row};

use super::catalog_store::map_row_to_book;

/// PostgreSQL implementation of UnitOfWork
///
/// Each transaction checks out one pooled connection and returns it on
/// commit, rollback, or drop.
pub struct UnitOfWork {
    pool: PgPool,
}

impl UnitOfWork {
    /// Create a new UnitOfWork with a PostgreSQL connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnitOfWorkTrait for UnitOfWork {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

/// A READ COMMITTED transaction
///
/// Concurrent writers are detected by the version predicate on
/// `books` and the status predicate on `loans`, not by the isolation level.
pub struct PgTransaction {
    pub(super) tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PgTransaction {
    /// Reads the book row and its open-loan count in one statement, so both
    /// come from the same snapshot even under READ COMMITTED.
    async fn inventory_snapshot(&mut self, book_id: BookId) -> Result<Option<(Book, u32)>> {
        let row = sqlx::query(
            r#"
            SELECT
                b.id,
                b.title,
                b.author,
                b.isbn,
                b.published_year,
                b.copies_total,
                b.copies_available,
                b.version,
                b.created_at,
                b.updated_at,
                (
                    SELECT COUNT(*)
                    FROM loans l
                    WHERE l.book_id = b.id AND l.status = 'borrowed'
                ) AS open_loans
            FROM books b
            WHERE b.id = $1
            "#,
        )
        .bind(book_id.value())
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let book = map_row_to_book(&row)?;
        let count: i64 = row.try_get("open_loans")?;
        let open_loans = u32::try_from(count).map_err(|_| {
            StoreError::Corrupt(format!("book {} has {} open loans", book_id, count))
        })?;
        Ok(Some((book, open_loans)))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
