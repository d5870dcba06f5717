use crate::domain::{
    book::Book,
    value_objects::{BookId, Inventory},
};
use crate::ports::{CatalogStore, Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, postgres::PgRow};

use super::unit_of_work::PgTransaction;

/// 冊数をデータベースの列型に変換する
fn to_db_count(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| StoreError::Constraint(format!("{} out of range: {}", column, value)))
}

fn book_conflict(book_id: BookId) -> StoreError {
    StoreError::VersionConflict {
        entity: "book",
        id: book_id.value(),
    }
}

/// PostgreSQLの行データをBookに変換する
///
/// 冊数は負数や`copies_available > copies_total`を含む可能性があるため、
/// Inventoryの生成に失敗した行は`StoreError::Corrupt`として扱う。
pub(super) fn map_row_to_book(row: &PgRow) -> Result<Book> {
    let book_id = BookId::from_uuid(row.try_get("id")?);
    let copies_total: i32 = row.try_get("copies_total")?;
    let copies_available: i32 = row.try_get("copies_available")?;

    let inventory = u32::try_from(copies_total)
        .ok()
        .zip(u32::try_from(copies_available).ok())
        .and_then(|(total, available)| Inventory::try_new(total, available).ok())
        .ok_or_else(|| {
            StoreError::Corrupt(format!(
                "book {} has {} of {} copies available",
                book_id, copies_available, copies_total
            ))
        })?;

    Ok(Book {
        book_id,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        isbn: row.try_get("isbn")?,
        published_year: row.try_get("published_year")?,
        inventory,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl CatalogStore for PgTransaction {
    async fn get_book(&mut self, book_id: BookId) -> Result<Option<Book>> {
        let row = sqlx::query(
            r#"
            SELECT
                id,
                title,
                author,
                isbn,
                published_year,
                copies_total,
                copies_available,
                version,
                created_at,
                updated_at
            FROM books
            WHERE id = $1
            "#,
        )
        .bind(book_id.value())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(map_row_to_book).transpose()
    }

    /// versionを条件にした単一のUPDATEで在庫を変更する
    ///
    /// 範囲チェックはテーブルのCHECK制約が行う。
    async fn update_availability(
        &mut self,
        book_id: BookId,
        delta: i32,
        expected_version: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE books
            SET
                copies_available = copies_available + $2,
                version = version + 1,
                updated_at = $4
            WHERE id = $1 AND version = $3
            RETURNING version
            "#,
        )
        .bind(book_id.value())
        .bind(delta)
        .bind(expected_version)
        .bind(updated_at)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(row.try_get("version")?),
            None => Err(book_conflict(book_id)),
        }
    }

    async fn update_book(&mut self, book: &Book, expected_version: i64) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE books
            SET
                title = $2,
                author = $3,
                isbn = $4,
                published_year = $5,
                copies_total = $6,
                copies_available = $7,
                version = version + 1,
                updated_at = $8
            WHERE id = $1 AND version = $9
            RETURNING version
            "#,
        )
        .bind(book.book_id.value())
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(book.published_year)
        .bind(to_db_count(book.inventory.total(), "copies_total")?)
        .bind(to_db_count(book.inventory.available(), "copies_available")?)
        .bind(book.updated_at)
        .bind(expected_version)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(row.try_get("version")?),
            None => Err(book_conflict(book.book_id)),
        }
    }

    /// 貸出から参照されている行は外部キー制約で削除できない
    async fn delete_book(&mut self, book_id: BookId, expected_version: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1 AND version = $2")
            .bind(book_id.value())
            .bind(expected_version)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(book_conflict(book_id));
        }
        Ok(())
    }

    async fn insert_book(&mut self, book: &Book) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO books (
                id,
                title,
                author,
                isbn,
                published_year,
                copies_total,
                copies_available,
                version,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(book.book_id.value())
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(book.published_year)
        .bind(to_db_count(book.inventory.total(), "copies_total")?)
        .bind(to_db_count(book.inventory.available(), "copies_available")?)
        .bind(book.version)
        .bind(book.created_at)
        .bind(book.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }
}
