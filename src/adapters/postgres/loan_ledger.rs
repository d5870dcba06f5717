use crate::domain::{
    loan::{Loan, LoanStatus},
    value_objects::{BookId, LoanId, MemberId},
};
use crate::ports::{LoanLedger, Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, postgres::PgRow};
use std::str::FromStr;

use super::unit_of_work::PgTransaction;

/// PostgreSQLの行データをLoanに変換する
///
/// statusの文字列からの変換に失敗した行は`StoreError::Corrupt`になる。
fn map_row_to_loan(row: &PgRow) -> Result<Loan> {
    let status_str: &str = row.try_get("status")?;
    let status = LoanStatus::from_str(status_str).map_err(StoreError::Corrupt)?;

    Ok(Loan {
        loan_id: LoanId::from_uuid(row.try_get("id")?),
        book_id: BookId::from_uuid(row.try_get("book_id")?),
        member_id: MemberId::from_uuid(row.try_get("member_id")?),
        borrowed_at: row.try_get("borrowed_at")?,
        due_date: row.try_get("due_date")?,
        returned_at: row.try_get("returned_at")?,
        status,
    })
}

#[async_trait]
impl LoanLedger for PgTransaction {
    async fn insert_loan(&mut self, loan: &Loan) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO loans (
                id,
                book_id,
                member_id,
                borrowed_at,
                due_date,
                returned_at,
                status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(loan.loan_id.value())
        .bind(loan.book_id.value())
        .bind(loan.member_id.value())
        .bind(loan.borrowed_at)
        .bind(loan.due_date)
        .bind(loan.returned_at)
        .bind(loan.status.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn get_loan(&mut self, loan_id: LoanId) -> Result<Option<Loan>> {
        let row = sqlx::query(
            r#"
            SELECT
                id,
                book_id,
                member_id,
                borrowed_at,
                due_date,
                returned_at,
                status
            FROM loans
            WHERE id = $1
            "#,
        )
        .bind(loan_id.value())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(map_row_to_loan).transpose()
    }

    /// borrowedの行だけを更新する
    ///
    /// 同時に返却された場合、後続のUPDATEは先行のコミットを待ってから
    /// 条件を再評価するため0行になる。
    async fn update_status(
        &mut self,
        loan_id: LoanId,
        status: LoanStatus,
        returned_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE loans
            SET status = $2, returned_at = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'borrowed'
            "#,
        )
        .bind(loan_id.value())
        .bind(status.as_str())
        .bind(returned_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionConflict {
                entity: "loan",
                id: loan_id.value(),
            });
        }

        Ok(())
    }

    async fn count_open_loans(&mut self, book_id: BookId) -> Result<u32> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS open_loans
            FROM loans
            WHERE book_id = $1 AND status = 'borrowed'
            "#,
        )
        .bind(book_id.value())
        .fetch_one(&mut *self.tx)
        .await?;

        let count: i64 = row.try_get("open_loans")?;
        u32::try_from(count)
            .map_err(|_| StoreError::Corrupt(format!("book {} has {} open loans", book_id, count)))
    }

    async fn book_has_loans(&mut self, book_id: BookId) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM loans WHERE book_id = $1) AS has_loans")
            .bind(book_id.value())
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(row.try_get("has_loans")?)
    }

    async fn member_has_loans(&mut self, member_id: MemberId) -> Result<bool> {
        let row =
            sqlx::query("SELECT EXISTS (SELECT 1 FROM loans WHERE member_id = $1) AS has_loans")
                .bind(member_id.value())
                .fetch_one(&mut *self.tx)
                .await?;

        Ok(row.try_get("has_loans")?)
    }
}
