use crate::domain::{
    member::Member,
    value_objects::{Email, MemberId},
};
use crate::ports::{MembershipStore, Result, StoreError};
use async_trait::async_trait;
use sqlx::{Row, postgres::PgRow};

use super::unit_of_work::PgTransaction;

fn map_row_to_member(row: &PgRow) -> Result<Member> {
    let member_id = MemberId::from_uuid(row.try_get("id")?);
    let email: &str = row.try_get("email")?;
    let email = Email::parse(email).map_err(|e| {
        StoreError::Corrupt(format!("member {} has an invalid email: {}", member_id, e))
    })?;

    Ok(Member {
        member_id,
        name: row.try_get("name")?,
        email,
        phone: row.try_get("phone")?,
        address: row.try_get("address")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl MembershipStore for PgTransaction {
    async fn get_member(&mut self, member_id: MemberId) -> Result<Option<Member>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, phone, address, created_at
            FROM members
            WHERE id = $1
            "#,
        )
        .bind(member_id.value())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(map_row_to_member).transpose()
    }

    /// 会員を追加する（emailの一意制約違反は`Duplicate`に変換される）
    async fn insert_member(&mut self, member: &Member) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO members (id, name, email, phone, address, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(member.member_id.value())
        .bind(&member.name)
        .bind(member.email.as_str())
        .bind(&member.phone)
        .bind(&member.address)
        .bind(member.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_member(&mut self, member: &Member) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE members
            SET name = $2, email = $3, phone = $4, address = $5
            WHERE id = $1
            "#,
        )
        .bind(member.member_id.value())
        .bind(&member.name)
        .bind(member.email.as_str())
        .bind(&member.phone)
        .bind(&member.address)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_member(&mut self, member_id: MemberId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM members WHERE id = $1")
            .bind(member_id.value())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
