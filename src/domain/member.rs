use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    Email, MemberId, RegisterMemberError,
    commands::{RegisterMember, UpdateMember},
};

/// Member - 貸出エンジンからは参照のみ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub member_id: MemberId,
    pub name: String,
    pub email: Email,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 純粋関数：会員を登録する
///
/// メールアドレスの一意性はストアが保証する。
pub fn register_member(cmd: RegisterMember) -> Result<Member, RegisterMemberError> {
    let name = cmd.name.trim();
    if name.is_empty() {
        return Err(RegisterMemberError::EmptyName);
    }
    let email = Email::parse(&cmd.email)?;

    Ok(Member {
        member_id: MemberId::new(),
        name: name.to_string(),
        email,
        phone: non_blank(cmd.phone),
        address: non_blank(cmd.address),
        created_at: cmd.registered_at,
    })
}

/// 純粋関数：会員情報を更新する
///
/// 登録時と同じ検証を行う。登録日時は変わらない。
pub fn revise_member(member: &Member, cmd: UpdateMember) -> Result<Member, RegisterMemberError> {
    let name = cmd.name.trim();
    if name.is_empty() {
        return Err(RegisterMemberError::EmptyName);
    }
    let email = Email::parse(&cmd.email)?;

    Ok(Member {
        name: name.to_string(),
        email,
        phone: non_blank(cmd.phone),
        address: non_blank(cmd.address),
        ..member.clone()
    })
}
