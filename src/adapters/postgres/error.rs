use crate::ports::StoreError;

// PostgreSQL SQLSTATE
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const ADMIN_SHUTDOWN: &str = "57P01";
const CANNOT_CONNECT_NOW: &str = "57P03";
const QUERY_CANCELED: &str = "57014";

enum Kind {
    Conflict,
    Transient,
    Duplicate(String),
    Constraint(String),
    Corrupt,
    Other,
}

/// 一意制約名を利用者向けの表現に変換する
fn describe_unique_constraint(name: Option<&str>) -> String {
    match name {
        Some("members_email_key") => "member email".to_string(),
        Some("books_pkey") => "book id".to_string(),
        Some("members_pkey") => "member id".to_string(),
        Some("loans_pkey") => "loan id".to_string(),
        Some(other) => other.to_string(),
        None => "unique key".to_string(),
    }
}

fn kind_of(err: &sqlx::Error) -> Kind {
    match err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED) => Kind::Conflict,
            // 参照先の行が同時に削除された。再試行すると存在確認で検出される
            Some(FOREIGN_KEY_VIOLATION) => Kind::Conflict,
            Some(UNIQUE_VIOLATION) => Kind::Duplicate(describe_unique_constraint(db.constraint())),
            Some(code) if code.starts_with("23") => Kind::Constraint(match db.constraint() {
                Some(name) => format!("{} ({})", db.message(), name),
                None => db.message().to_string(),
            }),
            // 08xxx: connection exception
            Some(code) if code.starts_with("08") => Kind::Transient,
            Some(ADMIN_SHUTDOWN | CANNOT_CONNECT_NOW | QUERY_CANCELED) => Kind::Transient,
            _ => Kind::Other,
        },
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::WorkerCrashed => Kind::Transient,
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => Kind::Corrupt,
        _ => Kind::Other,
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match kind_of(&err) {
            Kind::Conflict => StoreError::WriteConflict(Box::new(err)),
            Kind::Transient => StoreError::Transient(Box::new(err)),
            Kind::Duplicate(what) => StoreError::Duplicate(what),
            Kind::Constraint(detail) => StoreError::Constraint(detail),
            Kind::Corrupt => StoreError::Corrupt(err.to_string()),
            Kind::Other => StoreError::Other(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_transient() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StoreError::Transient(_)));
    }

    #[test]
    fn test_io_error_is_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: StoreError = sqlx::Error::Io(io).into();
        assert!(matches!(err, StoreError::Transient(_)));
    }

    #[test]
    fn test_row_not_found_is_unclassified() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::Other(_)));
    }

    #[test]
    fn test_missing_column_is_corrupt() {
        let err: StoreError = sqlx::Error::ColumnNotFound("copies_total".to_string()).into();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_unique_constraint_names_are_described() {
        assert_eq!(
            describe_unique_constraint(Some("members_email_key")),
            "member email"
        );
        assert_eq!(describe_unique_constraint(None), "unique key");
    }
}
