use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    BookId, Inventory, InventoryError, LendCopyError, RegisterBookError, RestoreCopyError,
    ReviseBookError,
    commands::{RegisterBook, UpdateBook},
};

/// 所蔵数の上限（ストアの整数列の範囲）
pub const MAX_COPIES: u32 = i32::MAX as u32;

/// Book - 蔵書カタログの1タイトル
///
/// `inventory`は貸出エンジンだけが変更する。
/// `version`は楽観的排他制御のトークンで、在庫更新のたびにストアが1つ進める。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Book {
    pub book_id: BookId,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub published_year: Option<i32>,
    pub inventory: Inventory,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 在庫の整合性監査結果
///
/// `copies_available == copies_total - open_loans` が成り立つかを表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InventoryAudit {
    pub book_id: BookId,
    pub copies_total: u32,
    pub copies_available: u32,
    pub open_loans: u32,
    pub consistent: bool,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 登録・更新で共通の書誌情報の検証
fn validate_details(
    title: &str,
    author: &str,
    copies_total: u32,
) -> Result<(String, String), RegisterBookError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(RegisterBookError::EmptyTitle);
    }
    let author = author.trim();
    if author.is_empty() {
        return Err(RegisterBookError::EmptyAuthor);
    }
    if copies_total > MAX_COPIES {
        return Err(RegisterBookError::TooManyCopies { max: MAX_COPIES });
    }
    Ok((title.to_string(), author.to_string()))
}

/// 純粋関数：書籍を登録する
///
/// ビジネスルール：
/// - タイトルと著者は空にできない
/// - 所蔵数は`MAX_COPIES`以下
/// - 登録直後は全冊が貸出可能
pub fn register_book(cmd: RegisterBook) -> Result<Book, RegisterBookError> {
    let (title, author) = validate_details(&cmd.title, &cmd.author, cmd.copies_total)?;

    Ok(Book {
        book_id: BookId::new(),
        title,
        author,
        isbn: non_blank(cmd.isbn),
        published_year: cmd.published_year,
        inventory: Inventory::new(cmd.copies_total),
        version: 0,
        created_at: cmd.registered_at,
        updated_at: cmd.registered_at,
    })
}

/// 純粋関数：書誌情報と所蔵数を更新する
///
/// ビジネスルール：
/// - 登録時と同じ検証を行う
/// - 所蔵数は貸出中の冊数を下回れない
/// - 貸出中の冊数は変わらず、所蔵数の増減分だけ貸出可能数が変わる
///
/// versionはストアが更新するため変更しない。
pub fn revise_book(book: &Book, cmd: UpdateBook) -> Result<Book, ReviseBookError> {
    let (title, author) = validate_details(&cmd.title, &cmd.author, cmd.copies_total)?;
    let inventory = book
        .inventory
        .resize(cmd.copies_total)
        .map_err(|err| match err {
            InventoryError::TotalBelowOnLoan { on_loan, requested } => {
                ReviseBookError::TotalBelowOnLoan { on_loan, requested }
            }
            _ => ReviseBookError::TotalBelowOnLoan {
                on_loan: book.inventory.on_loan(),
                requested: cmd.copies_total,
            },
        })?;

    Ok(Book {
        title,
        author,
        isbn: non_blank(cmd.isbn),
        published_year: cmd.published_year,
        inventory,
        updated_at: cmd.updated_at,
        ..book.clone()
    })
}

/// 純粋関数：1冊を貸出に引き当てる
///
/// 副作用なし。在庫を1冊減らした新しいBookを返す。
/// versionはストアが更新するため変更しない。
pub fn lend_copy(book: &Book, at: DateTime<Utc>) -> Result<Book, LendCopyError> {
    let inventory = book
        .inventory
        .take()
        .map_err(|_| LendCopyError::NoCopiesAvailable)?;

    Ok(Book {
        inventory,
        updated_at: at,
        ..book.clone()
    })
}

/// 純粋関数：返却された1冊を書架に戻す
///
/// 所蔵数を超える場合は台帳の破損を意味するため失敗する。
pub fn restore_copy(book: &Book, at: DateTime<Utc>) -> Result<Book, RestoreCopyError> {
    let inventory = book.inventory.put_back().map_err(|err| match err {
        InventoryError::AllCopiesOnShelf { total }
        | InventoryError::AvailableExceedsTotal { total, .. } => {
            RestoreCopyError::WouldExceedTotal { total }
        }
        InventoryError::NoCopiesAvailable | InventoryError::TotalBelowOnLoan { .. } => {
            RestoreCopyError::WouldExceedTotal {
                total: book.inventory.total(),
            }
        }
    })?;

    Ok(Book {
        inventory,
        updated_at: at,
        ..book.clone()
    })
}

/// 純粋関数：在庫数と貸出中の件数を突き合わせる
pub fn audit(book: &Book, open_loans: u32) -> InventoryAudit {
    InventoryAudit {
        book_id: book.book_id,
        copies_total: book.inventory.total(),
        copies_available: book.inventory.available(),
        open_loans,
        consistent: book.inventory.on_loan() == open_loans,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(copies_total: u32) -> Book {
        register_book(RegisterBook {
            title: "The Name of the Rose".to_string(),
            author: "Umberto Eco".to_string(),
            isbn: Some(" 978-0151446476 ".to_string()),
            published_year: Some(1980),
            copies_total,
            registered_at: Utc::now(),
        })
        .unwrap()
    }

    #[test]
    fn test_register_book_starts_with_every_copy_available() {
        let book = register(3);
        assert_eq!(book.inventory.total(), 3);
        assert_eq!(book.inventory.available(), 3);
        assert_eq!(book.version, 0);
        assert_eq!(book.isbn.as_deref(), Some("978-0151446476"));
    }

    #[test]
    fn test_register_book_rejects_blank_title_and_author() {
        let now = Utc::now();
        let cmd = RegisterBook {
            title: "  ".to_string(),
            author: "Someone".to_string(),
            isbn: None,
            published_year: None,
            copies_total: 1,
            registered_at: now,
        };
        assert_eq!(
            register_book(cmd.clone()).unwrap_err(),
            RegisterBookError::EmptyTitle
        );

        let cmd = RegisterBook {
            title: "Title".to_string(),
            author: "".to_string(),
            ..cmd
        };
        assert_eq!(register_book(cmd).unwrap_err(), RegisterBookError::EmptyAuthor);
    }

    #[test]
    fn test_register_book_drops_blank_isbn() {
        let book = register_book(RegisterBook {
            title: "Title".to_string(),
            author: "Author".to_string(),
            isbn: Some("   ".to_string()),
            published_year: None,
            copies_total: 1,
            registered_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(book.isbn, None);
    }

    #[test]
    fn test_register_book_rejects_copies_beyond_store_range() {
        let cmd = RegisterBook {
            title: "Title".to_string(),
            author: "Author".to_string(),
            isbn: None,
            published_year: None,
            copies_total: MAX_COPIES + 1,
            registered_at: Utc::now(),
        };
        assert_eq!(
            register_book(cmd.clone()).unwrap_err(),
            RegisterBookError::TooManyCopies { max: MAX_COPIES }
        );

        let book = register_book(RegisterBook {
            copies_total: MAX_COPIES,
            ..cmd
        })
        .unwrap();
        assert_eq!(book.inventory.total(), MAX_COPIES);
    }

    fn update_for(book: &Book, copies_total: u32) -> UpdateBook {
        UpdateBook {
            book_id: book.book_id,
            title: " Il nome della rosa ".to_string(),
            author: book.author.clone(),
            isbn: None,
            published_year: Some(1980),
            copies_total,
            updated_at: book.created_at + chrono::Duration::hours(1),
        }
    }

    #[test]
    fn test_revise_book_keeps_copies_on_loan() {
        let lent = lend_copy(&register(3), Utc::now()).unwrap();

        let revised = revise_book(&lent, update_for(&lent, 5)).unwrap();

        assert_eq!(revised.title, "Il nome della rosa");
        assert_eq!(revised.isbn, None);
        assert_eq!(revised.inventory.total(), 5);
        assert_eq!(revised.inventory.available(), 4);
        assert_eq!(revised.version, lent.version);
        assert_eq!(revised.created_at, lent.created_at);
        assert_eq!(revised.updated_at, lent.created_at + chrono::Duration::hours(1));
    }

    #[test]
    fn test_revise_book_rejects_total_below_copies_on_loan() {
        let book = register(2);
        let lent = lend_copy(&lend_copy(&book, Utc::now()).unwrap(), Utc::now()).unwrap();

        assert_eq!(
            revise_book(&lent, update_for(&lent, 1)).unwrap_err(),
            ReviseBookError::TotalBelowOnLoan {
                on_loan: 2,
                requested: 1
            }
        );
    }

    #[test]
    fn test_revise_book_applies_registration_rules() {
        let book = register(1);
        let cmd = UpdateBook {
            author: " ".to_string(),
            ..update_for(&book, 1)
        };
        assert_eq!(revise_book(&book, cmd).unwrap_err(), ReviseBookError::EmptyAuthor);
        assert_eq!(
            revise_book(&book, update_for(&book, MAX_COPIES + 1)).unwrap_err(),
            ReviseBookError::TooManyCopies { max: MAX_COPIES }
        );
    }

    #[test]
    fn test_lend_copy_decrements_available() {
        let book = register(2);
        let later = book.created_at + chrono::Duration::minutes(5);

        let lent = lend_copy(&book, later).unwrap();

        assert_eq!(lent.inventory.available(), 1);
        assert_eq!(lent.version, book.version);
        assert_eq!(lent.updated_at, later);
    }

    #[test]
    fn test_lend_copy_fails_when_no_copies_left() {
        let book = register(1);
        let lent = lend_copy(&book, Utc::now()).unwrap();
        assert_eq!(
            lend_copy(&lent, Utc::now()).unwrap_err(),
            LendCopyError::NoCopiesAvailable
        );
    }

    #[test]
    fn test_restore_copy_fails_when_it_would_exceed_total() {
        let book = register(2);
        assert_eq!(
            restore_copy(&book, Utc::now()).unwrap_err(),
            RestoreCopyError::WouldExceedTotal { total: 2 }
        );
    }

    #[test]
    fn test_lend_then_restore_round_trip() {
        let book = register(2);
        let lent = lend_copy(&book, Utc::now()).unwrap();
        let restored = restore_copy(&lent, Utc::now()).unwrap();
        assert_eq!(restored.inventory, book.inventory);
    }

    #[test]
    fn test_audit_detects_drift() {
        let book = lend_copy(&register(3), Utc::now()).unwrap();

        let audit_ok = audit(&book, 1);
        assert!(audit_ok.consistent);
        assert_eq!(audit_ok.copies_available, 2);

        let audit_drift = audit(&book, 2);
        assert!(!audit_drift.consistent);
    }
}
