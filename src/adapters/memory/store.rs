use crate::domain::{
    book::Book,
    loan::{Loan, LoanStatus},
    member::Member,
    value_objects::{BookId, Inventory, LoanId, MemberId},
};
use crate::ports::{
    CatalogStore, LoanLedger, MembershipStore, Result, StoreError, Transaction,
    UnitOfWork as UnitOfWorkTrait,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct StoredLoan {
    loan: Loan,
    version: u64,
}

#[derive(Debug, Default)]
struct Tables {
    books: HashMap<BookId, Book>,
    members: HashMap<MemberId, Member>,
    loans: HashMap<LoanId, StoredLoan>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    failing_commits: AtomicU32,
}

impl Shared {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        // 保持中にpanicしても表は常に整合した状態で書き換えられる
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// インメモリのストア
///
/// 楽観的トランザクションを提供する。読み取りはコミット済みの状態を見て、
/// 書き込みはトランザクション内にバッファされる。コミット時に、触れた書籍と
/// 貸出のversionがまだ読み取り時と同じかを1つのロックの下で検証し、
/// すべて適用するか、`StoreError::VersionConflict`で何も適用しない。
///
/// 貸出が参照する書籍・会員の欠落は、PostgreSQLの外部キー違反と同じく
/// `StoreError::WriteConflict`として報告する。
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 次のn回のコミットを一時障害で失敗させる（テスト用）
    pub fn fail_next_commits(&self, n: u32) {
        self.shared.failing_commits.store(n, Ordering::SeqCst);
    }

    /// 参照や在庫を検証せずに貸出を書き込む（テスト用）
    ///
    /// 壊れた台帳からの返却など、通常の操作では作れない状態を再現する。
    pub fn force_insert_loan(&self, loan: Loan) {
        self.shared.tables().loans.insert(
            loan.loan_id,
            StoredLoan {
                loan,
                version: 0,
            },
        );
    }
}

#[async_trait]
impl UnitOfWorkTrait for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(InMemoryTransaction {
            shared: Arc::clone(&self.shared),
            new_books: HashMap::new(),
            book_writes: HashMap::new(),
            deleted_books: HashMap::new(),
            new_members: Vec::new(),
            member_writes: HashMap::new(),
            deleted_members: HashSet::new(),
            new_loans: HashMap::new(),
            status_updates: HashMap::new(),
        }))
    }
}

/// 書籍行の書き込みバッファ
///
/// `book`は書き込み後の行全体。`base_version`はこのトランザクションが
/// 最初に読んだコミット済みのversion。
#[derive(Debug, Clone)]
struct BookWrite {
    base_version: i64,
    book: Book,
}

/// 貸出ステータス更新の書き込みバッファ
#[derive(Debug, Clone, Copy)]
struct StatusWrite {
    base_version: u64,
    status: LoanStatus,
    returned_at: Option<DateTime<Utc>>,
}

fn apply_delta(book: &Book, delta: i32, updated_at: DateTime<Utc>) -> Result<Book> {
    let available = i64::from(book.inventory.available()) + i64::from(delta);
    let inventory = u32::try_from(available)
        .ok()
        .and_then(|available| Inventory::try_new(book.inventory.total(), available).ok())
        .ok_or_else(|| {
            StoreError::Constraint(format!(
                "copies_available for book {} would become {} (total {})",
                book.book_id,
                available,
                book.inventory.total()
            ))
        })?;

    Ok(Book {
        inventory,
        version: book.version + 1,
        updated_at,
        ..book.clone()
    })
}

fn version_conflict(entity: &'static str, id: uuid::Uuid) -> StoreError {
    StoreError::VersionConflict { entity, id }
}

fn missing_reference(detail: String) -> StoreError {
    StoreError::WriteConflict(detail.into())
}

/// インメモリストアのトランザクション
pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    new_books: HashMap<BookId, Book>,
    book_writes: HashMap<BookId, BookWrite>,
    deleted_books: HashMap<BookId, i64>,
    new_members: Vec<Member>,
    member_writes: HashMap<MemberId, Member>,
    deleted_members: HashSet<MemberId>,
    new_loans: HashMap<LoanId, Loan>,
    status_updates: HashMap<LoanId, StatusWrite>,
}

impl InMemoryTransaction {
    /// コミット済みの書籍にこのトランザクションの書き込みを重ねて返す
    fn book_in(&self, tables: &Tables, book_id: BookId) -> Option<Book> {
        if let Some(book) = self.new_books.get(&book_id) {
            return Some(book.clone());
        }
        if self.deleted_books.contains_key(&book_id) {
            return None;
        }
        match self.book_writes.get(&book_id) {
            Some(write) => Some(write.book.clone()),
            None => tables.books.get(&book_id).cloned(),
        }
    }

    fn current_book(&self, book_id: BookId) -> Option<Book> {
        let tables = self.shared.tables();
        self.book_in(&tables, book_id)
    }

    /// 書き込み後の書籍をバッファに積む。最初の書き込みのbase_versionを保つ
    fn stage_book(&mut self, base_version: i64, book: Book) {
        if let Some(pending) = self.new_books.get_mut(&book.book_id) {
            *pending = book;
            return;
        }
        self.book_writes
            .entry(book.book_id)
            .and_modify(|write| write.book = book.clone())
            .or_insert(BookWrite { base_version, book });
    }

    /// このトランザクションから見える会員（コミット済み + 書き込み）
    fn visible_members<'t>(&'t self, tables: &'t Tables) -> impl Iterator<Item = &'t Member> {
        tables
            .members
            .values()
            .filter(move |m| {
                !self.deleted_members.contains(&m.member_id)
                    && !self.member_writes.contains_key(&m.member_id)
            })
            .chain(self.member_writes.values())
            .chain(self.new_members.iter())
    }

    fn member_in(&self, tables: &Tables, member_id: MemberId) -> Option<Member> {
        self.visible_members(tables)
            .find(|m| m.member_id == member_id)
            .cloned()
    }

    fn email_taken_in(&self, tables: &Tables, member: &Member) -> bool {
        self.visible_members(tables)
            .any(|m| m.email == member.email && m.member_id != member.member_id)
    }

    fn loan_in(&self, tables: &Tables, loan_id: LoanId) -> Option<(Loan, Option<u64>)> {
        if let Some(loan) = self.new_loans.get(&loan_id) {
            return Some((loan.clone(), None));
        }

        let stored = tables.loans.get(&loan_id)?;
        let loan = match self.status_updates.get(&loan_id) {
            Some(write) => Loan {
                status: write.status,
                returned_at: write.returned_at,
                ..stored.loan.clone()
            },
            None => stored.loan.clone(),
        };
        Some((loan, Some(stored.version)))
    }

    /// このトランザクションから見える貸出（ステータス更新を反映済み）
    fn visible_loans<'t>(&'t self, tables: &'t Tables) -> impl Iterator<Item = Loan> + 't {
        tables
            .loans
            .keys()
            .chain(self.new_loans.keys())
            .filter_map(move |loan_id| self.loan_in(tables, *loan_id))
            .map(|(loan, _)| loan)
    }

    fn open_loans_in(&self, tables: &Tables, book_id: BookId) -> u32 {
        let open = self
            .visible_loans(tables)
            .filter(|loan| loan.book_id == book_id && loan.status == LoanStatus::Borrowed)
            .count();
        open as u32
    }

    /// コミット可能かを検証する（表のロックを保持したまま呼ぶ）
    fn validate(&self, tables: &Tables) -> Result<()> {
        let written = self
            .book_writes
            .iter()
            .map(|(book_id, write)| (book_id, write.base_version))
            .chain(self.deleted_books.iter().map(|(book_id, base)| (book_id, *base)));
        for (book_id, base_version) in written {
            let book = tables
                .books
                .get(book_id)
                .ok_or_else(|| version_conflict("book", book_id.value()))?;
            if book.version != base_version {
                return Err(version_conflict("book", book_id.value()));
            }
        }

        for (loan_id, write) in &self.status_updates {
            let stored = tables
                .loans
                .get(loan_id)
                .ok_or_else(|| version_conflict("loan", loan_id.value()))?;
            if stored.version != write.base_version {
                return Err(version_conflict("loan", loan_id.value()));
            }
        }

        for book_id in self.new_books.keys() {
            if tables.books.contains_key(book_id) {
                return Err(StoreError::Duplicate(format!("book {}", book_id)));
            }
        }

        for member_id in self.member_writes.keys().chain(self.deleted_members.iter()) {
            if !tables.members.contains_key(member_id) {
                return Err(version_conflict("member", member_id.value()));
            }
        }

        let mut emails = HashSet::new();
        for member in self.visible_members(tables) {
            if !emails.insert(&member.email) {
                return Err(StoreError::Duplicate("member email".to_string()));
            }
        }

        for loan in tables.loans.values().map(|stored| &stored.loan) {
            if self.deleted_books.contains_key(&loan.book_id) {
                return Err(missing_reference(format!(
                    "book {} is still referenced by loan {}",
                    loan.book_id, loan.loan_id
                )));
            }
            if self.deleted_members.contains(&loan.member_id) {
                return Err(missing_reference(format!(
                    "member {} is still referenced by loan {}",
                    loan.member_id, loan.loan_id
                )));
            }
        }

        for loan in self.new_loans.values() {
            let book_known = self.new_books.contains_key(&loan.book_id)
                || (tables.books.contains_key(&loan.book_id)
                    && !self.deleted_books.contains_key(&loan.book_id));
            let member_known = self.member_in(tables, loan.member_id).is_some();
            if !book_known || !member_known {
                return Err(missing_reference(format!(
                    "loan {} references a missing book or member",
                    loan.loan_id
                )));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl CatalogStore for InMemoryTransaction {
    async fn get_book(&mut self, book_id: BookId) -> Result<Option<Book>> {
        Ok(self.current_book(book_id))
    }

    async fn update_availability(
        &mut self,
        book_id: BookId,
        delta: i32,
        expected_version: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<i64> {
        let current = self
            .current_book(book_id)
            .ok_or_else(|| version_conflict("book", book_id.value()))?;
        if current.version != expected_version {
            return Err(version_conflict("book", book_id.value()));
        }

        // 範囲外になる変更はここで拒否する
        let updated = apply_delta(&current, delta, updated_at)?;
        let version = updated.version;
        self.stage_book(current.version, updated);
        Ok(version)
    }

    async fn update_book(&mut self, book: &Book, expected_version: i64) -> Result<i64> {
        let current = self
            .current_book(book.book_id)
            .ok_or_else(|| version_conflict("book", book.book_id.value()))?;
        if current.version != expected_version {
            return Err(version_conflict("book", book.book_id.value()));
        }

        let version = current.version + 1;
        self.stage_book(
            current.version,
            Book {
                version,
                created_at: current.created_at,
                ..book.clone()
            },
        );
        Ok(version)
    }

    async fn delete_book(&mut self, book_id: BookId, expected_version: i64) -> Result<()> {
        let current = self
            .current_book(book_id)
            .ok_or_else(|| version_conflict("book", book_id.value()))?;
        if current.version != expected_version {
            return Err(version_conflict("book", book_id.value()));
        }

        if self.new_books.remove(&book_id).is_some() {
            return Ok(());
        }
        let base_version = self
            .book_writes
            .remove(&book_id)
            .map_or(current.version, |write| write.base_version);
        self.deleted_books.insert(book_id, base_version);
        Ok(())
    }

    async fn insert_book(&mut self, book: &Book) -> Result<()> {
        if self.current_book(book.book_id).is_some() {
            return Err(StoreError::Duplicate(format!("book {}", book.book_id)));
        }
        self.new_books.insert(book.book_id, book.clone());
        Ok(())
    }
}

#[async_trait]
impl MembershipStore for InMemoryTransaction {
    async fn get_member(&mut self, member_id: MemberId) -> Result<Option<Member>> {
        let tables = self.shared.tables();
        Ok(self.member_in(&tables, member_id))
    }

    async fn insert_member(&mut self, member: &Member) -> Result<()> {
        let taken = {
            let tables = self.shared.tables();
            self.email_taken_in(&tables, member)
        };
        if taken {
            return Err(StoreError::Duplicate("member email".to_string()));
        }
        self.new_members.push(member.clone());
        Ok(())
    }

    async fn update_member(&mut self, member: &Member) -> Result<bool> {
        let (exists, taken) = {
            let tables = self.shared.tables();
            (
                self.member_in(&tables, member.member_id).is_some(),
                self.email_taken_in(&tables, member),
            )
        };
        if !exists {
            return Ok(false);
        }
        if taken {
            return Err(StoreError::Duplicate("member email".to_string()));
        }

        match self
            .new_members
            .iter_mut()
            .find(|m| m.member_id == member.member_id)
        {
            Some(pending) => *pending = member.clone(),
            None => {
                self.member_writes.insert(member.member_id, member.clone());
            }
        }
        Ok(true)
    }

    async fn delete_member(&mut self, member_id: MemberId) -> Result<bool> {
        let exists = {
            let tables = self.shared.tables();
            self.member_in(&tables, member_id).is_some()
        };
        if !exists {
            return Ok(false);
        }

        let before = self.new_members.len();
        self.new_members.retain(|m| m.member_id != member_id);
        if self.new_members.len() == before {
            self.member_writes.remove(&member_id);
            self.deleted_members.insert(member_id);
        }
        Ok(true)
    }
}

#[async_trait]
impl LoanLedger for InMemoryTransaction {
    async fn insert_loan(&mut self, loan: &Loan) -> Result<()> {
        let exists = {
            let tables = self.shared.tables();
            self.loan_in(&tables, loan.loan_id).is_some()
        };
        if exists {
            return Err(StoreError::Duplicate(format!("loan {}", loan.loan_id)));
        }
        self.new_loans.insert(loan.loan_id, loan.clone());
        Ok(())
    }

    async fn get_loan(&mut self, loan_id: LoanId) -> Result<Option<Loan>> {
        let tables = self.shared.tables();
        Ok(self.loan_in(&tables, loan_id).map(|(loan, _)| loan))
    }

    async fn update_status(
        &mut self,
        loan_id: LoanId,
        status: LoanStatus,
        returned_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let current = {
            let tables = self.shared.tables();
            self.loan_in(&tables, loan_id)
        };
        let (loan, version) = current.ok_or_else(|| version_conflict("loan", loan_id.value()))?;
        if loan.status != LoanStatus::Borrowed {
            return Err(version_conflict("loan", loan_id.value()));
        }

        match version {
            None => {
                if let Some(pending) = self.new_loans.get_mut(&loan_id) {
                    pending.status = status;
                    pending.returned_at = returned_at;
                }
            }
            Some(base_version) => {
                self.status_updates.insert(
                    loan_id,
                    StatusWrite {
                        base_version,
                        status,
                        returned_at,
                    },
                );
            }
        }
        Ok(())
    }

    async fn count_open_loans(&mut self, book_id: BookId) -> Result<u32> {
        let tables = self.shared.tables();
        Ok(self.open_loans_in(&tables, book_id))
    }

    async fn book_has_loans(&mut self, book_id: BookId) -> Result<bool> {
        let tables = self.shared.tables();
        Ok(self.visible_loans(&tables).any(|loan| loan.book_id == book_id))
    }

    async fn member_has_loans(&mut self, member_id: MemberId) -> Result<bool> {
        let tables = self.shared.tables();
        Ok(self
            .visible_loans(&tables)
            .any(|loan| loan.member_id == member_id))
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn inventory_snapshot(&mut self, book_id: BookId) -> Result<Option<(Book, u32)>> {
        // 書籍と貸出件数を同じロックの下で読む
        let tables = self.shared.tables();
        Ok(self
            .book_in(&tables, book_id)
            .map(|book| (book, self.open_loans_in(&tables, book_id))))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let injected = self
            .shared
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Transient("injected commit failure".into()));
        }

        let mut tables = self.shared.tables();
        self.validate(&tables)?;

        for (book_id, write) in &self.book_writes {
            tables.books.insert(*book_id, write.book.clone());
        }
        for book_id in self.deleted_books.keys() {
            tables.books.remove(book_id);
        }
        for (loan_id, write) in &self.status_updates {
            if let Some(stored) = tables.loans.get_mut(loan_id) {
                stored.loan.status = write.status;
                stored.loan.returned_at = write.returned_at;
                stored.version += 1;
            }
        }
        for (book_id, book) in &self.new_books {
            tables.books.insert(*book_id, book.clone());
        }
        for member_id in &self.deleted_members {
            tables.members.remove(member_id);
        }
        for (member_id, member) in &self.member_writes {
            tables.members.insert(*member_id, member.clone());
        }
        for member in &self.new_members {
            tables.members.insert(member.member_id, member.clone());
        }
        for (loan_id, loan) in &self.new_loans {
            tables.loans.insert(
                *loan_id,
                StoredLoan {
                    loan: loan.clone(),
                    version: 0,
                },
            );
        }

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
