use async_trait::async_trait;
use std::time::Duration;

use crate::ports::{StoreError, Transaction, UnitOfWork};

use super::errors::{LendingError, Result};

/// 再試行ポリシー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大試行回数（1以上、初回を含む）
    pub max_attempts: u32,
    /// 初回再試行前の待機時間。以降は試行ごとに倍になる
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// `attempt`回目の失敗後に待つ時間
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(6);
        self.backoff.saturating_mul(1 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            backoff: Duration::from_millis(20),
        }
    }
}

/// 作業単位の1回の試行が失敗した理由
#[derive(Debug)]
pub(crate) enum StepFailure {
    /// 業務ルールによる拒否。再試行しない
    Rejected(LendingError),
    /// ストア層の失敗。分類してから扱いを決める
    Store(StoreError),
}

impl From<LendingError> for StepFailure {
    fn from(err: LendingError) -> Self {
        StepFailure::Rejected(err)
    }
}

impl From<StoreError> for StepFailure {
    fn from(err: StoreError) -> Self {
        StepFailure::Store(err)
    }
}

pub(crate) type StepResult<T> = std::result::Result<T, StepFailure>;

/// トランザクション内で実行される作業単位
///
/// 再試行のたびに新しいトランザクションで最初から実行されるため、
/// `run`は前回の試行の結果に依存してはならない。
#[async_trait]
pub(crate) trait UnitOfWorkStep: Sync {
    type Output: Send;

    /// ログ出力用の操作名
    fn name(&self) -> &'static str;

    async fn run(&self, tx: &mut dyn Transaction) -> StepResult<Self::Output>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryCause {
    Conflict,
    Transient,
}

impl RetryCause {
    fn exhausted(self, attempts: u32) -> LendingError {
        match self {
            RetryCause::Conflict => LendingError::Conflict { attempts },
            RetryCause::Transient => LendingError::StorageUnavailable { attempts },
        }
    }
}

enum Disposition {
    Retry(RetryCause),
    Fail(LendingError),
}

/// ストア層のエラーを分類する
fn classify(err: StoreError, attempt: u32) -> Disposition {
    match err {
        StoreError::VersionConflict { .. } | StoreError::WriteConflict(_) => {
            Disposition::Retry(RetryCause::Conflict)
        }
        StoreError::Transient(_) => Disposition::Retry(RetryCause::Transient),
        StoreError::Duplicate(what) => Disposition::Fail(LendingError::AlreadyExists(what)),
        StoreError::Constraint(detail) | StoreError::Corrupt(detail) => {
            tracing::error!(%detail, "store rejected a write that breaks an integrity rule");
            Disposition::Fail(LendingError::InvariantViolation(detail))
        }
        StoreError::Other(source) => {
            tracing::error!(error = %source, "unclassified storage failure");
            Disposition::Fail(LendingError::StorageUnavailable { attempts: attempt })
        }
    }
}

/// 1回の試行：開始、実行、コミット。失敗時はロールバックする
async fn run_once<S: UnitOfWorkStep>(
    unit_of_work: &dyn UnitOfWork,
    step: &S,
) -> StepResult<S::Output> {
    let mut tx = unit_of_work.begin().await?;

    match step.run(tx.as_mut()).await {
        Ok(output) => {
            tx.commit().await?;
            Ok(output)
        }
        Err(failure) => {
            if let Err(err) = tx.rollback().await {
                tracing::warn!(operation = step.name(), error = %err, "rollback failed");
            }
            Err(failure)
        }
    }
}

/// 作業単位を再試行付きで実行する
///
/// 競合と一時障害は`policy.max_attempts`回まで再試行し、尽きたら
/// `Conflict`または`StorageUnavailable`を返す。それ以外は即座に返す。
/// 失敗した試行の変更はすべてロールバックされる。
pub(crate) async fn execute<S: UnitOfWorkStep>(
    unit_of_work: &dyn UnitOfWork,
    policy: &RetryPolicy,
    step: &S,
) -> Result<S::Output> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let store_err = match run_once(unit_of_work, step).await {
            Ok(output) => return Ok(output),
            Err(StepFailure::Rejected(err)) => return Err(err),
            Err(StepFailure::Store(err)) => err,
        };

        let cause = match classify(store_err, attempt) {
            Disposition::Fail(err) => return Err(err),
            Disposition::Retry(cause) => cause,
        };

        if attempt >= max_attempts {
            tracing::warn!(
                operation = step.name(),
                attempts = attempt,
                ?cause,
                "retry budget exhausted"
            );
            return Err(cause.exhausted(attempt));
        }

        let delay = policy.backoff_for(attempt);
        tracing::warn!(
            operation = step.name(),
            attempt,
            ?cause,
            delay_ms = delay.as_millis() as u64,
            "retrying unit of work"
        );
        tokio::time::sleep(delay).await;
    }
}
