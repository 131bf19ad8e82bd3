//! Interceptor chain.
//!
//! A [`Pipeline`] wraps one handler with three ordered interceptor lists:
//!
//! - `before` runs first; the first error aborts the run
//! - the handler runs next, then `after` with the same abort rule
//! - `on_defer` always runs, exactly once per interceptor, even after an
//!   abort, so cleanup like releasing the user lock can't be skipped
//!
//! Interceptors and handlers share one shape: they take the context by
//! value and hand it back, so every step sees what earlier steps stored.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn, Instrument};

use crate::errors::BotError;

/// Context handed back together with the error that stopped a step.
pub struct Interrupted<C> {
    pub ctx: C,
    pub error: BotError,
}

impl<C> Interrupted<C> {
    pub fn new(ctx: C, error: impl Into<BotError>) -> Self {
        Self {
            ctx,
            error: error.into(),
        }
    }
}

impl<C> fmt::Debug for Interrupted<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupted").field("error", &self.error).finish()
    }
}

/// Result of one interceptor or handler.
pub type Step<C> = Result<C, Interrupted<C>>;

/// Turn a plain result into a [`Step`] carrying `ctx`.
pub fn step<C>(ctx: C, result: Result<(), BotError>) -> Step<C> {
    match result {
        Ok(()) => Ok(ctx),
        Err(error) => Err(Interrupted { ctx, error }),
    }
}

/// Anything that consumes and returns a context.
///
/// Implemented for every `Fn(C) -> impl Future<Output = Step<C>>`, so
/// plain `async fn`s can be used directly.
pub trait Interceptor<C>: Send + Sync + 'static {
    fn call(&self, ctx: C) -> BoxFuture<'static, Step<C>>;
}

impl<C, F, Fut> Interceptor<C> for F
where
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Step<C>> + Send + 'static,
{
    fn call(&self, ctx: C) -> BoxFuture<'static, Step<C>> {
        Box::pin(self(ctx))
    }
}

pub type Chain<C> = Vec<Arc<dyn Interceptor<C>>>;

/// Stage at which a pipeline run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Before,
    Handler,
    After,
}

/// Error returned from [`Pipeline::run`].
#[derive(Debug)]
pub struct ChainError {
    pub stage: Stage,
    pub source: BotError,
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} stage failed: {}", self.stage, self.source)
    }
}

impl std::error::Error for ChainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Default log fields attached to every run of a pipeline.
#[derive(Debug, Clone, Default)]
pub struct LogFields {
    pub module: &'static str,
    pub func: &'static str,
    pub path: &'static str,
}

impl LogFields {
    pub fn new(module: &'static str, func: &'static str, path: &'static str) -> Self {
        Self { module, func, path }
    }
}

/// A handler wrapped with its interceptors.
pub struct Pipeline<C> {
    handler: Arc<dyn Interceptor<C>>,
    before: Chain<C>,
    after: Chain<C>,
    on_defer: Chain<C>,
    fields: LogFields,
}

impl<C: Send + 'static> Pipeline<C> {
    pub fn new(handler: impl Interceptor<C>) -> Self {
        Self {
            handler: Arc::new(handler),
            before: Vec::new(),
            after: Vec::new(),
            on_defer: Vec::new(),
            fields: LogFields::default(),
        }
    }

    #[must_use]
    pub fn before(mut self, interceptor: impl Interceptor<C>) -> Self {
        self.before.push(Arc::new(interceptor));
        self
    }

    #[must_use]
    pub fn after(mut self, interceptor: impl Interceptor<C>) -> Self {
        self.after.push(Arc::new(interceptor));
        self
    }

    #[must_use]
    pub fn on_defer(mut self, interceptor: impl Interceptor<C>) -> Self {
        self.on_defer.push(Arc::new(interceptor));
        self
    }

    /// Put `chain` in front of the existing before interceptors.
    #[must_use]
    pub fn prepend_before(mut self, chain: Chain<C>) -> Self {
        let mut before = chain;
        before.append(&mut self.before);
        self.before = before;
        self
    }

    #[must_use]
    pub fn fields(mut self, fields: LogFields) -> Self {
        self.fields = fields;
        self
    }

    pub fn log_fields(&self) -> &LogFields {
        &self.fields
    }

    /// Run the pipeline for one update.
    pub async fn run(&self, ctx: C, trace_id: &str) -> Result<(), ChainError> {
        let span = tracing::info_span!(
            "update",
            module = self.fields.module,
            func = self.fields.func,
            path = self.fields.path,
            trace_id = trace_id,
        );
        self.run_inner(ctx).instrument(span).await
    }

    async fn run_inner(&self, ctx: C) -> Result<(), ChainError> {
        let (ctx, result) = match run_chain(ctx, &self.before).await {
            Err(Interrupted { ctx, error }) => (ctx, Err((Stage::Before, error))),
            Ok(ctx) => match self.handler.call(ctx).await {
                Err(Interrupted { ctx, error }) => (ctx, Err((Stage::Handler, error))),
                Ok(ctx) => match run_chain(ctx, &self.after).await {
                    Err(Interrupted { ctx, error }) => (ctx, Err((Stage::After, error))),
                    Ok(ctx) => (ctx, Ok(())),
                },
            },
        };

        run_defer(ctx, &self.on_defer).await;

        result.map_err(|(stage, source)| {
            debug!("Pipeline stopped at {:?}: {}", stage, source);
            ChainError { stage, source }
        })
    }
}

/// Run `chain` in order, stopping at the first error.
async fn run_chain<C: Send + 'static>(mut ctx: C, chain: &Chain<C>) -> Step<C> {
    for interceptor in chain {
        ctx = interceptor.call(ctx).await?;
    }
    Ok(ctx)
}

/// Run every deferred interceptor; failures are logged and skipped.
async fn run_defer<C: Send + 'static>(mut ctx: C, chain: &Chain<C>) -> C {
    for interceptor in chain {
        ctx = match interceptor.call(ctx).await {
            Ok(ctx) => ctx,
            Err(Interrupted { ctx, error }) => {
                warn!("Deferred interceptor failed: {}", error);
                ctx
            }
        };
    }
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    use crate::runtime::{LockKey, UserLockGuard, UserLocks};

    /// Minimal context recording which steps ran.
    struct TestCtx {
        log: Arc<Mutex<Vec<String>>>,
        value: u32,
    }

    impl TestCtx {
        fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
            let log = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    log: log.clone(),
                    value: 0,
                },
                log,
            )
        }

        fn record(&self, what: &str) {
            self.log.lock().push(what.to_string());
        }
    }

    async fn record_step(ctx: TestCtx, name: &'static str) -> Step<TestCtx> {
        ctx.record(name);
        Ok(ctx)
    }

    async fn fail_step(ctx: TestCtx, name: &'static str) -> Step<TestCtx> {
        ctx.record(name);
        Err(Interrupted::new(ctx, BotError::InvalidSyntax))
    }

    fn recorder(name: &'static str) -> impl Interceptor<TestCtx> {
        move |ctx: TestCtx| record_step(ctx, name)
    }

    fn failing(name: &'static str) -> impl Interceptor<TestCtx> {
        move |ctx: TestCtx| fail_step(ctx, name)
    }

    #[tokio::test]
    async fn test_full_run_order() {
        let pipeline = Pipeline::new(recorder("handler"))
            .before(recorder("b1"))
            .before(recorder("b2"))
            .after(recorder("a1"))
            .on_defer(recorder("d1"))
            .on_defer(recorder("d2"));

        let (ctx, log) = TestCtx::new();
        pipeline.run(ctx, "t").await.unwrap();

        assert_eq!(*log.lock(), vec!["b1", "b2", "handler", "a1", "d1", "d2"]);
    }

    #[tokio::test]
    async fn test_before_error_skips_rest_but_runs_defer() {
        for failing_at in 0..3 {
            let mut pipeline = Pipeline::new(recorder("handler"));
            for i in 0..3 {
                pipeline = if i == failing_at {
                    pipeline.before(failing(["b0", "b1", "b2"][i]))
                } else {
                    pipeline.before(recorder(["b0", "b1", "b2"][i]))
                };
            }
            let pipeline = pipeline
                .after(recorder("a1"))
                .on_defer(recorder("d1"))
                .on_defer(recorder("d2"));

            let (ctx, log) = TestCtx::new();
            let err = pipeline.run(ctx, "t").await.unwrap_err();
            assert_eq!(err.stage, Stage::Before);

            let log = log.lock().clone();
            let expected: Vec<String> = ["b0", "b1", "b2"][..=failing_at]
                .iter()
                .chain(["d1", "d2"].iter())
                .map(|s| s.to_string())
                .collect();
            assert_eq!(log, expected);
        }
    }

    #[tokio::test]
    async fn test_handler_error_skips_after() {
        let pipeline = Pipeline::new(failing("handler"))
            .after(recorder("a1"))
            .on_defer(recorder("d1"));

        let (ctx, log) = TestCtx::new();
        let err = pipeline.run(ctx, "t").await.unwrap_err();

        assert_eq!(err.stage, Stage::Handler);
        assert!(matches!(err.source, BotError::InvalidSyntax));
        assert_eq!(*log.lock(), vec!["handler", "d1"]);
    }

    #[tokio::test]
    async fn test_failing_defer_does_not_stop_other_defers() {
        let pipeline = Pipeline::new(recorder("handler"))
            .on_defer(failing("d1"))
            .on_defer(recorder("d2"));

        let (ctx, log) = TestCtx::new();
        pipeline.run(ctx, "t").await.unwrap();
        assert_eq!(*log.lock(), vec!["handler", "d1", "d2"]);
    }

    async fn add_twenty(mut ctx: TestCtx) -> Step<TestCtx> {
        ctx.value += 20;
        Ok(ctx)
    }

    async fn add_twenty_two(mut ctx: TestCtx) -> Step<TestCtx> {
        ctx.value += 22;
        Ok(ctx)
    }

    async fn report_value(ctx: TestCtx) -> Step<TestCtx> {
        ctx.record(&format!("handler saw {}", ctx.value));
        Ok(ctx)
    }

    #[tokio::test]
    async fn test_mutations_are_visible_downstream() {
        let pipeline = Pipeline::new(report_value)
            .before(add_twenty)
            .before(add_twenty_two);

        let (ctx, log) = TestCtx::new();
        pipeline.run(ctx, "t").await.unwrap();
        assert_eq!(*log.lock(), vec!["handler saw 42"]);
    }

    /// Context shaped like the bot's: a lock slot filled before the handler
    /// and emptied on defer.
    struct LockedCtx {
        locks: UserLocks,
        user_id: u64,
        lock: Option<UserLockGuard>,
        active: Arc<Mutex<u32>>,
        overlaps: Arc<Mutex<u32>>,
    }

    async fn lock(mut ctx: LockedCtx) -> Step<LockedCtx> {
        ctx.lock = Some(ctx.locks.acquire(LockKey::user(ctx.user_id)).await);
        Ok(ctx)
    }

    async fn unlock(mut ctx: LockedCtx) -> Step<LockedCtx> {
        ctx.lock.take();
        Ok(ctx)
    }

    async fn critical_section(ctx: LockedCtx) -> Step<LockedCtx> {
        {
            let mut active = ctx.active.lock();
            *active += 1;
            if *active > 1 {
                *ctx.overlaps.lock() += 1;
            }
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        *ctx.active.lock() -= 1;
        Ok(ctx)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_user_runs_do_not_overlap() {
        let pipeline = Arc::new(
            Pipeline::new(critical_section)
                .before(lock)
                .on_defer(unlock),
        );
        let locks = UserLocks::new();
        let active = Arc::new(Mutex::new(0));
        let overlaps = Arc::new(Mutex::new(0));

        let mut runs = Vec::new();
        for _ in 0..2 {
            let pipeline = pipeline.clone();
            let ctx = LockedCtx {
                locks: locks.clone(),
                user_id: 99,
                lock: None,
                active: active.clone(),
                overlaps: overlaps.clone(),
            };
            runs.push(tokio::spawn(async move { pipeline.run(ctx, "tip").await }));
        }
        for run in runs {
            run.await.unwrap().unwrap();
        }

        assert_eq!(*overlaps.lock(), 0);
        assert!(locks.is_empty());
    }

    async fn reject_banned(ctx: LockedCtx) -> Step<LockedCtx> {
        Err(Interrupted::new(ctx, BotError::Banned))
    }

    #[tokio::test]
    async fn test_lock_released_when_before_chain_fails_after_locking() {
        let locks = UserLocks::new();
        let pipeline = Pipeline::new(critical_section)
            .before(lock)
            .before(reject_banned)
            .on_defer(unlock);

        let ctx = LockedCtx {
            locks: locks.clone(),
            user_id: 5,
            lock: None,
            active: Arc::new(Mutex::new(0)),
            overlaps: Arc::new(Mutex::new(0)),
        };
        assert!(pipeline.run(ctx, "t").await.is_err());
        assert!(!locks.is_locked(&LockKey::user(5)));
    }

    /// Wallet creation flow: the stored record is read only once the user
    /// lock is held, so a second `/start` sees the first one's wallet.
    struct WalletCtx {
        locks: UserLocks,
        lock: Option<UserLockGuard>,
        stored: Arc<Mutex<Option<u32>>>,
        loaded: Option<u32>,
        created: Arc<Mutex<u32>>,
    }

    async fn lock_wallet_user(mut ctx: WalletCtx) -> Step<WalletCtx> {
        ctx.lock = Some(ctx.locks.acquire(LockKey::user(1)).await);
        Ok(ctx)
    }

    async fn load_wallet(mut ctx: WalletCtx) -> Step<WalletCtx> {
        ctx.loaded = *ctx.stored.lock();
        Ok(ctx)
    }

    async fn create_missing_wallet(ctx: WalletCtx) -> Step<WalletCtx> {
        if ctx.loaded.is_none() {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let mut created = ctx.created.lock();
            *created += 1;
            *ctx.stored.lock() = Some(*created);
        }
        Ok(ctx)
    }

    async fn unlock_wallet_user(mut ctx: WalletCtx) -> Step<WalletCtx> {
        ctx.lock.take();
        Ok(ctx)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_record_loaded_after_lock_is_current() {
        let pipeline = Arc::new(
            Pipeline::new(create_missing_wallet)
                .before(lock_wallet_user)
                .before(load_wallet)
                .on_defer(unlock_wallet_user),
        );
        let locks = UserLocks::new();
        let stored = Arc::new(Mutex::new(None));
        let created = Arc::new(Mutex::new(0));

        let mut runs = Vec::new();
        for _ in 0..2 {
            let pipeline = pipeline.clone();
            let ctx = WalletCtx {
                locks: locks.clone(),
                lock: None,
                stored: stored.clone(),
                loaded: None,
                created: created.clone(),
            };
            runs.push(tokio::spawn(async move { pipeline.run(ctx, "start").await }));
        }
        for run in runs {
            run.await.unwrap().unwrap();
        }

        assert_eq!(*created.lock(), 1);
        assert_eq!(*stored.lock(), Some(1));
    }
}
