//! Execution bridge: drives an effect to a tagged exit.
//!
//! The bridge is the only place an effect actually runs. It never rejects
//! for expected failures - every outcome arrives as an [`Exit`]:
//!
//! - declared error → `Failure(Fail(e))`
//! - panic inside the effect → `Failure(Die(defect))` (contained, never
//!   unwinds into the caller)
//! - fired cancellation signal → the effect future is dropped and the
//!   bridge resolves `Failure(Interrupt)` - never left pending
//!
//! Every run executes inside a tracing span named for the driving
//! operation, carrying the descriptor key as a field. The span is purely
//! observational.

use std::fmt;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cache::QueryKey;
use crate::effect::{Effect, EffectContext};
use crate::outcome::{Cause, Exit};
use crate::runtime::Runtime;

/// Which adapter operation is driving this run. Selects the span name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// A non-suspending query fetch.
    Query,
    /// A suspense query fetch.
    SuspenseQuery,
    /// A mutation.
    Mutation,
}

impl OpKind {
    /// The span name for this operation.
    pub fn span_name(&self) -> &'static str {
        match self {
            OpKind::Query => "use_query",
            OpKind::SuspenseQuery => "use_suspense_query",
            OpKind::Mutation => "use_mutation",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.span_name())
    }
}

/// Per-run options for the bridge.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Cancellation signal to honor; `None` means the run is never
    /// externally interrupted.
    pub signal: Option<CancellationToken>,
    /// The driving operation, used for the tracing span name.
    pub op: OpKind,
    /// The descriptor key, attached to the span.
    pub key: QueryKey,
}

/// Run an effect against a runtime and resolve its exit.
///
/// Success and failure delivery is exactly-once per invocation. A signal
/// that is already fired at entry interrupts without starting the effect.
/// A disposed runtime resolves as a defect-flavored failure so callers fail
/// fast instead of silently no-oping.
pub async fn run_to_exit<A, E, R>(
    effect: &Effect<A, E, R>,
    runtime: &Runtime<R>,
    options: RunOptions,
) -> Exit<A, E>
where
    A: Send + 'static,
    E: Send + 'static,
    R: Send + Sync + 'static,
{
    let span = match options.op {
        OpKind::Query => tracing::info_span!("use_query", query.key = %options.key),
        OpKind::SuspenseQuery => {
            tracing::info_span!("use_suspense_query", query.key = %options.key)
        }
        OpKind::Mutation => tracing::info_span!("use_mutation", query.key = %options.key),
    };

    async {
        let caps = match runtime.capabilities() {
            Ok(caps) => caps,
            Err(err) => return Exit::Failure(Cause::die(err)),
        };

        let signal = options.signal.unwrap_or_default();
        if signal.is_cancelled() {
            return Exit::Failure(Cause::Interrupt);
        }

        let ctx = EffectContext::new(caps, signal.clone());
        let guarded = AssertUnwindSafe(effect.launch(ctx)).catch_unwind();
        tokio::pin!(guarded);

        tokio::select! {
            _ = signal.cancelled() => Exit::Failure(Cause::Interrupt),
            outcome = &mut guarded => match outcome {
                Ok(Ok(value)) => Exit::Success(value),
                Ok(Err(error)) => Exit::Failure(Cause::Fail(error)),
                Err(panic) => Exit::Failure(Cause::from_panic(panic)),
            },
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{CapabilityRegistry, Layer};
    use std::time::Duration;

    async fn runtime() -> Runtime<()> {
        let registry = CapabilityRegistry::new();
        Runtime::build(&Layer::new("test", || async { Ok(()) }), &registry)
            .await
            .unwrap()
    }

    fn opts(signal: Option<CancellationToken>) -> RunOptions {
        RunOptions {
            signal,
            op: OpKind::Query,
            key: QueryKey::new(["test"]),
        }
    }

    #[tokio::test]
    async fn test_success_exit() {
        let rt = runtime().await;
        let effect: Effect<i32, String, ()> = Effect::succeed(11);
        let exit = run_to_exit(&effect, &rt, opts(None)).await;
        assert_eq!(exit.success(), Some(&11));
    }

    #[tokio::test]
    async fn test_declared_error_becomes_fail_cause() {
        let rt = runtime().await;
        let effect: Effect<i32, String, ()> = Effect::fail("missing".to_string());
        let exit = run_to_exit(&effect, &rt, opts(None)).await;
        assert_eq!(
            exit.failure().unwrap().expected(),
            Some(&"missing".to_string())
        );
    }

    #[tokio::test]
    async fn test_panic_becomes_die_cause() {
        let rt = runtime().await;
        let effect: Effect<i32, String, ()> =
            Effect::new(|_ctx| async { panic!("unexpected state") });
        let exit = run_to_exit(&effect, &rt, opts(None)).await;
        let cause = exit.failure().unwrap();
        assert!(cause.defect().unwrap().to_string().contains("unexpected state"));
    }

    #[tokio::test]
    async fn test_cancel_mid_run_interrupts() {
        let rt = runtime().await;
        let effect: Effect<i32, String, ()> = Effect::new(|_ctx| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(1)
        });

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let exit = run_to_exit(&effect, &rt, opts(Some(token))).await;
        assert!(exit.failure().unwrap().is_interrupted());
    }

    #[tokio::test]
    async fn test_already_cancelled_signal_interrupts_without_running() {
        let rt = runtime().await;
        let effect: Effect<i32, String, ()> =
            Effect::new(|_ctx| async { panic!("must not run") });

        let token = CancellationToken::new();
        token.cancel();

        let exit = run_to_exit(&effect, &rt, opts(Some(token))).await;
        assert!(exit.failure().unwrap().is_interrupted());
    }

    #[tokio::test]
    async fn test_disposed_runtime_fails_fast_as_defect() {
        let rt = runtime().await;
        rt.dispose().await;

        let effect: Effect<i32, String, ()> = Effect::succeed(1);
        let exit = run_to_exit(&effect, &rt, opts(None)).await;
        let defect = exit.failure().unwrap().defect().unwrap();
        assert!(defect
            .downcast_ref::<crate::SluiceError>()
            .map(|e| matches!(e, crate::SluiceError::RuntimeDisposed))
            .unwrap_or(false));
    }
}
