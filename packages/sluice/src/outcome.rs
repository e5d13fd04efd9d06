//! Tagged outcomes and structured failure causes.
//!
//! Running an effect always produces an [`Exit`]: either `Success(value)` or
//! `Failure(cause)`. The [`Cause`] keeps the full failure structure - an
//! expected error from the effect's declared error channel, a defect (an
//! unexpected panic), or an interruption marker from cancellation - so
//! downstream consumers can branch on failure kind without losing
//! information.
//!
//! # Key Invariants
//!
//! 1. **An Exit is never partially resolved** - consumers match both arms
//! 2. **Causes are never downgraded** - no stringification, no collapsing
//!    to a single error type
//! 3. **Interruption is not an error report** - it is its own variant

use std::any::Any;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Defect
// =============================================================================

/// An unexpected failure: a panic or an exception not declared in the
/// effect's error channel.
///
/// Defects wrap a shared `anyhow::Error` so they stay cloneable and
/// downcastable. `anyhow` is internal transport here - the defect itself is
/// the externalized shape.
#[derive(Clone)]
pub struct Defect(Arc<anyhow::Error>);

impl Defect {
    /// Wrap an error as a defect.
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(error.into()))
    }

    /// Attempt to downcast the underlying error to a concrete type.
    pub fn downcast_ref<T: fmt::Display + fmt::Debug + Send + Sync + 'static>(
        &self,
    ) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Defect({:?})", self.0)
    }
}

// =============================================================================
// Cause
// =============================================================================

/// The full structure of a failure.
///
/// Every failing run resolves to exactly one of these; none of them is ever
/// silently converted into another. `Fail` carries the application-declared
/// error value intact.
#[derive(Debug, Clone)]
pub enum Cause<E> {
    /// An expected failure: a value from the effect's declared error channel.
    Fail(E),
    /// A defect: an unexpected panic or undeclared exception.
    Die(Defect),
    /// The run was interrupted by cancellation.
    Interrupt,
}

impl<E> Cause<E> {
    /// Build a `Die` cause from any error.
    pub fn die(error: impl Into<anyhow::Error>) -> Self {
        Cause::Die(Defect::new(error))
    }

    /// Build a `Die` cause from a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "effect panicked".to_string()
        };
        Cause::Die(Defect::new(anyhow::anyhow!("{}", message)))
    }

    /// The expected error value, if this cause carries one.
    pub fn expected(&self) -> Option<&E> {
        match self {
            Cause::Fail(e) => Some(e),
            _ => None,
        }
    }

    /// The defect, if this cause carries one.
    pub fn defect(&self) -> Option<&Defect> {
        match self {
            Cause::Die(d) => Some(d),
            _ => None,
        }
    }

    /// Whether this cause was produced by cancellation.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Cause::Interrupt)
    }

    /// Map the expected error value, leaving defects and interrupts intact.
    pub fn map<E2>(self, f: impl FnOnce(E) -> E2) -> Cause<E2> {
        match self {
            Cause::Fail(e) => Cause::Fail(f(e)),
            Cause::Die(d) => Cause::Die(d),
            Cause::Interrupt => Cause::Interrupt,
        }
    }
}

impl<E: fmt::Display> fmt::Display for Cause<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Fail(e) => write!(f, "failed with {}", e),
            Cause::Die(d) => write!(f, "died with defect: {}", d),
            Cause::Interrupt => write!(f, "interrupted"),
        }
    }
}

impl<E: fmt::Display + fmt::Debug> std::error::Error for Cause<E> {}

// =============================================================================
// Exit
// =============================================================================

/// The tagged result of running an effect to completion.
///
/// Never a bare rejection: expected failures, defects, and interruptions all
/// arrive here as `Failure` with their structure intact.
#[derive(Debug, Clone)]
pub enum Exit<A, E> {
    /// The effect completed with a success value.
    Success(A),
    /// The effect failed; the cause says how.
    Failure(Cause<E>),
}

impl<A, E> Exit<A, E> {
    /// Whether this exit is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Exit::Success(_))
    }

    /// The success value, if any.
    pub fn success(&self) -> Option<&A> {
        match self {
            Exit::Success(a) => Some(a),
            Exit::Failure(_) => None,
        }
    }

    /// The failure cause, if any.
    pub fn failure(&self) -> Option<&Cause<E>> {
        match self {
            Exit::Success(_) => None,
            Exit::Failure(c) => Some(c),
        }
    }

    /// Convert into a plain `Result`, keeping the cause structure.
    pub fn into_result(self) -> Result<A, Cause<E>> {
        match self {
            Exit::Success(a) => Ok(a),
            Exit::Failure(c) => Err(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct NotFound;

    impl fmt::Display for NotFound {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "not found")
        }
    }

    #[test]
    fn test_cause_expected_error_recoverable() {
        let cause = Cause::Fail(NotFound);
        assert_eq!(cause.expected(), Some(&NotFound));
        assert!(cause.defect().is_none());
        assert!(!cause.is_interrupted());
    }

    #[test]
    fn test_cause_die_preserves_source() {
        #[derive(Debug, thiserror::Error)]
        #[error("boom")]
        struct Boom;

        let cause: Cause<NotFound> = Cause::die(Boom);
        let defect = cause.defect().unwrap();
        assert!(defect.downcast_ref::<Boom>().is_some());
    }

    #[test]
    fn test_cause_from_panic_extracts_message() {
        let payload: Box<dyn Any + Send> = Box::new("index out of bounds");
        let cause: Cause<NotFound> = Cause::from_panic(payload);
        assert!(cause.defect().unwrap().to_string().contains("out of bounds"));
    }

    #[test]
    fn test_cause_interrupt() {
        let cause: Cause<NotFound> = Cause::Interrupt;
        assert!(cause.is_interrupted());
        assert!(cause.expected().is_none());
        assert_eq!(cause.to_string(), "interrupted");
    }

    #[test]
    fn test_cause_map_only_touches_expected() {
        let mapped = Cause::Fail(1).map(|n: i32| n + 1);
        assert_eq!(mapped.expected(), Some(&2));

        let mapped: Cause<i32> = Cause::<i32>::Interrupt.map(|n| n + 1);
        assert!(mapped.is_interrupted());
    }

    #[test]
    fn test_exit_both_arms() {
        let success: Exit<i32, NotFound> = Exit::Success(7);
        assert!(success.is_success());
        assert_eq!(success.success(), Some(&7));
        assert_eq!(success.into_result().unwrap(), 7);

        let failure: Exit<i32, NotFound> = Exit::Failure(Cause::Fail(NotFound));
        assert!(!failure.is_success());
        assert_eq!(failure.failure().unwrap().expected(), Some(&NotFound));
        assert!(failure.into_result().is_err());
    }
}
