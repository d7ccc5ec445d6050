//! Fluent assertions with descriptive failures.
//!
//! ```rust
//! use api_harness::verify::{verify, verify_labeled};
//!
//! verify(200u16).is(200).unwrap();
//! verify_labeled(vec!["acme", "globex"], "List of organization names")
//!     .contains("acme")
//!     .unwrap();
//!
//! let failure = verify(vec![1, 2]).is(vec![2, 1]).unwrap_err();
//! assert!(failure.to_string().contains("[1, 2]"));
//! ```

use crate::error::{AssertionFailure, HarnessError, HarnessResult};
use chrono::{DateTime, Utc};
use log::warn;
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Characters of a rendered value kept by [`Verification::succinctly`].
pub const SUCCINCT_LIMIT: usize = 120;

/// Result of a terminal check.
pub type Check = Result<(), AssertionFailure>;

/// A captured value awaiting a terminal check.
#[derive(Debug, Clone)]
pub struct Verification<T> {
    actual: T,
    label: Option<String>,
    succinct: bool,
}

/// Start a verification.
pub fn verify<T>(actual: T) -> Verification<T> {
    Verification {
        actual,
        label: None,
        succinct: false,
    }
}

/// Start a verification whose failures carry `label`.
pub fn verify_labeled<T>(actual: T, label: impl Into<String>) -> Verification<T> {
    Verification {
        actual,
        label: Some(label.into()),
        succinct: false,
    }
}

/// Shorten `text` to at most `max_chars` characters, marking the cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{}... ({} more chars)", kept, total - max_chars)
}

impl<T> Verification<T> {
    /// Truncate rendered values in failure messages.
    pub fn succinctly(mut self) -> Self {
        self.succinct = true;
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Borrow the captured value.
    pub fn actual(&self) -> &T {
        &self.actual
    }

    /// Replace the captured value with a derived one, keeping label and
    /// rendering options.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Verification<U> {
        Verification {
            actual: f(self.actual),
            label: self.label,
            succinct: self.succinct,
        }
    }

    fn render(&self, value: &dyn Debug) -> String {
        let rendered = format!("{:?}", value);
        if self.succinct {
            truncate(&rendered, SUCCINCT_LIMIT)
        } else {
            rendered
        }
    }

    fn fail(&self, check: &'static str, expected: String, actual: String) -> Check {
        Err(AssertionFailure {
            label: self.label.clone(),
            check,
            expected,
            actual,
        })
    }
}

impl<T: Debug> Verification<T> {
    /// Passes when the value equals `expected`. Collections compare in order.
    pub fn is<E>(self, expected: E) -> Check
    where
        T: PartialEq<E>,
        E: Debug,
    {
        if self.actual == expected {
            Ok(())
        } else {
            self.fail("is", self.render(&expected), self.render(&self.actual))
        }
    }

    /// Passes when the value differs from `unexpected`.
    pub fn is_not<E>(self, unexpected: E) -> Check
    where
        T: PartialEq<E>,
        E: Debug,
    {
        if self.actual != unexpected {
            Ok(())
        } else {
            self.fail(
                "is_not",
                format!("anything but {}", self.render(&unexpected)),
                self.render(&self.actual),
            )
        }
    }

    /// Passes when `predicate` holds; `description` names the expectation.
    pub fn matches(self, predicate: impl FnOnce(&T) -> bool, description: &str) -> Check {
        if predicate(&self.actual) {
            Ok(())
        } else {
            self.fail("matches", description.to_string(), self.render(&self.actual))
        }
    }
}

impl<T: Debug> Verification<Option<T>> {
    pub fn is_some(self) -> Check {
        if self.actual.is_some() {
            Ok(())
        } else {
            self.fail("is_some", "a value".to_string(), "None".to_string())
        }
    }

    pub fn is_none(self) -> Check {
        if self.actual.is_none() {
            Ok(())
        } else {
            self.fail("is_none", "None".to_string(), self.render(&self.actual))
        }
    }
}

impl<T: Debug> Verification<Vec<T>> {
    /// Narrow each element before comparing; order is preserved.
    pub fn select<U>(self, f: impl FnMut(&T) -> U) -> Verification<Vec<U>> {
        Verification {
            actual: self.actual.iter().map(f).collect(),
            label: self.label,
            succinct: self.succinct,
        }
    }

    /// Passes when some element equals `item`.
    pub fn contains<E>(self, item: E) -> Check
    where
        T: PartialEq<E>,
        E: Debug,
    {
        if self.actual.iter().any(|element| *element == item) {
            Ok(())
        } else {
            self.fail(
                "contains",
                format!("a collection containing {}", self.render(&item)),
                self.render(&self.actual),
            )
        }
    }

    /// Passes when no element equals `item`.
    pub fn does_not_contain<E>(self, item: E) -> Check
    where
        T: PartialEq<E>,
        E: Debug,
    {
        if self.actual.iter().any(|element| *element == item) {
            self.fail(
                "does_not_contain",
                format!("a collection without {}", self.render(&item)),
                self.render(&self.actual),
            )
        } else {
            Ok(())
        }
    }
}

impl Verification<String> {
    /// Passes when the string contains `needle`.
    pub fn contains(self, needle: &str) -> Check {
        self.str_contains(needle, true)
    }

    /// Passes when the string does not contain `needle`.
    pub fn does_not_contain(self, needle: &str) -> Check {
        self.str_contains(needle, false)
    }

    fn str_contains(self, needle: &str, wanted: bool) -> Check {
        if self.actual.contains(needle) == wanted {
            return Ok(());
        }
        let (check, expected) = if wanted {
            ("contains", format!("text containing {:?}", needle))
        } else {
            ("does_not_contain", format!("text without {:?}", needle))
        };
        self.fail(check, expected, self.render(&self.actual))
    }
}

impl Verification<&str> {
    /// Passes when the string contains `needle`.
    pub fn contains(self, needle: &str) -> Check {
        self.map(str::to_owned).contains(needle)
    }

    /// Passes when the string does not contain `needle`.
    pub fn does_not_contain(self, needle: &str) -> Check {
        self.map(str::to_owned).does_not_contain(needle)
    }
}

impl Verification<DateTime<Utc>> {
    /// Passes when the timestamp is within `tolerance` of now, either side.
    pub fn is_within(self, tolerance: Duration) -> Check {
        self.is_within_of(Utc::now(), tolerance)
    }

    /// Passes when the timestamp is within `tolerance` of `reference`.
    pub fn is_within_of(self, reference: DateTime<Utc>, tolerance: Duration) -> Check {
        let difference_ms = (reference - self.actual).num_milliseconds().unsigned_abs();
        if u128::from(difference_ms) <= tolerance.as_millis() {
            Ok(())
        } else {
            self.fail(
                "is_within",
                format!("{} +/- {:?}", reference.to_rfc3339(), tolerance),
                format!("{} (off by {}ms)", self.actual.to_rfc3339(), difference_ms),
            )
        }
    }
}

/// Collects failures of soft checks so a test can report all of them.
#[derive(Debug, Default)]
pub struct AssertionLog {
    failures: Mutex<Vec<AssertionFailure>>,
}

impl AssertionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a check. Returns whether it passed.
    pub fn check(&self, outcome: Check) -> bool {
        match outcome {
            Ok(()) => true,
            Err(failure) => {
                warn!("{}", failure);
                self.failures
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(failure);
                false
            }
        }
    }

    /// Failures recorded so far.
    pub fn failures(&self) -> Vec<AssertionFailure> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `Ok` if nothing failed, otherwise a single [`HarnessError::Assertion`]
    /// describing every failure.
    pub fn result(&self) -> HarnessResult<()> {
        let mut failures = self.failures();
        match failures.len() {
            0 => Ok(()),
            1 => Err(HarnessError::Assertion(failures.remove(0))),
            n => Err(HarnessError::Assertion(AssertionFailure {
                label: Some(format!("{} verifications failed", n)),
                check: "all",
                expected: "every verification to hold".to_string(),
                actual: failures
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n"),
            })),
        }
    }

    pub fn into_result(self) -> HarnessResult<()> {
        self.result()
    }
}
