//! Immutable HTTP request descriptions.
//!
//! A [`RequestSpec`] is built once with the consuming constructors in
//! [`builders`] and customised afterwards only through
//! [`RequestSpec::with`], which returns a new value and leaves the receiver
//! untouched. Shared request templates can therefore be specialised per test,
//! for example with a fixture's access token, without affecting other tests.
//!
//! ```rust
//! use api_harness::request::{Override, RequestSpec, bearer};
//!
//! let base = RequestSpec::get("/a");
//! let authorized = base.with(Override::Authorization(Some(bearer("T"))));
//! let moved = authorized.with(Override::Url("/b".into()));
//!
//! assert_eq!(moved.authorization(), Some("Bearer T"));
//! assert_eq!(moved.url(), "/b");
//! assert_eq!(base.authorization(), None);
//! assert_eq!(base.url(), "/a");
//! ```

pub mod builders;
pub mod core;

#[cfg(test)]
mod tests;

pub use self::core::{Method, Override, RequestSpec, SerializationFormat};
pub use builders::bearer;
