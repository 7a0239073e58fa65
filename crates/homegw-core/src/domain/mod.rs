//! Domain layer: identity types with no I/O.
//!
//! - **`identity`** – [`Principal`] and [`AccessLevel`], the result of a
//!   successful authentication.  A principal is fixed for the lifetime of the
//!   connection it was established on.

pub mod identity;

pub use identity::{AccessLevel, Principal};
