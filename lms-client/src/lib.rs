//! Client for the upstream LMS web-service API.
//!
//! Issues single, time-bounded requests and validates response shapes.
//! Translation of the returned records is left to the caller.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod client;

pub use client::{ClientConfig, LmsClient};
