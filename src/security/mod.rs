//! Request size limits enforced by the HTTP codec

pub mod limits;

pub use limits::{RequestLimits, SizeError, SizeValidator};
