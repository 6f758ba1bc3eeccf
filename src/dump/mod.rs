//! Request reflection and synthetic responses
//!
//! [`origin`] resolves who is calling, [`snapshot`] turns a request into
//! its echoed form, [`handlers`] implements the routes and [`router`]
//! maps paths onto them.

pub mod exchange;
pub mod handlers;
pub mod origin;
pub mod router;
pub mod snapshot;

pub use exchange::{Capabilities, Exchange};
pub use handlers::{Handler, MAX_BYTES, MAX_LINES};
pub use origin::{Origin, OriginPolicy};
pub use router::Router;
pub use snapshot::RequestSnapshot;
