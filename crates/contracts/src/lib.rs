//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace:
//! the telemetry `Record`, the stream / store / subscriber seams and the
//! pipeline configuration blueprint.
//! Business crates depend only on this crate, never on each other's internals.
//!
//! ## Ordering model
//! - `vehicle_id` is both the partition key and the ordering key
//! - `observed_at` is the vehicle-side timestamp, `stored_at` the server-side one

mod blueprint;
mod error;
mod record;
mod sink;
mod store;
mod stream;
mod subscriber;

pub use blueprint::*;
pub use error::*;
pub use record::*;
pub use sink::*;
pub use store::*;
pub use stream::*;
pub use subscriber::*;
