//! Maintenance gate
//!
//! Every request not excluded by the [`RouteFilter`] asks the [`FlagCache`]
//! for the current [`MaintenanceFlag`]. While the content source says the site
//! is under maintenance the request URI is rewritten to the maintenance page;
//! the client keeps seeing the URL it asked for.
//!
//! The gate fails open: a missing endpoint, an unreachable or broken content
//! source, or an unexpected payload all resolve to [`MaintenanceFlag::Unknown`]
//! and the request passes untouched.

mod cache;
mod gate;
mod lookup;
mod matcher;

pub use cache::{CacheStatsSnapshot, Clock, FlagCache, SystemClock};
pub use gate::{MaintenanceGate, maintenance_gate};
pub use lookup::{FlagSource, HttpFlagSource, LookupError};
pub use matcher::RouteFilter;
pub use site_gate_core::{GateDecision, MaintenanceFlag, decide};
