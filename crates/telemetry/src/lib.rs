//! Telemetry backbone: trace correlation, the structured event log, the
//! request timer, the circuit-broken index shipper, analytics queries, and
//! the data-lifecycle manager.

pub mod events;
pub mod lifecycle;
pub mod log;
pub mod queries;
pub mod shipper;
pub mod timer;
pub mod trace;

pub use log::{Event, EventLog};
pub use shipper::{IndexBackend, IndexShipper, ShipperConfig, StoreHandler};
pub use timer::{RequestTimer, TimingSpan};
pub use trace::TraceContext;
