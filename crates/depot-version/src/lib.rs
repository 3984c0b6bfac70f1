#![warn(missing_docs)]

//! Depot version subsystem: the editing/committed lifecycle, the mutation
//! gateway over metadata and chunk storage, and the garbage collector.
//!
//! Coordination between mutators and GC is explicit: a [`MaintenanceGate`]
//! and an [`UploadSlots`] pool are constructed by the owning server and
//! injected into both sides.

pub mod error;
pub mod gate;
pub mod gc;
pub mod manager;

pub use error::{VersionError, VersionResult};
pub use gate::{GatePass, MaintenanceGate, UploadSlots};
pub use gc::{GarbageCollector, GcConfig, GcPassReport, GcStats};
pub use manager::{UploadOutcome, VersionManager};
