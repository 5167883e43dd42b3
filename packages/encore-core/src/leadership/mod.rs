//! Tab leadership: which tab may hold the live playback device.
//!
//! Tabs cannot talk to each other; they elect a leader through a last-write-wins
//! record in shared storage, refreshed by heartbeats and taken over on timeout.

mod coordinator;
mod record;

pub use coordinator::{LeaderState, LeadershipStatus, TabCoordinator};
pub use record::{LeadershipRecord, LeadershipRegister, StorageLeadershipRegister, TabId};
