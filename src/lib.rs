//! hasync - active/standby checkpoint replication
//!
//! Keeps a standby replica's in-memory object state converged with an
//! active peer over an unreliable frame transport:
//!
//! - `codec`: versioned record encoding with sub-part negotiation
//! - `queue`: async update queue, counters, and the replay log
//! - `session`: the cold/warm/data sync protocol, both sides
//! - `role`: HA role definitions and the transition controller
//! - `engine`: single-threaded event loop tying it all together

pub mod codec;
pub mod config;
pub mod engine;
pub mod event;
pub mod observability;
pub mod queue;
pub mod role;
pub mod session;
pub mod store;
pub mod timer;
pub mod transport;

pub use codec::{EntityKind, ReplicatedEntity, SubPartVersion, VersionRange};
pub use config::EngineConfig;
pub use engine::{EngineError, EngineResult, ReplicationEngine};
pub use event::EngineEvent;
pub use queue::UpdateOperation;
pub use role::HaRole;
pub use session::SyncState;
pub use store::{MemoryStore, ObjectStore};
pub use transport::{LoopbackEndpoint, LoopbackPair, Transport};
