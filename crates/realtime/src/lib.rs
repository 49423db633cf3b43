//! Session and delivery core: presence, room subscriptions, typing,
//! message fan-out, and chat lifecycle.
//!
//! The transport layer (websocket handlers, REST routes) stays thin; every
//! behavior that matters lives here so it can be exercised without a
//! socket.

pub mod connection;
pub mod context;
pub mod delivery;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod locks;
pub mod presence;
pub mod rooms;
pub mod store_ops;
pub mod typing;

pub use connection::{ConnectionHandle, ConnectionId};
pub use context::RealtimeContext;
pub use delivery::{MessageDeliveryEngine, OutgoingMessage};
pub use errors::{RealtimeError, RealtimeResult};
pub use events::{ClientEvent, DeliveryTarget, ServerEvent};
pub use lifecycle::{ChatLifecycleManager, MembershipOutcome};
pub use locks::ChatLocks;
pub use presence::{BroadcastToAll, PresenceRegistry, PresenceScope};
pub use rooms::RoomMembershipTable;
pub use typing::TypingCoordinator;
