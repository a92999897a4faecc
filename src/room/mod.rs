//! Waiting-room presence
//!
//! Membership, ready state, host-only game start and the activity feed
//! for one Spades waiting room.

pub mod activity;
pub mod coordinator;
pub mod notifier;
pub mod state;

pub use activity::{ActivityFeed, RoomActivityLog};
pub use coordinator::RoomPresenceCoordinator;
pub use notifier::{Notification, Notifier, RecordingNotifier, Severity, TracingNotifier};
pub use state::check_transition;
