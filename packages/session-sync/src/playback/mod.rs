//! Multi-device playback session

mod coordinator;
mod engine;
mod interpolation;
mod preference;
mod registry;

pub use coordinator::{
    CoordinatorTick, PlaybackSessionCoordinator, SessionEvent, SessionRole, SessionView,
    TransferTicket,
};
pub use engine::{PlaybackEngine, PlaybackSnapshot};
pub use interpolation::{interpolate_position, now_millis};
pub use preference::{RemoteJoinPreference, JOIN_PREFERENCE_KEY};
pub use registry::DeviceRegistry;
