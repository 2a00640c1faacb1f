//! Plugin facades layered on [`PluginHandle`](crate::PluginHandle).
//!
//! A facade holds a plugin handle and speaks one plugin's message
//! vocabulary through [`PluginHandle::request_message`](crate::PluginHandle::request_message).
//! It never reaches into session or client internals.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `videoroom` | `janus.plugin.videoroom` rooms, publishers and listeners |

// ============================================================================
// Submodules
// ============================================================================

/// VideoRoom plugin facade.
pub mod videoroom;

// ============================================================================
// Re-exports
// ============================================================================

pub use videoroom::{
    FeedId, ParticipantType, RoomCreated, RoomExists, RoomId, RoomJoined, RoomList,
    RoomParticipants, VIDEOROOM_PLUGIN, VideoRoomHandle, VideoRoomListener, VideoRoomPlugin,
    VideoRoomPublisher,
};
