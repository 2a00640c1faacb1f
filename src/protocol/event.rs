//! Plugin handle event classification.
//!
//! Frames addressed to a handle (`sender` set) are classified by their
//! `janus` discriminant before being fanned out to listeners.
//!
//! | `janus` | Variant |
//! |---------|---------|
//! | `webrtcup` | [`HandleEventKind::WebrtcUp`] |
//! | `media` | [`HandleEventKind::Media`] |
//! | `slowlink` | [`HandleEventKind::SlowLink`] |
//! | `hangup` | [`HandleEventKind::Hangup`] |
//! | `detached` | [`HandleEventKind::Detached`] |
//! | `trickle` | [`HandleEventKind::Trickle`] |
//! | anything else | [`HandleEventKind::Generic`] |

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use super::{FrameKind, Jsep};
use super::response::Frame;

// ============================================================================
// HandleEventKind
// ============================================================================

/// Typed view of a handle event.
#[derive(Debug, Clone, PartialEq)]
pub enum HandleEventKind {
    /// The handle's PeerConnection is up.
    WebrtcUp,

    /// Media started or stopped flowing.
    Media {
        /// Media type (`audio`, `video`).
        media_type: Option<String>,
        /// Whether the gateway is receiving this media.
        receiving: bool,
    },

    /// The gateway detected a lossy link.
    SlowLink {
        /// `true` if the problem is on the gateway's uplink.
        uplink: bool,
        /// Media type affected.
        media_type: Option<String>,
        /// Lost packets reported.
        lost: u64,
    },

    /// The PeerConnection was closed.
    Hangup {
        /// Reason supplied by the gateway.
        reason: Option<String>,
    },

    /// The gateway detached the handle.
    Detached,

    /// The gateway trickled an ICE candidate.
    Trickle {
        /// Candidate payload.
        candidate: Value,
        /// End-of-candidates marker.
        completed: bool,
    },

    /// Plugin events and anything unrecognised.
    Generic,
}

// ============================================================================
// HandleEvent
// ============================================================================

/// A classified event addressed to a plugin handle.
#[derive(Debug, Clone)]
pub struct HandleEvent {
    /// Classification.
    pub kind: HandleEventKind,
    /// The frame as received.
    pub frame: Frame,
}

impl HandleEvent {
    /// Classifies a frame. Never fails; unknown kinds become
    /// [`HandleEventKind::Generic`].
    #[must_use]
    pub fn classify(frame: Frame) -> Self {
        let kind = match frame.janus {
            FrameKind::WebrtcUp => HandleEventKind::WebrtcUp,

            FrameKind::Media => HandleEventKind::Media {
                media_type: frame.get_str("type").map(str::to_string),
                receiving: frame.get_bool("receiving").unwrap_or_default(),
            },

            FrameKind::SlowLink => HandleEventKind::SlowLink {
                uplink: frame.get_bool("uplink").unwrap_or_default(),
                media_type: frame.get_str("media").map(str::to_string),
                lost: frame.get_u64("lost").unwrap_or_default(),
            },

            FrameKind::Hangup => HandleEventKind::Hangup {
                reason: frame.get_str("reason").map(str::to_string),
            },

            FrameKind::Detached => HandleEventKind::Detached,

            FrameKind::Trickle => {
                let candidate = frame.get("candidate").cloned().unwrap_or(Value::Null);
                let completed = candidate
                    .get("completed")
                    .and_then(Value::as_bool)
                    .unwrap_or_default();
                HandleEventKind::Trickle {
                    candidate,
                    completed,
                }
            }

            _ => HandleEventKind::Generic,
        };

        Self { kind, frame }
    }

    /// Returns the plugin's payload (`plugindata.data`) for generic events.
    #[inline]
    #[must_use]
    pub fn plugin_payload(&self) -> Option<&Value> {
        self.frame
            .plugin_data()
            .and_then(|plugindata| plugindata.get("data"))
    }

    /// Returns the session description attached to the event.
    #[inline]
    #[must_use]
    pub fn jsep(&self) -> Option<Jsep> {
        self.frame.jsep()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn classify(value: Value) -> HandleEvent {
        HandleEvent::classify(Frame::parse(value).expect("parse frame"))
    }

    #[test]
    fn test_webrtcup() {
        let event = classify(json!({ "janus": "webrtcup", "session_id": 1, "sender": 2 }));
        assert_eq!(event.kind, HandleEventKind::WebrtcUp);
    }

    #[test]
    fn test_media() {
        let event = classify(json!({
            "janus": "media", "session_id": 1, "sender": 2,
            "type": "video", "receiving": true
        }));

        assert_eq!(
            event.kind,
            HandleEventKind::Media {
                media_type: Some("video".into()),
                receiving: true,
            }
        );
    }

    #[test]
    fn test_slowlink() {
        let event = classify(json!({
            "janus": "slowlink", "sender": 2, "uplink": true, "media": "audio", "lost": 12
        }));

        assert_eq!(
            event.kind,
            HandleEventKind::SlowLink {
                uplink: true,
                media_type: Some("audio".into()),
                lost: 12,
            }
        );
    }

    #[test]
    fn test_hangup_reason() {
        let event = classify(json!({ "janus": "hangup", "sender": 2, "reason": "DTLS alert" }));
        assert_eq!(
            event.kind,
            HandleEventKind::Hangup {
                reason: Some("DTLS alert".into())
            }
        );
    }

    #[test]
    fn test_trickle_completed() {
        let event = classify(json!({
            "janus": "trickle", "sender": 2, "candidate": { "completed": true }
        }));

        match event.kind {
            HandleEventKind::Trickle { completed, .. } => assert!(completed),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_plugin_event_is_generic() {
        let event = classify(json!({
            "janus": "event", "sender": 2,
            "plugindata": { "plugin": "janus.plugin.videoroom", "data": { "videoroom": "event" } }
        }));

        assert_eq!(event.kind, HandleEventKind::Generic);
        assert_eq!(event.plugin_payload(), Some(&json!({ "videoroom": "event" })));
    }

    #[test]
    fn test_unknown_kind_is_generic() {
        let event = classify(json!({ "janus": "something_new", "sender": 2 }));
        assert_eq!(event.kind, HandleEventKind::Generic);
    }
}
