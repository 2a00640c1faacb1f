//! `janus.plugin.videoroom` facade.
//!
//! [`VideoRoomPlugin`] is bound to one [`Session`] and hands out three kinds
//! of handle wrappers:
//!
//! - [`VideoRoomHandle`] - room management and raw participant requests
//! - [`VideoRoomPublisher`] - publishes a local feed into a room
//! - [`VideoRoomListener`] - subscribes to one remote feed
//!
//! Every wrapper holds a [`PluginHandle`] and talks through
//! [`PluginHandle::request_message`]. Plugin-level failures (`error_code`
//! in the plugin payload) surface as [`Error::Plugin`].
//!
//! # Example
//!
//! ```no_run
//! use janus_client::Session;
//!
//! # async fn example(session: Session, offer: String) -> janus_client::Result<()> {
//! let videoroom = session.video_room();
//!
//! let publisher = videoroom.publish_feed(1234, &offer, None).await?;
//! println!("answer: {:?}", publisher.answer());
//!
//! for feed in videoroom.get_feeds_exclude(1234, publisher.publisher_id().unwrap()).await? {
//!     let listener = videoroom.listen_feed(1234, feed, None).await?;
//!     println!("offer: {:?}", listener.offer());
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::handle::PluginHandle;
use crate::identifiers::{HandleId, ListenerId};
use crate::protocol::{Jsep, JsepType, PluginResponse};
use crate::session::Session;

// ============================================================================
// Constants
// ============================================================================

/// Plugin package name.
pub const VIDEOROOM_PLUGIN: &str = "janus.plugin.videoroom";

/// Short plugin name.
const VIDEOROOM_NAME: &str = "videoroom";

// ============================================================================
// RoomId
// ============================================================================

/// Room identifier. Numeric unless the gateway runs with string IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoomId {
    /// Numeric ID.
    Number(u64),
    /// String ID.
    Text(String),
}

/// Publisher feed identifier; shares the room ID encoding.
pub type FeedId = RoomId;

impl RoomId {
    /// Reads an ID from a JSON number or string.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_u64().map(Self::Number),
            Value::String(text) => Some(Self::Text(text.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

impl From<u64> for RoomId {
    #[inline]
    fn from(id: u64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for RoomId {
    #[inline]
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<String> for RoomId {
    #[inline]
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

impl From<RoomId> for Value {
    fn from(id: RoomId) -> Self {
        match id {
            RoomId::Number(id) => Value::from(id),
            RoomId::Text(id) => Value::String(id),
        }
    }
}

// ============================================================================
// ParticipantType
// ============================================================================

/// Role requested on `join`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantType {
    /// Sends media into the room.
    Publisher,
    /// Receives one feed.
    Subscriber,
    /// Legacy spelling of [`ParticipantType::Subscriber`].
    Listener,
}

impl ParticipantType {
    /// Returns the `ptype` wire value.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Publisher => "publisher",
            Self::Subscriber => "subscriber",
            Self::Listener => "listener",
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// Reply to `create`.
#[derive(Debug, Clone)]
pub struct RoomCreated {
    /// ID of the new room.
    pub room: RoomId,
    /// Full plugin reply.
    pub response: PluginResponse,
}

/// Reply to `exists`.
#[derive(Debug, Clone)]
pub struct RoomExists {
    /// Whether the room exists.
    pub exists: bool,
    /// Full plugin reply.
    pub response: PluginResponse,
}

/// Reply to `list`.
#[derive(Debug, Clone)]
pub struct RoomList {
    /// Room descriptions as sent by the plugin.
    pub list: Vec<Value>,
    /// Full plugin reply.
    pub response: PluginResponse,
}

/// Reply to `listparticipants`.
#[derive(Debug, Clone)]
pub struct RoomParticipants {
    /// Participant descriptions as sent by the plugin.
    pub participants: Vec<Value>,
    /// Full plugin reply.
    pub response: PluginResponse,
}

impl RoomParticipants {
    /// Returns the IDs of participants that are currently publishing.
    #[must_use]
    pub fn publishing(&self) -> Vec<FeedId> {
        self.participants
            .iter()
            .filter(|participant| participant.get("publisher").and_then(Value::as_bool) == Some(true))
            .filter_map(|participant| participant.get("id").and_then(RoomId::from_value))
            .collect()
    }
}

/// Reply to `join` and `joinandconfigure`.
#[derive(Debug, Clone)]
pub struct RoomJoined {
    /// Participant ID (publisher) or subscribed feed (listener).
    pub id: Option<FeedId>,
    /// Session description sent back by the plugin.
    pub jsep: Option<Jsep>,
    /// Publishers already in the room.
    pub publishers: Vec<Value>,
    /// Full plugin reply.
    pub response: PluginResponse,
}

impl RoomJoined {
    fn from_response(response: PluginResponse) -> Self {
        let data = payload(&response);
        Self {
            id: data.get("id").and_then(RoomId::from_value),
            jsep: response.jsep(),
            publishers: array(data, "publishers"),
            response,
        }
    }
}

// ============================================================================
// VideoRoomHandle
// ============================================================================

/// A handle attached to the VideoRoom plugin.
///
/// `options` arguments are JSON objects merged into the message body
/// (`null` means none); the operation's own fields win on conflict.
#[derive(Clone)]
pub struct VideoRoomHandle {
    handle: PluginHandle,
}

impl fmt::Debug for VideoRoomHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoRoomHandle")
            .field("id", &self.handle.id())
            .finish_non_exhaustive()
    }
}

impl VideoRoomHandle {
    /// Wraps an attached plugin handle.
    #[inline]
    #[must_use]
    pub fn new(handle: PluginHandle) -> Self {
        Self { handle }
    }

    /// Returns the handle ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> HandleId {
        self.handle.id()
    }

    /// Returns the underlying plugin handle.
    #[inline]
    #[must_use]
    pub fn plugin_handle(&self) -> &PluginHandle {
        &self.handle
    }

    /// Registers a listener for VideoRoom notifications (`event` frames
    /// carrying a plugin payload). Receives the payload and any JSEP.
    pub fn on_room_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Value, Option<&Jsep>) + Send + Sync + 'static,
    {
        self.handle.on_event(move |event| {
            if let Some(data) = event.plugin_payload() {
                listener(data, event.jsep().as_ref());
            }
        })
    }

    /// Detaches from the plugin.
    ///
    /// # Errors
    ///
    /// Returns an error if the `detach` request fails. The handle is
    /// disposed either way.
    pub async fn detach(&self) -> Result<()> {
        self.handle.detach().await.map(|_| ())
    }

    async fn send(&self, body: Map<String, Value>, jsep: Option<&Jsep>) -> Result<PluginResponse> {
        let request = body.get("request").and_then(Value::as_str).unwrap_or_default();
        trace!(handle_id = %self.handle.id(), request, "VideoRoom request");

        let body = Value::Object(body);
        let response = match jsep {
            Some(jsep) => self.handle.request_message_with_jsep(body, jsep).await?,
            None => self.handle.request_message(body).await?,
        };
        response.into_result()
    }
}

// ============================================================================
// VideoRoomHandle - Room Management
// ============================================================================

impl VideoRoomHandle {
    /// Creates a room.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses, or
    /// [`Error::Protocol`] if the reply names no room.
    pub async fn create(&self, options: Value) -> Result<RoomCreated> {
        let response = self.send(message_body("create", options)?, None).await?;
        let room = payload(&response)
            .get("room")
            .and_then(RoomId::from_value)
            .ok_or_else(|| Error::protocol("VideoRoom create reply carries no room"))?;

        debug!(handle_id = %self.handle.id(), %room, "VideoRoom room created");
        Ok(RoomCreated { room, response })
    }

    /// Destroys a room.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn destroy(&self, room: impl Into<RoomId>, options: Value) -> Result<PluginResponse> {
        let mut body = message_body("destroy", options)?;
        body.insert("room".into(), room.into().into());
        self.send(body, None).await
    }

    /// Checks whether a room exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn exists(&self, room: impl Into<RoomId>) -> Result<RoomExists> {
        let mut body = message_body("exists", Value::Null)?;
        body.insert("room".into(), room.into().into());

        let response = self.send(body, None).await?;
        let exists = payload(&response)
            .get("exists")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(RoomExists { exists, response })
    }

    /// Lists the rooms visible to this handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn list(&self) -> Result<RoomList> {
        let response = self.send(message_body("list", Value::Null)?, None).await?;
        let list = array(payload(&response), "list");
        Ok(RoomList { list, response })
    }

    /// Lists the participants of a room.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses (e.g. no such room).
    pub async fn list_participants(&self, room: impl Into<RoomId>) -> Result<RoomParticipants> {
        let mut body = message_body("listparticipants", Value::Null)?;
        body.insert("room".into(), room.into().into());

        let response = self.send(body, None).await?;
        let participants = array(payload(&response), "participants");
        Ok(RoomParticipants { participants, response })
    }
}

// ============================================================================
// VideoRoomHandle - Participation
// ============================================================================

impl VideoRoomHandle {
    /// Joins a room with the given role.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn join(
        &self,
        room: impl Into<RoomId>,
        ptype: ParticipantType,
        options: Value,
    ) -> Result<RoomJoined> {
        let mut body = message_body("join", options)?;
        body.insert("room".into(), room.into().into());
        body.insert("ptype".into(), ptype.as_str().into());

        self.send(body, None).await.map(RoomJoined::from_response)
    }

    /// Joins a room as a publisher.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn join_publisher(&self, room: impl Into<RoomId>, options: Value) -> Result<RoomJoined> {
        self.join(room, ParticipantType::Publisher, options).await
    }

    /// Joins a room as a subscriber of `feed`. The reply carries the
    /// plugin's offer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn join_listener(
        &self,
        room: impl Into<RoomId>,
        feed: impl Into<FeedId>,
        options: Value,
    ) -> Result<RoomJoined> {
        let options = with_field(options, "feed", feed.into().into())?;
        self.join(room, ParticipantType::Subscriber, options).await
    }

    /// Updates publishing parameters (`audio`, `video`, `bitrate`, ...).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn configure(&self, options: Value) -> Result<PluginResponse> {
        self.send(message_body("configure", options)?, None).await
    }

    /// Joins as a publisher and configures in one step, carrying `jsep`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn join_and_configure(
        &self,
        room: impl Into<RoomId>,
        jsep: &Jsep,
        options: Value,
    ) -> Result<RoomJoined> {
        let mut body = message_body("joinandconfigure", options)?;
        body.insert("room".into(), room.into().into());
        body.insert("ptype".into(), ParticipantType::Publisher.as_str().into());

        self.send(body, Some(jsep)).await.map(RoomJoined::from_response)
    }

    /// Starts publishing with the given offer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn publish(&self, jsep: &Jsep, options: Value) -> Result<PluginResponse> {
        self.send(message_body("publish", options)?, Some(jsep)).await
    }

    /// Stops publishing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn unpublish(&self, options: Value) -> Result<PluginResponse> {
        self.send(message_body("unpublish", options)?, None).await
    }

    /// Starts receiving a subscribed feed, carrying the local answer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn start(&self, room: impl Into<RoomId>, jsep: &Jsep, options: Value) -> Result<PluginResponse> {
        let mut body = message_body("start", options)?;
        body.insert("room".into(), room.into().into());
        self.send(body, Some(jsep)).await
    }

    /// Pauses delivery of a subscribed feed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn pause(&self, options: Value) -> Result<PluginResponse> {
        self.send(message_body("pause", options)?, None).await
    }

    /// Switches a subscription to another feed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn switch(&self, options: Value) -> Result<PluginResponse> {
        self.send(message_body("switch", options)?, None).await
    }

    /// Stops a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn stop(&self, options: Value) -> Result<PluginResponse> {
        self.send(message_body("stop", options)?, None).await
    }

    /// Adds an RTP forwarder or stream, depending on `options`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn add(&self, options: Value) -> Result<PluginResponse> {
        self.send(message_body("add", options)?, None).await
    }

    /// Removes what [`VideoRoomHandle::add`] added.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn remove(&self, options: Value) -> Result<PluginResponse> {
        self.send(message_body("remove", options)?, None).await
    }

    /// Leaves the room.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn leave(&self, options: Value) -> Result<PluginResponse> {
        self.send(message_body("leave", options)?, None).await
    }

    /// Publishes into `room` with the given offer.
    ///
    /// Same as [`VideoRoomHandle::join_and_configure`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn publish_feed(&self, room: impl Into<RoomId>, jsep: &Jsep, options: Value) -> Result<RoomJoined> {
        self.join_and_configure(room, jsep, options).await
    }

    /// Subscribes to `feed` in `room`.
    ///
    /// Same as [`VideoRoomHandle::join_listener`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn listen_feed(
        &self,
        room: impl Into<RoomId>,
        feed: impl Into<FeedId>,
        options: Value,
    ) -> Result<RoomJoined> {
        self.join_listener(room, feed, options).await
    }
}

// ============================================================================
// VideoRoomPublisher
// ============================================================================

/// A VideoRoom handle dedicated to publishing one local feed.
#[derive(Debug)]
pub struct VideoRoomPublisher {
    handle: VideoRoomHandle,
    room: RoomId,
    publisher_id: Mutex<Option<FeedId>>,
    answer: Mutex<Option<String>>,
}

impl VideoRoomPublisher {
    /// Binds a VideoRoom handle to `room`.
    #[must_use]
    pub fn new(handle: VideoRoomHandle, room: impl Into<RoomId>) -> Self {
        Self {
            handle,
            room: room.into(),
            publisher_id: Mutex::new(None),
            answer: Mutex::new(None),
        }
    }

    /// Returns the wrapped VideoRoom handle.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> &VideoRoomHandle {
        &self.handle
    }

    /// Returns the room this publisher targets.
    #[inline]
    #[must_use]
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Returns the participant ID assigned on join.
    #[inline]
    #[must_use]
    pub fn publisher_id(&self) -> Option<FeedId> {
        self.publisher_id.lock().clone()
    }

    /// Returns the plugin's SDP answer.
    #[inline]
    #[must_use]
    pub fn answer(&self) -> Option<String> {
        self.answer.lock().clone()
    }

    /// Joins and configures with `offer`, storing the returned answer and
    /// publisher ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses, or
    /// [`Error::Protocol`] if the reply carries no SDP answer.
    pub async fn create_answer(&self, offer: &str) -> Result<()> {
        let joined = self
            .handle
            .join_and_configure(self.room.clone(), &Jsep::offer(offer), Value::Null)
            .await?;

        let answer = joined
            .jsep
            .filter(|jsep| jsep.kind == JsepType::Answer)
            .ok_or_else(|| Error::protocol("VideoRoom joinandconfigure reply carries no answer"))?;

        debug!(handle_id = %self.handle.id(), room = %self.room, "VideoRoom publisher joined");
        *self.publisher_id.lock() = joined.id;
        *self.answer.lock() = Some(answer.sdp);
        Ok(())
    }
}

// ============================================================================
// VideoRoomListener
// ============================================================================

/// A VideoRoom handle dedicated to receiving one remote feed.
#[derive(Debug)]
pub struct VideoRoomListener {
    handle: VideoRoomHandle,
    room: RoomId,
    feed: FeedId,
    offer: Mutex<Option<String>>,
}

impl VideoRoomListener {
    /// Binds a VideoRoom handle to `feed` in `room`.
    #[must_use]
    pub fn new(handle: VideoRoomHandle, room: impl Into<RoomId>, feed: impl Into<FeedId>) -> Self {
        Self {
            handle,
            room: room.into(),
            feed: feed.into(),
            offer: Mutex::new(None),
        }
    }

    /// Returns the wrapped VideoRoom handle.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> &VideoRoomHandle {
        &self.handle
    }

    /// Returns the room.
    #[inline]
    #[must_use]
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Returns the subscribed feed.
    #[inline]
    #[must_use]
    pub fn feed(&self) -> &FeedId {
        &self.feed
    }

    /// Returns the plugin's SDP offer.
    #[inline]
    #[must_use]
    pub fn offer(&self) -> Option<String> {
        self.offer.lock().clone()
    }

    /// Joins as a subscriber and stores the plugin's offer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses, or
    /// [`Error::Protocol`] if the reply carries no SDP offer.
    pub async fn create_offer(&self) -> Result<()> {
        let joined = self
            .handle
            .join_listener(self.room.clone(), self.feed.clone(), Value::Null)
            .await?;

        let offer = joined
            .jsep
            .filter(|jsep| jsep.kind == JsepType::Offer)
            .ok_or_else(|| Error::protocol("VideoRoom join reply carries no offer"))?;

        debug!(handle_id = %self.handle.id(), room = %self.room, feed = %self.feed, "VideoRoom listener joined");
        *self.offer.lock() = Some(offer.sdp);
        Ok(())
    }

    /// Sends the local answer and starts media delivery.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if the plugin refuses.
    pub async fn set_remote_answer(&self, answer: &str) -> Result<()> {
        self.handle
            .start(self.room.clone(), &Jsep::answer(answer), Value::Null)
            .await
            .map(|_| ())
    }
}

// ============================================================================
// VideoRoomPlugin
// ============================================================================

/// VideoRoom entry point for one session.
pub struct VideoRoomPlugin {
    session: Session,
    default: Mutex<Option<VideoRoomHandle>>,
}

impl fmt::Debug for VideoRoomPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoRoomPlugin")
            .field("session_id", &self.session.id())
            .finish_non_exhaustive()
    }
}

impl VideoRoomPlugin {
    /// Binds the facade to a session.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session,
            default: Mutex::new(None),
        }
    }

    /// Returns the short plugin name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        VIDEOROOM_NAME
    }

    /// Returns the plugin package name.
    #[inline]
    #[must_use]
    pub fn full_name(&self) -> &'static str {
        VIDEOROOM_PLUGIN
    }

    /// Returns the session.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns a shared handle for room queries, attaching one on first use
    /// or after the previous one was disposed.
    ///
    /// # Errors
    ///
    /// Returns an error if the `attach` request fails.
    pub async fn default_handle(&self, opaque_id: Option<&str>) -> Result<VideoRoomHandle> {
        if let Some(handle) = self.default.lock().as_ref() {
            if !handle.plugin_handle().is_disposed() {
                return Ok(handle.clone());
            }
        }

        let handle = self.create_video_room_handle(opaque_id).await?;
        *self.default.lock() = Some(handle.clone());
        Ok(handle)
    }

    /// Attaches a new VideoRoom handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the `attach` request fails.
    pub async fn create_video_room_handle(&self, opaque_id: Option<&str>) -> Result<VideoRoomHandle> {
        self.session
            .create_plugin_handle(VIDEOROOM_PLUGIN, opaque_id)
            .await
            .map(VideoRoomHandle::new)
    }

    /// Wraps a handle that is already attached on the gateway.
    #[must_use]
    pub fn attach_video_room_handle(&self, handle_id: HandleId, opaque_id: Option<&str>) -> VideoRoomHandle {
        VideoRoomHandle::new(
            self.session
                .attach_plugin_handle(handle_id, VIDEOROOM_PLUGIN, opaque_id),
        )
    }

    /// Attaches a new handle bound to publish into `room`.
    ///
    /// # Errors
    ///
    /// Returns an error if the `attach` request fails.
    pub async fn create_publisher_handle(
        &self,
        room: impl Into<RoomId>,
        opaque_id: Option<&str>,
    ) -> Result<VideoRoomPublisher> {
        let handle = self.create_video_room_handle(opaque_id).await?;
        Ok(VideoRoomPublisher::new(handle, room))
    }

    /// Wraps an attached handle as a publisher for `room`.
    #[must_use]
    pub fn attach_publisher_handle(
        &self,
        handle_id: HandleId,
        room: impl Into<RoomId>,
        opaque_id: Option<&str>,
    ) -> VideoRoomPublisher {
        VideoRoomPublisher::new(self.attach_video_room_handle(handle_id, opaque_id), room)
    }

    /// Attaches a new handle bound to receive `feed` in `room`.
    ///
    /// # Errors
    ///
    /// Returns an error if the `attach` request fails.
    pub async fn create_listener_handle(
        &self,
        room: impl Into<RoomId>,
        feed: impl Into<FeedId>,
        opaque_id: Option<&str>,
    ) -> Result<VideoRoomListener> {
        let handle = self.create_video_room_handle(opaque_id).await?;
        Ok(VideoRoomListener::new(handle, room, feed))
    }

    /// Wraps an attached handle as a listener of `feed` in `room`.
    #[must_use]
    pub fn attach_listener_handle(
        &self,
        handle_id: HandleId,
        room: impl Into<RoomId>,
        feed: impl Into<FeedId>,
        opaque_id: Option<&str>,
    ) -> VideoRoomListener {
        VideoRoomListener::new(self.attach_video_room_handle(handle_id, opaque_id), room, feed)
    }

    /// Attaches a publisher and publishes `offer` into `room`.
    ///
    /// The handle is detached again if publishing fails.
    ///
    /// # Errors
    ///
    /// Returns an error if attaching or publishing fails.
    pub async fn publish_feed(
        &self,
        room: impl Into<RoomId>,
        offer: &str,
        opaque_id: Option<&str>,
    ) -> Result<VideoRoomPublisher> {
        let publisher = self.create_publisher_handle(room, opaque_id).await?;
        if let Err(e) = publisher.create_answer(offer).await {
            debug!(handle_id = %publisher.handle().id(), error = %e, "Publish failed, detaching");
            let _ = publisher.handle().detach().await;
            return Err(e);
        }
        Ok(publisher)
    }

    /// Attaches a listener and asks the plugin for an offer for `feed`.
    ///
    /// The handle is detached again if subscribing fails.
    ///
    /// # Errors
    ///
    /// Returns an error if attaching or subscribing fails.
    pub async fn listen_feed(
        &self,
        room: impl Into<RoomId>,
        feed: impl Into<FeedId>,
        opaque_id: Option<&str>,
    ) -> Result<VideoRoomListener> {
        let listener = self.create_listener_handle(room, feed, opaque_id).await?;
        if let Err(e) = listener.create_offer().await {
            debug!(handle_id = %listener.handle().id(), error = %e, "Subscribe failed, detaching");
            let _ = listener.handle().detach().await;
            return Err(e);
        }
        Ok(listener)
    }

    /// Returns the feeds currently published in `room`.
    ///
    /// # Errors
    ///
    /// Returns an error if the participant query fails.
    pub async fn get_feeds(&self, room: impl Into<RoomId>) -> Result<Vec<FeedId>> {
        let handle = self.default_handle(None).await?;
        let participants = handle.list_participants(room).await?;
        Ok(participants.publishing())
    }

    /// Returns the feeds published in `room`, minus `feed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the participant query fails.
    pub async fn get_feeds_exclude(
        &self,
        room: impl Into<RoomId>,
        feed: impl Into<FeedId>,
    ) -> Result<Vec<FeedId>> {
        let feed = feed.into();
        let mut feeds = self.get_feeds(room).await?;
        feeds.retain(|id| *id != feed);
        Ok(feeds)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Turns caller options into a message body for `request`.
fn message_body(request: &str, options: Value) -> Result<Map<String, Value>> {
    let mut body = match options {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(Error::config(format!(
                "VideoRoom options must be a JSON object, got {other}"
            )));
        }
    };
    body.insert("request".into(), Value::from(request));
    Ok(body)
}

/// Adds `key` to caller options.
fn with_field(options: Value, key: &str, value: Value) -> Result<Value> {
    let mut map = match options {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(Error::config(format!(
                "VideoRoom options must be a JSON object, got {other}"
            )));
        }
    };
    map.insert(key.into(), value);
    Ok(Value::Object(map))
}

fn payload(response: &PluginResponse) -> &Value {
    response.data().unwrap_or(&Value::Null)
}

fn array(data: &Value, key: &str) -> Vec<Value> {
    data.get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use serde_json::json;

    use crate::client::Client;
    use crate::testing::{connected, create_session, eventually, options, reply, reply_plugin};
    use crate::transport::MemoryPeer;

    async fn setup() -> (Client, MemoryPeer, Session) {
        let (client, mut peer, _transport, _server) = connected(options()).await;
        let session = create_session(&client, &mut peer, 123).await;
        (client, peer, session)
    }

    async fn attach(plugin: &VideoRoomPlugin, peer: &mut MemoryPeer, id: u64) -> VideoRoomHandle {
        let (handle, ()) = tokio::join!(plugin.create_video_room_handle(None), async {
            let request = peer.recv().await.expect("attach request");
            assert_eq!(request["janus"], "attach");
            assert_eq!(request["plugin"], VIDEOROOM_PLUGIN);
            reply(peer, &request, "success", json!({ "data": { "id": id } }));
        });
        handle.expect("videoroom handle")
    }

    fn reply_sync(peer: &MemoryPeer, request: &Value, data: Value) {
        reply(
            peer,
            request,
            "success",
            json!({
                "session_id": request["session_id"],
                "sender": request["handle_id"],
                "plugindata": { "plugin": VIDEOROOM_PLUGIN, "data": data }
            }),
        );
    }

    #[test]
    fn test_room_id_conversions() {
        assert_eq!(RoomId::from(1234), RoomId::Number(1234));
        assert_eq!(RoomId::from("lobby"), RoomId::Text("lobby".into()));
        assert_eq!(RoomId::from_value(&json!(7)), Some(RoomId::Number(7)));
        assert_eq!(RoomId::from_value(&json!("x")), Some(RoomId::Text("x".into())));
        assert_eq!(RoomId::from_value(&json!(null)), None);
        assert_eq!(Value::from(RoomId::Number(9)), json!(9));
        assert_eq!(RoomId::Text("lobby".into()).to_string(), "lobby");
    }

    #[test]
    fn test_message_body_merges_options() {
        let body = message_body("create", json!({ "publishers": 6, "request": "ignored" })).expect("body");
        assert_eq!(body["request"], "create");
        assert_eq!(body["publishers"], 6);

        assert_eq!(message_body("list", Value::Null).expect("body").len(), 1);
        assert!(matches!(message_body("list", json!([1])), Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_create_room() {
        let (_client, mut peer, session) = setup().await;
        let plugin = session.video_room();
        let handle = attach(&plugin, &mut peer, 456).await;

        let (created, ()) = tokio::join!(handle.create(json!({ "description": "demo" })), async {
            let request = peer.recv().await.expect("create");
            assert_eq!(request["janus"], "message");
            assert_eq!(request["handle_id"], 456);
            assert_eq!(request["body"]["request"], "create");
            assert_eq!(request["body"]["description"], "demo");
            reply_sync(&peer, &request, json!({ "videoroom": "created", "room": 1234 }));
        });

        let created = created.expect("created");
        assert_eq!(created.room, RoomId::Number(1234));
        assert_eq!(created.response.name(), Some(VIDEOROOM_PLUGIN));
    }

    #[tokio::test]
    async fn test_exists_and_list() {
        let (_client, mut peer, session) = setup().await;
        let plugin = session.video_room();
        let handle = attach(&plugin, &mut peer, 456).await;

        let (exists, ()) = tokio::join!(handle.exists("lobby"), async {
            let request = peer.recv().await.expect("exists");
            assert_eq!(request["body"]["request"], "exists");
            assert_eq!(request["body"]["room"], "lobby");
            reply_sync(&peer, &request, json!({ "videoroom": "success", "room": "lobby", "exists": false }));
        });
        assert!(!exists.expect("exists").exists);

        let (list, ()) = tokio::join!(handle.list(), async {
            let request = peer.recv().await.expect("list");
            assert_eq!(request["body"]["request"], "list");
            reply_sync(
                &peer,
                &request,
                json!({ "videoroom": "success", "list": [{ "room": 1 }, { "room": 2 }] }),
            );
        });
        assert_eq!(list.expect("list").list.len(), 2);
    }

    #[tokio::test]
    async fn test_plugin_error_surfaces() {
        let (_client, mut peer, session) = setup().await;
        let plugin = session.video_room();
        let handle = attach(&plugin, &mut peer, 456).await;

        let (result, ()) = tokio::join!(handle.list_participants(99), async {
            let request = peer.recv().await.expect("listparticipants");
            reply_sync(
                &peer,
                &request,
                json!({ "videoroom": "event", "error_code": 426, "error": "No such room (99)" }),
            );
        });

        match result {
            Err(Error::Plugin { code, reason }) => {
                assert_eq!(code, 426);
                assert_eq!(reason, "No such room (99)");
            }
            other => panic!("expected plugin error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_publish_feed_stores_answer() {
        let (_client, mut peer, session) = setup().await;
        let plugin = session.video_room();

        let (publisher, ()) = tokio::join!(plugin.publish_feed(1234, "v=0 offer", None), async {
            let request = peer.recv().await.expect("attach");
            reply(&peer, &request, "success", json!({ "data": { "id": 456 } }));

            let request = peer.recv().await.expect("joinandconfigure");
            assert_eq!(request["body"]["request"], "joinandconfigure");
            assert_eq!(request["body"]["ptype"], "publisher");
            assert_eq!(request["body"]["room"], 1234);
            assert_eq!(request["jsep"], json!({ "type": "offer", "sdp": "v=0 offer" }));
            reply_plugin(
                &peer,
                &request,
                VIDEOROOM_PLUGIN,
                json!({ "videoroom": "joined", "room": 1234, "id": 42, "publishers": [] }),
                Some(json!({ "type": "answer", "sdp": "v=0 answer" })),
            );
        });

        let publisher = publisher.expect("publisher");
        assert_eq!(publisher.room(), &RoomId::Number(1234));
        assert_eq!(publisher.publisher_id(), Some(RoomId::Number(42)));
        assert_eq!(publisher.answer().as_deref(), Some("v=0 answer"));
        assert_eq!(publisher.handle().id(), HandleId::new(456));
    }

    #[tokio::test]
    async fn test_publish_feed_failure_detaches() {
        let (_client, mut peer, session) = setup().await;
        let plugin = session.video_room();

        let (result, ()) = tokio::join!(plugin.publish_feed(1234, "v=0 offer", None), async {
            let request = peer.recv().await.expect("attach");
            reply(&peer, &request, "success", json!({ "data": { "id": 456 } }));

            let request = peer.recv().await.expect("joinandconfigure");
            reply_plugin(
                &peer,
                &request,
                VIDEOROOM_PLUGIN,
                json!({ "videoroom": "event", "error_code": 436, "error": "Already publishing" }),
                None,
            );

            let request = peer.recv().await.expect("detach");
            assert_eq!(request["janus"], "detach");
            reply(&peer, &request, "success", json!({}));
        });

        assert!(matches!(result, Err(Error::Plugin { code: 436, .. })));
        assert_eq!(session.handle_count(), 0);
    }

    #[tokio::test]
    async fn test_listener_offer_then_answer() {
        let (_client, mut peer, session) = setup().await;
        let plugin = session.video_room();

        let (listener, ()) = tokio::join!(plugin.listen_feed(1234, 42, None), async {
            let request = peer.recv().await.expect("attach");
            reply(&peer, &request, "success", json!({ "data": { "id": 789 } }));

            let request = peer.recv().await.expect("join");
            assert_eq!(request["body"]["request"], "join");
            assert_eq!(request["body"]["ptype"], "subscriber");
            assert_eq!(request["body"]["feed"], 42);
            reply_plugin(
                &peer,
                &request,
                VIDEOROOM_PLUGIN,
                json!({ "videoroom": "attached", "room": 1234, "id": 42 }),
                Some(json!({ "type": "offer", "sdp": "v=0 remote" })),
            );
        });

        let listener = listener.expect("listener");
        assert_eq!(listener.feed(), &RoomId::Number(42));
        assert_eq!(listener.offer().as_deref(), Some("v=0 remote"));

        let (started, ()) = tokio::join!(listener.set_remote_answer("v=0 local"), async {
            let request = peer.recv().await.expect("start");
            assert_eq!(request["body"]["request"], "start");
            assert_eq!(request["jsep"]["type"], "answer");
            reply_plugin(
                &peer,
                &request,
                VIDEOROOM_PLUGIN,
                json!({ "videoroom": "event", "started": "ok" }),
                None,
            );
        });
        started.expect("started");
    }

    #[tokio::test]
    async fn test_listener_without_offer_is_protocol_error() {
        let (_client, mut peer, session) = setup().await;
        let plugin = session.video_room();
        let listener = plugin.attach_listener_handle(HandleId::new(789), 1234, 42, None);

        let (result, ()) = tokio::join!(listener.create_offer(), async {
            let request = peer.recv().await.expect("join");
            reply_plugin(
                &peer,
                &request,
                VIDEOROOM_PLUGIN,
                json!({ "videoroom": "attached", "room": 1234, "id": 42 }),
                None,
            );
        });

        assert!(matches!(result, Err(Error::Protocol { .. })));
        assert!(listener.offer().is_none());
    }

    #[tokio::test]
    async fn test_get_feeds_reuses_default_handle() {
        let (_client, mut peer, session) = setup().await;
        let plugin = session.video_room();
        let participants = json!({
            "videoroom": "participants",
            "room": 1234,
            "participants": [
                { "id": 1, "publisher": true },
                { "id": 2, "publisher": false },
                { "id": 3, "publisher": true }
            ]
        });

        let (feeds, ()) = tokio::join!(plugin.get_feeds(1234), async {
            let request = peer.recv().await.expect("attach");
            assert_eq!(request["janus"], "attach");
            reply(&peer, &request, "success", json!({ "data": { "id": 456 } }));

            let request = peer.recv().await.expect("listparticipants");
            assert_eq!(request["body"]["request"], "listparticipants");
            reply_sync(&peer, &request, participants.clone());
        });
        assert_eq!(feeds.expect("feeds"), vec![RoomId::Number(1), RoomId::Number(3)]);

        let (feeds, ()) = tokio::join!(plugin.get_feeds_exclude(1234, 3), async {
            let request = peer.recv().await.expect("listparticipants");
            assert_eq!(request["janus"], "message");
            assert_eq!(request["handle_id"], 456);
            reply_sync(&peer, &request, participants.clone());
        });
        assert_eq!(feeds.expect("feeds"), vec![RoomId::Number(1)]);
    }

    #[tokio::test]
    async fn test_room_event_listener() {
        let (_client, mut peer, session) = setup().await;
        let plugin = session.video_room();
        let handle = attach(&plugin, &mut peer, 456).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        handle.on_room_event(move |data, jsep| {
            log.lock().push((data["videoroom"].clone(), jsep.is_some()));
        });

        assert!(peer.send(json!({
            "janus": "event",
            "session_id": 123,
            "sender": 456,
            "plugindata": { "plugin": VIDEOROOM_PLUGIN, "data": { "videoroom": "event", "unpublished": 42 } }
        })));
        // Frames without a plugin payload are not room events
        assert!(peer.send(json!({ "janus": "event", "session_id": 123, "sender": 456 })));

        eventually(|| !seen.lock().is_empty()).await;
        tokio::task::yield_now().await;
        assert_eq!(*seen.lock(), vec![(json!("event"), false)]);
    }
}
