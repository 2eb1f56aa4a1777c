//! Local audio/video tracks and the shared pool that owns them.

use crate::config::{StreamSelection, LOCAL_AUDIO_TRACK_ID, LOCAL_STREAM_ID, LOCAL_VIDEO_TRACK_ID};
use crate::error::{Error, Result};
use crate::peer::types::MediaKind;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Handle to a local capture track; clones share the same underlying track.
#[derive(Clone)]
pub struct LocalTrack {
    kind: MediaKind,
    track: Arc<TrackLocalStaticSample>,
}

impl LocalTrack {
    pub fn new(kind: MediaKind, track: Arc<TrackLocalStaticSample>) -> Self {
        Self { kind, track }
    }

    /// Opus microphone track
    pub fn audio() -> Self {
        let codec = RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        };
        Self::new(
            MediaKind::Audio,
            Arc::new(TrackLocalStaticSample::new(
                codec,
                LOCAL_AUDIO_TRACK_ID.to_owned(),
                LOCAL_STREAM_ID.to_owned(),
            )),
        )
    }

    /// VP8 camera track
    pub fn video() -> Self {
        let codec = RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        };
        Self::new(
            MediaKind::Video,
            Arc::new(TrackLocalStaticSample::new(
                codec,
                LOCAL_VIDEO_TRACK_ID.to_owned(),
                LOCAL_STREAM_ID.to_owned(),
            )),
        )
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        self.track.id()
    }

    pub fn track(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.track)
    }

    /// True when both handles point at the same underlying track
    pub fn same_track(&self, other: &LocalTrack) -> bool {
        Arc::ptr_eq(&self.track, &other.track)
    }

    /// Feeds one encoded frame from the host capture pipeline
    pub async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<()> {
        self.track
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::MediaAcquisition(format!("write to {} failed: {e}", self.id())))
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("kind", &self.kind)
            .field("id", &self.id())
            .finish()
    }
}

/// Tracks a session attaches to its connection
#[derive(Debug, Clone)]
pub struct LocalStream {
    pub id: String,
    pub audio: Option<LocalTrack>,
    pub video: Option<LocalTrack>,
}

impl LocalStream {
    pub fn tracks(&self) -> impl Iterator<Item = &LocalTrack> {
        self.audio.iter().chain(self.video.iter())
    }
}

/// Result of a capture request
#[derive(Debug, Clone, Default)]
pub struct CapturedMedia {
    pub audio: Option<LocalTrack>,
    pub video: Option<LocalTrack>,
}

/// Process-wide local tracks, shared by every active session.
///
/// At most one audio and one video track exist at a time. Sessions
/// [`acquire`](LocalMedia::acquire) a hold once their call is set up; the
/// tracks are dropped when the last hold is released.
#[derive(Debug, Default)]
pub struct LocalMedia {
    audio: Option<LocalTrack>,
    video: Option<LocalTrack>,
    holders: usize,
}

impl LocalMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// Media kinds `wanted` asks for that are not captured yet
    pub fn missing(&self, wanted: StreamSelection) -> StreamSelection {
        StreamSelection {
            audio: wanted.audio && self.audio.is_none(),
            video: wanted.video && self.video.is_none(),
        }
    }

    /// Stores freshly captured tracks. Slots already filled keep their
    /// track; the duplicate capture is dropped.
    pub fn install(&mut self, captured: CapturedMedia) {
        if let Some(audio) = captured.audio {
            if self.audio.is_none() {
                info!("Local audio track ready: {}", audio.id());
                self.audio = Some(audio);
            } else {
                debug!("Discarding duplicate audio capture");
            }
        }
        if let Some(video) = captured.video {
            if self.video.is_none() {
                info!("Local video track ready: {}", video.id());
                self.video = Some(video);
            } else {
                debug!("Discarding duplicate video capture");
            }
        }
    }

    /// Builds the stream a session with `selection` sends
    pub fn stream_for(&self, selection: StreamSelection) -> Result<LocalStream> {
        let audio = if selection.audio {
            Some(self.audio.clone().ok_or_else(|| {
                Error::MediaAcquisition("local audio track not available".into())
            })?)
        } else {
            None
        };
        let video = if selection.video {
            Some(self.video.clone().ok_or_else(|| {
                Error::MediaAcquisition("local video track not available".into())
            })?)
        } else {
            None
        };

        Ok(LocalStream {
            id: LOCAL_STREAM_ID.to_owned(),
            audio,
            video,
        })
    }

    pub fn acquire(&mut self) {
        self.holders += 1;
        debug!("Local media holders: {}", self.holders);
    }

    /// Drops one hold; returns true when this released the tracks
    pub fn release(&mut self) -> bool {
        self.holders = self.holders.saturating_sub(1);
        debug!("Local media holders: {}", self.holders);
        if self.holders > 0 {
            return false;
        }

        let had_tracks = self.audio.is_some() || self.video.is_some();
        self.audio = None;
        self.video = None;
        if had_tracks {
            info!("Last session gone, local tracks released");
        }
        had_tracks
    }

    /// Drops captured tracks no session holds. Returns true if any were dropped.
    pub fn drop_unheld(&mut self) -> bool {
        if self.holders > 0 || (self.audio.is_none() && self.video.is_none()) {
            return false;
        }
        self.audio = None;
        self.video = None;
        info!("Dropped local tracks with no session attached");
        true
    }

    pub fn holders(&self) -> usize {
        self.holders
    }

    pub fn audio(&self) -> Option<&LocalTrack> {
        self.audio.as_ref()
    }

    pub fn video(&self) -> Option<&LocalTrack> {
        self.video.as_ref()
    }
}
