//! Video view state: container/preview geometry and the remote tile registry.

use crate::error::{Error, Result};
use crate::layout::{layout_tiles, Rect};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Position and size as sent by the host, `[x, y]` / `[w, h]`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ViewParams {
    pub position: [f64; 2],
    pub size: [f64; 2],
}

impl ViewParams {
    pub fn rect(&self) -> Rect {
        Rect::new(self.position[0], self.position[1], self.size[0], self.size[1])
    }

    fn validate_container(&self) -> Result<()> {
        let [w, h] = self.size;
        if !(w.is_finite() && h.is_finite()) || w <= 0.0 || h <= 0.0 {
            return Err(Error::Config(format!(
                "video container has no size ({}x{})",
                w, h
            )));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VideoViewConfig {
    #[serde(alias = "containerParams")]
    pub container: ViewParams,
    /// Local preview, relative to the container origin
    #[serde(default)]
    pub local: Option<ViewParams>,
}

/// Remote video attached by one session
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTile {
    pub session_key: String,
    pub track_id: String,
    pub aspect_ratio: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TilePlacement {
    pub session_key: String,
    pub track_id: String,
    pub rect: Rect,
}

/// Where every view goes, handed to the host renderer
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewLayout {
    pub local: Option<Rect>,
    pub remotes: Vec<TilePlacement>,
    pub visible: bool,
}

/// Host renderer that owns the actual view widgets
pub trait VideoSurface: Send + Sync {
    fn render(&self, layout: &ViewLayout);
}

#[derive(Debug)]
pub struct VideoView {
    config: Option<VideoViewConfig>,
    tiles: Vec<RemoteTile>,
    visible: bool,
    default_aspect: f64,
}

impl VideoView {
    pub fn new(default_aspect: f64) -> Self {
        Self {
            config: None,
            tiles: Vec::new(),
            visible: true,
            default_aspect,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    pub fn set_config(&mut self, config: VideoViewConfig) -> Result<()> {
        config.container.validate_container()?;
        debug!("Video view configured: {:?}", config);
        self.config = Some(config);
        Ok(())
    }

    /// Replaces the container only, keeping the preview
    pub fn set_container(&mut self, container: ViewParams) -> Result<()> {
        container.validate_container()?;
        let config = self
            .config
            .as_mut()
            .ok_or_else(|| Error::Config("video view not configured".into()))?;
        config.container = container;
        Ok(())
    }

    pub fn add_remote(&mut self, session_key: &str, track_id: &str) {
        if self.tiles.iter().any(|t| t.track_id == track_id) {
            return;
        }
        self.tiles.push(RemoteTile {
            session_key: session_key.to_string(),
            track_id: track_id.to_string(),
            aspect_ratio: self.default_aspect,
        });
    }

    pub fn remove_remote(&mut self, track_id: &str) -> bool {
        let before = self.tiles.len();
        self.tiles.retain(|t| t.track_id != track_id);
        before != self.tiles.len()
    }

    /// Records the native size of a session's remote video. Returns whether
    /// the aspect ratio actually changed.
    pub fn set_video_size(&mut self, session_key: &str, width: f64, height: f64) -> Result<bool> {
        if !(width > 0.0 && height > 0.0) {
            return Err(Error::Config(format!(
                "invalid video size {}x{}",
                width, height
            )));
        }
        let tile = self
            .tiles
            .iter_mut()
            .find(|t| t.session_key == session_key)
            .ok_or_else(|| Error::SessionNotFound(session_key.to_string()))?;

        let aspect = width / height;
        if (tile.aspect_ratio - aspect).abs() < f64::EPSILON {
            return Ok(false);
        }
        tile.aspect_ratio = aspect;
        Ok(true)
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn tiles(&self) -> &[RemoteTile] {
        &self.tiles
    }

    /// Full layout for the current state, `None` until a view is configured
    pub fn compute(&self) -> Option<ViewLayout> {
        let config = self.config.as_ref()?;
        let container = config.container.rect();

        let local = config.local.map(|p| {
            Rect::new(
                container.x + p.position[0],
                container.y + p.position[1],
                p.size[0],
                p.size[1],
            )
        });

        let aspects: Vec<f64> = self.tiles.iter().map(|t| t.aspect_ratio).collect();
        let placed = layout_tiles(container, &aspects);
        let remotes = self
            .tiles
            .iter()
            .zip(placed.tiles)
            .map(|(tile, rect)| TilePlacement {
                session_key: tile.session_key.clone(),
                track_id: tile.track_id.clone(),
                rect,
            })
            .collect();

        Some(ViewLayout {
            local,
            remotes,
            visible: self.visible,
        })
    }
}
