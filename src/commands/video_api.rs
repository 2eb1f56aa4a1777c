use crate::error::Result;
use crate::runtime::BridgeHandle;
use crate::video::{VideoViewConfig, ViewParams};
use tauri::{command, State};

/// Sets the container and local preview geometry
#[command]
pub async fn set_video_view(
    bridge: State<'_, BridgeHandle>,
    config: VideoViewConfig,
) -> Result<()> {
    bridge.set_video_view(config).await
}

/// Container moved or resized
#[command]
pub async fn refresh_video_view(
    bridge: State<'_, BridgeHandle>,
    container: ViewParams,
) -> Result<()> {
    bridge.refresh_video_view(container).await
}

#[command]
pub async fn hide_video_view(bridge: State<'_, BridgeHandle>) -> Result<()> {
    bridge.hide_video_view().await
}

#[command]
pub async fn show_video_view(bridge: State<'_, BridgeHandle>) -> Result<()> {
    bridge.show_video_view().await
}

/// Renderer learned the native size of a remote video
#[command]
pub async fn video_size_changed(
    bridge: State<'_, BridgeHandle>,
    session_key: String,
    width: f64,
    height: f64,
) -> Result<()> {
    bridge.video_size_changed(&session_key, width, height).await
}
