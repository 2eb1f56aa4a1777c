//! Tauri host: forwards outbound messages and layouts to the webview as
//! events and exposes the bridge as commands.

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::peer::connection::WebRtcEngine;
use crate::runtime::build_bridge;
use crate::signaling::{OutboundMessage, SignalingBridge};
use crate::video::{VideoSurface, ViewLayout};
use serde::Serialize;
use std::sync::Arc;
use tauri::{AppHandle, Emitter, Manager};
use tracing::{debug, warn};

pub const MESSAGE_EVENT: &str = "callbridge-message";
pub const LAYOUT_EVENT: &str = "callbridge-video-layout";

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct MessagePayload<'a> {
    session_key: &'a str,
    message: &'a OutboundMessage,
}

/// Delivers bridge output to the webview
pub struct TauriBridge {
    app: AppHandle,
}

impl TauriBridge {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl SignalingBridge for TauriBridge {
    fn send(&self, session_key: &str, message: &OutboundMessage) {
        let payload = MessagePayload {
            session_key,
            message,
        };
        match self.app.emit(MESSAGE_EVENT, payload) {
            Ok(()) => debug!("Emitted message for {}", session_key),
            Err(e) => warn!("Failed to emit message for {}: {:?}", session_key, e),
        }
    }
}

impl VideoSurface for TauriBridge {
    fn render(&self, layout: &ViewLayout) {
        if let Err(e) = self.app.emit(LAYOUT_EVENT, layout) {
            warn!("Failed to emit video layout: {:?}", e);
        }
    }
}

fn start_bridge(app: &AppHandle) -> Result<()> {
    let engine = Arc::new(WebRtcEngine::new()?);
    let host = Arc::new(TauriBridge::new(app.clone()));
    let (handle, task) = build_bridge(BridgeConfig::default(), engine, host.clone(), host);
    tauri::async_runtime::spawn(task);
    app.manage(handle);
    Ok(())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    crate::logger::init();

    tauri::Builder::default()
        .setup(|app| {
            start_bridge(app.handle())?;
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Sessions
            crate::commands::session_api::create_session,
            crate::commands::session_api::call,
            crate::commands::session_api::receive_message,
            crate::commands::session_api::renegotiate,
            crate::commands::session_api::disconnect,
            // Video view
            crate::commands::video_api::set_video_view,
            crate::commands::video_api::refresh_video_view,
            crate::commands::video_api::hide_video_view,
            crate::commands::video_api::show_video_view,
            crate::commands::video_api::video_size_changed,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
