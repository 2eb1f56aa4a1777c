use crate::config::SessionConfig;
use crate::error::Result;
use crate::runtime::BridgeHandle;
use tauri::{command, State};
use tracing::info;

/// Registers a session under `session_key`
#[command]
pub async fn create_session(
    bridge: State<'_, BridgeHandle>,
    session_key: String,
    config: SessionConfig,
) -> Result<()> {
    info!("create_session called for {}", session_key);
    bridge.create_session(&session_key, config).await
}

/// Captures local media if needed and starts the call
#[command]
pub async fn call(bridge: State<'_, BridgeHandle>, session_key: String) -> Result<()> {
    info!("call called for {}", session_key);
    bridge.call(&session_key).await
}

/// Inbound signaling message relayed by the host transport
#[command]
pub async fn receive_message(
    bridge: State<'_, BridgeHandle>,
    session_key: String,
    message: String,
) -> Result<()> {
    bridge.receive_message(&session_key, &message).await
}

#[command]
pub async fn renegotiate(
    bridge: State<'_, BridgeHandle>,
    session_key: String,
    config: SessionConfig,
) -> Result<()> {
    info!("renegotiate called for {}", session_key);
    bridge.renegotiate(&session_key, config).await
}

#[command]
pub async fn disconnect(bridge: State<'_, BridgeHandle>, session_key: String) -> Result<()> {
    info!("disconnect called for {}", session_key);
    bridge.disconnect(&session_key).await
}
