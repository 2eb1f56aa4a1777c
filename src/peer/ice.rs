use crate::config::TurnConfig;
use crate::peer::types::{IceCandidate, IceServer};
use crate::utils::add_turn_url_scheme;
use std::collections::VecDeque;
use tracing::debug;

/// Remote candidates that arrived before the connection could take them.
///
/// The queue exists from session creation until [`CandidateQueue::retire`];
/// afterwards every candidate is handed straight back for immediate delivery.
#[derive(Debug)]
pub struct CandidateQueue {
    pending: Option<VecDeque<IceCandidate>>,
}

impl Default for CandidateQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateQueue {
    pub fn new() -> Self {
        Self {
            pending: Some(VecDeque::new()),
        }
    }

    /// Buffers `candidate` while the queue is live, otherwise returns it
    /// to the caller to apply now.
    pub fn offer(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        match self.pending.as_mut() {
            Some(queue) => {
                queue.push_back(candidate);
                debug!("Queued remote candidate, {} pending", queue.len());
                None
            }
            None => Some(candidate),
        }
    }

    /// Drains the buffered candidates in arrival order and retires the queue.
    /// Returns nothing on every call after the first.
    pub fn retire(&mut self) -> Vec<IceCandidate> {
        self.pending
            .take()
            .map(|queue| queue.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn is_buffering(&self) -> bool {
        self.pending.is_some()
    }

    pub fn len(&self) -> usize {
        self.pending.as_ref().map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed ICE list for a session: the public STUN server, then the
/// session's TURN relay when one is configured.
pub fn session_ice_servers(stun_url: &str, turn: &TurnConfig) -> Vec<IceServer> {
    let mut servers = vec![IceServer {
        url: stun_url.to_string(),
        username: String::new(),
        credential: String::new(),
    }];

    if !turn.host.trim().is_empty() {
        servers.push(IceServer {
            url: add_turn_url_scheme(turn),
            username: turn.username.clone(),
            credential: turn.password.clone(),
        });
    } else {
        debug!("No TURN host configured, using STUN only");
    }

    servers
}
