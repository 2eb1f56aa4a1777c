mod common;

use callbridge_lib::config::BridgeConfig;
use callbridge_lib::error::Error;
use callbridge_lib::peer::engine::PeerEvent;
use callbridge_lib::peer::types::IceConnectionState;
use callbridge_lib::runtime::{spawn_bridge, BridgeHandle};
use common::*;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Semaphore;

fn start(engine: Arc<FakeEngine>) -> (BridgeHandle, Arc<RecordingBridge>) {
    let bridge = RecordingBridge::new();
    let handle = spawn_bridge(
        BridgeConfig::default(),
        engine,
        bridge.clone(),
        RecordingSurface::new(),
    );
    (handle, bridge)
}

#[tokio::test]
async fn raw_offer_gets_an_answer() {
    let engine = FakeEngine::new();
    let (handle, bridge) = start(engine.clone());

    handle
        .create_session("b", session_config(false, true, false))
        .await
        .unwrap();
    handle.call("b").await.unwrap();

    let raw = json!({ "type": "offer", "sdp": REMOTE_OFFER }).to_string();
    handle.receive_message("b", &raw).await.unwrap();

    assert_eq!(bridge.types_for("b"), ["__set_session_key", "answer"]);
    assert_eq!(engine.link_for("b").remote_descriptions().len(), 1);
}

#[tokio::test]
async fn bad_envelopes_are_dropped() {
    let engine = FakeEngine::new();
    let (handle, bridge) = start(engine.clone());
    handle
        .create_session("a", session_config(true, true, false))
        .await
        .unwrap();
    handle.call("a").await.unwrap();

    for raw in ["{not json", r#"{"sdp":"x"}"#, r#"{"type":"hello"}"#] {
        handle.receive_message("a", raw).await.unwrap();
    }

    assert_eq!(bridge.types_for("a"), ["__set_session_key", "offer"]);
    assert!(engine.link_for("a").calls().len() == 2);
    let status = handle.status().await.unwrap();
    assert_eq!(status.sessions, 1);
}

#[tokio::test]
async fn pending_capture_does_not_block_other_sessions() {
    let gate = Arc::new(Semaphore::new(0));
    let engine = FakeEngine::gated(gate.clone());
    let (handle, bridge) = start(engine.clone());

    handle
        .create_session("a", session_config(true, true, false))
        .await
        .unwrap();
    let caller = handle.clone();
    let pending = tokio::spawn(async move { caller.call("a").await });

    // another session is served while "a" waits on the permission prompt
    handle
        .create_session("b", session_config(false, false, false))
        .await
        .unwrap();
    handle.call("b").await.unwrap();
    handle.disconnect("b").await.unwrap();
    assert_eq!(bridge.count("b", "__disconnected"), 1);
    assert!(!pending.is_finished());

    gate.add_permits(1);
    pending.await.unwrap().unwrap();
    assert_eq!(bridge.types_for("a"), ["__set_session_key", "offer"]);

    let status = handle.status().await.unwrap();
    assert_eq!(status.media_holders, 1);
    assert!(status.has_local_audio);
}

#[tokio::test]
async fn engine_events_reach_the_host() {
    let engine = FakeEngine::new();
    let (handle, bridge) = start(engine.clone());
    handle
        .create_session("a", session_config(true, true, false))
        .await
        .unwrap();
    handle.call("a").await.unwrap();

    let link = engine.link_for("a");
    link.raise(PeerEvent::LocalCandidate(candidate(3)));
    assert!(eventually(|| bridge.count("a", "candidate") == 1).await);

    link.raise(PeerEvent::IceConnectionState(IceConnectionState::Failed));
    assert!(eventually(|| bridge.count("a", "__disconnected") == 1).await);
    assert!(link.is_closed());
    assert_eq!(bridge.count("a", "bye"), 0);

    let status = handle.status().await.unwrap();
    assert_eq!(status.sessions, 0);
    assert_eq!(status.media_holders, 0);
    assert!(!status.has_local_audio);
}

#[tokio::test]
async fn messages_are_applied_in_submission_order() {
    let engine = FakeEngine::new();
    let (handle, _bridge) = start(engine.clone());
    handle
        .create_session("b", session_config(false, true, false))
        .await
        .unwrap();
    handle.call("b").await.unwrap();

    let offer = json!({ "type": "offer", "sdp": REMOTE_OFFER }).to_string();
    let mut raws: Vec<String> = (1..=3)
        .map(|n| {
            json!({
                "type": "candidate",
                "label": 0,
                "id": "0",
                "candidate": candidate(n).candidate,
            })
            .to_string()
        })
        .collect();
    raws.insert(1, offer);
    for raw in &raws {
        handle.receive_message("b", raw).await.unwrap();
    }

    let expected: Vec<String> = (1..=3).map(|n| candidate(n).candidate).collect();
    assert_eq!(engine.link_for("b").added_candidates(), expected);
}

#[tokio::test]
async fn shutdown_hangs_up_everyone() {
    let engine = FakeEngine::new();
    let (handle, bridge) = start(engine.clone());
    for key in ["a", "b"] {
        handle
            .create_session(key, session_config(true, true, false))
            .await
            .unwrap();
        handle.call(key).await.unwrap();
    }

    handle.shutdown();

    assert!(eventually(|| bridge.count("a", "bye") == 1 && bridge.count("b", "bye") == 1).await);
    assert!(eventually(|| engine.links().iter().all(|l| l.is_closed())).await);
    assert!(matches!(handle.call("a").await, Err(Error::Closed)));
}

#[tokio::test]
async fn concurrent_calls_share_one_capture() {
    let gate = Arc::new(Semaphore::new(0));
    let engine = FakeEngine::gated(gate.clone());
    let (handle, bridge) = start(engine.clone());
    for key in ["a", "b"] {
        handle
            .create_session(key, session_config(true, true, true))
            .await
            .unwrap();
    }

    let calls: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|key| {
            let caller = handle.clone();
            tokio::spawn(async move { caller.call(key).await })
        })
        .collect();
    assert!(until_awaiting_media(&handle, 2).await);

    gate.add_permits(2);
    for call in calls {
        call.await.unwrap().unwrap();
    }

    assert_eq!(engine.capture_count(), 1);
    assert_eq!(bridge.types_for("a"), ["__set_session_key", "offer"]);
    assert_eq!(bridge.types_for("b"), ["__set_session_key", "offer"]);
    let a = engine.link_for("a").attached().remove(0);
    let b = engine.link_for("b").attached().remove(0);
    assert!(a.audio.zip(b.audio).is_some_and(|(a, b)| a.same_track(&b)));

    let status = handle.status().await.unwrap();
    assert_eq!(status.media_holders, 2);
    assert_eq!(status.awaiting_media, 0);
}

#[tokio::test]
async fn denied_capture_fails_every_waiting_call() {
    let gate = Arc::new(Semaphore::new(0));
    let engine = FakeEngine::gated(gate.clone());
    engine.deny_capture(true);
    let (handle, _bridge) = start(engine.clone());
    for key in ["a", "b"] {
        handle
            .create_session(key, session_config(true, true, false))
            .await
            .unwrap();
    }

    let calls: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|key| {
            let caller = handle.clone();
            tokio::spawn(async move { caller.call(key).await })
        })
        .collect();
    assert!(until_awaiting_media(&handle, 2).await);

    gate.add_permits(2);
    for call in calls {
        let result = call.await.unwrap();
        assert!(matches!(result, Err(Error::MediaAcquisition(_))));
    }
    assert!(engine.links().is_empty());

    let status = handle.status().await.unwrap();
    assert_eq!(status.awaiting_media, 0);
    assert!(!status.has_local_audio);
}

#[tokio::test]
async fn renegotiate_during_call_capture_is_rejected() {
    let gate = Arc::new(Semaphore::new(0));
    let engine = FakeEngine::gated(gate.clone());
    let (handle, bridge) = start(engine.clone());
    handle
        .create_session("a", session_config(true, true, false))
        .await
        .unwrap();
    let caller = handle.clone();
    let pending = tokio::spawn(async move { caller.call("a").await });
    assert!(until_awaiting_media(&handle, 1).await);

    let err = handle
        .renegotiate("a", session_config(true, true, true))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    gate.add_permits(1);
    pending.await.unwrap().unwrap();
    assert_eq!(bridge.types_for("a"), ["__set_session_key", "offer"]);

    let status = handle.status().await.unwrap();
    assert_eq!(status.media_holders, 1);
    assert!(status.has_local_audio);
    assert!(!status.has_local_video);
}

#[tokio::test]
async fn capture_finishing_after_hangup_leaves_no_tracks() {
    let gate = Arc::new(Semaphore::new(0));
    let engine = FakeEngine::gated(gate.clone());
    let (handle, _bridge) = start(engine.clone());
    handle
        .create_session("a", session_config(true, true, false))
        .await
        .unwrap();
    let caller = handle.clone();
    let pending = tokio::spawn(async move { caller.call("a").await });
    assert!(until_awaiting_media(&handle, 1).await);

    handle.disconnect("a").await.unwrap();
    gate.add_permits(1);

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(Error::SessionNotFound(_))));
    let status = handle.status().await.unwrap();
    assert_eq!(status.media_holders, 0);
    assert!(!status.has_local_audio);
}

#[tokio::test]
async fn renegotiate_adding_video_captures_in_background() {
    let gate = Arc::new(Semaphore::new(1));
    let engine = FakeEngine::gated(gate.clone());
    let (handle, bridge) = start(engine.clone());
    handle
        .create_session("a", session_config(true, true, false))
        .await
        .unwrap();
    handle.call("a").await.unwrap();

    let caller = handle.clone();
    let pending = tokio::spawn(async move {
        caller
            .renegotiate("a", session_config(true, true, true))
            .await
    });
    assert!(until_awaiting_media(&handle, 1).await);
    assert_eq!(bridge.count("a", "offer"), 1);

    gate.add_permits(1);
    pending.await.unwrap().unwrap();

    assert_eq!(engine.capture_count(), 2);
    assert_eq!(bridge.count("a", "offer"), 2);
    let attached = engine.link_for("a").attached();
    assert!(attached[1].audio.is_some() && attached[1].video.is_some());
    let status = handle.status().await.unwrap();
    assert_eq!(status.media_holders, 1);
    assert!(status.has_local_video);
}
