use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use winechat_translation::ServerEvent;

use crate::fixtures::test_app::TestApp;

#[tokio::test]
async fn connect_reports_languages_and_capabilities() {
    let app = TestApp::spawn().await;
    let mut ws = app
        .join("alice", "wine-1", "&source_language=ja-JP&target_languages=ko,EN")
        .await;

    let connected = ws.expect_type("connected").await;
    assert_eq!(connected["user_id"], "alice");
    assert_eq!(connected["room_id"], "wine-1");
    assert_eq!(connected["source_language"], "ja");
    assert_eq!(connected["target_languages"], json!(["ko", "en"]));
    assert_eq!(connected["recognition_available"], true);
    assert_eq!(connected["translation_available"], true);
    assert_eq!(connected["settings"]["text_translation_enabled"], true);

    ws.close().await;
}

#[tokio::test]
async fn invalid_token_is_rejected() {
    let app = TestApp::spawn().await;
    let url = format!("ws://{}/ws?token=garbage&room_id=r", app.addr);
    assert!(tokio_tungstenite::connect_async(&url).await.is_err());
}

#[tokio::test]
async fn missing_room_is_rejected() {
    let app = TestApp::spawn().await;
    let url = format!("ws://{}/ws?token={}&room_id=", app.addr, app.token("alice"));
    assert!(tokio_tungstenite::connect_async(&url).await.is_err());
}

#[tokio::test]
async fn final_transcript_reaches_each_listener_in_their_language() {
    let app = TestApp::spawn().await;
    let mut speaker = app.join("tanaka", "wine", "&source_language=ja").await;
    speaker.expect_type("connected").await;
    let mut korean = app.join("kim", "wine", "&source_language=ko").await;
    korean.expect_type("connected").await;
    let mut english = app.join("smith", "wine", "&source_language=en").await;
    english.expect_type("connected").await;

    speaker
        .send_json(json!({"type": "recognition_result", "transcript": "乾杯", "is_final": true}))
        .await;

    let ko = korean.expect_type("translation").await;
    assert_eq!(ko["speaker_id"], "tanaka");
    assert_eq!(ko["original_text"], "乾杯");
    assert_eq!(ko["translated_text"], "乾杯 (ja->ko)");
    assert_eq!(ko["target_language"], "ko");
    assert_eq!(ko["result_kind"], "text");

    let en = english.expect_type("translation").await;
    assert_eq!(en["translated_text"], "乾杯 (ja->en)");

    speaker.assert_no("translation", Duration::from_millis(200)).await;
    assert_eq!(app.translator.targets(), vec!["en", "ko"]);
}

#[tokio::test]
async fn interim_transcripts_are_not_translated() {
    let app = TestApp::spawn().await;
    let mut speaker = app.join("a", "r", "&source_language=ja").await;
    speaker.expect_type("connected").await;
    let mut listener = app.join("b", "r", "&source_language=en").await;
    listener.expect_type("connected").await;

    speaker
        .send_json(json!({"type": "recognition_result", "transcript": "かん"}))
        .await;

    listener.assert_no("translation", Duration::from_millis(300)).await;
    assert!(app.translator.targets().is_empty());
}

#[tokio::test]
async fn binary_audio_goes_through_server_recognition() {
    let app = TestApp::spawn().await;
    let mut speaker = app.join("a", "r", "&source_language=ja").await;
    speaker.expect_type("connected").await;
    let mut listener = app.join("b", "r", "&source_language=fr").await;
    listener.expect_type("connected").await;

    // 160 samples of s16le silence.
    speaker.send_binary(vec![0u8; 320]).await;

    let fr = listener.expect_type("translation").await;
    assert_eq!(fr["original_text"], "heard 160 samples");
    assert_eq!(fr["translated_text"], "heard 160 samples (ja->fr)");
    assert!(app.recognizer.languages.lock().contains(&"ja".to_string()));
}

#[tokio::test]
async fn float_audio_frames_are_accepted() {
    let app = TestApp::spawn().await;
    let mut speaker = app.join("a", "r", "&source_language=ja").await;
    speaker.expect_type("connected").await;
    let mut listener = app.join("b", "r", "&source_language=en").await;
    listener.expect_type("connected").await;

    speaker
        .send_json(json!({"type": "audio_data", "data": [0.0, 0.5, -0.5, 1.0]}))
        .await;

    let en = listener.expect_type("translation").await;
    assert_eq!(en["original_text"], "heard 4 samples");
}

#[tokio::test]
async fn voice_translation_carries_audio() {
    let app = TestApp::spawn().await;
    let mut speaker = app.join("a", "r", "&source_language=ja").await;
    speaker.expect_type("connected").await;
    let mut listener = app.join("b", "r", "&source_language=ko").await;
    listener.expect_type("connected").await;

    listener
        .send_json(json!({
            "type": "update_settings",
            "settings": {"voice_translation_enabled": true, "voice_speed": 1.5}
        }))
        .await;
    let updated = listener.expect_type("settings_updated").await;
    assert_eq!(updated["settings"]["voice_translation_enabled"], true);
    assert_eq!(updated["persisted"], true);

    speaker
        .send_json(json!({"type": "recognition_result", "transcript": "美味しい", "is_final": true}))
        .await;

    let ko = listener.expect_type("translation").await;
    assert_eq!(ko["result_kind"], "voice");
    assert_eq!(ko["voice_id"], "ko-KR-Wavenet-A");
    // base64 of "ko-KR-Wavenet-A@1.5"
    assert_eq!(ko["audio_data"], "a28tS1ItV2F2ZW5ldC1BQDEuNQ==");
}

#[tokio::test]
async fn invalid_settings_are_reported_and_not_applied() {
    let app = TestApp::spawn().await;
    let mut ws = app.join("a", "r", "&source_language=en").await;
    ws.expect_type("connected").await;

    ws.send_json(json!({"type": "update_settings", "settings": {"voice_speed": 9.0}}))
        .await;
    let error = ws.expect_type("error").await;
    assert!(error["message"].as_str().unwrap().contains("Invalid settings"));

    ws.send_json(json!({"type": "get_participants"})).await;
    let participants = ws.expect_type("participants").await;
    assert_eq!(participants["participants"][0]["voice_translation_enabled"], false);
}

#[tokio::test]
async fn malformed_frames_get_an_error_without_disconnect() {
    let app = TestApp::spawn().await;
    let mut ws = app.join("a", "r", "").await;
    ws.expect_type("connected").await;

    ws.send_text("not json").await;
    ws.expect_type("error").await;
    ws.send_json(json!({"type": "teleport"})).await;
    ws.expect_type("error").await;

    ws.send_json(json!({"type": "ping"})).await;
    ws.expect_type("pong").await;
}

#[tokio::test]
async fn voices_and_participants_on_request() {
    let app = TestApp::spawn().await;
    let mut a = app.join("a", "r", "&source_language=ja&target_languages=en").await;
    a.expect_type("connected").await;
    let mut b = app.join("b", "r", "&source_language=ko").await;
    b.expect_type("connected").await;

    a.send_json(json!({"type": "get_voices", "language": "ja-JP"})).await;
    let voices = a.expect_type("voices_list").await;
    assert_eq!(voices["language"], "ja");
    assert_eq!(voices["default_voice"], "ja-JP-Wavenet-A");
    assert_eq!(voices["voices"].as_array().unwrap().len(), 4);

    a.send_json(json!({"type": "get_participants"})).await;
    let list = a.expect_type("participants").await;
    let people = list["participants"].as_array().unwrap();
    assert_eq!(people.len(), 2);
    assert_eq!(people[0]["user_id"], "a");
    assert_eq!(people[0]["target_languages"], json!(["en"]));
    assert_eq!(people[1]["source_language"], "ko");
}

#[tokio::test]
async fn second_connection_for_same_user_is_refused() {
    let app = TestApp::spawn().await;
    let mut first = app.join("a", "r", "").await;
    first.expect_type("connected").await;

    let mut second = app.join("a", "r", "").await;
    let error = second.expect_type("error").await;
    assert!(error["message"].as_str().unwrap().contains("already"));
    second.expect_closed().await;

    first.send_json(json!({"type": "ping"})).await;
    first.expect_type("pong").await;
}

#[tokio::test]
async fn closing_socket_removes_participant_and_room() {
    let app = TestApp::spawn().await;
    let mut a = app.join("a", "r", "").await;
    a.expect_type("connected").await;
    let mut b = app.join("b", "r", "").await;
    b.expect_type("connected").await;

    b.close().await;
    let registry = app.state.manager.registry().clone();
    wait_until(|| registry.session_count() == 1).await;

    a.send_json(json!({"type": "get_participants"})).await;
    let list = a.expect_type("participants").await;
    assert_eq!(list["participants"].as_array().unwrap().len(), 1);

    a.close().await;
    wait_until(|| !registry.has_room(&"r".into())).await;

    // The user may come straight back.
    let mut again = app.join("b", "r", "").await;
    again.expect_type("connected").await;
}

#[tokio::test]
async fn room_announcement_reaches_everyone_but_the_sender() {
    let app = TestApp::spawn().await;
    let mut a = app.join("a", "r", "").await;
    a.expect_type("connected").await;
    let mut b = app.join("b", "r", "").await;
    b.expect_type("connected").await;
    let mut other = app.join("c", "elsewhere", "").await;
    other.expect_type("connected").await;

    let notice = Arc::new(ServerEvent::TranslationUnavailable {
        reason: "maintenance".to_string(),
    });
    let failures = app
        .state
        .manager
        .channel()
        .broadcast(&"r".into(), notice, Some(&"a".into()));
    assert!(failures.is_empty());

    let frame = b.expect_type("translation_unavailable").await;
    assert_eq!(frame["reason"], "maintenance");
    a.assert_no("translation_unavailable", Duration::from_millis(100)).await;
    other.assert_no("translation_unavailable", Duration::from_millis(100)).await;
}

#[tokio::test]
async fn silent_connection_is_closed_after_idle_timeout() {
    let app = TestApp::spawn_configured(|s| s.pipeline.idle_timeout_ms = 300).await;
    let mut quiet = app.join("quiet", "r", "").await;
    quiet.expect_type("connected").await;

    quiet.expect_closed().await;
    let registry = app.state.manager.registry().clone();
    wait_until(|| registry.session_count() == 0).await;
    assert!(!registry.has_room(&"r".into()));
    assert_eq!(app.state.manager.coordinator().active_streams(), 0);
}

#[tokio::test]
async fn active_connection_outlives_idle_timeout() {
    let app = TestApp::spawn_configured(|s| s.pipeline.idle_timeout_ms = 300).await;
    let mut ws = app.join("busy", "r", "").await;
    ws.expect_type("connected").await;

    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(150)).await;
        ws.send_json(json!({"type": "ping"})).await;
        ws.expect_type("pong").await;
    }
    assert_eq!(app.state.manager.registry().session_count(), 1);
}

#[tokio::test]
async fn missing_translator_is_announced() {
    let app = TestApp::spawn_without_translation().await;
    let mut ws = app.join("a", "r", "").await;

    let connected = ws.expect_type("connected").await;
    assert_eq!(connected["translation_available"], false);
    ws.expect_type("translation_unavailable").await;

    ws.send_json(json!({"type": "ping"})).await;
    ws.expect_type("pong").await;
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met in time");
}
