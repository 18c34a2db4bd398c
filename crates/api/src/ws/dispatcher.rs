use tracing::{debug, warn};
use winechat_translation::{
    ClientMessage, Connection, ConnectionManager, ServerEvent, audio, language, voices,
};

/// Handles one JSON text frame. Malformed input gets an `error` reply; the
/// connection is never closed from here.
pub async fn handle_client_message(manager: &ConnectionManager, connection: &Connection, text: &str) {
    let user_id = connection.user_id();
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            debug!(%user_id, %e, "Unparseable client message");
            reply(connection, ServerEvent::error(format!("Invalid message: {e}")));
            return;
        }
    };

    match message {
        ClientMessage::AudioData { data } => {
            manager.push_audio(user_id, audio::from_f32(&data)).await;
        }
        ClientMessage::RecognitionResult { transcript, is_final } => {
            manager.submit_transcript(user_id, transcript, is_final).await;
        }
        ClientMessage::UpdateSettings { settings } => {
            match manager.update_settings(user_id, settings).await {
                Ok(outcome) => reply(
                    connection,
                    ServerEvent::SettingsUpdated {
                        settings: outcome.preferences.settings,
                        source_language: outcome.preferences.source_language,
                        target_languages: outcome.preferences.target_languages,
                        persisted: outcome.persisted,
                    },
                ),
                Err(e) => reply(connection, ServerEvent::error(e.to_string())),
            }
        }
        ClientMessage::GetVoices { language: tag } => match language::normalize(&tag) {
            Some(code) => reply(
                connection,
                ServerEvent::VoicesList {
                    voices: voices::available_voices(&code).to_vec(),
                    default_voice: voices::default_voice(&code),
                    language: code,
                },
            ),
            None => reply(connection, ServerEvent::error(format!("Unknown language: {tag}"))),
        },
        ClientMessage::GetParticipants => {
            let room_id = connection.room_id().clone();
            let participants = manager.participants(&room_id);
            reply(connection, ServerEvent::Participants { room_id, participants });
        }
        ClientMessage::Ping => reply(connection, ServerEvent::Pong),
    }
}

fn reply(connection: &Connection, event: ServerEvent) {
    if !connection.reply(event) {
        warn!(user_id = %connection.user_id(), "Reply dropped, outbound queue unavailable");
    }
}
