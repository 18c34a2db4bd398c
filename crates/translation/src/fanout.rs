use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::channel::RoomChannel;
use crate::protocol::ServerEvent;
use crate::providers::{SpeechSynthesizer, TextTranslator};
use crate::registry::{Recipient, SessionRegistry};
use crate::{ResultKind, TranscriptEvent, TranslationResult, UserId};

/// Counters for one processed transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub translation_calls: usize,
    pub synthesis_calls: usize,
    pub delivered: usize,
    pub undeliverable: usize,
    pub failed_languages: Vec<String>,
}

impl FanoutReport {
    fn merge(&mut self, other: FanoutReport) {
        self.translation_calls += other.translation_calls;
        self.synthesis_calls += other.synthesis_calls;
        self.delivered += other.delivered;
        self.undeliverable += other.undeliverable;
        self.failed_languages.extend(other.failed_languages);
    }
}

/// Synthesis is shared by recipients asking for the same voice at the same
/// speed. Speed is compared in thousandths.
type VoiceKey = (String, i32);

fn voice_key(voice_id: &str, speed: f32) -> VoiceKey {
    (voice_id.to_string(), (speed * 1000.0).round() as i32)
}

/// Turns final transcripts into per-language translation results and
/// delivers them to the other participants of the speaker's room.
///
/// Work is deduplicated: one translation per distinct target language and one
/// synthesis per distinct (language, voice, speed), regardless of how many
/// participants share it.
pub struct FanoutEngine {
    registry: Arc<SessionRegistry>,
    channel: Arc<RoomChannel>,
    translator: Arc<dyn TextTranslator>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
}

impl FanoutEngine {
    pub fn new(
        registry: Arc<SessionRegistry>,
        channel: Arc<RoomChannel>,
        translator: Arc<dyn TextTranslator>,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    ) -> Self {
        info!(
            translator = %translator.name(),
            synthesizer = synthesizer.as_ref().map(|s| s.name()).unwrap_or("none"),
            "Fan-out engine created"
        );
        Self {
            registry,
            channel,
            translator,
            synthesizer,
        }
    }

    pub fn has_synthesizer(&self) -> bool {
        self.synthesizer.is_some()
    }

    /// Processes one transcript event. Interim events and speakers without a
    /// session are ignored.
    pub async fn handle(&self, event: &TranscriptEvent) -> FanoutReport {
        if !event.is_final {
            return FanoutReport::default();
        }
        let text = event.text.trim();
        if text.is_empty() {
            return FanoutReport::default();
        }
        let Some(speaker) = self.registry.session(&event.speaker_id) else {
            debug!(speaker = %event.speaker_id, "Speaker has no session, skipping fan-out");
            return FanoutReport::default();
        };
        let source = speaker.source_language;

        // Recipients grouped by target language; a listener already in the
        // speaker's language needs no translation.
        let mut groups: BTreeMap<String, Vec<Recipient>> = BTreeMap::new();
        for recipient in self
            .registry
            .recipients_for_room(&speaker.room_id, &speaker.user_id)
        {
            if recipient.target_language != source {
                groups
                    .entry(recipient.target_language.clone())
                    .or_default()
                    .push(recipient);
            }
        }
        if groups.is_empty() {
            debug!(speaker = %event.speaker_id, room_id = %speaker.room_id, "No translation targets");
            return FanoutReport::default();
        }

        let outcomes = join_all(
            groups
                .into_iter()
                .map(|(target, recipients)| self.translate_group(&event.speaker_id, text, &source, target, recipients)),
        )
        .await;

        let mut report = FanoutReport::default();
        for outcome in outcomes {
            report.merge(outcome);
        }
        info!(
            speaker = %event.speaker_id,
            room_id = %speaker.room_id,
            translations = report.translation_calls,
            syntheses = report.synthesis_calls,
            delivered = report.delivered,
            failed = ?report.failed_languages,
            "Fan-out complete"
        );
        report
    }

    async fn translate_group(
        &self,
        speaker_id: &UserId,
        text: &str,
        source: &str,
        target: String,
        recipients: Vec<Recipient>,
    ) -> FanoutReport {
        let mut report = FanoutReport {
            translation_calls: 1,
            ..Default::default()
        };

        let translated = match self.translator.translate(text, source, &target).await {
            Ok(translated) => translated,
            Err(e) => {
                warn!(%speaker_id, source, target_language = %target, error = %e, "Translation failed");
                let payload = Arc::new(ServerEvent::TranslationError {
                    speaker_id: speaker_id.clone(),
                    target_language: target.clone(),
                    message: e.to_string(),
                });
                self.deliver(recipients.iter().map(|r| &r.user_id), &payload, &mut report);
                report.failed_languages.push(target);
                return report;
            }
        };

        let base = TranslationResult {
            speaker_id: speaker_id.clone(),
            original_text: text.to_string(),
            translated_text: translated,
            source_language: source.to_string(),
            target_language: target.clone(),
            voice_id: None,
            audio_payload: None,
            result_kind: ResultKind::Text,
        };

        let mut text_only: Vec<&UserId> = Vec::new();
        let mut voiced: BTreeMap<VoiceKey, (f32, Vec<&UserId>)> = BTreeMap::new();
        for recipient in &recipients {
            match (&recipient.voice, &self.synthesizer) {
                (Some(voice), Some(_)) => {
                    voiced
                        .entry(voice_key(&voice.voice_id, voice.speed))
                        .or_insert_with(|| (voice.speed, Vec::new()))
                        .1
                        .push(&recipient.user_id);
                }
                _ => text_only.push(&recipient.user_id),
            }
        }

        if let Some(synthesizer) = &self.synthesizer
            && !voiced.is_empty()
        {
            report.synthesis_calls += voiced.len();
            let syntheses = join_all(voiced.iter().map(|((voice_id, _), (speed, _))| {
                synthesizer.synthesize(&base.translated_text, voice_id, *speed)
            }))
            .await;

            for (((voice_id, _), (_, users)), audio) in voiced.iter().zip(syntheses) {
                match audio {
                    Ok(audio) => {
                        let payload = Arc::new(ServerEvent::Translation(TranslationResult {
                            voice_id: Some(voice_id.clone()),
                            audio_payload: Some(audio),
                            result_kind: ResultKind::Voice,
                            ..base.clone()
                        }));
                        self.deliver(users.iter().copied(), &payload, &mut report);
                    }
                    Err(e) => {
                        warn!(target_language = %target, voice = %voice_id, error = %e, "Synthesis failed, sending text only");
                        text_only.extend(users.iter().copied());
                    }
                }
            }
        }

        if !text_only.is_empty() {
            let payload = Arc::new(ServerEvent::Translation(base));
            self.deliver(text_only.into_iter(), &payload, &mut report);
        }
        report
    }

    /// Sends one shared payload to each user. Unreachable users are counted
    /// and skipped.
    fn deliver<'a>(
        &self,
        users: impl Iterator<Item = &'a UserId>,
        payload: &Arc<ServerEvent>,
        report: &mut FanoutReport,
    ) {
        for user_id in users {
            match self.channel.send(user_id, payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!(%user_id, error = %e, "Recipient unreachable, discarding result");
                    report.undeliverable += 1;
                }
            }
        }
    }
}
