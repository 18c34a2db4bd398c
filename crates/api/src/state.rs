use std::sync::Arc;

use tracing::warn;
use winechat_config::Settings;
use winechat_services::AuthService;
use winechat_translation::providers::ProviderSet;
use winechat_translation::{
    ConnectionManager, FanoutEngine, RecognitionCoordinator, RoomChannel, SessionRegistry,
    SettingsStore, SpeechSynthesizer, TextTranslator,
};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub auth: Arc<AuthService>,
    pub manager: Arc<ConnectionManager>,
    /// Direct access for the one-shot HTTP endpoints.
    pub translator: Option<Arc<dyn TextTranslator>>,
    pub synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
}

impl AppState {
    /// Wires the pipeline from whatever providers are available. Without a
    /// translator there is no fan-out; clients are told so on connect.
    pub fn new(settings: Settings, providers: ProviderSet, store: Arc<dyn SettingsStore>) -> Self {
        let pipeline = &settings.pipeline;
        let registry = Arc::new(SessionRegistry::new());
        let channel = Arc::new(RoomChannel::new());

        let coordinator = RecognitionCoordinator::new(
            providers.recognizer,
            pipeline.sample_rate,
            pipeline.transcript_buffer,
        );

        let translator = providers.translator;
        let synthesizer = providers.synthesizer;

        let fanout = match translator.clone() {
            Some(translator) => Some(Arc::new(FanoutEngine::new(
                registry.clone(),
                channel.clone(),
                translator,
                synthesizer.clone(),
            ))),
            None => {
                if synthesizer.is_some() {
                    warn!("Speech synthesis configured without translation, voice output disabled");
                }
                None
            }
        };

        let manager = ConnectionManager::new(registry, channel, coordinator, fanout, store, pipeline);
        let auth = AuthService::new(&settings.jwt);

        Self {
            settings: Arc::new(settings),
            auth: Arc::new(auth),
            manager: Arc::new(manager),
            translator,
            synthesizer,
        }
    }
}
