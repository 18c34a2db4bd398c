use std::net::SocketAddr;
use std::sync::Arc;

use winechat_api::{build_router, state::AppState};
use winechat_config::Settings;
use winechat_translation::{InMemorySettingsStore, TextTranslator};
use winechat_translation::providers::ProviderSet;

use super::fakes::{CountingRecognizer, EchoTranslator, TaggingSynthesizer};
use super::ws_client::WsClient;

pub struct TestApp {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    pub state: AppState,
    pub translator: Arc<EchoTranslator>,
    pub synthesizer: Arc<TaggingSynthesizer>,
    pub recognizer: Arc<CountingRecognizer>,
}

impl TestApp {
    /// Boots the full router on a random local port with every provider faked.
    pub async fn spawn() -> Self {
        Self::spawn_with(true, |_| {}).await
    }

    /// Same, but with no translation provider configured.
    pub async fn spawn_without_translation() -> Self {
        Self::spawn_with(false, |_| {}).await
    }

    /// Full providers, with settings adjusted before the router is built.
    pub async fn spawn_configured(configure: impl FnOnce(&mut Settings)) -> Self {
        Self::spawn_with(true, configure).await
    }

    async fn spawn_with(translation: bool, configure: impl FnOnce(&mut Settings)) -> Self {
        let mut settings = Settings::default();
        settings.jwt.secret = "e2e-secret".to_string();
        configure(&mut settings);

        let translator = Arc::new(EchoTranslator::default());
        let synthesizer = Arc::new(TaggingSynthesizer::default());
        let recognizer = Arc::new(CountingRecognizer::default());
        let providers = ProviderSet {
            recognizer: Some(recognizer.clone()),
            translator: translation.then(|| translator.clone() as Arc<dyn TextTranslator>),
            synthesizer: Some(synthesizer.clone()),
        };

        let state = AppState::new(settings, providers, Arc::new(InMemorySettingsStore::new()));
        let app = build_router(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: reqwest::Client::new(),
            state,
            translator,
            synthesizer,
            recognizer,
        }
    }

    pub fn token(&self, user_id: &str) -> String {
        self.state
            .auth
            .issue_access_token(user_id, chrono::Duration::minutes(15))
            .unwrap()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path))
    }

    pub fn auth_get(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(token)
    }

    pub fn auth_post(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(token)
    }

    pub fn auth_put(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client.put(self.url(path)).bearer_auth(token)
    }

    /// Joins `room` as `user`. `query` is appended verbatim,
    /// e.g. `"&source_language=ja&target_languages=ko,en"`.
    pub async fn join(&self, user: &str, room: &str, query: &str) -> WsClient {
        let url = format!(
            "ws://{}/ws?token={}&room_id={}{}",
            self.addr,
            self.token(user),
            room,
            query
        );
        WsClient::connect(&url).await
    }
}
