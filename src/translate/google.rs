//! Google Cloud Translation (v2) client

use super::{TranslateError, Translator, ENGLISH};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_TRANSLATE_URL: &str = "https://translation.googleapis.com/language/translate/v2";

const TRANSLATE_TIMEOUT: Duration = Duration::from_secs(30);

/// English as the service is asked for it; detection still reports `en`
const WIRE_ENGLISH: &str = "en-us";

fn wire_language(language: &str) -> &str {
    if language == ENGLISH {
        WIRE_ENGLISH
    } else {
        language
    }
}

/// Connection settings for the translation service
#[derive(Debug, Clone)]
pub struct TranslateConfig {
    pub api_key: String,
    pub base_url: String,
    /// Optional HTTP(S) proxy all translation traffic goes through
    pub proxy: Option<String>,
}

impl TranslateConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_TRANSLATE_URL.to_string(),
            proxy: None,
        }
    }
}

pub struct GoogleTranslator {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GoogleTranslator {
    pub fn new(config: &TranslateConfig) -> Result<Self, TranslateError> {
        let mut builder = Client::builder().timeout(TRANSLATE_TIMEOUT);
        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| TranslateError::Config(format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| TranslateError::Config(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_form<R: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<R, TranslateError> {
        let response = self.client.post(url).form(form).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TranslateError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| TranslateError::Malformed(format!("{e} - body: {body}")))
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn detect(&self, text: &str) -> Result<String, TranslateError> {
        let url = format!("{}/detect", self.base_url);
        let form = [("key", self.api_key.as_str()), ("q", text), ("format", "text")];
        let response: DetectResponse = self.post_form(&url, &form).await?;

        response
            .data
            .detections
            .into_iter()
            .next()
            .and_then(|candidates| candidates.into_iter().next())
            .map(|detection| detection.language)
            .ok_or_else(|| TranslateError::Malformed("no detections in response".to_string()))
    }

    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslateError> {
        let form = [
            ("key", self.api_key.as_str()),
            ("source", wire_language(source)),
            ("target", wire_language(target)),
            ("q", text),
            ("format", "text"),
        ];
        let response: TranslateResponse = self.post_form(&self.base_url, &form).await?;

        response
            .data
            .translations
            .into_iter()
            .next()
            .map(|translation| translation.translated_text)
            .ok_or_else(|| TranslateError::Malformed("no translations in response".to_string()))
    }
}

// Google Translation API types

#[derive(Debug, Deserialize)]
struct DetectResponse {
    data: DetectData,
}

#[derive(Debug, Deserialize)]
struct DetectData {
    detections: Vec<Vec<Detection>>,
}

#[derive(Debug, Deserialize)]
struct Detection {
    language: String,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    #[serde(rename = "translatedText")]
    translated_text: String,
}
