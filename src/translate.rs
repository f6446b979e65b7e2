//! Language detection and translation around turn text
//!
//! Prompts are always built from English text. Inbound user text is
//! detected and translated to English; responses are translated back into
//! the user's language for display.

mod error;
mod google;

pub use error::TranslateError;
pub use google::{GoogleTranslator, TranslateConfig, DEFAULT_TRANSLATE_URL};

use async_trait::async_trait;
use std::sync::Arc;

/// Language tag of text that needs no translation
pub const ENGLISH: &str = "en";

/// Remote detect/translate capability
#[async_trait]
pub trait Translator: Send + Sync {
    /// Detect the language of `text`
    async fn detect(&self, text: &str) -> Result<String, TranslateError>;

    /// Translate `text` from `source` into `target`
    async fn translate(&self, text: &str, source: &str, target: &str)
        -> Result<String, TranslateError>;
}

/// Translator used when no translation service is configured: everything
/// is English
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranslator;

#[async_trait]
impl Translator for IdentityTranslator {
    async fn detect(&self, _text: &str) -> Result<String, TranslateError> {
        Ok(ENGLISH.to_string())
    }

    async fn translate(
        &self,
        text: &str,
        _source: &str,
        _target: &str,
    ) -> Result<String, TranslateError> {
        Ok(text.to_string())
    }
}

/// Inbound text in canonical form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub canonical: String,
    pub language: String,
}

/// Wraps a [`Translator`] with the inbound/outbound contract used per turn
pub struct TextTransformPipeline<T: ?Sized> {
    translator: Arc<T>,
}

impl<T: ?Sized> Clone for TextTransformPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            translator: self.translator.clone(),
        }
    }
}

impl<T: Translator + ?Sized> TextTransformPipeline<T> {
    pub fn new(translator: Arc<T>) -> Self {
        Self { translator }
    }

    /// Detect the language of `text` and translate it to English if needed
    pub async fn normalize_inbound(&self, text: &str) -> Result<Normalized, TranslateError> {
        let language = self.translator.detect(text).await?;
        if language == ENGLISH {
            return Ok(Normalized {
                canonical: text.to_string(),
                language,
            });
        }
        let canonical = self.translator.translate(text, &language, ENGLISH).await?;
        tracing::debug!(language = %language, "Translated inbound text");
        Ok(Normalized {
            canonical,
            language,
        })
    }

    /// Translate English `canonical` text back into `language`
    pub async fn localize_outbound(
        &self,
        canonical: &str,
        language: &str,
    ) -> Result<String, TranslateError> {
        if language == ENGLISH {
            return Ok(canonical.to_string());
        }
        self.translator.translate(canonical, ENGLISH, language).await
    }
}
