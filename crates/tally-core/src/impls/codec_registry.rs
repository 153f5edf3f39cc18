//! CodecRegistry - content-type から VoteCodec を引く
//!
//! # 設計原則
//! - 起動時に一度だけ構築し、以降は不変（共有可変状態を持たない）
//! - 呼び出し側（HTTP state / consumer）へ明示的に渡す
//! - 未知・未指定の content-type は default codec にフォールバック

use std::collections::HashMap;
use std::sync::Arc;

use super::json_codec::JsonCodec;
use crate::ports::VoteCodec;

pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn VoteCodec>>,
    default: Arc<dyn VoteCodec>,
}

/// RegistryError は CodecRegistry の構築エラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("codec for content type '{0}' is already registered")]
    AlreadyRegistered(String),
}

/// `Application/JSON; charset=utf-8` → `application/json`
fn normalize(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

impl CodecRegistry {
    /// Registry whose default (and only) codec is `default`.
    pub fn new(default: Arc<dyn VoteCodec>) -> Self {
        let mut codecs = HashMap::new();
        codecs.insert(normalize(default.content_type()), Arc::clone(&default));
        Self { codecs, default }
    }

    /// JSON only.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(JsonCodec))
    }

    pub fn register(&mut self, codec: Arc<dyn VoteCodec>) -> Result<(), RegistryError> {
        let key = normalize(codec.content_type());
        if self.codecs.contains_key(&key) {
            return Err(RegistryError::AlreadyRegistered(key));
        }
        self.codecs.insert(key, codec);
        Ok(())
    }

    pub fn get(&self, content_type: &str) -> Option<Arc<dyn VoteCodec>> {
        self.codecs.get(&normalize(content_type)).cloned()
    }

    pub fn resolve(&self, content_type: Option<&str>) -> Arc<dyn VoteCodec> {
        content_type
            .and_then(|ct| self.get(ct))
            .unwrap_or_else(|| self.default_codec())
    }

    pub fn default_codec(&self) -> Arc<dyn VoteCodec> {
        Arc::clone(&self.default)
    }

    pub fn content_types(&self) -> Vec<String> {
        let mut types: Vec<_> = self.codecs.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CodecError, ErrorResponse, SurveyResults, Vote, VotePayload};

    struct PlainText;

    impl VoteCodec for PlainText {
        fn content_type(&self) -> &'static str {
            "text/plain"
        }
        fn decode_submission(&self, _: &[u8]) -> Result<VotePayload, CodecError> {
            Err(CodecError::Decode("unsupported".into()))
        }
        fn encode_vote(&self, _: &Vote) -> Result<Vec<u8>, CodecError> {
            Err(CodecError::Encode("unsupported".into()))
        }
        fn decode_vote(&self, _: &[u8]) -> Result<Vote, CodecError> {
            Err(CodecError::Decode("unsupported".into()))
        }
        fn encode_results(&self, _: &SurveyResults) -> Result<Vec<u8>, CodecError> {
            Err(CodecError::Encode("unsupported".into()))
        }
        fn encode_error(&self, error: &ErrorResponse) -> Result<Vec<u8>, CodecError> {
            Ok(error.error.clone().into_bytes())
        }
    }

    #[test]
    fn json_is_registered_by_default() {
        let registry = CodecRegistry::with_defaults();
        assert_eq!(registry.content_types(), vec!["application/json".to_string()]);
        assert!(registry.get("Application/JSON; charset=utf-8").is_some());
    }

    #[test]
    fn unknown_or_missing_content_type_falls_back_to_default() {
        let registry = CodecRegistry::with_defaults();
        assert_eq!(registry.resolve(None).content_type(), "application/json");
        assert_eq!(
            registry.resolve(Some("application/xml")).content_type(),
            "application/json"
        );
    }

    #[test]
    fn registered_codec_is_resolved() {
        let mut registry = CodecRegistry::with_defaults();
        registry.register(Arc::new(PlainText)).unwrap();
        assert_eq!(registry.resolve(Some("text/plain")).content_type(), "text/plain");
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = CodecRegistry::with_defaults();
        let result = registry.register(Arc::new(JsonCodec));
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(_))));
    }
}
