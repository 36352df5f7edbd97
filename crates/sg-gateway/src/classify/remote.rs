//! Remote moderation providers
//!
//! All three classifiers talk to the same generative-AI moderation API
//! through [`ModelClient`]; they differ only in model, prompt, and how the
//! payload becomes request parts. Every call is bounded by the configured
//! timeout — a slow upstream costs this sub-check, never the request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use tracing::debug;

use super::parse::{parse_model_output, ParseOutcome};
use super::Classifier;
use crate::config::GatewayConfig;
use crate::error::ClassifyError;
use sg_core::{CheckType, FilteringLevel, Verdict};

/// Text shorter than this is boilerplate; classified safe without a call.
const MIN_TEXT_LEN: usize = 20;
/// Text longer than this is truncated before classification.
const MAX_TEXT_LEN: usize = 4_000;

// =============================================================================
// Shared API client
// =============================================================================

pub struct ModelClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl ModelClient {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.model_api_base.trim_end_matches('/').to_string(),
            api_key: config.model_api_key.clone(),
            timeout: Duration::from_millis(config.classifier_timeout_ms),
        }
    }

    /// One generateContent call; returns the raw text of the first
    /// candidate. Timeout and transport failures map to [`ClassifyError`].
    pub async fn generate(&self, model: &str, parts: Vec<Value>) -> Result<String, ClassifyError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );
        let body = json!({ "contents": [{ "parts": parts }] });

        let call = async {
            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| ClassifyError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(ClassifyError::Upstream(status.as_u16()));
            }

            let value: Value = response
                .json()
                .await
                .map_err(|e| ClassifyError::Transport(e.to_string()))?;

            value["candidates"][0]["content"]["parts"][0]["text"]
                .as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| ClassifyError::Unparseable("no candidate text".into()))
        };

        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ClassifyError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    fn parse_to_verdict(&self, raw: &str) -> Result<Verdict, ClassifyError> {
        match parse_model_output(raw) {
            ParseOutcome::Parsed(mv) => Ok(mv.into_verdict()),
            ParseOutcome::Unparseable => {
                let snippet: String = raw.chars().take(100).collect();
                Err(ClassifyError::Unparseable(snippet))
            }
        }
    }
}

fn strictness_note(level: FilteringLevel) -> &'static str {
    match level {
        FilteringLevel::Strict => {
            "\nApply STRICT standards. Flag even suggestive, mildly violent, or age-questionable content."
        }
        FilteringLevel::Moderate | FilteringLevel::Custom => {
            "\nApply MODERATE standards. Flag clearly inappropriate content for under-18 audiences."
        }
        FilteringLevel::Off => "",
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// =============================================================================
// URL reputation
// =============================================================================

pub struct UrlClassifier {
    client: Arc<ModelClient>,
    model: String,
}

impl UrlClassifier {
    pub fn new(client: Arc<ModelClient>, config: &GatewayConfig) -> Self {
        Self {
            client,
            model: config.text_model.clone(),
        }
    }
}

#[async_trait]
impl Classifier for UrlClassifier {
    fn check_type(&self) -> CheckType {
        CheckType::Url
    }

    async fn classify(
        &self,
        payload: &str,
        _level: FilteringLevel,
    ) -> Result<Verdict, ClassifyError> {
        let prompt = format!(
            "Analyze the following URL for adult, harmful, or inappropriate content \
             for children under 18.\nURL: {payload}\n\
             Return ONLY a raw JSON object:\n\
             {{\n  \"status\": \"SAFE\" or \"UNSAFE\",\n  \"reason\": \"brief explanation\",\n  \
             \"confidence\": number between 0 and 100\n}}"
        );

        let raw = self.client.generate(&self.model, vec![json!({ "text": prompt })]).await?;
        debug!(check = "url", raw_len = raw.len(), "classifier response");
        self.client.parse_to_verdict(&raw)
    }
}

// =============================================================================
// Text classification
// =============================================================================

pub struct TextClassifier {
    client: Arc<ModelClient>,
    model: String,
}

impl TextClassifier {
    pub fn new(client: Arc<ModelClient>, config: &GatewayConfig) -> Self {
        Self {
            client,
            model: config.text_model.clone(),
        }
    }
}

#[async_trait]
impl Classifier for TextClassifier {
    fn check_type(&self) -> CheckType {
        CheckType::Text
    }

    async fn classify(
        &self,
        payload: &str,
        level: FilteringLevel,
    ) -> Result<Verdict, ClassifyError> {
        let trimmed = payload.trim();
        if trimmed.len() < MIN_TEXT_LEN {
            return Ok(Verdict::safe_skipped());
        }
        let truncated = truncate_chars(trimmed, MAX_TEXT_LEN);

        let prompt = format!(
            "You are a strict parental control AI system.\n\
             Analyze the following content and classify it as SAFE or UNSAFE for \
             children under 18.\n\
             If unsafe, specify the reason category from this list:\n\
             - Sexual Content\n- Nudity\n- Explicit Language\n- Violence\n- Drugs\n\
             - Hate Speech\n- Other Harmful Content{note}\n\
             Return ONLY a raw JSON object:\n\
             {{\n  \"status\": \"SAFE\" or \"UNSAFE\",\n  \
             \"category\": \"reason category or null if SAFE\",\n  \
             \"confidence\": number between 0 and 100\n}}\n\
             Content to analyze:\n{truncated}",
            note = strictness_note(level),
        );

        let raw = self.client.generate(&self.model, vec![json!({ "text": prompt })]).await?;
        debug!(check = "text", raw_len = raw.len(), "classifier response");
        self.client.parse_to_verdict(&raw)
    }
}

// =============================================================================
// Image classification
// =============================================================================

pub struct ImageClassifier {
    client: Arc<ModelClient>,
    model: String,
    fetch: reqwest::Client,
    fetch_timeout: Duration,
    max_bytes: u64,
}

impl ImageClassifier {
    pub fn new(client: Arc<ModelClient>, config: &GatewayConfig) -> Self {
        Self {
            client,
            model: config.vision_model.clone(),
            fetch: reqwest::Client::new(),
            fetch_timeout: Duration::from_millis(config.image_fetch_timeout_ms),
            max_bytes: config.image_max_bytes,
        }
    }

    /// Download the image so the model sees pixels, not a URL.
    async fn fetch_image(&self, url: &str) -> Result<(Vec<u8>, String), ClassifyError> {
        let response = self
            .fetch
            .get(url)
            .timeout(self.fetch_timeout)
            .header("User-Agent", "SafeGate/0.2")
            .send()
            .await
            .map_err(|e| ClassifyError::ImageFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ClassifyError::ImageFetch(format!(
                "status {}",
                response.status().as_u16()
            )));
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or("image/jpeg").to_string())
            .unwrap_or_else(|| "image/jpeg".to_string());

        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(ClassifyError::ImageFetch(format!("{len} bytes exceeds cap")));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClassifyError::ImageFetch(e.to_string()))?;

        if bytes.len() as u64 > self.max_bytes {
            return Err(ClassifyError::ImageFetch(format!(
                "{} bytes exceeds cap",
                bytes.len()
            )));
        }

        Ok((bytes.to_vec(), mime))
    }
}

#[async_trait]
impl Classifier for ImageClassifier {
    fn check_type(&self) -> CheckType {
        CheckType::Image
    }

    async fn classify(
        &self,
        payload: &str,
        level: FilteringLevel,
    ) -> Result<Verdict, ClassifyError> {
        if !(payload.starts_with("http://") || payload.starts_with("https://")) {
            return Ok(Verdict::safe_skipped());
        }

        let (bytes, mime) = self.fetch_image(payload).await?;

        let strict_note = if level == FilteringLevel::Strict {
            "\nApply STRICT standards. Flag suggestive poses, partial nudity, or any age-questionable content."
        } else {
            ""
        };

        let prompt = format!(
            "You are an AI content moderation system for parental control.\n\
             Analyze this image and determine if it contains any of:\n\
             - Nudity (full or partial)\n- Sexual content or suggestive poses\n\
             - Violence or gore\n- Drugs or drug paraphernalia\n\
             - Inappropriate meme text\n- Any other harmful content for children under 18\
             {strict_note}\n\
             Also, if the image contains visible text (e.g. meme), extract and evaluate that text.\n\n\
             Return ONLY a raw JSON object:\n\
             {{\n  \"status\": \"SAFE\" or \"UNSAFE\",\n  \
             \"category\": \"reason category or null if SAFE\",\n  \
             \"confidence\": number between 0 and 100,\n  \
             \"detectedText\": \"any visible text found in the image, or null\"\n}}"
        );

        let parts = vec![
            json!({ "text": prompt }),
            json!({ "inline_data": { "mime_type": mime, "data": BASE64.encode(&bytes) } }),
        ];

        let raw = self.client.generate(&self.model, parts).await?;
        debug!(check = "image", raw_len = raw.len(), "classifier response");
        self.client.parse_to_verdict(&raw)
    }
}
