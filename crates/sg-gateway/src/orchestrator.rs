//! Classification orchestrator
//!
//! Runs the moderation decision pipeline for every check the API receives:
//! profile resolution, the static policy gate, then cache-fronted fan-out
//! to the external classifiers. The aggregate blocks iff any sub-check
//! blocks; reason precedence is url > text > image.
//!
//! Failure policy: a sub-check that times out, errors, or returns garbage
//! becomes a fail-open verdict for that sub-check only. A missing profile
//! means policy-less but classifier-full (unmanaged device). Activity
//! records are written fire-and-forget; the response never waits on them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{fingerprint, ResultCache};
use crate::classify::Classifier;
use crate::config::GatewayConfig;
use crate::store::{ActivityRecord, ActivityStore, ProfileStore};
use sg_core::{
    normalize_domain, CheckType, FilteringLevel, PolicyDecision, PolicyGate, Profile, Verdict,
};

/// Page text shorter than this is not worth a text sub-check.
pub const MIN_PAGE_TEXT_LEN: usize = 50;
/// Image cap for the dedicated image endpoint.
pub const MAX_IMAGES_BATCH: usize = 10;
/// Image cap for the combined page endpoint.
pub const MAX_IMAGES_PAGE: usize = 5;

/// Verdict for one image URL.
#[derive(Debug, Clone, Serialize)]
pub struct ImageResult {
    pub url: String,
    #[serde(flatten)]
    pub verdict: Verdict,
}

/// Response of the dedicated image endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagesOutcome {
    pub blocked: bool,
    pub blocked_images: Vec<ImageResult>,
    pub results: Vec<ImageResult>,
}

/// Per-check detail retained on a combined page verdict.
#[derive(Debug, Clone, Serialize)]
pub struct PageDetails {
    pub url: Verdict,
    pub text: Verdict,
    pub images: Vec<ImageResult>,
}

/// Response of the combined page endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PageOutcome {
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub details: PageDetails,
}

/// Combined page request as the orchestrator sees it.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub url: String,
    pub text: Option<String>,
    pub image_urls: Vec<String>,
    pub device_id: String,
}

pub struct Orchestrator {
    profiles: Arc<dyn ProfileStore>,
    activity: Arc<dyn ActivityStore>,
    cache: ResultCache,
    url_classifier: Arc<dyn Classifier>,
    text_classifier: Arc<dyn Classifier>,
    image_classifier: Arc<dyn Classifier>,
    content_ttl: Duration,
    url_ttl: Duration,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        activity: Arc<dyn ActivityStore>,
        cache: ResultCache,
        url_classifier: Arc<dyn Classifier>,
        text_classifier: Arc<dyn Classifier>,
        image_classifier: Arc<dyn Classifier>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            profiles,
            activity,
            cache,
            url_classifier,
            text_classifier,
            image_classifier,
            content_ttl: Duration::from_secs(config.cache_ttl_secs),
            url_ttl: Duration::from_secs(config.url_cache_ttl_secs),
        }
    }

    fn now() -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }

    /// Profile lookup. A store failure degrades to "no profile": the
    /// pipeline runs policy-less rather than failing the request.
    async fn resolve_profile(&self, device_id: &str) -> Option<Profile> {
        if device_id.is_empty() {
            return None;
        }
        match self.profiles.find_by_device_id(device_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(device_id, error = %e, "profile lookup failed; running policy-less");
                None
            }
        }
    }

    /// One cache-fronted classifier call. Never returns an error: failures
    /// collapse to a fail-open verdict for this sub-check.
    async fn cached_classify(
        &self,
        classifier: &Arc<dyn Classifier>,
        payload: &str,
        level: FilteringLevel,
        ttl: Duration,
    ) -> Verdict {
        let fp = fingerprint(classifier.check_type(), payload, level);

        if let Some(hit) = self.cache.get(&fp).await {
            return hit;
        }

        match classifier.classify(payload, level).await {
            Ok(verdict) => {
                if verdict.error.is_none() {
                    self.cache.put(&fp, &verdict, ttl).await;
                }
                verdict
            }
            Err(e) => {
                warn!(
                    check = classifier.check_type().as_str(),
                    error = %e,
                    "classifier failed; defaulting open"
                );
                Verdict::fail_open(e.tag())
            }
        }
    }

    /// Fire-and-forget activity write. The response path never waits.
    fn log_blocked(
        &self,
        profile: &Profile,
        url: &str,
        check_type: CheckType,
        reason: Option<String>,
        confidence: Option<u8>,
    ) {
        let record = ActivityRecord {
            child_id: profile.id.clone(),
            parent_id: profile.parent_id.clone(),
            url: url.to_string(),
            domain: normalize_domain(url),
            check_type,
            status: "blocked".to_string(),
            reason,
            confidence,
            timestamp: Utc::now(),
        };
        let activity = Arc::clone(&self.activity);
        tokio::spawn(async move {
            if let Err(e) = activity.append(record).await {
                warn!(error = %e, "activity write failed");
            }
        });
    }

    fn level_of(profile: Option<&Profile>) -> FilteringLevel {
        profile.map(|p| p.filtering_level).unwrap_or_default()
    }

    /// Static policy evaluation for a URL. `None` means Defer (or no
    /// applicable policy at all).
    fn gate_verdict(profile: Option<&Profile>, url: &str) -> Option<Verdict> {
        let profile = profile?;
        let domain = normalize_domain(url)?;
        let gate = PolicyGate::new(profile);

        match gate.evaluate(&domain, Self::now()) {
            PolicyDecision::Allow { reason } => Some(Verdict::policy_allow(reason)),
            PolicyDecision::Block { reason } => Some(Verdict::policy_block(reason)),
            PolicyDecision::Defer => None,
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// URL-only check (the client precheck).
    pub async fn check_url(&self, url: &str, device_id: &str) -> Verdict {
        let profile = self.resolve_profile(device_id).await;

        if let Some(verdict) = Self::gate_verdict(profile.as_ref(), url) {
            if verdict.blocked {
                if let Some(p) = &profile {
                    self.log_blocked(p, url, CheckType::Url, verdict.reason.clone(), Some(100));
                }
            }
            debug!(url, blocked = verdict.blocked, "policy gate short-circuit");
            return verdict;
        }

        let level = Self::level_of(profile.as_ref());
        let verdict = self
            .cached_classify(&self.url_classifier, url, level, self.url_ttl)
            .await;

        if verdict.blocked {
            if let Some(p) = &profile {
                self.log_blocked(
                    p,
                    url,
                    CheckType::Url,
                    verdict.reason.clone(),
                    Some(verdict.confidence),
                );
            }
        }
        verdict
    }

    /// Text-only check.
    pub async fn check_text(&self, text: &str, device_id: &str, url: Option<&str>) -> Verdict {
        let profile = self.resolve_profile(device_id).await;
        let level = Self::level_of(profile.as_ref());

        let verdict = self
            .cached_classify(&self.text_classifier, text, level, self.content_ttl)
            .await;

        if verdict.blocked {
            if let (Some(p), Some(url)) = (&profile, url) {
                self.log_blocked(
                    p,
                    url,
                    CheckType::Text,
                    verdict.category.clone(),
                    Some(verdict.confidence),
                );
            }
        }
        verdict
    }

    /// Batch image check, capped at [`MAX_IMAGES_BATCH`].
    pub async fn check_images(
        &self,
        image_urls: &[String],
        device_id: &str,
        url: Option<&str>,
    ) -> ImagesOutcome {
        let profile = self.resolve_profile(device_id).await;
        let level = Self::level_of(profile.as_ref());

        let results = self
            .classify_images(image_urls, level, MAX_IMAGES_BATCH)
            .await;

        let blocked_images: Vec<ImageResult> =
            results.iter().filter(|r| r.verdict.blocked).cloned().collect();
        let blocked = !blocked_images.is_empty();

        if blocked {
            if let (Some(p), Some(url)) = (&profile, url) {
                let first = &blocked_images[0].verdict;
                self.log_blocked(
                    p,
                    url,
                    CheckType::Image,
                    first.category.clone(),
                    Some(first.confidence),
                );
            }
        }

        ImagesOutcome {
            blocked,
            blocked_images,
            results,
        }
    }

    /// Combined page check: policy gate first, then url/text/image
    /// sub-checks concurrently, each behind the cache.
    pub async fn check_page(&self, request: PageRequest) -> PageOutcome {
        let profile = self.resolve_profile(&request.device_id).await;

        if let Some(verdict) = Self::gate_verdict(profile.as_ref(), &request.url) {
            if verdict.blocked {
                if let Some(p) = &profile {
                    self.log_blocked(
                        p,
                        &request.url,
                        CheckType::Url,
                        verdict.reason.clone(),
                        Some(100),
                    );
                }
            }
            return PageOutcome {
                blocked: verdict.blocked,
                reason: verdict.reason.clone(),
                details: PageDetails {
                    url: verdict,
                    text: Verdict::safe_skipped(),
                    images: Vec::new(),
                },
            };
        }

        let level = Self::level_of(profile.as_ref());

        let url_fut = self.cached_classify(&self.url_classifier, &request.url, level, self.url_ttl);

        let text = request.text.as_deref().unwrap_or("").trim();
        let text_fut = async {
            if text.len() > MIN_PAGE_TEXT_LEN {
                self.cached_classify(&self.text_classifier, text, level, self.content_ttl)
                    .await
            } else {
                Verdict::safe_skipped()
            }
        };

        let images_fut = self.classify_images(&request.image_urls, level, MAX_IMAGES_PAGE);

        // All three sub-checks settle independently; a slow or failed one
        // costs only itself.
        let (url_verdict, text_verdict, image_results) = tokio::join!(url_fut, text_fut, images_fut);

        let blocked_image = image_results.iter().find(|r| r.verdict.blocked);
        let blocked = url_verdict.blocked || text_verdict.blocked || blocked_image.is_some();

        // Reason precedence: url > text > image
        let reason = if url_verdict.blocked {
            url_verdict.reason.clone()
        } else if text_verdict.blocked {
            text_verdict.category.clone()
        } else {
            blocked_image.and_then(|r| r.verdict.category.clone())
        };

        if blocked {
            if let Some(p) = &profile {
                self.log_blocked(p, &request.url, CheckType::Page, reason.clone(), None);
            }
        }

        PageOutcome {
            blocked,
            reason,
            details: PageDetails {
                url: url_verdict,
                text: text_verdict,
                images: image_results,
            },
        }
    }

    /// Filter, cap, and classify a batch of image URLs concurrently.
    async fn classify_images(
        &self,
        image_urls: &[String],
        level: FilteringLevel,
        max: usize,
    ) -> Vec<ImageResult> {
        let candidates: Vec<&String> = image_urls
            .iter()
            .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
            .take(max)
            .collect();

        let futures = candidates.iter().map(|url| {
            let url = (*url).clone();
            async move {
                let verdict = self
                    .cached_classify(&self.image_classifier, &url, level, self.content_ttl)
                    .await;
                ImageResult { url, verdict }
            }
        });

        join_all(futures).await
    }
}
