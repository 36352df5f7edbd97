//! End-to-end tests of the moderation pipeline with scripted classifiers.
//!
//! Every test wires a full orchestrator over in-memory stores and cache;
//! the classifiers are local mocks that count their calls, so the tests
//! can assert not just the verdicts but how many external calls a given
//! decision path costs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use sg_core::{CheckType, FilteringLevel, Profile, Status, Verdict};
use sg_gateway::cache::{MemoryTier, ResultCache};
use sg_gateway::classify::Classifier;
use sg_gateway::config::GatewayConfig;
use sg_gateway::error::ClassifyError;
use sg_gateway::orchestrator::{Orchestrator, PageRequest};
use sg_gateway::store::{MemoryActivityStore, MemoryProfileStore};

#[derive(Clone, Copy)]
enum Script {
    Safe,
    Block {
        reason: Option<&'static str>,
        category: Option<&'static str>,
    },
    Fail,
}

struct MockClassifier {
    check_type: CheckType,
    script: Script,
    calls: AtomicUsize,
}

impl MockClassifier {
    fn new(check_type: CheckType, script: Script) -> Arc<Self> {
        Arc::new(Self {
            check_type,
            script,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    fn check_type(&self) -> CheckType {
        self.check_type
    }

    async fn classify(
        &self,
        _payload: &str,
        _level: FilteringLevel,
    ) -> Result<Verdict, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script {
            Script::Safe => Ok(Verdict::safe()),
            Script::Block { reason, category } => Ok(Verdict {
                blocked: true,
                status: Status::Unsafe,
                reason: reason.map(String::from),
                category: category.map(String::from),
                confidence: 90,
                error: None,
                detected_text: None,
            }),
            Script::Fail => Err(ClassifyError::Transport("connection refused".into())),
        }
    }
}

struct Harness {
    orchestrator: Orchestrator,
    activity: Arc<MemoryActivityStore>,
    url: Arc<MockClassifier>,
    text: Arc<MockClassifier>,
    image: Arc<MockClassifier>,
}

fn harness(profile: Option<Profile>, url: Script, text: Script, image: Script) -> Harness {
    let profiles = Arc::new(MemoryProfileStore::new());
    if let Some(p) = profile {
        profiles.insert(p);
    }
    let activity = Arc::new(MemoryActivityStore::new());

    let url = MockClassifier::new(CheckType::Url, url);
    let text = MockClassifier::new(CheckType::Text, text);
    let image = MockClassifier::new(CheckType::Image, image);

    let cache = ResultCache::new(Some(Arc::new(MemoryTier::new())), None);
    let orchestrator = Orchestrator::new(
        profiles,
        Arc::clone(&activity) as Arc<dyn sg_gateway::store::ActivityStore>,
        cache,
        Arc::clone(&url) as Arc<dyn Classifier>,
        Arc::clone(&text) as Arc<dyn Classifier>,
        Arc::clone(&image) as Arc<dyn Classifier>,
        &GatewayConfig::default(),
    );

    Harness {
        orchestrator,
        activity,
        url,
        text,
        image,
    }
}

fn profile(device_id: &str) -> Profile {
    Profile {
        id: "child-1".into(),
        parent_id: "parent-1".into(),
        name: "Kid".into(),
        device_id: Some(device_id.into()),
        filtering_level: FilteringLevel::Moderate,
        is_active: true,
        custom_settings: Default::default(),
        allowed_domains: vec![],
        blocked_domains: vec![],
        time_restrictions: Default::default(),
    }
}

async fn settle_activity() {
    // Activity writes are spawned off the response path.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_blocklisted_domain_costs_zero_external_calls() {
    let mut p = profile("dev-1");
    p.blocked_domains = vec!["bad.example".into()];
    let h = harness(Some(p), Script::Safe, Script::Safe, Script::Safe);

    let v = h.orchestrator.check_url("https://bad.example/page", "dev-1").await;
    assert!(v.blocked);
    assert_eq!(v.reason.as_deref(), Some("manual_blocklist"));
    assert_eq!(h.url.calls(), 0);

    settle_activity().await;
    let records = h.activity.snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reason.as_deref(), Some("manual_blocklist"));
}

#[tokio::test]
async fn test_allowlist_beats_blocklist() {
    let mut p = profile("dev-1");
    p.allowed_domains = vec!["example.com".into()];
    p.blocked_domains = vec!["example.com".into()];
    let h = harness(Some(p), Script::Safe, Script::Safe, Script::Safe);

    let v = h.orchestrator.check_url("https://www.example.com/", "dev-1").await;
    assert!(!v.blocked);
    assert_eq!(v.reason.as_deref(), Some("allowlisted"));
    assert_eq!(h.url.calls(), 0);
}

#[tokio::test]
async fn test_filtering_off_short_circuits() {
    let mut p = profile("dev-1");
    p.filtering_level = FilteringLevel::Off;
    p.blocked_domains = vec!["bad.example".into()];
    let h = harness(Some(p), Script::Safe, Script::Safe, Script::Safe);

    let v = h.orchestrator.check_url("https://bad.example/", "dev-1").await;
    assert!(!v.blocked);
    assert_eq!(v.reason.as_deref(), Some("filtering_off"));
    assert_eq!(h.url.calls(), 0);
}

#[tokio::test]
async fn test_cache_hit_suppresses_second_call() {
    let h = harness(Some(profile("dev-1")), Script::Safe, Script::Safe, Script::Safe);

    let first = h.orchestrator.check_url("https://example.com/a", "dev-1").await;
    let second = h.orchestrator.check_url("https://example.com/a", "dev-1").await;

    assert_eq!(first, second);
    assert_eq!(h.url.calls(), 1);
}

#[tokio::test]
async fn test_classifier_failure_fails_open() {
    let h = harness(Some(profile("dev-1")), Script::Fail, Script::Safe, Script::Safe);

    let v = h.orchestrator.check_url("https://example.com/", "dev-1").await;
    assert!(!v.blocked);
    assert_eq!(v.error.as_deref(), Some("transport_error"));
}

#[tokio::test]
async fn test_failed_verdicts_are_not_cached() {
    let h = harness(Some(profile("dev-1")), Script::Fail, Script::Safe, Script::Safe);

    h.orchestrator.check_url("https://example.com/", "dev-1").await;
    h.orchestrator.check_url("https://example.com/", "dev-1").await;

    // Both attempts reached the classifier: failures must stay retryable.
    assert_eq!(h.url.calls(), 2);
}

#[tokio::test]
async fn test_unknown_device_still_gets_classified() {
    let h = harness(None, Script::Safe, Script::Safe, Script::Safe);

    let v = h.orchestrator.check_url("https://example.com/", "dev-unknown").await;
    assert!(!v.blocked);
    assert_eq!(h.url.calls(), 1);

    settle_activity().await;
    assert!(h.activity.snapshot().is_empty());
}

#[tokio::test]
async fn test_page_reason_prefers_url_over_text_and_image() {
    let h = harness(
        Some(profile("dev-1")),
        Script::Block { reason: Some("phishing site"), category: None },
        Script::Block { reason: None, category: Some("Violence") },
        Script::Block { reason: None, category: Some("Nudity") },
    );

    let outcome = h
        .orchestrator
        .check_page(PageRequest {
            url: "https://example.com/".into(),
            text: Some("long enough page text to be worth a classifier call here".into()),
            image_urls: vec!["https://example.com/a.jpg".into()],
            device_id: "dev-1".into(),
        })
        .await;

    assert!(outcome.blocked);
    assert_eq!(outcome.reason.as_deref(), Some("phishing site"));
}

#[tokio::test]
async fn test_page_falls_back_to_text_then_image_reason() {
    let h = harness(
        Some(profile("dev-1")),
        Script::Safe,
        Script::Block { reason: None, category: Some("Violence") },
        Script::Block { reason: None, category: Some("Nudity") },
    );

    let outcome = h
        .orchestrator
        .check_page(PageRequest {
            url: "https://example.com/".into(),
            text: Some("long enough page text to be worth a classifier call here".into()),
            image_urls: vec!["https://example.com/a.jpg".into()],
            device_id: "dev-1".into(),
        })
        .await;

    assert!(outcome.blocked);
    assert_eq!(outcome.reason.as_deref(), Some("Violence"));

    let h = harness(
        Some(profile("dev-1")),
        Script::Safe,
        Script::Safe,
        Script::Block { reason: None, category: Some("Nudity") },
    );

    let outcome = h
        .orchestrator
        .check_page(PageRequest {
            url: "https://example.com/".into(),
            text: Some("long enough page text to be worth a classifier call here".into()),
            image_urls: vec!["https://example.com/a.jpg".into()],
            device_id: "dev-1".into(),
        })
        .await;

    assert!(outcome.blocked);
    assert_eq!(outcome.reason.as_deref(), Some("Nudity"));
}

#[tokio::test]
async fn test_one_failed_subcheck_does_not_poison_the_page() {
    let h = harness(
        Some(profile("dev-1")),
        Script::Block { reason: Some("phishing site"), category: None },
        Script::Fail,
        Script::Safe,
    );

    let outcome = h
        .orchestrator
        .check_page(PageRequest {
            url: "https://example.com/".into(),
            text: Some("long enough page text to be worth a classifier call here".into()),
            image_urls: vec![],
            device_id: "dev-1".into(),
        })
        .await;

    assert!(outcome.blocked);
    assert_eq!(outcome.reason.as_deref(), Some("phishing site"));
    assert!(!outcome.details.text.blocked);
    assert_eq!(outcome.details.text.error.as_deref(), Some("transport_error"));
}

#[tokio::test]
async fn test_all_classifiers_down_still_fails_open() {
    let h = harness(Some(profile("dev-1")), Script::Fail, Script::Fail, Script::Fail);

    let outcome = h
        .orchestrator
        .check_page(PageRequest {
            url: "https://example.com/".into(),
            text: Some("long enough page text to be worth a classifier call here".into()),
            image_urls: vec!["https://example.com/a.jpg".into()],
            device_id: "dev-1".into(),
        })
        .await;

    // The page loads; every sub-check records its failure internally.
    assert!(!outcome.blocked);
    assert!(outcome.reason.is_none());
    assert_eq!(outcome.details.url.error.as_deref(), Some("transport_error"));
    assert_eq!(outcome.details.text.error.as_deref(), Some("transport_error"));
    assert_eq!(outcome.details.images.len(), 1);
    assert_eq!(
        outcome.details.images[0].verdict.error.as_deref(),
        Some("transport_error")
    );

    settle_activity().await;
    assert!(h.activity.snapshot().is_empty());
}

#[tokio::test]
async fn test_page_skips_trivial_text() {
    let h = harness(Some(profile("dev-1")), Script::Safe, Script::Safe, Script::Safe);

    h.orchestrator
        .check_page(PageRequest {
            url: "https://example.com/".into(),
            text: Some("short".into()),
            image_urls: vec![],
            device_id: "dev-1".into(),
        })
        .await;

    assert_eq!(h.text.calls(), 0);
    assert_eq!(h.url.calls(), 1);
}

#[tokio::test]
async fn test_page_caps_images_at_five() {
    let h = harness(Some(profile("dev-1")), Script::Safe, Script::Safe, Script::Safe);

    let image_urls: Vec<String> = (0..9)
        .map(|i| format!("https://example.com/img-{i}.jpg"))
        .collect();

    let outcome = h
        .orchestrator
        .check_page(PageRequest {
            url: "https://example.com/".into(),
            text: None,
            image_urls,
            device_id: "dev-1".into(),
        })
        .await;

    assert_eq!(outcome.details.images.len(), 5);
    assert_eq!(h.image.calls(), 5);
}

#[tokio::test]
async fn test_batch_images_filter_non_http_and_cap_at_ten() {
    let h = harness(Some(profile("dev-1")), Script::Safe, Script::Safe, Script::Safe);

    let mut image_urls: Vec<String> = (0..12)
        .map(|i| format!("https://example.com/img-{i}.jpg"))
        .collect();
    image_urls.insert(0, "data:image/png;base64,xxxx".into());

    let outcome = h.orchestrator.check_images(&image_urls, "dev-1", None).await;
    assert_eq!(outcome.results.len(), 10);
    assert!(!outcome.blocked);
    assert!(outcome.blocked_images.is_empty());
}

#[tokio::test]
async fn test_blocked_image_lands_in_both_lists() {
    let h = harness(
        Some(profile("dev-1")),
        Script::Safe,
        Script::Safe,
        Script::Block { reason: None, category: Some("Nudity") },
    );

    let urls = vec!["https://example.com/a.jpg".to_string()];
    let outcome = h
        .orchestrator
        .check_images(&urls, "dev-1", Some("https://example.com/"))
        .await;

    assert!(outcome.blocked);
    assert_eq!(outcome.blocked_images.len(), 1);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.blocked_images[0].verdict.category.as_deref(), Some("Nudity"));

    settle_activity().await;
    let records = h.activity.snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].check_type, CheckType::Image);
}

#[tokio::test]
async fn test_page_gate_allow_skips_all_subchecks() {
    let mut p = profile("dev-1");
    p.allowed_domains = vec!["example.com".into()];
    let h = harness(Some(p), Script::Safe, Script::Safe, Script::Safe);

    let outcome = h
        .orchestrator
        .check_page(PageRequest {
            url: "https://example.com/anything".into(),
            text: Some("long enough page text to be worth a classifier call here".into()),
            image_urls: vec!["https://example.com/a.jpg".into()],
            device_id: "dev-1".into(),
        })
        .await;

    assert!(!outcome.blocked);
    assert_eq!(outcome.reason.as_deref(), Some("allowlisted"));
    assert_eq!(h.url.calls() + h.text.calls() + h.image.calls(), 0);
}
