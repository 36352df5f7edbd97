//! Classifier capability
//!
//! One interface per content kind today (url / text / image), written so
//! the orchestrator never sees a concrete provider. `payload` is the
//! content to judge: the URL itself, the extracted text, or an image URL.
//!
//! Providers are expected to be unreliable: slow, occasionally down, and
//! prone to returning prose around their JSON. All of that is contained
//! here — a provider either returns a complete [`Verdict`] or a
//! [`ClassifyError`] that the orchestrator converts to a fail-open verdict
//! for that sub-check alone.

mod parse;
mod remote;

pub use parse::{parse_model_output, ParseOutcome};
pub use remote::{ImageClassifier, ModelClient, TextClassifier, UrlClassifier};

use async_trait::async_trait;

use crate::error::ClassifyError;
use sg_core::{CheckType, FilteringLevel, Verdict};

#[async_trait]
pub trait Classifier: Send + Sync {
    fn check_type(&self) -> CheckType;

    async fn classify(&self, payload: &str, level: FilteringLevel)
        -> Result<Verdict, ClassifyError>;
}
