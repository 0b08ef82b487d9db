//! OCR (Optical Character Recognition) contract
//!
//! The extraction core only needs single-line recognition of small crops;
//! block recognition and the installation check complete the engine surface.

use crossbeam_channel::{bounded, Receiver, Sender};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ExtractionError;

/// Text recognition engine
pub trait TextRecognitionEngine: Send + Sync {
    /// Recognize a crop expected to hold one line or one word
    fn recognize_line(&self, image: &DynamicImage) -> Result<String, ExtractionError>;

    /// Recognize general text laid out as a block
    fn recognize_block(&self, image: &DynamicImage) -> Result<String, ExtractionError>;

    /// Whether the engine can be called at all
    fn is_available(&self) -> bool;

    /// Detailed installation status for troubleshooting
    fn verify_installation(&self) -> InstallationStatus;
}

/// Result of an installation check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallationStatus {
    pub installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
}

impl InstallationStatus {
    pub fn ready(version: impl Into<String>, languages: Vec<String>) -> Self {
        Self {
            installed: true,
            version: Some(version.into()),
            status: Some("Ready".to_string()),
            languages,
            ..Default::default()
        }
    }

    pub fn missing(error: impl Into<String>, solution: impl Into<String>) -> Self {
        Self {
            installed: false,
            error: Some(error.into()),
            solution: Some(solution.into()),
            ..Default::default()
        }
    }
}

/// Bounded pool of recognition permits.
///
/// Tokens circulate through a bounded channel: taking one is `recv`,
/// returning it is `send` when the [`Permit`] drops.
#[derive(Debug, Clone)]
pub struct RecognitionPermits {
    give: Sender<()>,
    take: Receiver<()>,
}

impl RecognitionPermits {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (give, take) = bounded(capacity);
        for _ in 0..capacity {
            // Cannot fail: the channel holds exactly `capacity` tokens
            let _ = give.send(());
        }
        Self { give, take }
    }

    /// Wait up to `timeout` for a permit
    pub fn acquire(&self, timeout: Duration) -> Option<Permit> {
        self.take.recv_timeout(timeout).ok().map(|()| Permit {
            give: self.give.clone(),
        })
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        self.take.len()
    }
}

/// A held recognition permit, returned to the pool on drop
#[derive(Debug)]
pub struct Permit {
    give: Sender<()>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        let _ = self.give.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permits_limit_concurrency() {
        let permits = RecognitionPermits::new(2);
        let first = permits.acquire(Duration::from_millis(10)).unwrap();
        let _second = permits.acquire(Duration::from_millis(10)).unwrap();
        assert_eq!(permits.available(), 0);
        assert!(permits.acquire(Duration::from_millis(10)).is_none());

        drop(first);
        assert_eq!(permits.available(), 1);
        assert!(permits.acquire(Duration::from_millis(10)).is_some());
    }

    #[test]
    fn test_zero_capacity_still_allows_one() {
        let permits = RecognitionPermits::new(0);
        assert!(permits.acquire(Duration::from_millis(10)).is_some());
    }

    #[test]
    fn test_installation_status_serialization() {
        let status = InstallationStatus::missing("tesseract not found", "install tesseract");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["installed"], false);
        assert_eq!(json["error"], "tesseract not found");
        assert!(json.get("version").is_none());

        let ready = InstallationStatus::ready("5.3.0", vec!["eng".into()]);
        assert!(ready.installed);
        assert_eq!(ready.status.as_deref(), Some("Ready"));
    }
}
