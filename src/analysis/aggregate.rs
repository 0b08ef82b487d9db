//! Combining the results of both document sides

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::SideResult;

/// Merged result for a whole document.
///
/// `success` reports that processing ran to completion; how much was actually
/// read is `extraction_rate`. Use [`meets_threshold`](Self::meets_threshold)
/// to apply a content requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedResult {
    pub success: bool,
    pub data: SideResult,
    pub extracted_fields: usize,
    pub total_fields: usize,
    /// Fraction of non-empty fields, 0.0..=1.0
    pub extraction_rate: f64,
}

impl CombinedResult {
    /// Whether at least a `min_rate` fraction (0.0..=1.0) of the fields was read
    pub fn meets_threshold(&self, min_rate: f64) -> bool {
        self.success && self.extraction_rate >= min_rate
    }
}

/// Merges front and back results and computes extraction statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAggregator;

impl ResultAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Merge both sides; on a key collision the back value is kept
    pub fn combine(&self, front: &SideResult, back: &SideResult) -> CombinedResult {
        let mut data = front.clone();
        for (field, value) in back {
            if data.insert(field.clone(), value.clone()).is_some() {
                warn!("Field {} present on both sides, keeping the back value", field);
            }
        }

        let total_fields = data.len();
        let extracted_fields = data.values().filter(|v| !v.is_empty()).count();
        let extraction_rate = if total_fields == 0 {
            0.0
        } else {
            extracted_fields as f64 / total_fields as f64
        };
        debug!(
            "Extracted {}/{} fields ({:.1}%)",
            extracted_fields,
            total_fields,
            extraction_rate * 100.0
        );

        CombinedResult {
            success: true,
            data,
            extracted_fields,
            total_fields,
            extraction_rate,
        }
    }
}
