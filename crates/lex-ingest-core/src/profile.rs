//! Per-source strategy triple.
//!
//! One orchestrator serves every portal; what differs between portals is the
//! [`SourceProfile`] it is handed.

use std::fmt;
use std::sync::Arc;

use crate::classify::{Classifier, KeywordClassifier};
use crate::extract::{Extractor, HeuristicExtractor};
use crate::segment::{ArticleSegmenter, Segmenter};

#[derive(Clone)]
pub struct SourceProfile {
    pub name: String,
    pub extractor: Arc<dyn Extractor>,
    pub segmenter: Arc<dyn Segmenter>,
    pub classifier: Arc<dyn Classifier>,
}

impl SourceProfile {
    /// Heuristic extraction, article segmentation and keyword classification.
    pub fn standard(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extractor: Arc::new(HeuristicExtractor::default()),
            segmenter: Arc::new(ArticleSegmenter::default()),
            classifier: Arc::new(KeywordClassifier::default()),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_segmenter(mut self, segmenter: Arc<dyn Segmenter>) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }
}

impl Default for SourceProfile {
    fn default() -> Self {
        Self::standard("default")
    }
}

impl fmt::Debug for SourceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceProfile")
            .field("name", &self.name)
            .field("extractor", &self.extractor.name())
            .field("segmenter", &self.segmenter.name())
            .field("classifier", &self.classifier.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_swaps_classifier() {
        let profile = SourceProfile::standard("dld").with_classifier(Arc::new(
            KeywordClassifier::default().with_default_category("Dubai Real Estate Law"),
        ));
        assert_eq!(profile.classifier.classify("escrow"), "Dubai Real Estate Law");
        let dbg = format!("{profile:?}");
        assert!(dbg.contains("dld"));
        assert!(dbg.contains("heuristic"));
    }
}
