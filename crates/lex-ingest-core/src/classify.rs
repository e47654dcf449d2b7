//! Leading-window keyword classification.
//!
//! Only the first `window_chars` characters are inspected. Rules are tried in
//! order; the first rule with any keyword present wins. No match yields the
//! default category.

use serde::Serialize;

pub const DEFAULT_CATEGORY: &str = "UAE Federal Law";
pub const DEFAULT_WINDOW_CHARS: usize = 500;

pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn classify(&self, text: &str) -> String;
}

/// One category and the keywords that select it.
#[derive(Debug, Clone, Serialize)]
pub struct KeywordRule {
    pub category: String,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new(category: &str, keywords: &[&str]) -> Self {
        Self {
            category: category.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    fn matches(&self, window: &str) -> bool {
        self.keywords.iter().any(|k| window.contains(k.as_str()))
    }
}

/// The fixed taxonomy, in priority order.
pub fn default_rules() -> Vec<KeywordRule> {
    vec![
        KeywordRule::new("Traffic and Transportation", &["traffic"]),
        KeywordRule::new("Family and Personal Status", &["personal status", "marriage"]),
        KeywordRule::new("Labor and Employment", &["labor", "labour", "employment"]),
        KeywordRule::new("Commercial Law", &["commercial", "business"]),
    ]
}

#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    rules: Vec<KeywordRule>,
    default_category: String,
    window_chars: usize,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            default_category: DEFAULT_CATEGORY.to_string(),
            window_chars: DEFAULT_WINDOW_CHARS,
        }
    }
}

impl KeywordClassifier {
    pub fn with_default_category(mut self, category: impl Into<String>) -> Self {
        self.default_category = category.into();
        self
    }

    pub fn with_window(mut self, window_chars: usize) -> Self {
        self.window_chars = window_chars;
        self
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    pub fn default_category(&self) -> &str {
        &self.default_category
    }
}

impl Classifier for KeywordClassifier {
    fn name(&self) -> &str {
        "keyword"
    }

    fn classify(&self, text: &str) -> String {
        let window: String = text
            .chars()
            .take(self.window_chars)
            .collect::<String>()
            .to_lowercase();

        self.rules
            .iter()
            .find(|rule| rule.matches(&window))
            .map(|rule| rule.category.clone())
            .unwrap_or_else(|| self.default_category.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traffic_law_is_classified() {
        let c = KeywordClassifier::default();
        assert_eq!(
            c.classify("This Traffic Law regulates vehicle registration and licensing."),
            "Traffic and Transportation"
        );
    }

    #[test]
    fn no_match_falls_back_to_default() {
        let c = KeywordClassifier::default();
        assert_eq!(c.classify("Provisions on the national flag."), DEFAULT_CATEGORY);
        assert_eq!(c.classify(""), DEFAULT_CATEGORY);
    }

    #[test]
    fn first_rule_wins_over_later_matches() {
        let c = KeywordClassifier::default();
        // mentions both employment and traffic; traffic comes first in rule order
        let text = "Employment of drivers under the federal traffic regime";
        assert_eq!(c.classify(text), "Traffic and Transportation");
        assert_eq!(
            c.classify("Marriage contracts and commercial agencies"),
            "Family and Personal Status"
        );
    }

    #[test]
    fn only_leading_window_is_inspected() {
        let c = KeywordClassifier::default();
        let text = format!("{} commercial", "a".repeat(600));
        assert_eq!(c.classify(&text), DEFAULT_CATEGORY);
        assert_eq!(c.clone().with_window(1000).classify(&text), "Commercial Law");
    }

    #[test]
    fn default_category_is_configurable() {
        let c = KeywordClassifier::default().with_default_category("Dubai Real Estate Law");
        assert_eq!(c.classify("Rules for off-plan escrow accounts"), "Dubai Real Estate Law");
        assert_eq!(c.default_category(), "Dubai Real Estate Law");
    }
}
