//! Article segmentation.
//!
//! Splits normalized text into an ordered sequence of [`Article`]s by
//! scanning forward for `Article <n>` headings, where `<n>` is a digit
//! sequence, a spelled-out number or ordinal, or a Roman numeral. Each
//! article spans from the end of its heading to the start of the next
//! heading (or the end of the text).
//!
//! Segmentation never fails: text without headings yields zero articles.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::Article;
use crate::normalize::truncate_chars;

/// Headings closer together than this produce no article.
pub const MIN_ARTICLE_CHARS: usize = 10;
/// Default cap on stored article text.
pub const DEFAULT_MAX_ARTICLE_CHARS: usize = 1000;

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bArticle\s+(\d+|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|twenty|first|second|third|fourth|fifth|sixth|seventh|eighth|ninth|tenth|[ivxlcdm]+)\b",
    )
    .unwrap()
});

static ROMAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^m{0,3}(?:cm|cd|d?c{0,3})(?:xc|xl|l?x{0,3})(?:ix|iv|v?i{0,3})$").unwrap()
});

/// Digits and number words pass; letter runs must be a well-formed Roman
/// numeral, so headings like `Article XL` count and `Article civil` does not.
fn is_numeral(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    if !lower.chars().all(|c| "ivxlcdm".contains(c)) {
        return true;
    }
    ROMAN.is_match(&lower)
}

/// A strategy that splits document text into labeled sections.
pub trait Segmenter: Send + Sync {
    fn name(&self) -> &str;

    fn segment(&self, text: &str) -> Vec<Article>;
}

#[derive(Debug, Clone)]
pub struct ArticleSegmenter {
    pub max_article_chars: usize,
    pub min_article_chars: usize,
}

impl Default for ArticleSegmenter {
    fn default() -> Self {
        Self {
            max_article_chars: DEFAULT_MAX_ARTICLE_CHARS,
            min_article_chars: MIN_ARTICLE_CHARS,
        }
    }
}

impl ArticleSegmenter {
    pub fn new(max_article_chars: usize) -> Self {
        Self {
            max_article_chars,
            ..Self::default()
        }
    }
}

impl Segmenter for ArticleSegmenter {
    fn name(&self) -> &str {
        "article-heading"
    }

    fn segment(&self, text: &str) -> Vec<Article> {
        let headings: Vec<_> = HEADING
            .captures_iter(text)
            .filter(|caps| caps.get(1).is_some_and(|n| is_numeral(n.as_str())))
            .filter_map(|caps| caps.get(0))
            .collect();
        let mut articles = Vec::new();

        for (i, heading) in headings.iter().enumerate() {
            let next = headings.get(i + 1);
            let end = next.map(|n| n.start()).unwrap_or(text.len());
            let body = text[heading.end()..end].trim();

            // Between two headings, short spans are noise (tables of
            // contents, cross references). The final article only needs text.
            let too_short = next.is_some() && body.chars().count() < self.min_article_chars;
            if body.is_empty() || too_short {
                continue;
            }

            let (kept, _) = truncate_chars(body, self.max_article_chars);
            articles.push(Article {
                sequence_index: articles.len(),
                label: heading.as_str().split_whitespace().collect::<Vec<_>>().join(" "),
                text: kept.trim_end().to_string(),
            });
        }

        articles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(text: &str) -> Vec<Article> {
        ArticleSegmenter::default().segment(text)
    }

    #[test]
    fn empty_input_yields_no_articles() {
        assert!(seg("").is_empty());
        assert!(seg("No headings in this text at all.").is_empty());
    }

    #[test]
    fn splits_between_headings() {
        let articles = seg("Article 1 Hello world Article 2 Goodbye");
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].label, "Article 1");
        assert_eq!(articles[0].text, "Hello world");
        assert_eq!(articles[0].sequence_index, 0);
        assert_eq!(articles[1].label, "Article 2");
        assert_eq!(articles[1].text, "Goodbye");
        assert_eq!(articles[1].sequence_index, 1);
    }

    #[test]
    fn adjacent_headings_are_noise() {
        let articles = seg("Article 1 Article 2 see below\nArticle 3 The employer shall pay wages monthly.");
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].label, "Article 3");
        assert_eq!(articles[0].sequence_index, 0);
    }

    #[test]
    fn recognizes_words_and_roman_numerals() {
        let text = "ARTICLE ONE Definitions apply here.\n\
                    Article IV Scope of application text.\n\
                    article   Seventeen Final provisions.";
        let articles = seg(text);
        let labels: Vec<_> = articles.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["ARTICLE ONE", "Article IV", "article Seventeen"]);
    }

    #[test]
    fn roman_numerals_past_thirty_nine() {
        let text = "Article XXXIX Transitional provisions apply.\n\
                    Article XL Repeal of earlier legislation.\n\
                    Article L Publication in the Official Gazette.\n\
                    Article XC Entry into force of this law.";
        let labels: Vec<_> = seg(text).into_iter().map(|a| a.label).collect();
        assert_eq!(labels, vec!["Article XXXIX", "Article XL", "Article L", "Article XC"]);
    }

    #[test]
    fn malformed_roman_words_are_not_headings() {
        assert!(seg("The article did not change the civil code at all.").is_empty());
        assert!(seg("See article civil provisions elsewhere in the code.").is_empty());
        assert!(is_numeral("MCMXCIV"));
        assert!(!is_numeral("IIII"));
        assert!(is_numeral("12"));
    }

    #[test]
    fn ignores_non_numeral_words() {
        assert!(seg("This article describes the rules in general terms.").is_empty());
    }

    #[test]
    fn caps_article_text() {
        let long = "x".repeat(5000);
        let articles = ArticleSegmenter::new(100).segment(&format!("Article 1 {long}"));
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].text.chars().count(), 100);
    }

    #[test]
    fn labels_collapse_internal_whitespace() {
        let articles = seg("Article\n\n12 Penalties for late registration.");
        assert_eq!(articles[0].label, "Article 12");
    }
}
