//! Failure signature detection.
//!
//! The remote site answers with two recognisable stand-in pages instead of
//! chapter content: a "please read on your phone" notice and a client-side
//! "load failed" placeholder. Both go away on reload.

use crate::config::SiteConfig;
use crate::traits::{Classification, SignatureClassifier};

/// Classifies pages by literal substring match against known signatures.
#[derive(Debug, Clone, Default)]
pub struct LiteralSignatureClassifier {
    mobile_warning: Vec<String>,
    load_failure: Vec<String>,
}

impl LiteralSignatureClassifier {
    pub fn new(mobile_warning: Vec<String>, load_failure: Vec<String>) -> Self {
        Self {
            mobile_warning: mobile_warning.into_iter().filter(|s| !s.is_empty()).collect(),
            load_failure: load_failure.into_iter().filter(|s| !s.is_empty()).collect(),
        }
    }

    pub fn from_site(config: &SiteConfig) -> Self {
        Self::new(
            config.mobile_warning_signatures.clone(),
            config.load_failure_signatures.clone(),
        )
    }

    fn matches(signatures: &[String], page_text: &str, page_html: &str) -> bool {
        signatures
            .iter()
            .any(|sig| page_text.contains(sig.as_str()) || page_html.contains(sig.as_str()))
    }
}

impl SignatureClassifier for LiteralSignatureClassifier {
    fn classify(&self, page_text: &str, page_html: &str) -> Classification {
        // A mobile warning page may also embed the failure placeholder; the warning wins.
        if Self::matches(&self.mobile_warning, page_text, page_html) {
            Classification::MobileWarning
        } else if Self::matches(&self.load_failure, page_text, page_html) {
            Classification::LoadFailure
        } else {
            Classification::Good
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> LiteralSignatureClassifier {
        LiteralSignatureClassifier::from_site(&SiteConfig::default())
    }

    #[test]
    fn plain_content_is_good() {
        let verdict = classifier().classify("第一章 正文內容", "<div id=\"content\"><p>正文</p></div>");
        assert_eq!(verdict, Classification::Good);
    }

    #[test]
    fn detects_mobile_warning_in_text() {
        let verdict = classifier().classify("請使用手機瀏覽器閱讀本站", "");
        assert_eq!(verdict, Classification::MobileWarning);
    }

    #[test]
    fn detects_load_failure_in_html_only() {
        let verdict = classifier().classify("", "<div class=\"tip\">內容加載失敗，請刷新</div>");
        assert_eq!(verdict, Classification::LoadFailure);
    }

    #[test]
    fn mobile_warning_takes_precedence() {
        let verdict = classifier().classify("請使用手機瀏覽器閱讀 內容加載失敗", "");
        assert_eq!(verdict, Classification::MobileWarning);
    }

    #[test]
    fn empty_signatures_never_match() {
        let c = LiteralSignatureClassifier::new(vec![String::new()], vec![]);
        assert_eq!(c.classify("anything", "<p>anything</p>"), Classification::Good);
    }
}
