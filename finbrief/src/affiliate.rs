use serde::{Deserialize, Serialize};

/// A recommendation link appended to the briefing email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateLink {
    pub text: String,
    pub url: String,
}

impl AffiliateLink {
    fn new(text: &str, url: &str) -> Self {
        Self {
            text: text.to_string(),
            url: url.to_string(),
        }
    }
}

/// Pick links matching the day's keywords. Falls back to the checklist link.
pub fn contextual_links<S: AsRef<str>>(keywords: &[S]) -> Vec<AffiliateLink> {
    let mentions = |needles: &[&str]| {
        keywords
            .iter()
            .any(|k| needles.iter().any(|n| k.as_ref().contains(n)))
    };

    let mut links = Vec::new();

    if mentions(&["금리", "예금"]) {
        links.push(AffiliateLink::new(
            "📊 지금 가장 높은 예금 금리 비교하기",
            "https://example.com/parking-account",
        ));
    }

    if mentions(&["주식", "투자", "AI"]) {
        links.push(AffiliateLink::new("📚 투자 필독서: 돈의 속성", "https://example.com/books"));
    }

    if mentions(&["부동산"]) {
        links.push(AffiliateLink::new("🏠 부동산 투자 가이드", "https://example.com/realestate"));
    }

    if links.is_empty() {
        links.push(AffiliateLink::new("💡 재테크 필수 체크리스트", "https://example.com/checklist"));
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_and_ai_keywords_pick_two_links() {
        let links = contextual_links(&["#금리 동결", "#AI 반도체"]);
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/parking-account", "https://example.com/books"]);
    }

    #[test]
    fn unmatched_keywords_fall_back_to_checklist() {
        let links = contextual_links(&["#환율"]);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://example.com/checklist");
    }

    #[test]
    fn real_estate_link() {
        let links = contextual_links(&[String::from("#부동산")]);
        assert_eq!(links[0].url, "https://example.com/realestate");
    }
}
