use serde::{Deserialize, Serialize};

/// One headline collected from a feed. Lives for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    /// RFC 3339 timestamp; the collection time when the feed has none
    pub pub_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_snippet: Option<String>,
    pub source: String,
}

/// Market direction attached to a selected headline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bull,
    Bear,
    Neutral,
}

impl Sentiment {
    pub fn emoji(self) -> &'static str {
        match self {
            Sentiment::Bull => "🐂",
            Sentiment::Bear => "🐻",
            Sentiment::Neutral => "😐",
        }
    }
}

/// A headline picked by the analyzer, with its short explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopNews {
    pub title: String,
    /// Three sentences
    pub summary: String,
    pub sentiment: Sentiment,
    /// One sentence on why it matters
    pub reason: String,
}

/// Output of one analysis: at most three headlines, keywords and the overall mood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub top_news: Vec<TopNews>,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub market_sentiment: String,
}

pub const MAX_TOP_NEWS: usize = 3;

impl AnalysisResult {
    /// Stand-in content used when the model's answer could not be read and the
    /// configured policy allows the run to continue.
    pub fn placeholder() -> Self {
        Self {
            top_news: vec![TopNews {
                title: "분석 오류".to_string(),
                summary: "AI 분석 중 오류가 발생했습니다. 잠시 후 다시 시도해주세요.".to_string(),
                sentiment: Sentiment::Neutral,
                reason: "시스템 오류".to_string(),
            }],
            keywords: vec!["#재테크".to_string(), "#투자".to_string(), "#뉴스".to_string()],
            market_sentiment: "분석 결과를 가져올 수 없습니다.".to_string(),
        }
    }
}
