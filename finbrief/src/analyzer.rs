use anyhow::{Context, Result};
use common::ParseFailurePolicy;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm::{extract_json_from_text, LlmProvider, LlmRequest};
use crate::model::{AnalysisResult, NewsItem, MAX_TOP_NEWS};

/// Why a model answer could not be turned into an [`AnalysisResult`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("response is not JSON: {0}")]
    NotJson(String),

    #[error("response JSON has the wrong shape: {0}")]
    WrongShape(String),
}

impl ParseFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            ParseFailure::NotJson(_) => "not_json",
            ParseFailure::WrongShape(_) => "wrong_shape",
        }
    }
}

/// Strictly validate a model answer.
///
/// `topNews` and `keywords` must be arrays and every entry must match the schema.
/// More than three headlines are cut down to three.
pub fn parse_analysis(text: &str) -> Result<AnalysisResult, ParseFailure> {
    let candidate = extract_json_from_text(text);

    let value: serde_json::Value =
        serde_json::from_str(candidate).map_err(|e| ParseFailure::NotJson(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| ParseFailure::WrongShape("top-level value is not an object".into()))?;

    for field in ["topNews", "keywords"] {
        match object.get(field) {
            Some(serde_json::Value::Array(_)) => {}
            Some(_) => return Err(ParseFailure::WrongShape(format!("`{}` is not an array", field))),
            None => return Err(ParseFailure::WrongShape(format!("`{}` is missing", field))),
        }
    }

    let mut result: AnalysisResult =
        serde_json::from_value(value).map_err(|e| ParseFailure::WrongShape(e.to_string()))?;
    result.top_news.truncate(MAX_TOP_NEWS);
    Ok(result)
}

/// Outcome of one analysis call.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub result: AnalysisResult,
    /// Set when `result` is the placeholder standing in for an unreadable answer
    pub parse_failure: Option<ParseFailure>,
}

impl AnalysisReport {
    pub fn is_degraded(&self) -> bool {
        self.parse_failure.is_some()
    }
}

/// Picks the three most relevant headlines through a text-generation provider.
pub struct Analyzer {
    provider: Arc<dyn LlmProvider>,
    policy: ParseFailurePolicy,
    max_tokens: usize,
    temperature: f32,
}

impl Analyzer {
    pub fn new(provider: Arc<dyn LlmProvider>, policy: ParseFailurePolicy) -> Self {
        Self {
            provider,
            policy,
            max_tokens: 2048,
            temperature: 0.7,
        }
    }

    pub fn with_generation(mut self, max_tokens: usize, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// One request per call. Upstream failures are errors; unreadable answers follow the policy.
    pub async fn analyze(&self, items: &[NewsItem]) -> Result<AnalysisReport> {
        info!(count = items.len(), "starting AI analysis");

        let request = LlmRequest {
            prompt: build_prompt(items),
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            timeout_seconds: None,
        };

        let response = self
            .provider
            .generate(request)
            .await
            .context("AI analysis request failed")?;

        info!(
            model = %response.model,
            total_tokens = response.usage.total_tokens,
            "AI response received"
        );

        match parse_analysis(&response.content) {
            Ok(result) => {
                info!(top_news = result.top_news.len(), "analysis complete");
                Ok(AnalysisReport {
                    result,
                    parse_failure: None,
                })
            }
            Err(failure) => {
                warn!(kind = failure.kind(), "failed to parse AI response: {}", failure);
                debug!(raw = %response.content, "unparseable AI response");
                match self.policy {
                    ParseFailurePolicy::Placeholder => Ok(AnalysisReport {
                        result: AnalysisResult::placeholder(),
                        parse_failure: Some(failure),
                    }),
                    ParseFailurePolicy::Abort => Err(anyhow::Error::new(failure)
                        .context("AI response could not be used and policy is abort")),
                }
            }
        }
    }
}

/// The fixed analysis prompt. Only numbered titles are embedded.
pub fn build_prompt(items: &[NewsItem]) -> String {
    let news_list = items
        .iter()
        .enumerate()
        .map(|(idx, item)| format!("{}. {}", idx + 1, item.title))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r##"
당신은 20년 경력의 펀드매니저이자 금융 전문가입니다.
독자는 바쁜 직장인으로, 30초 만에 핵심만 파악해야 합니다.

**임무:**
다음 뉴스 목록에서 **가장 중요한 3개**만 선정하고, 각각에 대해 분석하세요.

**뉴스 목록:**
{news_list}

**분석 기준:**
1. 투자 결정에 영향을 줄 수 있는 뉴스 우선
2. 시의성과 파급력이 큰 뉴스
3. 일반적인 홍보성 기사 제외

**출력 형식:**
반드시 아래 JSON 형식으로만 응답하세요. 다른 텍스트는 포함하지 마세요.

{{
  "topNews": [
    {{
      "title": "선정된 뉴스 제목",
      "summary": "초등학생도 이해할 수 있는 3줄 요약 (각 줄은 한 문장, 총 3문장)",
      "sentiment": "bull 또는 bear 또는 neutral 중 하나",
      "reason": "왜 이 뉴스가 중요한지 한 문장"
    }}
  ],
  "keywords": ["#키워드1", "#키워드2", "#키워드3"],
  "marketSentiment": "전체 시장 분위기를 한 줄로 요약"
}}

**주의사항:**
- summary는 정확히 3개 문장으로 작성
- sentiment는 "bull"(상승 요인), "bear"(하락 요인), "neutral"(중립) 중 하나만 선택
- keywords는 오늘의 핵심 투자 키워드 3개 (# 포함)
- JSON 형식만 출력, 추가 설명 금지
"##
    )
}

/// Human-readable console view of an analysis.
pub fn format_analysis(analysis: &AnalysisResult) -> String {
    let mut output = String::from("\n=== AI 분석 결과 ===\n\n");

    for (idx, news) in analysis.top_news.iter().enumerate() {
        let _ = writeln!(output, "{}. {} {}", idx + 1, news.title, news.sentiment.emoji());
        let _ = writeln!(output, "   요약: {}", news.summary);
        let _ = writeln!(output, "   💡 중요한 이유: {}\n", news.reason);
    }

    let _ = writeln!(output, "🔑 오늘의 키워드: {}", analysis.keywords.join(" "));
    let _ = writeln!(output, "📈 시장 분위기: {}", analysis.market_sentiment);
    output
}
