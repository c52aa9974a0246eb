//! HTML email templates. Every piece of analyzer- or link-sourced text goes through
//! [`escape_html`] before it is interpolated.

use chrono::{Datelike, NaiveDate, Weekday};
use std::fmt::Write as _;

use crate::affiliate::AffiliateLink;
use crate::model::AnalysisResult;

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

fn korean_weekday(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "월요일",
        Weekday::Tue => "화요일",
        Weekday::Wed => "수요일",
        Weekday::Thu => "목요일",
        Weekday::Fri => "금요일",
        Weekday::Sat => "토요일",
        Weekday::Sun => "일요일",
    }
}

/// e.g. `1월 29일 목요일`
pub fn short_korean_date(date: NaiveDate) -> String {
    format!("{}월 {}일 {}", date.month(), date.day(), korean_weekday(date.weekday()))
}

/// e.g. `2026년 1월 29일 목요일`
pub fn long_korean_date(date: NaiveDate) -> String {
    format!("{}년 {}", date.year(), short_korean_date(date))
}

pub fn email_subject(date: NaiveDate) -> String {
    format!("📊 FinBrief - {} 재테크 브리핑", short_korean_date(date))
}

pub fn unsubscribe_url(base_url: &str, token: &str) -> String {
    format!("{}/api/unsubscribe?token={}", base_url.trim_end_matches('/'), token)
}

/// Full briefing email for one subscriber.
pub fn render_briefing_email(
    analysis: &AnalysisResult,
    affiliate_links: Option<&[AffiliateLink]>,
    unsubscribe_url: &str,
    date: NaiveDate,
) -> String {
    let mut news_html = String::new();
    for (idx, news) in analysis.top_news.iter().enumerate() {
        let _ = write!(
            news_html,
            r#"
      <div style="margin-bottom: 32px; padding-bottom: 24px; border-bottom: 1px solid #e5e7eb;">
        <h2 style="font-size: 20px; font-weight: 700; color: #111827; margin: 0 0 16px 0;">
          {}. {} {}
        </h2>
        <p style="font-size: 16px; line-height: 1.6; color: #374151; margin: 0 0 16px 0;">
          {}
        </p>
        <div style="background-color: #f3f4f6; padding: 16px; border-radius: 8px;">
          <p style="font-size: 14px; font-weight: 600; color: #6b7280; margin: 0 0 8px 0;">
            💡 왜 중요한가?
          </p>
          <p style="font-size: 14px; line-height: 1.6; color: #4b5563; margin: 0;">
            {}
          </p>
        </div>
      </div>"#,
            idx + 1,
            escape_html(&news.title),
            news.sentiment.emoji(),
            escape_html(&news.summary),
            escape_html(&news.reason),
        );
    }

    let keywords_html: String = analysis
        .keywords
        .iter()
        .map(|k| {
            format!(
                r#"<span style="display: inline-block; background-color: #dbeafe; color: #1e40af; padding: 4px 12px; border-radius: 16px; font-size: 14px; margin: 4px;">{}</span>"#,
                escape_html(k)
            )
        })
        .collect();

    let affiliate_html = match affiliate_links {
        Some(links) if !links.is_empty() => {
            let items: String = links
                .iter()
                .map(|l| {
                    format!(
                        r#"
          <li style="margin-bottom: 8px;"><a href="{}" style="color: #2563eb; text-decoration: none;">{}</a></li>"#,
                        escape_html(&l.url),
                        escape_html(&l.text)
                    )
                })
                .collect();
            format!(
                r#"
      <div style="margin-top: 32px; padding: 24px; background-color: #fef3c7; border-radius: 8px;">
        <h3 style="font-size: 18px; font-weight: 700; color: #92400e; margin: 0 0 16px 0;">💰 추천 정보</h3>
        <ul style="margin: 0; padding-left: 20px; color: #78350f;">{}
        </ul>
      </div>"#,
                items
            )
        }
        _ => String::new(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="ko">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>FinBrief - 오늘의 재테크 브리핑</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; background-color: #f9fafb;">
  <div style="max-width: 600px; margin: 0 auto; background-color: #ffffff;">
    <div style="background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); padding: 32px 24px; text-align: center;">
      <h1 style="font-size: 28px; font-weight: 800; color: #ffffff; margin: 0 0 8px 0;">📊 FinBrief</h1>
      <p style="font-size: 16px; color: #e0e7ff; margin: 0;">오늘의 재테크 브리핑</p>
      <p style="font-size: 14px; color: #c7d2fe; margin: 8px 0 0 0;">{date}</p>
    </div>
    <div style="padding: 32px 24px;">{news}
      <div style="margin-bottom: 32px;">
        <h3 style="font-size: 18px; font-weight: 700; color: #111827; margin: 0 0 16px 0;">🔑 오늘의 키워드</h3>
        <div>{keywords}</div>
      </div>
      <div style="margin-bottom: 32px; padding: 24px; background-color: #f0fdf4; border-left: 4px solid #10b981; border-radius: 8px;">
        <h3 style="font-size: 18px; font-weight: 700; color: #065f46; margin: 0 0 12px 0;">📈 시장 분위기</h3>
        <p style="font-size: 16px; line-height: 1.6; color: #047857; margin: 0;">{mood}</p>
      </div>{affiliate}
    </div>
    <div style="padding: 24px; background-color: #f3f4f6; text-align: center; border-top: 1px solid #e5e7eb;">
      <p style="font-size: 14px; color: #6b7280; margin: 0 0 8px 0;"><strong>FinBrief</strong> | AI가 엄선한 재테크 뉴스</p>
      <p style="font-size: 12px; color: #9ca3af; margin: 0;">읽기 시간: 약 30초</p>
      <div style="margin-top: 16px;">
        <a href="{unsubscribe}" style="font-size: 12px; color: #6b7280; text-decoration: underline;">구독 해지</a>
      </div>
    </div>
  </div>
</body>
</html>"#,
        date = long_korean_date(date),
        news = news_html,
        keywords = keywords_html,
        mood = escape_html(&analysis.market_sentiment),
        affiliate = affiliate_html,
        unsubscribe = escape_html(unsubscribe_url),
    )
}

pub const WELCOME_SUBJECT: &str = "환영합니다! FinBrief 구독이 시작되었습니다";

/// Sent once, right after a new address is stored.
pub fn render_welcome_email(unsubscribe_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="ko">
<head><meta charset="UTF-8"><title>FinBrief</title></head>
<body style="margin: 0; padding: 24px; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif;">
  <h1 style="font-size: 24px; color: #111827;">📊 FinBrief에 오신 것을 환영합니다!</h1>
  <p style="font-size: 16px; line-height: 1.6; color: #374151;">매일 아침, AI가 엄선한 재테크 뉴스 3개를 30초 분량으로 보내드립니다.</p>
  <p style="font-size: 12px; color: #9ca3af;"><a href="{}" style="color: #6b7280;">구독 해지</a></p>
</body>
</html>"#,
        escape_html(unsubscribe_url)
    )
}
