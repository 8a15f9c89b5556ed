//! Normalization of prediction-service payloads into domain types.
//!
//! Every shape quirk of the wire format (newest-first series, ISO dates,
//! factors sent either as a list or a comma-joined string) is resolved here,
//! once, so nothing past the client boundary has to care.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use research_core::{AnalysisPayload, NewsItem, Prediction, PricePoint, Recommendation, SocialPost};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Platform label attached to every social post; the service only crawls Reddit.
pub const SOCIAL_PLATFORM: &str = "Reddit";

/// Reply text used when the service omits its free-form analysis.
pub const DEFAULT_ANALYSIS_TEXT: &str = "I'm analyzing the stock data...";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPricePoint {
    pub date: String,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArticle {
    pub title: String,
    #[serde(default)]
    pub source: String,
    pub published: String,
    #[serde(default)]
    pub link: String,
}

/// Post timestamps come back either as a date string or as epoch seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Epoch(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPost {
    pub author: String,
    pub title: String,
    pub sentiment: f64,
    pub created: RawTimestamp,
}

/// Positive/negative factors as sent by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactorList {
    List(Vec<String>),
    Joined(String),
}

impl FactorList {
    pub fn into_vec(self) -> Vec<String> {
        let items: Vec<String> = match self {
            FactorList::List(items) => items,
            FactorList::Joined(joined) => joined.split(',').map(str::to_string).collect(),
        };
        items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPrediction {
    #[serde(default)]
    pub analysis: Option<String>,
    pub predicted_change_pct: f64,
    pub predicted_direction: String,
    #[serde(default)]
    pub positive_factors: Option<FactorList>,
    #[serde(default)]
    pub negative_factors: Option<FactorList>,
    #[serde(default)]
    pub target_price: Option<f64>,
}

/// `2024-03-01` -> `Mar 1`. A time suffix after the date is ignored.
pub fn short_month_day(date: &str) -> ClientResult<String> {
    let day_part = date.get(..10).unwrap_or(date);
    let parsed = NaiveDate::parse_from_str(day_part, "%Y-%m-%d")
        .map_err(|e| ClientError::InvalidResponse(format!("bad price date '{}': {}", date, e)))?;
    Ok(parsed.format("%b %-d").to_string())
}

/// `2024-05-14T20:10:12Z` -> `14 May 2024 20:10:12`, in the timestamp's own offset.
///
/// Unparseable input is returned unchanged rather than failing the whole list.
pub fn long_date_time(input: &str) -> String {
    const LONG_FORMAT: &str = "%-d %B %Y %H:%M:%S";

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return dt.format(LONG_FORMAT).to_string();
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(input) {
        return dt.format(LONG_FORMAT).to_string();
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, pattern) {
            return dt.format(LONG_FORMAT).to_string();
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return dt.format(LONG_FORMAT).to_string();
        }
    }
    input.to_string()
}

fn timestamp_label(created: &RawTimestamp) -> String {
    match created {
        RawTimestamp::Text(text) => long_date_time(text),
        RawTimestamp::Epoch(secs) => Utc
            .timestamp_opt(*secs as i64, 0)
            .single()
            .map(|dt| dt.format("%-d %B %Y %H:%M:%S").to_string())
            .unwrap_or_else(|| secs.to_string()),
    }
}

/// Relabel dates and flip the newest-first series to oldest-first.
pub fn historical_series(points: Vec<RawPricePoint>) -> ClientResult<Vec<PricePoint>> {
    let mut series = points
        .into_iter()
        .map(|p| {
            Ok(PricePoint {
                date: short_month_day(&p.date)?,
                price: p.price,
            })
        })
        .collect::<ClientResult<Vec<_>>>()?;
    series.reverse();
    Ok(series)
}

pub fn news_items(articles: Vec<RawArticle>) -> Vec<NewsItem> {
    articles
        .into_iter()
        .map(|a| NewsItem {
            date: long_date_time(&a.published),
            title: a.title,
            source: a.source,
            link: a.link,
        })
        .collect()
}

pub fn social_posts(posts: Vec<RawPost>) -> Vec<SocialPost> {
    posts
        .into_iter()
        .map(|p| SocialPost {
            platform: SOCIAL_PLATFORM.to_string(),
            date: timestamp_label(&p.created),
            author: p.author,
            content: p.title,
            sentiment: p.sentiment,
        })
        .collect()
}

pub fn prediction(raw: RawPrediction) -> Prediction {
    let analysis = raw
        .analysis
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ANALYSIS_TEXT.to_string());

    Prediction {
        analysis,
        payload: AnalysisPayload {
            sentiment: Some(raw.predicted_change_pct),
            recommendation: Some(Recommendation::from_direction(&raw.predicted_direction)),
            pros: raw.positive_factors.map(FactorList::into_vec).unwrap_or_default(),
            cons: raw.negative_factors.map(FactorList::into_vec).unwrap_or_default(),
            target_price: raw.target_price,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_historical_series_relabels_and_reverses() {
        let raw = vec![
            RawPricePoint { date: "2024-03-02".to_string(), price: 101.0 },
            RawPricePoint { date: "2024-03-01".to_string(), price: 100.0 },
        ];

        let series = historical_series(raw).unwrap();

        assert_eq!(
            series,
            vec![
                PricePoint { date: "Mar 1".to_string(), price: 100.0 },
                PricePoint { date: "Mar 2".to_string(), price: 101.0 },
            ]
        );
    }

    #[test]
    fn test_historical_series_rejects_bad_date() {
        let raw = vec![RawPricePoint { date: "yesterday".to_string(), price: 1.0 }];
        assert!(matches!(historical_series(raw), Err(ClientError::InvalidResponse(_))));
    }

    #[test]
    fn test_short_month_day_ignores_time_suffix() {
        assert_eq!(short_month_day("2024-12-25T00:00:00").unwrap(), "Dec 25");
    }

    #[test]
    fn test_factor_list_shapes_normalize_identically() {
        let joined: FactorList = serde_json::from_str(r#""a,b,c""#).unwrap();
        let listed: FactorList = serde_json::from_str(r#"["a","b","c"]"#).unwrap();

        let expected = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(joined.into_vec(), expected);
        assert_eq!(listed.into_vec(), expected);
    }

    #[test]
    fn test_factor_list_trims_and_drops_blanks() {
        let joined = FactorList::Joined("Strong margins, ,Buybacks ".to_string());
        assert_eq!(joined.into_vec(), vec!["Strong margins", "Buybacks"]);
    }

    #[test]
    fn test_long_date_time_formats() {
        assert_eq!(long_date_time("2024-05-14T20:10:12Z"), "14 May 2024 20:10:12");
        assert_eq!(long_date_time("Tue, 14 May 2024 20:10:12 GMT"), "14 May 2024 20:10:12");
        assert_eq!(long_date_time("2024-05-14 08:01:02"), "14 May 2024 08:01:02");
        assert_eq!(long_date_time("not a date"), "not a date");
    }

    #[test]
    fn test_social_posts_map_fields_and_epoch_dates() {
        let posts = social_posts(vec![RawPost {
            author: "trader42".to_string(),
            title: "Earnings beat".to_string(),
            sentiment: -0.4,
            created: RawTimestamp::Epoch(1_715_717_412.0),
        }]);

        assert_eq!(posts[0].platform, "Reddit");
        assert_eq!(posts[0].author, "trader42");
        assert_eq!(posts[0].content, "Earnings beat");
        assert_eq!(posts[0].date, "14 May 2024 20:10:12");
        assert_eq!(posts[0].sentiment_label(), research_core::SentimentLabel::Negative);
    }

    #[test]
    fn test_prediction_maps_direction_and_factors() {
        let raw: RawPrediction = serde_json::from_value(serde_json::json!({
            "analysis": "Momentum remains positive.",
            "predicted_change_pct": 3.4,
            "predicted_direction": "Up",
            "positive_factors": "Services growth, Buybacks",
            "negative_factors": ["Regulation"],
            "target_price": 185.5
        }))
        .unwrap();

        let result = prediction(raw);

        assert_eq!(result.analysis, "Momentum remains positive.");
        assert_eq!(result.payload.sentiment, Some(3.4));
        assert_eq!(result.payload.recommendation, Some(Recommendation::Buy));
        assert_eq!(result.payload.pros, vec!["Services growth", "Buybacks"]);
        assert_eq!(result.payload.cons, vec!["Regulation"]);
        assert_eq!(result.payload.target_price, Some(185.5));
    }

    #[test]
    fn test_prediction_defaults_when_optional_fields_missing() {
        let raw: RawPrediction = serde_json::from_value(serde_json::json!({
            "predicted_change_pct": -1.2,
            "predicted_direction": "Down"
        }))
        .unwrap();

        let result = prediction(raw);

        assert_eq!(result.analysis, DEFAULT_ANALYSIS_TEXT);
        assert_eq!(result.payload.recommendation, Some(Recommendation::Sell));
        assert!(result.payload.pros.is_empty());
        assert!(result.payload.cons.is_empty());
    }
}
