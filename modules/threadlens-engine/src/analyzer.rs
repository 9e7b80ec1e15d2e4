use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use threadlens_common::{Analysis, RawPost, Sentiment};

use crate::traits::LanguageModel;
use crate::util::{title_case, truncate_chars};

/// Hard cap on post body characters included in a prompt.
const BODY_CHAR_BUDGET: usize = 500;

/// Max model calls in flight within one batch.
pub const CONCURRENT_REQUESTS: usize = 3;

/// Word lists for the heuristic fallback. Presence counts, not occurrence
/// counts: each word contributes at most once per post.
const POSITIVE_WORDS: &[&str] = &[
    "excellent", "amazing", "great", "fantastic", "love", "perfect",
    "best", "awesome", "outstanding", "superb", "wonderful", "impressed",
    "reliable", "efficient", "powerful", "smooth", "durable", "quality",
    "recommend", "happy", "satisfied", "worth", "solid", "sturdy",
];

const NEGATIVE_WORDS: &[&str] = &[
    "terrible", "awful", "horrible", "worst", "hate", "useless",
    "broken", "failure", "waste", "trash", "garbage", "nightmare",
    "disaster", "poor", "unreliable", "disappointed", "regret", "avoid",
];

const BRAND_KEYWORDS: &[&str] = &["toro", "bobcat", "caterpillar", "deere", "kubota", "ditch witch"];

/// Outcome of analyzing one post, tagged with provenance so call sites and
/// tests can tell the AI path from the heuristic one without error plumbing.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// The model returned a usable structured result.
    Model(Analysis),
    /// The model was unreachable or unparseable; local heuristic result.
    Fallback(Analysis),
}

impl AnalysisOutcome {
    pub fn analysis(&self) -> &Analysis {
        match self {
            AnalysisOutcome::Model(a) | AnalysisOutcome::Fallback(a) => a,
        }
    }

    pub fn into_analysis(self) -> Analysis {
        match self {
            AnalysisOutcome::Model(a) | AnalysisOutcome::Fallback(a) => a,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, AnalysisOutcome::Fallback(_))
    }
}

/// What the model returns. Tolerant of the field spellings small local models
/// actually emit (`score` vs `sentiment_score`, `features` vs
/// `feature_requests`, `brands` vs `brands_mentioned`).
#[derive(Debug, Deserialize)]
struct RawAnalysis {
    sentiment: Option<String>,
    score: Option<serde_json::Value>,
    sentiment_score: Option<serde_json::Value>,
    pain_points: Option<Vec<String>>,
    features: Option<Vec<String>>,
    feature_requests: Option<Vec<String>>,
    brands: Option<Vec<String>>,
    brands_mentioned: Option<Vec<String>>,
    user_type: Option<String>,
    summary: Option<String>,
}

/// Per-post sentiment analysis with guaranteed output: the model path when it
/// works, a deterministic keyword heuristic when it does not.
pub struct Analyzer {
    model: Arc<dyn LanguageModel>,
    context: String,
}

impl Analyzer {
    pub fn new(model: Arc<dyn LanguageModel>, context: &str) -> Self {
        Self {
            model,
            context: context.to_string(),
        }
    }

    /// Always yields a complete analysis; failures never escape.
    pub async fn analyze(&self, title: &str, body: Option<&str>) -> AnalysisOutcome {
        let prompt = build_prompt(title, body, &self.context);

        match self.model.generate(&prompt).await {
            Ok(text) => match parse_response(&text) {
                Some(analysis) => {
                    debug!(sentiment = %analysis.sentiment, score = analysis.sentiment_score, "Model analysis complete");
                    AnalysisOutcome::Model(analysis)
                }
                None => {
                    warn!(title = truncate_chars(title, 50), "Unparseable model response, using heuristic fallback");
                    AnalysisOutcome::Fallback(fallback_analysis(title, body))
                }
            },
            Err(e) => {
                warn!(title = truncate_chars(title, 50), error = %e, "Model call failed, using heuristic fallback");
                AnalysisOutcome::Fallback(fallback_analysis(title, body))
            }
        }
    }
}

fn build_prompt(title: &str, body: Option<&str>, context: &str) -> String {
    let text = match body {
        Some(b) if !b.is_empty() => format!("{title}. {}", truncate_chars(b, BODY_CHAR_BUDGET)),
        _ => title.to_string(),
    };

    format!(
        "Analyze this {context} post. Return JSON only:\n\"{text}\"\n\n\
         {{\"sentiment\":\"positive/slightly_positive/neutral/slightly_negative/negative\",\
         \"score\":<-1 to 1>,\"pain_points\":[],\"features\":[],\"brands\":[],\
         \"user_type\":\"\",\"summary\":\"\"}}"
    )
}

/// Parse and normalize a model response. None means fall back.
fn parse_response(text: &str) -> Option<Analysis> {
    let raw: RawAnalysis = serde_json::from_str(text).ok()?;
    let payload: serde_json::Value = serde_json::from_str(text).ok()?;

    let sentiment = raw
        .sentiment
        .as_deref()
        .map(Sentiment::from_label)
        .unwrap_or_default();

    let sentiment_score = raw
        .score
        .or(raw.sentiment_score)
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
        .clamp(-1.0, 1.0);

    Some(Analysis {
        sentiment,
        sentiment_score,
        pain_points: raw.pain_points.unwrap_or_default(),
        feature_requests: raw.features.or(raw.feature_requests).unwrap_or_default(),
        brands_mentioned: raw.brands.or(raw.brands_mentioned).unwrap_or_default(),
        user_type: raw.user_type.unwrap_or_else(|| "unknown".to_string()),
        summary: raw.summary.unwrap_or_default(),
        raw: Some(payload),
    })
}

/// Deterministic keyword analysis over the real title+body. A lead of more
/// than 2 means strong sentiment, 1-2 slight, a tie neutral.
pub(crate) fn fallback_analysis(title: &str, body: Option<&str>) -> Analysis {
    let text = format!("{} {}", title, body.unwrap_or("")).to_lowercase();

    let pos = POSITIVE_WORDS.iter().filter(|w| text.contains(*w)).count() as i64;
    let neg = NEGATIVE_WORDS.iter().filter(|w| text.contains(*w)).count() as i64;

    let (sentiment, score) = if pos > neg + 2 {
        (Sentiment::Positive, 0.7)
    } else if pos > neg {
        (Sentiment::SlightlyPositive, 0.3)
    } else if neg > pos + 2 {
        (Sentiment::Negative, -0.7)
    } else if neg > pos {
        (Sentiment::SlightlyNegative, -0.3)
    } else {
        (Sentiment::Neutral, 0.0)
    };

    let brands_mentioned = BRAND_KEYWORDS
        .iter()
        .filter(|brand| text.contains(*brand))
        .map(|brand| title_case(brand))
        .collect();

    Analysis {
        sentiment,
        sentiment_score: score,
        pain_points: Vec::new(),
        feature_requests: Vec::new(),
        brands_mentioned,
        user_type: "unknown".to_string(),
        summary: String::new(),
        raw: None,
    }
}

/// Runs many analyses with a fixed concurrency cap, preserving input order
/// in the output regardless of completion order.
pub struct BatchAnalyzer {
    analyzer: Arc<Analyzer>,
    concurrency: usize,
}

impl BatchAnalyzer {
    pub fn new(analyzer: Arc<Analyzer>) -> Self {
        Self::with_concurrency(analyzer, CONCURRENT_REQUESTS)
    }

    pub fn with_concurrency(analyzer: Arc<Analyzer>, concurrency: usize) -> Self {
        Self {
            analyzer,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn analyze_batch(&self, posts: &[RawPost]) -> Vec<AnalysisOutcome> {
        stream::iter(
            posts
                .iter()
                .map(|post| self.analyzer.analyze(&post.title, post.body.as_deref())),
        )
        .buffered(self.concurrency)
        .collect()
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{raw_post, MockModel};
    use serde_json::json;
    use std::time::Duration;

    fn analyzer(model: MockModel) -> Analyzer {
        Analyzer::new(Arc::new(model), "construction equipment")
    }

    #[test]
    fn parse_normalizes_label_and_clamps_score() {
        let analysis = parse_response(
            r#"{"sentiment":"Slightly Positive","score":3.5,"pain_points":null,"features":["gps tracking"]}"#,
        )
        .unwrap();
        assert_eq!(analysis.sentiment, Sentiment::SlightlyPositive);
        assert_eq!(analysis.sentiment_score, 1.0);
        assert_eq!(analysis.feature_requests, vec!["gps tracking"]);
        // A null list comes back empty, never absent.
        assert!(analysis.pain_points.is_empty());
        assert!(analysis.raw.is_some());
    }

    #[test]
    fn parse_rejects_malformed_list_entries() {
        // Non-string entries poison the whole parse; the caller falls back.
        assert!(parse_response(r#"{"sentiment":"neutral","pain_points":[1,2]}"#).is_none());
    }

    #[test]
    fn parse_accepts_alternate_field_spellings() {
        let analysis = parse_response(
            r#"{"sentiment":"negative","sentiment_score":-0.8,
                "feature_requests":["better seat"],"brands_mentioned":["Toro"]}"#,
        )
        .unwrap();
        assert_eq!(analysis.sentiment_score, -0.8);
        assert_eq!(analysis.feature_requests, vec!["better seat"]);
        assert_eq!(analysis.brands_mentioned, vec!["Toro"]);
    }

    #[test]
    fn parse_defaults_unknown_label_and_non_numeric_score() {
        let analysis =
            parse_response(r#"{"sentiment":"enthusiastic","score":"high"}"#).unwrap();
        assert_eq!(analysis.sentiment, Sentiment::Neutral);
        assert_eq!(analysis.sentiment_score, 0.0);
        assert_eq!(analysis.user_type, "unknown");
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(parse_response("I think this post is positive.").is_none());
        assert!(parse_response("").is_none());
    }

    #[test]
    fn fallback_classifies_by_word_lead() {
        // Lead of 3 positive words: strong positive.
        let a = fallback_analysis("excellent mower, amazing and reliable", None);
        assert_eq!(a.sentiment, Sentiment::Positive);
        assert_eq!(a.sentiment_score, 0.7);

        // Lead of 1: slight.
        let a = fallback_analysis("love this thing", None);
        assert_eq!(a.sentiment, Sentiment::SlightlyPositive);
        assert_eq!(a.sentiment_score, 0.3);

        // Lead of 4 negative words: strong negative.
        let a = fallback_analysis("terrible awful horrible worst", None);
        assert_eq!(a.sentiment, Sentiment::Negative);
        assert_eq!(a.sentiment_score, -0.7);

        // Lead of 1 negative: slight.
        let a = fallback_analysis("it arrived broken", None);
        assert_eq!(a.sentiment, Sentiment::SlightlyNegative);
        assert_eq!(a.sentiment_score, -0.3);

        // Tie: neutral.
        let a = fallback_analysis("great but broken", None);
        assert_eq!(a.sentiment, Sentiment::Neutral);
        assert_eq!(a.sentiment_score, 0.0);
    }

    #[test]
    fn fallback_extracts_brands_title_cased() {
        let a = fallback_analysis(
            "Comparing my Toro to a ditch witch",
            Some("the KUBOTA was fine too"),
        );
        assert_eq!(a.brands_mentioned, vec!["Toro", "Ditch Witch", "Kubota"]);
    }

    #[tokio::test]
    async fn unreachable_model_still_yields_complete_analysis() {
        let analyzer = analyzer(MockModel::unreachable());

        let outcome = analyzer.analyze("the worst mower, total garbage", None).await;

        assert!(outcome.is_fallback());
        let analysis = outcome.analysis();
        assert!(Sentiment::parse(analysis.sentiment.as_str()).is_some());
        assert!((-1.0..=1.0).contains(&analysis.sentiment_score));
        assert!(analysis.pain_points.is_empty());
        assert!(analysis.raw.is_none());
    }

    #[tokio::test]
    async fn garbage_model_output_falls_back_over_real_text() {
        let model = MockModel::new().reply_all_text("not json at all");
        let analyzer = analyzer(model);

        let outcome = analyzer.analyze("absolutely love it, excellent, superb quality", None).await;

        assert!(outcome.is_fallback());
        // The heuristic saw the real title, not empty input.
        assert_eq!(outcome.analysis().sentiment, Sentiment::Positive);
    }

    #[tokio::test]
    async fn model_scores_always_within_bounds() {
        for (label, score) in [
            ("positive", json!(17.0)),
            ("negative", json!(-99)),
            ("neutral", json!("n/a")),
        ] {
            let model = MockModel::new()
                .reply_all(json!({"sentiment": label, "score": score}));
            let outcome = analyzer(model).analyze("anything", None).await;
            let s = outcome.analysis().sentiment_score;
            assert!((-1.0..=1.0).contains(&s), "score {s} out of bounds");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn batch_preserves_input_order_despite_completion_order() {
        // Later posts finish first; output order must still match input.
        let model = MockModel::new()
            .reply_with_delay("alpha", json!({"sentiment":"neutral","summary":"alpha"}), Duration::from_millis(30))
            .reply_with_delay("beta", json!({"sentiment":"neutral","summary":"beta"}), Duration::from_millis(20))
            .reply_with_delay("gamma", json!({"sentiment":"neutral","summary":"gamma"}), Duration::from_millis(10));
        let batch = BatchAnalyzer::new(Arc::new(analyzer(model)));

        let posts = vec![
            raw_post("p1", "alpha"),
            raw_post("p2", "beta"),
            raw_post("p3", "gamma"),
        ];
        let outcomes = batch.analyze_batch(&posts).await;

        let summaries: Vec<&str> = outcomes.iter().map(|o| o.analysis().summary.as_str()).collect();
        assert_eq!(summaries, vec!["alpha", "beta", "gamma"]);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_never_exceeds_the_concurrency_cap() {
        let model = MockModel::new()
            .with_uniform_delay(Duration::from_millis(10))
            .reply_all(json!({"sentiment":"neutral"}));
        let in_flight = model.in_flight_tracker();
        let batch = BatchAnalyzer::new(Arc::new(analyzer(model)));

        let posts: Vec<_> = (0..10)
            .map(|i| raw_post(&format!("p{i}"), &format!("post {i}")))
            .collect();
        let outcomes = batch.analyze_batch(&posts).await;

        assert_eq!(outcomes.len(), 10);
        assert!(in_flight.max_seen() <= CONCURRENT_REQUESTS);
        assert!(in_flight.max_seen() >= 1);
    }

    #[tokio::test]
    async fn cap_of_one_still_preserves_order() {
        let model = MockModel::new().reply_all(json!({"sentiment":"neutral"}));
        let batch = BatchAnalyzer::with_concurrency(Arc::new(analyzer(model)), 1);

        let posts = vec![raw_post("p1", "one"), raw_post("p2", "two")];
        let outcomes = batch.analyze_batch(&posts).await;
        assert_eq!(outcomes.len(), 2);
    }
}
