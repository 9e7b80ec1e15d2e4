use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use threadlens_common::{ActionItem, Category, EffortLevel, Post, Priority, Sentiment};

use crate::util::{title_case, truncate_chars};

const TOP_PAIN_POINTS: usize = 15;
const TOP_FEATURE_REQUESTS: usize = 10;
const TOP_BRANDS: usize = 10;

/// How many ranked mentions become action items.
const PAIN_POINT_ITEMS: usize = 5;
const FEATURE_ITEMS: usize = 5;
const BRAND_ITEMS: usize = 3;

const MAX_RELATED_POSTS: usize = 10;
const MAX_RECOMMENDATIONS: usize = 5;

/// Floor on the number of derived items before fillers stop being added.
const MIN_ACTION_ITEMS: usize = 3;

/// A normalized free-text mention with its frequency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedMention {
    pub text: String,
    pub count: usize,
}

/// Aggregate view over every analyzed post of a job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InsightSummary {
    pub total_posts: usize,
    pub sentiment_breakdown: BTreeMap<Sentiment, usize>,
    pub avg_sentiment_score: f64,
    pub top_pain_points: Vec<RankedMention>,
    pub top_feature_requests: Vec<RankedMention>,
    pub top_brands: Vec<RankedMention>,
    pub user_types: BTreeMap<String, usize>,
}

impl InsightSummary {
    fn sentiment_count(&self, sentiment: Sentiment) -> usize {
        self.sentiment_breakdown.get(&sentiment).copied().unwrap_or(0)
    }

    pub fn negative_leaning(&self) -> usize {
        self.sentiment_count(Sentiment::Negative) + self.sentiment_count(Sentiment::SlightlyNegative)
    }

    pub fn positive_leaning(&self) -> usize {
        self.sentiment_count(Sentiment::Positive) + self.sentiment_count(Sentiment::SlightlyPositive)
    }
}

/// Frequency counter that remembers first-seen order for tie-breaking.
#[derive(Default)]
struct RankedCounter {
    counts: HashMap<String, (usize, usize)>,
}

impl RankedCounter {
    fn add(&mut self, raw: &str) {
        let key = raw.trim().to_lowercase();
        if key.is_empty() {
            return;
        }
        let first_seen = self.counts.len();
        let entry = self.counts.entry(key).or_insert((0, first_seen));
        entry.0 += 1;
    }

    /// Descending by count, ties broken by first-seen order.
    fn top(&self, n: usize) -> Vec<RankedMention> {
        let mut ranked: Vec<(&String, usize, usize)> = self
            .counts
            .iter()
            .map(|(text, (count, first_seen))| (text, *count, *first_seen))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked
            .into_iter()
            .take(n)
            .map(|(text, count, _)| RankedMention {
                text: text.clone(),
                count,
            })
            .collect()
    }
}

/// Fold all analyzed posts into the summary shape.
pub fn aggregate(posts: &[Post]) -> InsightSummary {
    let mut sentiment_breakdown: BTreeMap<Sentiment, usize> = BTreeMap::new();
    let mut user_types: BTreeMap<String, usize> = BTreeMap::new();
    let mut pain_points = RankedCounter::default();
    let mut feature_requests = RankedCounter::default();
    let mut brands = RankedCounter::default();

    let mut total_score = 0.0;
    let mut scored = 0usize;

    for post in posts {
        let sentiment = post
            .analysis
            .as_ref()
            .map(|a| a.sentiment)
            .unwrap_or_default();
        *sentiment_breakdown.entry(sentiment).or_insert(0) += 1;

        let Some(analysis) = &post.analysis else {
            continue;
        };

        total_score += analysis.sentiment_score;
        scored += 1;

        for pp in &analysis.pain_points {
            pain_points.add(pp);
        }
        for fr in &analysis.feature_requests {
            feature_requests.add(fr);
        }
        for brand in &analysis.brands_mentioned {
            brands.add(brand);
        }
        *user_types.entry(analysis.user_type.clone()).or_insert(0) += 1;
    }

    InsightSummary {
        total_posts: posts.len(),
        sentiment_breakdown,
        avg_sentiment_score: if scored > 0 { total_score / scored as f64 } else { 0.0 },
        top_pain_points: pain_points.top(TOP_PAIN_POINTS),
        top_feature_requests: feature_requests.top(TOP_FEATURE_REQUESTS),
        top_brands: brands.top(TOP_BRANDS),
        user_types,
    }
}

/// Derive prioritized action items from the summary. Deterministic rules, no
/// model call; output sorted by descending impact score.
pub fn derive_action_items(job_id: Uuid, summary: &InsightSummary, posts: &[Post]) -> Vec<ActionItem> {
    let mut items = Vec::new();
    let total = summary.total_posts;
    let pct_of_total = |count: usize| {
        if total > 0 {
            count as f64 / total as f64 * 100.0
        } else {
            0.0
        }
    };

    // Pain points.
    for mention in summary.top_pain_points.iter().take(PAIN_POINT_ITEMS) {
        let count = mention.count;
        let pct = pct_of_total(count);
        let priority = if count >= 10 {
            Priority::Critical
        } else if count >= 5 {
            Priority::High
        } else if count >= 2 {
            Priority::Medium
        } else {
            Priority::Low
        };
        let impact_score = match priority {
            Priority::Critical => (70 + (pct * 0.3) as i32).min(95),
            Priority::High => (55 + (pct * 0.4) as i32).min(85),
            Priority::Medium => (40 + (pct * 0.5) as i32).min(70),
            Priority::Low => (30 + (pct * 0.4) as i32).min(55),
        };

        items.push(ActionItem {
            id: Uuid::new_v4(),
            job_id,
            title: format!(
                "Address Customer Pain Point: {}",
                truncate_chars(&title_case(&mention.text), 50)
            ),
            description: format!(
                "This issue was mentioned {count} time(s) ({pct:.0}% of posts). \
                 Users are experiencing difficulties that should be investigated and resolved."
            ),
            category: Category::Product,
            priority,
            impact_score,
            effort_level: if count < 5 { EffortLevel::Medium } else { EffortLevel::High },
            timeline: if matches!(priority, Priority::Critical | Priority::High) {
                "Q1".to_string()
            } else {
                "Q2".to_string()
            },
            recommendations: capped(vec![
                format!("Investigate root cause of '{}'", truncate_chars(&mention.text, 40)),
                "Survey affected users for detailed feedback".to_string(),
                "Create engineering ticket for resolution".to_string(),
                "Monitor customer support tickets related to this issue".to_string(),
            ]),
            related_post_ids: posts_mentioning(&mention.text, posts),
            metrics: json!({ "mention_count": count, "percentage": pct }),
        });
    }

    // Feature requests.
    for mention in summary.top_feature_requests.iter().take(FEATURE_ITEMS) {
        let count = mention.count;
        let pct = pct_of_total(count);
        let priority = if count >= 5 {
            Priority::High
        } else if count >= 2 {
            Priority::Medium
        } else {
            Priority::Low
        };
        let impact_score = match priority {
            Priority::High => (50 + (pct * 0.4) as i32).min(80),
            Priority::Medium => (35 + (pct * 0.5) as i32).min(65),
            _ => (25 + (pct * 0.4) as i32).min(50),
        };

        items.push(ActionItem {
            id: Uuid::new_v4(),
            job_id,
            title: format!(
                "Feature Request: {}",
                truncate_chars(&title_case(&mention.text), 50)
            ),
            description: format!(
                "Users have requested this feature {count} time(s). This represents a \
                 product enhancement opportunity that could improve customer satisfaction."
            ),
            category: Category::Product,
            priority,
            impact_score,
            effort_level: EffortLevel::High,
            timeline: if priority == Priority::High { "Q2".to_string() } else { "Q3".to_string() },
            recommendations: capped(vec![
                "Evaluate technical feasibility and scope".to_string(),
                "Estimate development effort and resources".to_string(),
                "Add to product backlog for prioritization".to_string(),
                "Consider user beta testing program".to_string(),
            ]),
            related_post_ids: posts_mentioning(&mention.text, posts),
            metrics: json!({ "request_count": count }),
        });
    }

    // Brand mentions.
    for mention in summary.top_brands.iter().take(BRAND_ITEMS) {
        let count = mention.count;
        if count < 2 {
            continue;
        }
        let impact_score = if count >= 10 {
            70
        } else if count >= 5 {
            60
        } else {
            50
        };
        let brand = title_case(&mention.text);

        items.push(ActionItem {
            id: Uuid::new_v4(),
            job_id,
            title: format!("Competitive Analysis: {brand}"),
            description: format!(
                "{brand} was mentioned {count} time(s) in discussions. Analyze competitor \
                 positioning and customer comparisons."
            ),
            category: Category::Marketing,
            priority: Priority::Medium,
            impact_score,
            effort_level: EffortLevel::Low,
            timeline: "Q2".to_string(),
            recommendations: capped(vec![
                format!("Research {brand} product features and pricing"),
                "Identify competitive advantages and gaps".to_string(),
                "Develop differentiation messaging".to_string(),
                "Monitor competitor reviews and feedback".to_string(),
            ]),
            related_post_ids: posts_mentioning(&mention.text, posts),
            metrics: json!({ "mention_count": count }),
        });
    }

    // Negative sentiment.
    let negative = summary.negative_leaning();
    if negative > 0 {
        let neg_pct = pct_of_total(negative);
        let impact_score = if neg_pct > 50.0 {
            90
        } else if neg_pct > 40.0 {
            85
        } else if neg_pct > 30.0 {
            75
        } else if neg_pct > 20.0 {
            65
        } else if neg_pct > 10.0 {
            55
        } else {
            45
        };
        let priority = if neg_pct > 40.0 {
            Priority::Critical
        } else if neg_pct > 20.0 {
            Priority::High
        } else {
            Priority::Medium
        };

        items.push(ActionItem {
            id: Uuid::new_v4(),
            job_id,
            title: "Address Negative Customer Sentiment".to_string(),
            description: format!(
                "{negative} out of {total} posts ({neg_pct:.0}%) expressed negative sentiment. \
                 Prioritize understanding and addressing customer frustrations."
            ),
            category: Category::Service,
            priority,
            impact_score,
            effort_level: EffortLevel::High,
            timeline: "Q1".to_string(),
            recommendations: capped(vec![
                "Conduct deep-dive analysis of negative posts".to_string(),
                "Implement customer feedback loop".to_string(),
                "Improve customer support response times".to_string(),
                "Create proactive outreach program".to_string(),
            ]),
            related_post_ids: Vec::new(),
            metrics: json!({ "negative_count": negative, "negative_percentage": neg_pct }),
        });
    }

    // Positive advocacy.
    let positive = summary.positive_leaning();
    if total > 0 && positive as f64 >= total as f64 * 0.3 {
        let pos_pct = pct_of_total(positive);
        let impact_score = if pos_pct > 60.0 {
            70
        } else if pos_pct > 50.0 {
            65
        } else if pos_pct > 40.0 {
            60
        } else {
            55
        };

        items.push(ActionItem {
            id: Uuid::new_v4(),
            job_id,
            title: "Leverage Positive Customer Advocacy".to_string(),
            description: format!(
                "{positive} out of {total} posts ({pos_pct:.0}%) expressed positive sentiment. \
                 Build on this momentum with advocacy programs."
            ),
            category: Category::Marketing,
            priority: Priority::Medium,
            impact_score,
            effort_level: EffortLevel::Low,
            timeline: "Q2".to_string(),
            recommendations: capped(vec![
                "Identify potential brand advocates".to_string(),
                "Create customer testimonial program".to_string(),
                "Develop referral incentives".to_string(),
                "Share success stories on social media".to_string(),
            ]),
            related_post_ids: Vec::new(),
            metrics: json!({ "positive_count": positive, "positive_percentage": pos_pct }),
        });
    }

    // Professional user segment.
    let professionals = summary.user_types.get("professional").copied().unwrap_or(0);
    if total > 0 && professionals as f64 >= total as f64 * 0.3 {
        items.push(ActionItem {
            id: Uuid::new_v4(),
            job_id,
            title: "Target Professional User Segment".to_string(),
            description: format!(
                "{professionals} out of {total} users ({:.0}%) appear to be professionals. \
                 Consider specialized offerings for this segment.",
                pct_of_total(professionals)
            ),
            category: Category::Marketing,
            priority: Priority::Medium,
            impact_score: 65,
            effort_level: EffortLevel::Medium,
            timeline: "Q2".to_string(),
            recommendations: capped(vec![
                "Develop professional-grade product line".to_string(),
                "Create B2B marketing materials".to_string(),
                "Offer volume/fleet discounts".to_string(),
                "Build professional support tier".to_string(),
            ]),
            related_post_ids: Vec::new(),
            metrics: json!({ "professional_count": professionals }),
        });
    }

    // Generic fillers keep the list useful when the rules produced little.
    if items.len() < MIN_ACTION_ITEMS {
        items.push(ActionItem {
            id: Uuid::new_v4(),
            job_id,
            title: "Establish Customer Feedback Loop".to_string(),
            description: format!(
                "Based on analysis of {total} posts, implement systematic customer feedback \
                 collection to continuously improve products and services."
            ),
            category: Category::Service,
            priority: Priority::Medium,
            impact_score: 60,
            effort_level: EffortLevel::Medium,
            timeline: "Q2".to_string(),
            recommendations: capped(vec![
                "Set up regular community monitoring".to_string(),
                "Create customer survey program".to_string(),
                "Implement NPS tracking".to_string(),
                "Schedule quarterly feedback reviews".to_string(),
            ]),
            related_post_ids: Vec::new(),
            metrics: json!({ "posts_analyzed": total }),
        });
    }
    if items.len() < MIN_ACTION_ITEMS {
        items.push(ActionItem {
            id: Uuid::new_v4(),
            job_id,
            title: "Enhance Online Community Presence".to_string(),
            description: "Increase brand visibility and engagement in relevant online \
                          communities to build trust and gather real-time feedback."
                .to_string(),
            category: Category::Marketing,
            priority: Priority::Low,
            impact_score: 50,
            effort_level: EffortLevel::Low,
            timeline: "Q3".to_string(),
            recommendations: capped(vec![
                "Identify key subreddits and forums".to_string(),
                "Develop community engagement guidelines".to_string(),
                "Train team on authentic community participation".to_string(),
                "Track engagement metrics".to_string(),
            ]),
            related_post_ids: Vec::new(),
            metrics: json!({}),
        });
    }

    items.sort_by(|a, b| b.impact_score.cmp(&a.impact_score));
    items
}

fn capped(mut recommendations: Vec<String>) -> Vec<String> {
    recommendations.truncate(MAX_RECOMMENDATIONS);
    recommendations
}

/// Posts whose text (title, body, extracted insights) contains the needle,
/// case-insensitively. Capped at [`MAX_RELATED_POSTS`].
fn posts_mentioning(needle: &str, posts: &[Post]) -> Vec<Uuid> {
    let needle = needle.to_lowercase();
    posts
        .iter()
        .filter(|post| {
            let insights = post
                .analysis
                .as_ref()
                .map(|a| format!("{} {}", a.pain_points.join(" "), a.feature_requests.join(" ")))
                .unwrap_or_default();
            let haystack = format!(
                "{} {} {}",
                post.title,
                post.body.as_deref().unwrap_or(""),
                insights
            )
            .to_lowercase();
            haystack.contains(&needle)
        })
        .map(|post| post.id)
        .take(MAX_RELATED_POSTS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::analyzed_post;

    fn neutral(job_id: Uuid, n: usize) -> Vec<Post> {
        (0..n)
            .map(|i| analyzed_post(job_id, &format!("n{i}"), Sentiment::Neutral, 0.0, &[], &[], &[]))
            .collect()
    }

    #[test]
    fn aggregate_counts_and_ranks() {
        let job_id = Uuid::new_v4();
        let posts = vec![
            analyzed_post(job_id, "p1", Sentiment::Negative, -0.7, &["Battery Life"], &[], &["Toro"]),
            analyzed_post(job_id, "p2", Sentiment::Positive, 0.7, &["battery life"], &["GPS"], &["toro"]),
            analyzed_post(job_id, "p3", Sentiment::Neutral, 0.0, &["engine noise"], &["gps"], &[]),
        ];

        let summary = aggregate(&posts);

        assert_eq!(summary.total_posts, 3);
        assert_eq!(summary.sentiment_breakdown[&Sentiment::Negative], 1);
        assert_eq!(summary.sentiment_breakdown[&Sentiment::Positive], 1);
        assert!((summary.avg_sentiment_score - 0.0).abs() < 1e-9);

        // Case-insensitive normalization, ranked by count.
        assert_eq!(summary.top_pain_points[0], RankedMention { text: "battery life".into(), count: 2 });
        assert_eq!(summary.top_pain_points[1], RankedMention { text: "engine noise".into(), count: 1 });
        assert_eq!(summary.top_feature_requests[0].count, 2);
        assert_eq!(summary.top_brands[0], RankedMention { text: "toro".into(), count: 2 });
    }

    #[test]
    fn ranking_ties_break_by_first_seen() {
        let job_id = Uuid::new_v4();
        let posts = vec![
            analyzed_post(job_id, "p1", Sentiment::Neutral, 0.0, &["alpha", "beta"], &[], &[]),
            analyzed_post(job_id, "p2", Sentiment::Neutral, 0.0, &["beta", "alpha"], &[], &[]),
        ];

        let summary = aggregate(&posts);
        let texts: Vec<&str> = summary.top_pain_points.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["alpha", "beta"]);
    }

    #[test]
    fn posts_without_analysis_count_as_neutral() {
        let job_id = Uuid::new_v4();
        let mut post = analyzed_post(job_id, "p1", Sentiment::Positive, 0.5, &[], &[], &[]);
        post.analysis = None;

        let summary = aggregate(&[post]);
        assert_eq!(summary.sentiment_breakdown[&Sentiment::Neutral], 1);
        assert_eq!(summary.avg_sentiment_score, 0.0);
    }

    #[test]
    fn pain_point_in_six_of_twenty_posts_is_high_impact_67() {
        let job_id = Uuid::new_v4();
        let mut posts = neutral(job_id, 14);
        for i in 0..6 {
            posts.push(analyzed_post(
                job_id,
                &format!("pp{i}"),
                Sentiment::Neutral,
                0.0,
                &["battery life"],
                &[],
                &[],
            ));
        }

        let summary = aggregate(&posts);
        let items = derive_action_items(job_id, &summary, &posts);

        let item = items
            .iter()
            .find(|i| i.title.contains("Battery Life"))
            .expect("pain point item");
        // 6 mentions of 20 posts: high priority, 55 + floor(30 * 0.4) = 67.
        assert_eq!(item.priority, Priority::High);
        assert_eq!(item.impact_score, 67);
        assert_eq!(item.category, Category::Product);
    }

    #[test]
    fn nine_of_twenty_negative_posts_is_critical_85() {
        let job_id = Uuid::new_v4();
        let mut posts = neutral(job_id, 11);
        for i in 0..5 {
            posts.push(analyzed_post(job_id, &format!("neg{i}"), Sentiment::Negative, -0.7, &[], &[], &[]));
        }
        for i in 0..4 {
            posts.push(analyzed_post(
                job_id,
                &format!("sneg{i}"),
                Sentiment::SlightlyNegative,
                -0.3,
                &[],
                &[],
                &[],
            ));
        }

        let summary = aggregate(&posts);
        assert_eq!(summary.negative_leaning(), 9);

        let items = derive_action_items(job_id, &summary, &posts);
        let item = items
            .iter()
            .find(|i| i.title == "Address Negative Customer Sentiment")
            .expect("sentiment item");
        // 45% negative-leaning: critical priority, impact in the >40 band.
        assert_eq!(item.priority, Priority::Critical);
        assert_eq!(item.impact_score, 85);
    }

    #[test]
    fn at_least_three_items_sorted_by_impact() {
        let job_id = Uuid::new_v4();
        let posts = neutral(job_id, 4);

        let summary = aggregate(&posts);
        let items = derive_action_items(job_id, &summary, &posts);

        // All-neutral corpus still yields the filler floor.
        assert!(items.len() >= 2);
        for pair in items.windows(2) {
            assert!(pair[0].impact_score >= pair[1].impact_score);
        }

        // A corpus with any signal reaches three items.
        let mut posts = neutral(job_id, 10);
        posts.push(analyzed_post(job_id, "x1", Sentiment::Negative, -0.7, &["rust spots", "rust spots"], &[], &[]));
        posts.push(analyzed_post(job_id, "x2", Sentiment::Negative, -0.7, &["rust spots"], &[], &[]));
        let summary = aggregate(&posts);
        let items = derive_action_items(job_id, &summary, &posts);
        assert!(items.len() >= 3);
        for pair in items.windows(2) {
            assert!(pair[0].impact_score >= pair[1].impact_score);
        }
    }

    #[test]
    fn brand_items_require_two_mentions() {
        let job_id = Uuid::new_v4();
        let posts = vec![
            analyzed_post(job_id, "b1", Sentiment::Neutral, 0.0, &[], &[], &["Kubota", "Toro"]),
            analyzed_post(job_id, "b2", Sentiment::Neutral, 0.0, &[], &[], &["Kubota"]),
        ];

        let summary = aggregate(&posts);
        let items = derive_action_items(job_id, &summary, &posts);

        assert!(items.iter().any(|i| i.title == "Competitive Analysis: Kubota"));
        assert!(!items.iter().any(|i| i.title == "Competitive Analysis: Toro"));
    }

    #[test]
    fn advocacy_item_triggers_at_thirty_percent_positive() {
        let job_id = Uuid::new_v4();
        let mut posts = neutral(job_id, 11);
        for i in 0..9 {
            posts.push(analyzed_post(job_id, &format!("pos{i}"), Sentiment::Positive, 0.7, &[], &[], &[]));
        }

        let summary = aggregate(&posts);
        let items = derive_action_items(job_id, &summary, &posts);
        let item = items
            .iter()
            .find(|i| i.title == "Leverage Positive Customer Advocacy")
            .expect("advocacy item");
        // 45% positive: the >40 band.
        assert_eq!(item.impact_score, 60);
        assert_eq!(item.priority, Priority::Medium);
    }

    #[test]
    fn professional_segment_item() {
        let job_id = Uuid::new_v4();
        let mut posts = Vec::new();
        for i in 0..4 {
            let mut post = analyzed_post(job_id, &format!("pro{i}"), Sentiment::Neutral, 0.0, &[], &[], &[]);
            if let Some(a) = post.analysis.as_mut() {
                a.user_type = "professional".to_string();
            }
            posts.push(post);
        }
        posts.extend(neutral(job_id, 6));

        let summary = aggregate(&posts);
        let items = derive_action_items(job_id, &summary, &posts);
        let item = items
            .iter()
            .find(|i| i.title == "Target Professional User Segment")
            .expect("segment item");
        assert_eq!(item.impact_score, 65);
    }

    #[test]
    fn related_posts_are_capped_at_ten() {
        let job_id = Uuid::new_v4();
        let mut posts = Vec::new();
        for i in 0..12 {
            posts.push(analyzed_post(
                job_id,
                &format!("r{i}"),
                Sentiment::Neutral,
                0.0,
                &["clogged filter"],
                &[],
                &[],
            ));
        }

        let summary = aggregate(&posts);
        let items = derive_action_items(job_id, &summary, &posts);
        let item = items
            .iter()
            .find(|i| i.title.contains("Clogged Filter"))
            .expect("pain point item");
        assert_eq!(item.related_post_ids.len(), 10);
        assert!(item.recommendations.len() <= 5);
    }
}
