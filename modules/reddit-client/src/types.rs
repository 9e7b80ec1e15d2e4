use serde::Deserialize;

/// Listing envelope returned by Reddit's JSON endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub data: ListingData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub children: Vec<ListingChild>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingChild {
    #[serde(default)]
    pub kind: String,
    pub data: RedditPost,
}

/// A single post (`t3` thing) as Reddit serves it. Only the fields the
/// pipeline consumes; everything else in the payload is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RedditPost {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Self-text body. Empty for link posts.
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub subreddit: String,
    /// Missing when the account has been deleted upstream.
    pub author: Option<String>,
    /// Site-relative permalink, e.g. `/r/lawncare/comments/abc123/...`.
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    /// Creation time as epoch seconds. Reddit serves this as a float.
    #[serde(default)]
    pub created_utc: f64,
}
