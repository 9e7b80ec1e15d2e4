use std::collections::HashSet;

use threadlens_common::RawPost;

/// First-seen-ordered set of posts keyed by source id.
///
/// A post matching several keywords comes back from several searches; the
/// copy fetched first wins and later duplicates are dropped, not merged.
#[derive(Default)]
pub struct PostSet {
    seen: HashSet<String>,
    posts: Vec<RawPost>,
}

impl PostSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a batch into the set. Returns how many posts were new.
    pub fn merge(&mut self, batch: Vec<RawPost>) -> usize {
        let before = self.posts.len();
        for post in batch {
            if self.seen.insert(post.source_id.clone()) {
                self.posts.push(post);
            }
        }
        self.posts.len() - before
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn into_posts(self) -> Vec<RawPost> {
        self.posts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::raw_post;

    #[test]
    fn overlapping_searches_keep_first_seen() {
        // Search one returns two posts; search two returns one overlapping
        // and one new. Three unique posts survive, in first-seen order.
        let mut set = PostSet::new();

        let added = set.merge(vec![raw_post("p1", "first"), raw_post("p2", "second")]);
        assert_eq!(added, 2);

        let added = set.merge(vec![raw_post("p2", "second again"), raw_post("p3", "third")]);
        assert_eq!(added, 1);

        let posts = set.into_posts();
        let ids: Vec<&str> = posts.iter().map(|p| p.source_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
        // The kept copy is the one fetched first.
        assert_eq!(posts[1].title, "second");
    }

    #[test]
    fn duplicate_within_one_batch_is_dropped() {
        let mut set = PostSet::new();
        let added = set.merge(vec![raw_post("p1", "a"), raw_post("p1", "b")]);
        assert_eq!(added, 1);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn empty_batches_are_harmless() {
        let mut set = PostSet::new();
        assert_eq!(set.merge(Vec::new()), 0);
        assert!(set.is_empty());
    }
}
