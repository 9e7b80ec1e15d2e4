pub mod config;
pub mod types;

pub use config::Config;
pub use types::{
    ActionItem, Analysis, Category, EffortLevel, Job, JobProgress, JobStatus, Post, Priority,
    RawPost, Sentiment, SortMode, TimeWindow,
};
