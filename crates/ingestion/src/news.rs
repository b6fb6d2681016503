//! Raw news row normalization and exact-key deduplication.

use newsbar_core::{NewsRecord, TimePoint};
use std::collections::HashMap;
use tracing::debug;

/// Fixed mapping from upstream topic labels to column-safe slugs.
const TOPIC_SLUGS: [(&str, &str); 15] = [
    ("Blockchain", "blockchain"),
    ("Earnings", "earnings"),
    ("IPO", "ipo"),
    ("Mergers & Acquisitions", "mergers_and_acquisitions"),
    ("Financial Markets", "financial_markets"),
    ("Economy - Macro", "economy_macro"),
    ("Economy - Monetary", "economy_monetary"),
    ("Economy - Fiscal", "economy_fiscal"),
    ("Energy & Transportation", "energy_transportation"),
    ("Finance", "finance"),
    ("Life Sciences", "life_sciences"),
    ("Manufacturing", "manufacturing"),
    ("Real Estate & Construction", "real_estate"),
    ("Retail & Wholesale", "retail_wholesale"),
    ("Technology", "technology"),
];

/// Slug for a topic label; unmapped labels pass through unchanged.
pub fn normalize_topic(label: &str) -> &str {
    TOPIC_SLUGS
        .iter()
        .find(|(raw, _)| *raw == label)
        .map_or(label, |&(_, slug)| slug)
}

/// Rewrite `affected_topic` of every record to its slug.
pub fn normalize_topics(records: &mut [NewsRecord]) {
    for record in records.iter_mut() {
        if let Some(topic) = record.affected_topic.take() {
            record.affected_topic = Some(normalize_topic(&topic).to_string());
        }
    }
}

type NewsKey<'a> = (&'a str, TimePoint, &'a str, Option<&'a str>);

fn news_key(record: &NewsRecord) -> NewsKey<'_> {
    (
        &record.title,
        record.datetime,
        &record.ticker,
        record.affected_topic.as_deref(),
    )
}

/// Drop exact duplicates on (title, datetime, ticker, affected_topic),
/// keeping the last occurrence in input order.
pub fn dedup_news(records: Vec<NewsRecord>) -> Vec<NewsRecord> {
    let keep: Vec<bool> = {
        let mut last: HashMap<NewsKey<'_>, usize> = HashMap::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            last.insert(news_key(record), i);
        }
        records
            .iter()
            .enumerate()
            .map(|(i, record)| last.get(&news_key(record)) == Some(&i))
            .collect()
    };

    let before = records.len();
    let deduped: Vec<NewsRecord> = records
        .into_iter()
        .zip(keep)
        .filter_map(|(record, keep)| keep.then_some(record))
        .collect();
    debug!(removed = before - deduped.len(), "deduplicated news rows");
    deduped
}

/// Append `current` to `historical` and deduplicate; newer rows win.
pub fn combine(historical: Vec<NewsRecord>, current: Vec<NewsRecord>) -> Vec<NewsRecord> {
    let mut all = historical;
    all.extend(current);
    dedup_news(all)
}
