//! Aggregation reports over the software-review collection.
//!
//! Three fixed, parameterless reports back the dashboard charts. They always
//! cover the whole collection; list-query filters do not apply here.
//!
//! Also provides `reviewdesk stats`, which prints all three to stdout.

use anyhow::Result;
use serde::Serialize;

use crate::cast;
use crate::config::Config;
use crate::models::RecordKind;
use crate::store::{self, Bucket, Grouping, Store};

/// Response body of `GET /agg/stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    #[serde(rename = "avgRating", serialize_with = "cast::ser_number")]
    pub avg_rating: Option<f64>,
    #[serde(rename = "totalReviews")]
    pub total_reviews: i64,
    #[serde(rename = "verifiedPercent", serialize_with = "cast::ser_number_required")]
    pub verified_percent: f64,
}

/// Round to two decimals, ties to even (`4.125` -> `4.12`).
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}

/// Average rating, total count and share of verified purchases.
///
/// Returns `None` for an empty collection instead of dividing by zero.
pub async fn summary_stats(store: &dyn Store) -> Result<Option<SummaryStats>> {
    let summary = store
        .summarize(RecordKind::Software, "rating", "verified_purchase")
        .await?;

    if summary.count == 0 {
        return Ok(None);
    }

    Ok(Some(SummaryStats {
        avg_rating: summary.average.map(round2),
        total_reviews: summary.count,
        verified_percent: round2(100.0 * summary.flagged as f64 / summary.count as f64),
    }))
}

pub async fn ratings_distribution(store: &dyn Store) -> Result<Vec<Bucket>> {
    store
        .histogram(RecordKind::Software, Grouping::Value("rating"))
        .await
}

pub async fn reviews_per_year(store: &dyn Store) -> Result<Vec<Bucket>> {
    store
        .histogram(RecordKind::Software, Grouping::Year("timestamp"))
        .await
}

/// Run the stats command: compute every report and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = store::open(config).await?;
    let result = print_stats(store.as_ref()).await;
    store.close().await;
    result
}

async fn print_stats(store: &dyn Store) -> Result<()> {
    let (summary, ratings, years) = tokio::try_join!(
        summary_stats(store),
        ratings_distribution(store),
        reviews_per_year(store),
    )?;

    println!("reviewdesk: software review stats");
    println!("==================================");
    println!();

    let Some(summary) = summary else {
        println!("  No software reviews stored.");
        println!();
        return Ok(());
    };

    println!("  Reviews:     {}", summary.total_reviews);
    println!(
        "  Avg rating:  {}",
        summary
            .avg_rating
            .map(|r| format!("{:.2}", r))
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  Verified:    {:.2}%", summary.verified_percent);

    print_buckets("By rating", "RATING", &ratings);
    print_buckets("By year", "YEAR", &years);
    println!();
    Ok(())
}

fn print_buckets(title: &str, column: &str, buckets: &[Bucket]) {
    if buckets.is_empty() {
        return;
    }
    println!();
    println!("  {}:", title);
    println!("  {:<10} {:>8}", column, "COUNT");
    println!("  {}", "-".repeat(19));
    for b in buckets {
        let key = b
            .key
            .map(|k| cast::number_value(k).to_string())
            .unwrap_or_else(|| "(none)".to_string());
        println!("  {:<10} {:>8}", key, b.count);
    }
}
