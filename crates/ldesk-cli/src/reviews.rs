//! Review command handlers for the CLI.

use std::fmt::Write as _;

use clap::{Args, Subcommand};
use ldesk_core::{
    normalize_location_id, CoreError, Cursor, FilterQuery, ReplyState, ReviewId, ReviewRecord,
    Sentiment,
};
use ldesk_reviews::{LifecycleEngine, PaginationEngine, ReviewPage};

/// Sub-commands available under `reviews`.
#[derive(Debug, Subcommand)]
pub enum ReviewCommands {
    /// List reviews, newest first
    List(ListArgs),
    /// Publish the first reply to a pending review
    Reply {
        /// Local review id
        id: i64,
        /// Reply text
        text: String,
    },
}

#[derive(Debug, Default, Args)]
pub struct ListArgs {
    /// Restrict to one location (any identifier shape)
    #[arg(long)]
    pub location: Option<String>,
    /// Star rating, 1-5
    #[arg(long)]
    pub rating: Option<i64>,
    /// new, pending_reply or replied
    #[arg(long)]
    pub status: Option<ReplyState>,
    #[arg(long)]
    pub sentiment: Option<Sentiment>,
    /// Case-insensitive match on reviewer name or text
    #[arg(long)]
    pub search: Option<String>,
    /// Resume after the `next cursor` printed by a previous page
    #[arg(long)]
    pub cursor: Option<Cursor>,
    /// Page size, clamped to 1-100
    #[arg(long)]
    pub limit: Option<usize>,
}

impl ListArgs {
    pub(crate) fn to_query(&self) -> Result<FilterQuery, CoreError> {
        let mut query = FilterQuery::new();
        if let Some(raw) = &self.location {
            query = query.with_location(normalize_location_id(raw)?);
        }
        if let Some(rating) = self.rating {
            query = query.with_rating(rating)?;
        }
        if let Some(status) = self.status {
            query = query.with_status(status);
        }
        if let Some(sentiment) = self.sentiment {
            query = query.with_sentiment(sentiment);
        }
        if let Some(term) = &self.search {
            query = query.with_search(term);
        }
        Ok(query.with_cursor(self.cursor))
    }
}

/// # Errors
///
/// Returns an error for invalid filters or a failed store read.
pub(crate) async fn run_reviews_list(
    pages: &PaginationEngine,
    args: &ListArgs,
) -> anyhow::Result<ReviewPage> {
    let page = pages.query(args.to_query()?, args.limit).await?;
    tracing::debug!(
        items = page.items.len(),
        total = page.aggregates.total,
        more = page.next_cursor.is_some(),
        "review page loaded"
    );
    Ok(page)
}

/// # Errors
///
/// Returns an error when the reply is rejected; scope failures ask the
/// operator to reconnect the provider account.
pub(crate) async fn run_reviews_reply(
    lifecycle: &LifecycleEngine,
    id: i64,
    text: &str,
) -> anyhow::Result<ReviewRecord> {
    match lifecycle.reply_to_review(ReviewId(id), text).await {
        Ok(review) => {
            tracing::info!(review_id = id, "reply published");
            Ok(review)
        }
        Err(e) if e.reauthorize() => {
            tracing::warn!(review_id = id, error = %e, "reply rejected for missing scope");
            anyhow::bail!("{e}; reconnect the provider account and retry")
        }
        Err(e) => Err(e.into()),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_owned()
    }
}

/// Renders a page as a fixed-width table followed by its counters.
pub(crate) fn render_page(page: &ReviewPage) -> String {
    let mut out = String::new();
    if page.items.is_empty() {
        out.push_str("no reviews match; run `sync reviews <id>` first\n");
    } else {
        let _ = writeln!(
            out,
            "{:<8}{:<8}{:<15}{:<6}{:<12}{:<18}TEXT",
            "ID", "RATING", "STATUS", "READ", "DATE", "REVIEWER"
        );
        for r in &page.items {
            let _ = writeln!(
                out,
                "{:<8}{:<8}{:<15}{:<6}{:<12}{:<18}{}",
                r.id.0,
                r.rating,
                r.reply_state.as_str(),
                if r.is_read { "yes" } else { "no" },
                r.review_timestamp.format("%Y-%m-%d").to_string(),
                truncate(&r.reviewer_name, 16),
                truncate(r.text.as_deref().unwrap_or(""), 50),
            );
        }
    }

    let a = &page.aggregates;
    let average = a
        .average_rating
        .map_or_else(|| "n/a".to_owned(), |avg| format!("{avg:.2}"));
    let _ = writeln!(
        out,
        "total {}, pending {}, replied {}, average rating {average}",
        a.total, a.pending, a.replied
    );
    if let Some(cursor) = page.next_cursor {
        let _ = writeln!(out, "next cursor: {cursor}");
    }
    out
}
