//! Persisted suggestion snapshots.
//!
//! Each refresh writes a batch of rows sharing one `generated_at` timestamp;
//! readers only ever see the newest batch per seller. Old batches are kept
//! for a retention window so applied suggestions stay resolvable.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// A row in the `item_suggestions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SuggestionRow {
    pub id: i64,
    pub seller_id: i64,
    pub item_id: String,
    pub title: String,
    pub image_url: Option<String>,
    pub current_price: Decimal,
    pub available_stock: i64,
    pub recent_clicks: i64,
    pub recent_sold: i64,
    pub potential_score: f64,
    pub engagement_trend: String,
    pub scoring_policy_version: String,
    pub generated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// One scored item, ready to persist.
#[derive(Debug, Clone)]
pub struct NewSuggestion<'a> {
    pub seller_id: i64,
    pub item_id: &'a str,
    pub title: &'a str,
    pub image_url: Option<&'a str>,
    pub current_price: Decimal,
    pub available_stock: i64,
    pub recent_clicks: i64,
    pub recent_sold: i64,
    pub potential_score: f64,
    pub engagement_trend: &'a str,
    pub scoring_policy_version: &'a str,
    pub generated_at: DateTime<Utc>,
}

/// Inserts one scored suggestion row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on constraint violations or connection failure.
pub async fn insert_suggestion(
    pool: &PgPool,
    new: &NewSuggestion<'_>,
) -> Result<SuggestionRow, DbError> {
    let row = sqlx::query_as::<_, SuggestionRow>(
        "INSERT INTO item_suggestions \
         (seller_id, item_id, title, image_url, current_price, available_stock, \
          recent_clicks, recent_sold, potential_score, engagement_trend, \
          scoring_policy_version, generated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         RETURNING id, seller_id, item_id, title, image_url, current_price, available_stock, \
                   recent_clicks, recent_sold, potential_score, engagement_trend, \
                   scoring_policy_version, generated_at, created_at",
    )
    .bind(new.seller_id)
    .bind(new.item_id)
    .bind(new.title)
    .bind(new.image_url)
    .bind(new.current_price)
    .bind(new.available_stock)
    .bind(new.recent_clicks)
    .bind(new.recent_sold)
    .bind(new.potential_score)
    .bind(new.engagement_trend)
    .bind(new.scoring_policy_version)
    .bind(new.generated_at)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Fetches a suggestion by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] when no such suggestion exists.
pub async fn get_suggestion(pool: &PgPool, id: i64) -> Result<SuggestionRow, DbError> {
    sqlx::query_as::<_, SuggestionRow>(
        "SELECT id, seller_id, item_id, title, image_url, current_price, available_stock, \
                recent_clicks, recent_sold, potential_score, engagement_trend, \
                scoring_policy_version, generated_at, created_at \
         FROM item_suggestions WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns the newest suggestion batch for a seller, best score first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn latest_suggestions(
    pool: &PgPool,
    seller_id: i64,
) -> Result<Vec<SuggestionRow>, DbError> {
    let rows = sqlx::query_as::<_, SuggestionRow>(
        "SELECT id, seller_id, item_id, title, image_url, current_price, available_stock, \
                recent_clicks, recent_sold, potential_score, engagement_trend, \
                scoring_policy_version, generated_at, created_at \
         FROM item_suggestions \
         WHERE seller_id = $1 \
           AND generated_at = (SELECT MAX(generated_at) FROM item_suggestions WHERE seller_id = $1) \
         ORDER BY potential_score DESC, recent_clicks DESC, item_id ASC",
    )
    .bind(seller_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Deletes suggestion batches generated before the cutoff. Returns how many
/// rows were removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn purge_suggestions_before(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM item_suggestions WHERE generated_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
