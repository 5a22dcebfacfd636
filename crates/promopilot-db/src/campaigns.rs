//! Campaign rows: CRUD, guarded state writes, and the expiry sweep.
//!
//! State *validation* lives in `promopilot_core::campaign`; this module only
//! persists transitions that the caller already validated. Every state write
//! is guarded by the expected current state so that concurrent writers cannot
//! silently clobber each other.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row in the `campaigns` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CampaignRow {
    pub id: i64,
    pub public_id: Uuid,
    pub seller_id: i64,
    pub item_id: String,
    pub campaign_name: String,
    pub discount_percentage: Decimal,
    pub timezone: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub state: String,
    pub state_source: String,
    pub state_updated_at: DateTime<Utc>,
    pub total_clicks: i64,
    pub total_impressions: i64,
    pub total_conversions: i64,
    pub total_sales_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a campaign. Everything else defaults in SQL.
#[derive(Debug, Clone)]
pub struct NewCampaign<'a> {
    pub seller_id: i64,
    pub item_id: &'a str,
    pub campaign_name: &'a str,
    pub discount_percentage: Decimal,
    pub timezone: &'a str,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Inserts a campaign in `draft` state and returns the stored row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on constraint violations or connection failure.
pub async fn create_campaign(
    pool: &PgPool,
    new: &NewCampaign<'_>,
) -> Result<CampaignRow, DbError> {
    let row = sqlx::query_as::<_, CampaignRow>(
        "INSERT INTO campaigns \
         (public_id, seller_id, item_id, campaign_name, discount_percentage, timezone, \
          start_date, end_date) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING id, public_id, seller_id, item_id, campaign_name, discount_percentage, \
                   timezone, start_date, end_date, state, state_source, state_updated_at, \
                   total_clicks, total_impressions, total_conversions, total_sales_amount, \
                   created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(new.seller_id)
    .bind(new.item_id)
    .bind(new.campaign_name)
    .bind(new.discount_percentage)
    .bind(new.timezone)
    .bind(new.start_date)
    .bind(new.end_date)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Fetches a campaign by internal id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] when no such campaign exists.
pub async fn get_campaign(pool: &PgPool, id: i64) -> Result<CampaignRow, DbError> {
    sqlx::query_as::<_, CampaignRow>(
        "SELECT id, public_id, seller_id, item_id, campaign_name, discount_percentage, \
                timezone, start_date, end_date, state, state_source, state_updated_at, \
                total_clicks, total_impressions, total_conversions, total_sales_amount, \
                created_at, updated_at \
         FROM campaigns WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Fetches a campaign by its external UUID.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] when no such campaign exists.
pub async fn get_campaign_by_public_id(
    pool: &PgPool,
    public_id: Uuid,
) -> Result<CampaignRow, DbError> {
    sqlx::query_as::<_, CampaignRow>(
        "SELECT id, public_id, seller_id, item_id, campaign_name, discount_percentage, \
                timezone, start_date, end_date, state, state_source, state_updated_at, \
                total_clicks, total_impressions, total_conversions, total_sales_amount, \
                created_at, updated_at \
         FROM campaigns WHERE public_id = $1",
    )
    .bind(public_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Lists a seller's campaigns, newest first, optionally filtered by state.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn list_campaigns(
    pool: &PgPool,
    seller_id: i64,
    state: Option<&str>,
    limit: i64,
) -> Result<Vec<CampaignRow>, DbError> {
    let rows = sqlx::query_as::<_, CampaignRow>(
        "SELECT id, public_id, seller_id, item_id, campaign_name, discount_percentage, \
                timezone, start_date, end_date, state, state_source, state_updated_at, \
                total_clicks, total_impressions, total_conversions, total_sales_amount, \
                created_at, updated_at \
         FROM campaigns \
         WHERE seller_id = $1 AND ($2::text IS NULL OR state = $2) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $3",
    )
    .bind(seller_id)
    .bind(state)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Updates the editable campaign fields. Expired campaigns are immutable.
///
/// Returns `false` when the campaign is missing or already expired.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on constraint violations or connection failure.
pub async fn update_campaign_config(
    pool: &PgPool,
    id: i64,
    campaign_name: &str,
    discount_percentage: Decimal,
    timezone: &str,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE campaigns \
         SET campaign_name = $2, discount_percentage = $3, timezone = $4, \
             start_date = $5, end_date = $6, updated_at = NOW() \
         WHERE id = $1 AND state <> 'expired'",
    )
    .bind(id)
    .bind(campaign_name)
    .bind(discount_percentage)
    .bind(timezone)
    .bind(start_date)
    .bind(end_date)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Deletes a campaign; schedules cascade via the foreign key.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn delete_campaign(pool: &PgPool, id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM campaigns WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Optimistically moves a campaign from `expected_state` to `new_state`.
///
/// Returns `false` when the row no longer holds `expected_state`, which means
/// a concurrent writer won and the caller's decision is stale.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn set_campaign_state(
    pool: &PgPool,
    id: i64,
    new_state: &str,
    source: &str,
    expected_state: &str,
    at: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE campaigns \
         SET state = $2, state_source = $3, state_updated_at = $4, updated_at = NOW() \
         WHERE id = $1 AND state = $5",
    )
    .bind(id)
    .bind(new_state)
    .bind(source)
    .bind(at)
    .bind(expected_state)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Expires every non-expired campaign whose end date has passed.
///
/// Returns the ids of the campaigns that were flipped, so the caller can
/// retire their schedules in the same pass.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on connection failure.
pub async fn expire_due_campaigns(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<i64>, DbError> {
    let ids = sqlx::query_scalar::<_, i64>(
        "UPDATE campaigns \
         SET state = 'expired', state_source = 'system', state_updated_at = $1, \
             updated_at = NOW() \
         WHERE end_date <= $1 AND state <> 'expired' \
         RETURNING id",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}
