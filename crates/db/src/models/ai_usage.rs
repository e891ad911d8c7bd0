use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// AI editor usage for one user within one calendar-hour bucket.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct AiUsage {
    pub user_id: Uuid,
    pub hour_bucket: DateTime<Utc>,
    pub edit_count: i64,
}

/// Truncate a timestamp to the start of its calendar hour.
pub fn hour_bucket(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(now.hour(), 0, 0)
        .map(|ndt| ndt.and_utc())
        .unwrap_or(now)
}

/// Whole minutes until the next hour boundary, rounded up, never zero.
pub fn minutes_until_next_hour(now: DateTime<Utc>) -> i64 {
    let elapsed = i64::from(now.minute()) * 60 + i64::from(now.second());
    ((3600 - elapsed) + 59) / 60
}

impl AiUsage {
    pub async fn current_count(
        pool: &SqlitePool,
        user_id: Uuid,
        bucket: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"SELECT edit_count
               FROM ai_usage
               WHERE user_id = $1 AND hour_bucket = $2"#,
        )
        .bind(user_id)
        .bind(bucket)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|(count,)| count).unwrap_or(0))
    }

    /// Record one edit against the bucket, returning the new count.
    pub async fn increment(
        pool: &SqlitePool,
        user_id: Uuid,
        bucket: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            r#"INSERT INTO ai_usage (user_id, hour_bucket, edit_count)
               VALUES ($1, $2, 1)
               ON CONFLICT(user_id, hour_bucket) DO UPDATE SET
                   edit_count = ai_usage.edit_count + 1,
                   updated_at = CURRENT_TIMESTAMP
               RETURNING edit_count"#,
        )
        .bind(user_id)
        .bind(bucket)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[test]
    fn bucket_truncates_to_hour_start() {
        let now = "2026-08-30T14:37:52Z".parse::<DateTime<Utc>>().unwrap();
        let bucket = hour_bucket(now);
        assert_eq!(bucket.to_rfc3339(), "2026-08-30T14:00:00+00:00");
    }

    #[test]
    fn minutes_left_rounds_up_and_is_positive() {
        let late = "2026-08-30T14:59:30Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(minutes_until_next_hour(late), 1);
        let start = "2026-08-30T14:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(minutes_until_next_hour(start), 60);
    }

    #[tokio::test]
    async fn count_defaults_to_zero_and_increments() {
        let pool = test_pool().await;
        let user = Uuid::new_v4();
        let bucket = hour_bucket(Utc::now());

        assert_eq!(AiUsage::current_count(&pool, user, bucket).await.unwrap(), 0);
        assert_eq!(AiUsage::increment(&pool, user, bucket).await.unwrap(), 1);
        assert_eq!(AiUsage::increment(&pool, user, bucket).await.unwrap(), 2);
        assert_eq!(AiUsage::current_count(&pool, user, bucket).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn buckets_are_isolated_per_user_and_hour() {
        let pool = test_pool().await;
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let bucket = hour_bucket(Utc::now());
        let next = bucket + chrono::Duration::hours(1);

        AiUsage::increment(&pool, a, bucket).await.unwrap();
        assert_eq!(AiUsage::current_count(&pool, b, bucket).await.unwrap(), 0);
        assert_eq!(AiUsage::current_count(&pool, a, next).await.unwrap(), 0);
    }
}
