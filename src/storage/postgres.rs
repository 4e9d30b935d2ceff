use crate::models::{
    AccessEvent, Ad, AdSummary, ConversionEvent, Media, MediaSummary, NewAccess, ReportPeriod,
};
use crate::storage::trait_def::unix_now;
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

const ACCESS_COLUMNS: &str = "access_id, unique_id, referrer, ad_code, ip_address, user_agent, page, history, created_at, updated_at";

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS media (
                media_id BIGSERIAL PRIMARY KEY,
                name TEXT,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ads (
                ad_id BIGSERIAL PRIMARY KEY,
                media_id BIGINT NOT NULL REFERENCES media(media_id),
                name TEXT NOT NULL DEFAULT '',
                code TEXT NOT NULL UNIQUE,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accesses (
                access_id BIGSERIAL PRIMARY KEY,
                unique_id TEXT NOT NULL DEFAULT '',
                referrer TEXT,
                ad_code TEXT,
                ip_address TEXT,
                user_agent TEXT,
                page TEXT,
                history BIGINT NOT NULL DEFAULT 0,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_accesses_unique_id ON accesses(unique_id)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_accesses_ad_code ON accesses(ad_code)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversions (
                conversion_id BIGSERIAL PRIMARY KEY,
                order_id BIGINT NOT NULL UNIQUE,
                unique_id TEXT NOT NULL,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversions_unique_id ON conversions(unique_id)",
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn create_media(&self, name: &str) -> Result<Media> {
        let now = unix_now();

        let media = sqlx::query_as::<_, Media>(
            r#"
            INSERT INTO media (name, created_at, updated_at, is_active)
            VALUES ($1, $2, $2, TRUE)
            RETURNING media_id, name, created_at, updated_at, is_active
            "#,
        )
        .bind(name)
        .bind(now)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(media)
    }

    async fn create_ad(&self, media_id: i64, name: &str, code: &str) -> StorageResult<Ad> {
        let now = unix_now();

        let ad = sqlx::query_as::<_, Ad>(
            r#"
            INSERT INTO ads (media_id, name, code, created_at, updated_at, is_active)
            VALUES ($1, $2, $3, $4, $4, TRUE)
            ON CONFLICT (code) DO NOTHING
            RETURNING ad_id, media_id, name, code, created_at, updated_at, is_active
            "#,
        )
        .bind(media_id)
        .bind(name)
        .bind(code)
        .bind(now)
        .fetch_optional(self.pool.as_ref())
        .await?;

        ad.ok_or(StorageError::Conflict)
    }

    async fn deactivate_media(&self, media_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE media
            SET is_active = FALSE, updated_at = $1
            WHERE media_id = $2 AND is_active
            "#,
        )
        .bind(unix_now())
        .bind(media_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_ad(&self, ad_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE ads
            SET is_active = FALSE, updated_at = $1
            WHERE ad_id = $2 AND is_active
            "#,
        )
        .bind(unix_now())
        .bind(ad_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_media(&self) -> Result<Vec<Media>> {
        let media = sqlx::query_as::<_, Media>(
            r#"
            SELECT media_id, name, created_at, updated_at, is_active
            FROM media
            WHERE is_active
            ORDER BY media_id
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(media)
    }

    async fn list_ads(&self) -> Result<Vec<Ad>> {
        let ads = sqlx::query_as::<_, Ad>(
            r#"
            SELECT ad_id, media_id, name, code, created_at, updated_at, is_active
            FROM ads
            WHERE is_active
            ORDER BY ad_id
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(ads)
    }

    async fn get_active_ad_by_code(&self, code: &str) -> Result<Option<Ad>> {
        let ad = sqlx::query_as::<_, Ad>(
            r#"
            SELECT ad_id, media_id, name, code, created_at, updated_at, is_active
            FROM ads
            WHERE code = $1 AND is_active
            "#,
        )
        .bind(code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(ad)
    }

    async fn find_open_access(
        &self,
        unique_id: &str,
        active_after: i64,
    ) -> Result<Option<AccessEvent>> {
        let access = sqlx::query_as::<_, AccessEvent>(&format!(
            r#"
            SELECT {ACCESS_COLUMNS}
            FROM accesses
            WHERE unique_id = $1 AND updated_at > $2
            ORDER BY updated_at DESC, access_id DESC
            LIMIT 1
            "#
        ))
        .bind(unique_id)
        .bind(active_after)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(access)
    }

    async fn insert_access(&self, access: &NewAccess) -> Result<AccessEvent> {
        let row = sqlx::query_as::<_, AccessEvent>(&format!(
            r#"
            INSERT INTO accesses
                (unique_id, referrer, ad_code, ip_address, user_agent, page, history, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $7)
            RETURNING {ACCESS_COLUMNS}
            "#
        ))
        .bind(&access.unique_id)
        .bind(&access.referrer)
        .bind(&access.ad_code)
        .bind(&access.ip_address)
        .bind(&access.user_agent)
        .bind(&access.page)
        .bind(access.created_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row)
    }

    async fn increment_access_history(&self, access_id: i64, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE accesses
            SET history = history + 1, updated_at = $1
            WHERE access_id = $2
            "#,
        )
        .bind(now)
        .bind(access_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_accesses_by_visitor(&self, unique_id: &str) -> Result<Vec<AccessEvent>> {
        let rows = sqlx::query_as::<_, AccessEvent>(&format!(
            r#"
            SELECT {ACCESS_COLUMNS}
            FROM accesses
            WHERE unique_id = $1
            ORDER BY access_id
            "#
        ))
        .bind(unique_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows)
    }

    async fn has_access(&self, unique_id: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (SELECT 1 FROM accesses WHERE unique_id = $1)
            "#,
        )
        .bind(unique_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(exists)
    }

    async fn get_conversion_by_order(&self, order_id: i64) -> Result<Option<ConversionEvent>> {
        let conversion = sqlx::query_as::<_, ConversionEvent>(
            r#"
            SELECT conversion_id, order_id, unique_id, created_at
            FROM conversions
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(conversion)
    }

    async fn insert_conversion(
        &self,
        order_id: i64,
        unique_id: &str,
        created_at: i64,
    ) -> StorageResult<ConversionEvent> {
        let conversion = sqlx::query_as::<_, ConversionEvent>(
            r#"
            INSERT INTO conversions (order_id, unique_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING conversion_id, order_id, unique_id, created_at
            "#,
        )
        .bind(order_id)
        .bind(unique_id)
        .bind(created_at)
        .fetch_optional(self.pool.as_ref())
        .await?;

        conversion.ok_or(StorageError::Conflict)
    }

    async fn media_summary(&self, period: &ReportPeriod) -> Result<Vec<MediaSummary>> {
        let rows = sqlx::query_as::<_, MediaSummary>(
            r#"
            SELECT
                m.media_id,
                m.name AS media_name,
                COUNT(x.access_id) AS total_accesses,
                COUNT(DISTINCT x.unique_id) AS unique_visitors,
                (
                    SELECT COUNT(*)
                    FROM conversions c
                    JOIN accesses y ON y.access_id = (
                        SELECT l.access_id
                        FROM accesses l
                        WHERE l.unique_id = c.unique_id
                          AND l.ad_code IS NOT NULL
                          AND l.created_at <= c.created_at
                        ORDER BY l.created_at DESC, l.access_id DESC
                        LIMIT 1
                    )
                    JOIN ads b ON b.code = y.ad_code
                    WHERE b.media_id = m.media_id
                      AND b.is_active
                      AND ($1::BIGINT IS NULL OR y.created_at >= $1)
                      AND ($2::BIGINT IS NULL OR y.created_at < $2)
                ) AS conversions
            FROM media m
            LEFT JOIN ads a ON a.media_id = m.media_id AND a.is_active
            LEFT JOIN accesses x ON x.ad_code = a.code
                AND ($1::BIGINT IS NULL OR x.created_at >= $1)
                AND ($2::BIGINT IS NULL OR x.created_at < $2)
            WHERE m.is_active
            GROUP BY m.media_id, m.name
            ORDER BY m.media_id
            "#,
        )
        .bind(period.start)
        .bind(period.end)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows)
    }

    async fn ad_summary(&self, period: &ReportPeriod) -> Result<Vec<AdSummary>> {
        let rows = sqlx::query_as::<_, AdSummary>(
            r#"
            SELECT
                a.ad_id,
                a.name AS ad_name,
                a.code AS ad_code,
                a.media_id,
                COUNT(x.access_id) AS total_accesses,
                COUNT(DISTINCT x.unique_id) AS unique_visitors,
                (
                    SELECT COUNT(*)
                    FROM conversions c
                    JOIN accesses y ON y.access_id = (
                        SELECT l.access_id
                        FROM accesses l
                        WHERE l.unique_id = c.unique_id
                          AND l.ad_code IS NOT NULL
                          AND l.created_at <= c.created_at
                        ORDER BY l.created_at DESC, l.access_id DESC
                        LIMIT 1
                    )
                    WHERE y.ad_code = a.code
                      AND ($1::BIGINT IS NULL OR y.created_at >= $1)
                      AND ($2::BIGINT IS NULL OR y.created_at < $2)
                ) AS conversions
            FROM ads a
            LEFT JOIN accesses x ON x.ad_code = a.code
                AND ($1::BIGINT IS NULL OR x.created_at >= $1)
                AND ($2::BIGINT IS NULL OR x.created_at < $2)
            WHERE a.is_active
            GROUP BY a.ad_id, a.name, a.code, a.media_id
            ORDER BY a.ad_id
            "#,
        )
        .bind(period.start)
        .bind(period.end)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows)
    }
}
