use anyhow::Result;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::domain::{StatisticPoint, StatisticsMetadata};

/// Create the statistics tables when they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS statistics_meta (
            statistic_id        TEXT PRIMARY KEY,
            source              TEXT NOT NULL,
            name                TEXT NOT NULL,
            unit_of_measurement TEXT NOT NULL,
            has_mean            BOOLEAN NOT NULL,
            has_sum             BOOLEAN NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS statistics (
            statistic_id TEXT NOT NULL REFERENCES statistics_meta (statistic_id),
            start        TIMESTAMPTZ NOT NULL,
            sum          DOUBLE PRECISION NOT NULL,
            state        DOUBLE PRECISION NOT NULL,
            PRIMARY KEY (statistic_id, start)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch the most recent persisted point for a statistic, if any.
pub async fn last_statistic(
    pool: &PgPool,
    statistic_id: &str,
) -> Result<Option<StatisticPoint>> {
    let point = sqlx::query_as::<_, StatisticPoint>(
        r#"
        SELECT start, sum, state
        FROM statistics
        WHERE statistic_id = $1
        ORDER BY start DESC
        LIMIT 1
        "#,
    )
    .bind(statistic_id)
    .fetch_optional(pool)
    .await?;

    Ok(point)
}

/// Insert or refresh the metadata row describing a statistic series.
pub async fn upsert_metadata(pool: &PgPool, meta: &StatisticsMetadata) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO statistics_meta (statistic_id, source, name, unit_of_measurement, has_mean, has_sum)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (statistic_id) DO UPDATE SET
            source = EXCLUDED.source,
            name = EXCLUDED.name,
            unit_of_measurement = EXCLUDED.unit_of_measurement,
            has_mean = EXCLUDED.has_mean,
            has_sum = EXCLUDED.has_sum
        "#,
    )
    .bind(&meta.statistic_id)
    .bind(&meta.source)
    .bind(&meta.name)
    .bind(&meta.unit_of_measurement)
    .bind(meta.has_mean)
    .bind(meta.has_sum)
    .execute(pool)
    .await?;

    Ok(())
}

/// Write a batch of points with a single statement so the batch lands
/// atomically. Re-imported hours overwrite the previous row instead of
/// failing on the primary key.
pub async fn insert_statistics(
    pool: &PgPool,
    statistic_id: &str,
    points: &[StatisticPoint],
) -> Result<()> {
    if points.is_empty() {
        return Ok(());
    }

    let mut builder = build_insert(statistic_id, points);
    let query = builder.build();
    query.execute(pool).await?;

    Ok(())
}

/// Assemble the batch insert. `push_values` emits the `VALUES` keyword
/// itself, so the prefix must stop at the column list.
fn build_insert<'args>(
    statistic_id: &'args str,
    points: &'args [StatisticPoint],
) -> QueryBuilder<'args, Postgres> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO statistics (statistic_id, start, sum, state) ",
    );

    builder.push_values(points, |mut b, p| {
        b.push_bind(statistic_id)
            .push_bind(p.start)
            .push_bind(p.sum)
            .push_bind(p.state);
    });
    builder.push(
        " ON CONFLICT (statistic_id, start) DO UPDATE SET sum = EXCLUDED.sum, state = EXCLUDED.state",
    );

    builder
}
