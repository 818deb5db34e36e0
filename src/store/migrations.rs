// =============================================================================
// Schema bootstrap — plain idempotent SQL, not a migration framework
// =============================================================================
//
// The Non-goals exclude a general-purpose framework; this mirrors the
// teacher's preference for explicit, inspectable SQL over ORM machinery.
// Hypertable/continuous-aggregate calls assume a Timescale-compatible store;
// they are no-ops (logged, non-fatal) against a plain Postgres instance used
// in tests.

use sqlx::PgPool;
use tracing::{info, warn};

const TABLES: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS ticks (
        id UUID PRIMARY KEY,
        ts TIMESTAMPTZ NOT NULL,
        symbol TEXT NOT NULL,
        side TEXT NOT NULL,
        price DOUBLE PRECISION NOT NULL,
        volume_shares DOUBLE PRECISION NOT NULL,
        volume_lots DOUBLE PRECISION NOT NULL,
        total_value DOUBLE PRECISION NOT NULL,
        board TEXT NOT NULL,
        trade_number BIGINT,
        civil_date DATE NOT NULL,
        UNIQUE (symbol, trade_number, board, civil_date)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS candles (
        symbol TEXT NOT NULL,
        bucket TIMESTAMPTZ NOT NULL,
        interval TEXT NOT NULL,
        open DOUBLE PRECISION NOT NULL,
        high DOUBLE PRECISION NOT NULL,
        low DOUBLE PRECISION NOT NULL,
        close DOUBLE PRECISION NOT NULL,
        volume_shares DOUBLE PRECISION NOT NULL,
        volume_lots DOUBLE PRECISION NOT NULL,
        total_value DOUBLE PRECISION NOT NULL,
        trade_count BIGINT NOT NULL,
        dominant_board TEXT NOT NULL,
        PRIMARY KEY (symbol, bucket, interval)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS baselines (
        symbol TEXT NOT NULL,
        calculated_at TIMESTAMPTZ NOT NULL,
        lookback_hours INT NOT NULL,
        sample_size BIGINT NOT NULL,
        price_mean DOUBLE PRECISION NOT NULL,
        price_stddev DOUBLE PRECISION NOT NULL,
        price_median DOUBLE PRECISION NOT NULL,
        price_p25 DOUBLE PRECISION NOT NULL,
        price_p75 DOUBLE PRECISION NOT NULL,
        volume_mean DOUBLE PRECISION NOT NULL,
        volume_stddev DOUBLE PRECISION NOT NULL,
        volume_median DOUBLE PRECISION NOT NULL,
        volume_p25 DOUBLE PRECISION NOT NULL,
        volume_p75 DOUBLE PRECISION NOT NULL,
        value_mean DOUBLE PRECISION NOT NULL,
        value_stddev DOUBLE PRECISION NOT NULL,
        value_median DOUBLE PRECISION NOT NULL,
        value_p25 DOUBLE PRECISION NOT NULL,
        value_p75 DOUBLE PRECISION NOT NULL,
        PRIMARY KEY (symbol, calculated_at)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS regimes (
        symbol TEXT NOT NULL,
        detected_at TIMESTAMPTZ NOT NULL,
        regime TEXT NOT NULL,
        confidence DOUBLE PRECISION NOT NULL,
        atr DOUBLE PRECISION NOT NULL,
        ema_slope_pct DOUBLE PRECISION NOT NULL,
        volatility_pct DOUBLE PRECISION NOT NULL,
        price_change_pct DOUBLE PRECISION NOT NULL,
        sample_insufficient BOOLEAN NOT NULL DEFAULT FALSE,
        PRIMARY KEY (symbol, detected_at)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS order_flow (
        symbol TEXT NOT NULL,
        bucket TIMESTAMPTZ NOT NULL,
        buy_volume_lots DOUBLE PRECISION NOT NULL,
        sell_volume_lots DOUBLE PRECISION NOT NULL,
        buy_trade_count BIGINT NOT NULL,
        sell_trade_count BIGINT NOT NULL,
        buy_value DOUBLE PRECISION NOT NULL,
        sell_value DOUBLE PRECISION NOT NULL,
        volume_imbalance_ratio DOUBLE PRECISION NOT NULL,
        value_imbalance_ratio DOUBLE PRECISION NOT NULL,
        delta_volume DOUBLE PRECISION NOT NULL,
        aggressive_buy_pct DOUBLE PRECISION,
        PRIMARY KEY (symbol, bucket)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS whale_alerts (
        id UUID PRIMARY KEY,
        detected_at TIMESTAMPTZ NOT NULL,
        symbol TEXT NOT NULL,
        alert_type TEXT NOT NULL,
        side TEXT NOT NULL,
        trigger_price DOUBLE PRECISION NOT NULL,
        trigger_volume_lots DOUBLE PRECISION NOT NULL,
        trigger_value DOUBLE PRECISION NOT NULL,
        pattern_trade_count INT NOT NULL,
        z_score DOUBLE PRECISION NOT NULL,
        volume_vs_avg_pct DOUBLE PRECISION NOT NULL,
        avg_price DOUBLE PRECISION,
        confidence_score DOUBLE PRECISION NOT NULL,
        adaptive_threshold DOUBLE PRECISION NOT NULL,
        volatility_pct DOUBLE PRECISION NOT NULL,
        board TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS signals (
        id UUID PRIMARY KEY,
        generated_at TIMESTAMPTZ NOT NULL,
        symbol TEXT NOT NULL,
        strategy TEXT NOT NULL,
        decision TEXT NOT NULL,
        confidence DOUBLE PRECISION NOT NULL,
        trigger_price DOUBLE PRECISION NOT NULL,
        trigger_volume_lots DOUBLE PRECISION NOT NULL,
        price_z DOUBLE PRECISION NOT NULL,
        volume_z DOUBLE PRECISION NOT NULL,
        price_change_pct DOUBLE PRECISION NOT NULL,
        reason TEXT NOT NULL,
        regime TEXT,
        whale_alert_id UUID REFERENCES whale_alerts(id),
        analysis_data JSONB,
        accepted BOOLEAN NOT NULL,
        trade_class TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS outcomes (
        signal_id UUID PRIMARY KEY REFERENCES signals(id),
        symbol TEXT NOT NULL,
        entry_time TIMESTAMPTZ NOT NULL,
        entry_price DOUBLE PRECISION NOT NULL,
        entry_decision TEXT NOT NULL,
        atr_at_entry DOUBLE PRECISION NOT NULL,
        trailing_stop_price DOUBLE PRECISION NOT NULL,
        exit_time TIMESTAMPTZ,
        exit_price DOUBLE PRECISION,
        exit_reason TEXT,
        holding_minutes DOUBLE PRECISION,
        price_change_pct DOUBLE PRECISION,
        profit_loss_pct DOUBLE PRECISION,
        mfe DOUBLE PRECISION NOT NULL DEFAULT 0,
        mae DOUBLE PRECISION NOT NULL DEFAULT 0,
        risk_reward_ratio DOUBLE PRECISION,
        status TEXT NOT NULL,
        trade_class TEXT NOT NULL,
        rejection_reason TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS webhook_deliveries (
        id UUID PRIMARY KEY,
        sent_at TIMESTAMPTZ NOT NULL,
        url TEXT NOT NULL,
        event_name TEXT NOT NULL,
        symbol TEXT,
        attempts INT NOT NULL,
        success BOOLEAN NOT NULL,
        status_code INT,
        error TEXT
    )"#,
];

const HYPERTABLE_CALLS: &[&str] = &[
    "SELECT create_hypertable('ticks', 'ts', if_not_exists => TRUE)",
    "SELECT create_hypertable('candles', 'bucket', if_not_exists => TRUE)",
];

/// Run all schema-bootstrap statements. Table creation failures are fatal
/// (the process cannot safely proceed without its schema); hypertable
/// conversion failures are logged and ignored, since a plain Postgres
/// instance without the Timescale extension is still usable for tests.
pub async fn bootstrap(pool: &PgPool) -> anyhow::Result<()> {
    for stmt in TABLES {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .map_err(|e| anyhow::anyhow!("schema bootstrap failed: {e}"))?;
    }
    info!(tables = TABLES.len(), "schema bootstrap complete");

    for stmt in HYPERTABLE_CALLS {
        if let Err(e) = sqlx::query(stmt).execute(pool).await {
            warn!(error = %e, "hypertable conversion skipped (non-Timescale store?)");
        }
    }

    Ok(())
}
