//! Feature and rollup expressions for the refined dataset.
//!
//! All windowed and lag features are computed within each symbol's
//! chronologically sorted series via `.over(symbol)` — never across
//! symbols. Rolling windows use `min_periods == window_size`, so a
//! symbol's warm-up rows come out null and are dropped afterwards:
//! feature completeness is privileged over row count.

use polars::prelude::*;

/// Canonical tall input schema, in output order.
pub const BASE_COLUMNS: [&str; 7] = [
    "trade_date",
    "symbol",
    "open",
    "high",
    "low",
    "close",
    "volume",
];

/// Engineered columns, in output order.
pub const FEATURE_COLUMNS: [&str; 9] = [
    "pct_change_intraday",
    "day_range",
    "close_ma_7",
    "close_ma_14",
    "close_ma_30",
    "volatility_7",
    "close_lag_1",
    "close_lag_2",
    "close_lag_3",
];

fn trailing(window_size: usize) -> RollingOptionsFixedWindow {
    RollingOptionsFixedWindow {
        window_size,
        min_periods: window_size,
        ..Default::default()
    }
}

/// The per-symbol feature set.
///
/// `volatility_7` is the trailing 7-observation **sample** standard
/// deviation of close (ddof = 1, the polars default).
pub fn feature_exprs() -> Vec<Expr> {
    vec![
        ((col("close") - col("open")) / col("open") * lit(100.0)).alias("pct_change_intraday"),
        (col("high") - col("low")).alias("day_range"),
        col("close")
            .rolling_mean(trailing(7))
            .over([col("symbol")])
            .alias("close_ma_7"),
        col("close")
            .rolling_mean(trailing(14))
            .over([col("symbol")])
            .alias("close_ma_14"),
        col("close")
            .rolling_mean(trailing(30))
            .over([col("symbol")])
            .alias("close_ma_30"),
        col("close")
            .rolling_std(trailing(7))
            .over([col("symbol")])
            .alias("volatility_7"),
        col("close")
            .shift(lit(1))
            .over([col("symbol")])
            .alias("close_lag_1"),
        col("close")
            .shift(lit(2))
            .over([col("symbol")])
            .alias("close_lag_2"),
        col("close")
            .shift(lit(3))
            .over([col("symbol")])
            .alias("close_lag_3"),
    ]
}

/// Calendar-month truncation of the trade date, the rollup's group key.
pub fn month_key() -> Expr {
    col("trade_date").dt().truncate(lit("1mo")).alias("month")
}

/// Monthly rollup aggregations over the refined rows.
pub fn monthly_aggs() -> Vec<Expr> {
    vec![
        col("close").mean().alias("close_mean"),
        col("close").min().alias("close_min"),
        col("close").max().alias("close_max"),
        col("volume").sum().alias("volume_sum"),
        col("volume").mean().alias("volume_mean"),
        col("pct_change_intraday").mean().alias("pct_change_mean"),
        col("volatility_7").mean().alias("volatility_mean"),
        col("trade_date")
            .n_unique()
            .cast(DataType::Int64)
            .alias("trading_days"),
    ]
}
