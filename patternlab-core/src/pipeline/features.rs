//! Candle-shape features and technical indicators.
//!
//! Output columns, appended in this order:
//! `body_size`, `body_ratio`, `direction`, `upper_shadow`, `lower_shadow`,
//! `upper_shadow_ratio`, `lower_shadow_ratio`, `price_change`,
//! `price_pct_change`, then per MA window `sma_w`, `volatility_w`,
//! `range_w`, then `rsi_p`, optional `ema_w`, `macd`, `macd_signal`,
//! `macd_hist`, `true_range`, `atr_p`, optional `bollinger_*`.
//!
//! Rows with any undefined value are dropped at the end, so the number of
//! rows lost equals the largest warm-up in play (EMA-26 by default).

use super::config::IndicatorConfig;
use crate::domain::frame::{CLOSE, HIGH, LOW, OPEN};
use crate::domain::BarFrame;
use crate::error::PipelineError;
use crate::indicators::{
    atr, bollinger, diff, ema, macd, pct_change, rolling_max, rolling_mean, rolling_min,
    rolling_std, rsi, true_range,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct FeatureEngineer {
    config: IndicatorConfig,
}

impl FeatureEngineer {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    pub fn engineer(&self, cleaned: &BarFrame) -> Result<BarFrame, PipelineError> {
        let mut frame = cleaned.clone();
        let open = cleaned.require(OPEN)?;
        let high = cleaned.require(HIGH)?;
        let low = cleaned.require(LOW)?;
        let close = cleaned.require(CLOSE)?;
        let n = cleaned.len();
        let cfg = &self.config;

        let mut body_size = Vec::with_capacity(n);
        let mut body_ratio = Vec::with_capacity(n);
        let mut direction = Vec::with_capacity(n);
        let mut upper = Vec::with_capacity(n);
        let mut lower = Vec::with_capacity(n);
        let mut upper_ratio = Vec::with_capacity(n);
        let mut lower_ratio = Vec::with_capacity(n);
        for i in 0..n {
            let (o, h, l, c) = (open[i], high[i], low[i], close[i]);
            let range = h - l;
            let body = (c - o).abs();
            let bullish = c >= o;
            let (up, down) = if bullish { (h - c, o - l) } else { (h - o, c - l) };
            body_size.push(body);
            body_ratio.push(guarded_ratio(body, range));
            direction.push(if bullish { 1.0 } else { -1.0 });
            upper.push(up);
            lower.push(down);
            upper_ratio.push(guarded_ratio(up, range));
            lower_ratio.push(guarded_ratio(down, range));
        }
        frame.set_column("body_size", body_size)?;
        frame.set_column("body_ratio", body_ratio)?;
        frame.set_column("direction", direction)?;
        frame.set_column("upper_shadow", upper)?;
        frame.set_column("lower_shadow", lower)?;
        frame.set_column("upper_shadow_ratio", upper_ratio)?;
        frame.set_column("lower_shadow_ratio", lower_ratio)?;

        frame.set_column("price_change", diff(close))?;
        frame.set_column(
            "price_pct_change",
            pct_change(close).into_iter().map(|p| p * 100.0).collect(),
        )?;

        for &w in &cfg.ma_windows {
            frame.set_column(format!("sma_{w}"), rolling_mean(close, w))?;
            frame.set_column(format!("volatility_{w}"), rolling_std(close, w))?;
            let hi = rolling_max(high, w);
            let lo = rolling_min(low, w);
            frame.set_column(
                format!("range_{w}"),
                hi.iter().zip(&lo).map(|(h, l)| h - l).collect(),
            )?;
        }

        frame.set_column(format!("rsi_{}", cfg.rsi_period), rsi(close, cfg.rsi_period))?;

        for &w in &cfg.ema_windows {
            frame.set_column(format!("ema_{w}"), ema(close, w, w))?;
        }

        let m = macd(close, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
        frame.set_column("macd", m.line)?;
        frame.set_column("macd_signal", m.signal)?;
        frame.set_column("macd_hist", m.histogram)?;

        frame.set_column("true_range", true_range(high, low, close))?;
        frame.set_column(
            format!("atr_{}", cfg.atr_period),
            atr(high, low, close, cfg.atr_period),
        )?;

        if cfg.bollinger {
            let b = bollinger(close, cfg.bollinger_period, cfg.bollinger_k);
            frame.set_column("bollinger_upper", b.upper)?;
            frame.set_column("bollinger_middle", b.middle)?;
            frame.set_column("bollinger_lower", b.lower)?;
        }

        let keep: Vec<bool> = (0..n).map(|i| !frame.row_has_nan(i)).collect();
        frame.retain_rows(&keep);
        let dropped = n - frame.len();
        if frame.is_empty() {
            warn!(
                timeframe = %frame.timeframe(),
                input = n,
                "every row dropped during indicator warm-up"
            );
        } else {
            debug!(timeframe = %frame.timeframe(), dropped, "dropped warm-up rows");
        }

        Ok(frame)
    }
}

fn guarded_ratio(num: f64, denom: f64) -> f64 {
    if denom == 0.0 {
        0.0
    } else {
        num / denom
    }
}
