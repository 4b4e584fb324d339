//! RSI (Relative Strength Index) with exponentially weighted averages.
//!
//! Gains and losses are averaged with an adjusted exponential weighting,
//! alpha = 1 / period (centre of mass = period - 1):
//!
//!   avg_t = sum_i (1 - alpha)^i * x_{t-i} / sum_i (1 - alpha)^i
//!
//! RSI = 100 - (100 / (1 + avg_gain / avg_loss)); if avg_loss == 0: RSI = 100.
//!
//! Warmup: undefined until `period` price changes have been observed, so the
//! first defined value is at index `period`.

pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut values = Vec::with_capacity(closes.len());
    if closes.is_empty() {
        return values;
    }
    values.push(None);
    if period == 0 {
        values.resize(closes.len(), None);
        return values;
    }

    let decay = 1.0 - 1.0 / period as f64;
    let mut gain_num = 0.0;
    let mut loss_num = 0.0;
    let mut weight = 0.0;

    for i in 1..closes.len() {
        let change = closes[i] - closes[i - 1];
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };

        gain_num = gain + decay * gain_num;
        loss_num = loss + decay * loss_num;
        weight = 1.0 + decay * weight;

        if i < period {
            values.push(None);
            continue;
        }

        let avg_gain = gain_num / weight;
        let avg_loss = loss_num / weight;
        let rsi = if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
        };
        values.push(Some(rsi));
    }

    values
}
