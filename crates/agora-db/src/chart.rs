//! Fixed-window OHLCV aggregation over completed swaps.
//!
//! Prices are always expressed in the canonical orientation of a pair:
//! quote amount per base amount, where `base` is the lexicographically
//! smaller (lowercase) token address.

/// Orders two token addresses into `(base, quote)`.
pub fn canonical_pair(a: &str, b: &str) -> (String, String) {
    let a = a.to_ascii_lowercase();
    let b = b.to_ascii_lowercase();
    if a <= b { (a, b) } else { (b, a) }
}

/// Base/quote volumes and price of a swap in canonical orientation.
/// Returns `(base, quote, base_volume, quote_volume, price)`.
pub fn orient_swap(
    token_in: &str,
    token_out: &str,
    amount_in: f64,
    amount_out: f64,
) -> (String, String, f64, f64, f64) {
    let (base, quote) = canonical_pair(token_in, token_out);
    let (base_volume, quote_volume) = if token_in.eq_ignore_ascii_case(&base) {
        (amount_in, amount_out)
    } else {
        (amount_out, amount_in)
    };
    let price = quote_volume / base_volume;
    (base, quote, base_volume, quote_volume, price)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub timestamp: i64,
    pub price: f64,
    pub base_volume: f64,
    pub quote_volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trades: u64,
}

/// Epoch-aligned start of the window containing `timestamp`.
/// Saturates at `i64::MIN` for the few timestamps whose window starts below it.
pub fn bucket_start(timestamp: i64, interval_ms: i64) -> i64 {
    timestamp.saturating_sub(timestamp.rem_euclid(interval_ms))
}

/// Groups points into `interval_ms` windows. `points` must be ordered by
/// timestamp; windows without trades are not emitted.
pub fn build_candles(points: &[PricePoint], interval_ms: i64) -> Vec<Bucket> {
    let mut buckets: Vec<Bucket> = Vec::new();

    for p in points {
        let start = bucket_start(p.timestamp, interval_ms);
        match buckets.last_mut() {
            Some(b) if b.start == start => {
                b.high = b.high.max(p.price);
                b.low = b.low.min(p.price);
                b.close = p.price;
                b.volume += p.base_volume;
                b.quote_volume += p.quote_volume;
                b.trades += 1;
            }
            _ => buckets.push(Bucket {
                start,
                open: p.price,
                high: p.price,
                low: p.price,
                close: p.price,
                volume: p.base_volume,
                quote_volume: p.quote_volume,
                trades: 1,
            }),
        }
    }

    buckets
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowStats {
    pub volume: f64,
    pub quote_volume: f64,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub trades: u64,
    pub price_change_pct: f64,
}

/// Totals over an ordered window of points.
pub fn window_stats(points: &[PricePoint]) -> WindowStats {
    let mut stats = WindowStats::default();

    for p in points {
        stats.volume += p.base_volume;
        stats.quote_volume += p.quote_volume;
        stats.high = Some(stats.high.map_or(p.price, |h| h.max(p.price)));
        stats.low = Some(stats.low.map_or(p.price, |l| l.min(p.price)));
        stats.trades += 1;
    }

    if let (Some(first), Some(last)) = (points.first(), points.last()) {
        if first.price > 0.0 {
            stats.price_change_pct = (last.price - first.price) / first.price * 100.0;
        }
    }

    stats
}
