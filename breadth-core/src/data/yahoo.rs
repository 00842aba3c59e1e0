//! Yahoo Finance price source.
//!
//! Fetches daily closes from Yahoo's v8 chart API. The chart endpoint serves
//! one symbol per request, so a batch fans its symbols out over the rayon
//! pool and collects them into one response table. Each request retries with
//! exponential backoff and respects the shared circuit breaker.
//!
//! The endpoint is unofficial; payload changes surface as `ResponseFormatChanged`.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{BatchResponse, DataError, DataProvider, PriceSeries};
use chrono::{NaiveDate, NaiveTime};
use rayon::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

// ── v8 chart payload ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartSeries>>,
    #[serde(default)]
    error: Option<ChartFault>,
}

#[derive(Debug, Deserialize)]
struct ChartFault {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartSeries {
    meta: Option<ChartMeta>,
    #[serde(rename = "timestamp", default)]
    timestamps: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds (19800 for NSE).
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<QuoteBlock>,
    #[serde(default)]
    adjclose: Vec<AdjCloseBlock>,
}

#[derive(Debug, Deserialize)]
struct QuoteBlock {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseBlock {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// What one HTTP attempt produced.
#[derive(Debug)]
enum Attempt {
    Done(Result<PriceSeries, DataError>),
    /// Worth another try, optionally no sooner than the server asked.
    Retry(DataError, Option<Duration>),
}

/// Longest server-requested wait honoured between attempts.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(10);

/// Sort a non-success status into a final outcome or a retry. Only 403 is
/// treated as a ban; rate limits and server errors stay per-request.
fn classify_failure(
    status: reqwest::StatusCode,
    retry_after: Option<&str>,
    symbol: &str,
) -> Attempt {
    match status {
        reqwest::StatusCode::FORBIDDEN => Attempt::Done(Err(DataError::CircuitBreakerTripped)),
        reqwest::StatusCode::NOT_FOUND => Attempt::Done(Err(DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        })),
        reqwest::StatusCode::TOO_MANY_REQUESTS => {
            let hinted = retry_after.and_then(|v| v.trim().parse::<u64>().ok());
            Attempt::Retry(
                DataError::RateLimited {
                    retry_after_secs: hinted.unwrap_or(60),
                },
                hinted.map(Duration::from_secs),
            )
        }
        s if s.is_server_error() => {
            Attempt::Retry(DataError::Other(format!("HTTP {s} for {symbol}")), None)
        }
        s => Attempt::Done(Err(DataError::Other(format!("HTTP {s} for {symbol}")))),
    }
}

/// Wait before retry number `attempt` (1-based): exponential backoff, or the
/// server's Retry-After if longer, capped at [`MAX_RETRY_AFTER`].
fn retry_delay(base: Duration, attempt: u32, hint: Option<Duration>) -> Duration {
    let backoff = base * 2u32.pow(attempt.saturating_sub(1));
    match hint {
        Some(hint) => backoff.max(hint.min(MAX_RETRY_AFTER)),
        None => backoff,
    }
}

/// Daily closes from Yahoo Finance, one chart request per symbol.
pub struct YahooProvider {
    http: reqwest::blocking::Client,
    breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooProvider {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Other(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            breaker,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    /// Chart endpoint for `symbol` over `[start, end)` at daily resolution.
    fn chart_url(symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let epoch = |d: NaiveDate| d.and_time(NaiveTime::MIN).and_utc().timestamp();
        format!(
            "https://query2.finance.yahoo.com/v8/finance/chart/{symbol}\
             ?period1={}&period2={}&interval=1d&includeAdjustedClose=true",
            epoch(start),
            epoch(end)
        )
    }

    /// Turn a chart payload into a close series.
    ///
    /// Timestamps are shifted by the exchange offset before taking the date,
    /// so an NSE session opening at 09:15 IST lands on its local day.
    fn parse_response(symbol: &str, envelope: ChartEnvelope) -> Result<PriceSeries, DataError> {
        let body = envelope.chart;
        let Some(results) = body.result else {
            return Err(match body.error {
                Some(fault) if fault.code == "Not Found" => DataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                },
                Some(fault) => DataError::ResponseFormatChanged(format!(
                    "{}: {}",
                    fault.code, fault.description
                )),
                None => DataError::ResponseFormatChanged("chart has neither result nor error".into()),
            });
        };
        let data = results
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("chart result is empty".into()))?;

        let offset = data.meta.map_or(0, |m| m.gmtoffset);
        let closes = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("chart has no quote block".into()))?
            .close;
        let adjusted = data.indicators.adjclose.into_iter().next().map(|a| a.adjclose);

        let n = data.timestamps.len();
        let mut series = PriceSeries {
            dates: Vec::with_capacity(n),
            close: Vec::with_capacity(n),
            adj_close: adjusted.as_ref().map(|_| Vec::with_capacity(n)),
        };

        for (i, ts) in data.timestamps.into_iter().enumerate() {
            let close = closes.get(i).copied().flatten();
            let adj = adjusted.as_ref().and_then(|a| a.get(i).copied().flatten());
            // Non-trading placeholders carry no prices at all.
            if close.is_none() && adj.is_none() {
                continue;
            }
            let date = chrono::DateTime::from_timestamp(ts + offset, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| DataError::ResponseFormatChanged(format!("bad timestamp {ts}")))?;

            series.dates.push(date);
            series.close.push(close);
            if let Some(out) = series.adj_close.as_mut() {
                out.push(adj);
            }
        }

        if series.is_empty() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        Ok(series)
    }

    /// One request. Rate limits, server errors and connection failures are
    /// worth another attempt; everything else is final.
    fn attempt(&self, url: &str, symbol: &str) -> Attempt {
        let resp = match self.http.get(url).send() {
            Ok(resp) => resp,
            Err(e) if e.is_connect() || e.is_timeout() => {
                return Attempt::Retry(DataError::NetworkUnreachable(e.to_string()), None)
            }
            Err(e) => return Attempt::Done(Err(DataError::NetworkUnreachable(e.to_string()))),
        };

        let status = resp.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::FORBIDDEN {
                self.breaker.trip();
            }
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok());
            return classify_failure(status, retry_after, symbol);
        }

        let parsed = resp
            .json::<ChartEnvelope>()
            .map_err(|e| DataError::ResponseFormatChanged(format!("unreadable chart for {symbol}: {e}")))
            .and_then(|envelope| Self::parse_response(symbol, envelope));
        Attempt::Done(parsed)
    }

    /// Fetch one symbol, backing off exponentially between attempts.
    fn fetch_symbol(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, DataError> {
        let url = Self::chart_url(symbol, start, end);
        let mut last_error = DataError::Other(format!("no attempt made for {symbol}"));
        let mut hint = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = retry_delay(self.base_delay, attempt, hint);
                tracing::debug!(symbol, attempt, ?delay, "backing off");
                std::thread::sleep(delay);
            }
            if !self.breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped);
            }
            match self.attempt(&url, symbol) {
                Attempt::Done(result) => return result,
                Attempt::Retry(e, retry_after) => {
                    last_error = e;
                    hint = retry_after;
                }
            }
        }
        Err(last_error)
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    /// One-symbol batches come back as `Single`; larger batches as `Multi`
    /// with undelivered symbols present as `None`.
    fn fetch_batch(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BatchResponse, DataError> {
        if !self.breaker.is_allowed() {
            return Err(DataError::CircuitBreakerTripped);
        }

        let fetched: Vec<(String, Result<PriceSeries, DataError>)> = symbols
            .par_iter()
            .map(|symbol| (symbol.clone(), self.fetch_symbol(symbol, start, end)))
            .collect();

        BatchResponse::from_symbol_results(fetched)
    }

    fn is_available(&self) -> bool {
        self.breaker.is_allowed()
    }
}
