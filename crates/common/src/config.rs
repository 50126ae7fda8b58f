use std::env;
use std::str::FromStr;

use anyhow::Result;

const DEFAULT_STREAM_URL: &str = "wss://firehose.chirper.dev/v2/stream?follow=";

/// All recognized runtime options. Loaded once at startup from the
/// environment (a `.env` file is honored via dotenvy in the binary).
/// Brokerage credentials are read by the client itself, not held here.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base websocket URL of the social firehose; the author allow-list is
    /// appended as the follow filter.
    pub stream_url: String,
    /// Maximum notional to spend per immediate order.
    pub spend_limit: f64,
    /// Buffer before market close (seconds). New entries inside the buffer
    /// are rejected, and the deferred counter-order fires this long before
    /// the close.
    pub lead_time_secs: i64,
    /// When set, deferred counter-orders act on the full current holding
    /// instead of the originally computed quantity.
    pub liquidate_all: bool,
    /// Upper bound on normalized edit distance for fuzzy name matches.
    pub match_cutoff: f64,
    /// Upper bound on confidence x display-name length.
    pub weight_cutoff: f64,
    /// Minimum character count (whitespace excluded) for a noun span to be
    /// looked up.
    pub min_span_length: usize,
    /// Author ids whose posts are handled. Empty allows every author.
    pub author_allowlist: Vec<String>,
    /// Display names (lowercased, trimmed) that are never traded.
    pub instrument_denylist: Vec<String>,
    pub verbose: bool,
    /// Worker tasks handling posts concurrently.
    pub workers: usize,
    /// Capacity of the queue between the receive loop and the workers.
    pub queue_depth: usize,
}

impl Config {
    pub fn from_env() -> Result<Config> {
        Ok(Config {
            stream_url: env::var("STREAM_WS_URL")
                .unwrap_or_else(|_| DEFAULT_STREAM_URL.to_string()),
            spend_limit: parse_var("SPEND_LIMIT", 100.0)?,
            lead_time_secs: parse_var("LEAD_TIME_SECS", 3600)?,
            liquidate_all: parse_var("LIQUIDATE_ALL", false)?,
            match_cutoff: parse_var("MATCH_CUTOFF", 1.4)?,
            weight_cutoff: parse_var("WEIGHT_CUTOFF", 10.0)?,
            min_span_length: parse_var("MIN_SPAN_LENGTH", 4)?,
            author_allowlist: list_var("AUTHOR_ALLOWLIST"),
            instrument_denylist: list_var("INSTRUMENT_DENYLIST")
                .into_iter()
                .map(|name| name.to_lowercase())
                .collect(),
            verbose: parse_var("VERBOSE", true)?,
            workers: parse_var("WORKER_COUNT", 5)?,
            queue_depth: parse_var("QUEUE_DEPTH", 1024)?,
        })
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid value for {}: {:?}", name, raw))
}

fn list_var(name: &str) -> Vec<String> {
    match env::var(name) {
        Ok(raw) => split_list(&raw),
        Err(_) => Vec::new(),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}
