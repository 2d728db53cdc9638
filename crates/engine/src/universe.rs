use chrono::{DateTime, Duration, Utc};
use configuration::Config;
use core_types::from_exchange_id;
use serde::Deserialize;

/// The candidate list written by the external scanner.
#[derive(Debug, Deserialize)]
struct ScannerFile {
    scan_time: DateTime<Utc>,
    #[serde(default)]
    hot_symbols: Vec<HotSymbol>,
}

#[derive(Debug, Deserialize)]
struct HotSymbol {
    symbol: String,
}

/// Parses a scanner file and checks its freshness.
///
/// Returns the symbols in `BASE/QUOTE` notation, in scanner order, or a
/// reason the list cannot be used.
pub fn parse_scanner(contents: &str, now: DateTime<Utc>, max_age: Duration) -> Result<Vec<String>, String> {
    let file: ScannerFile = serde_json::from_str(contents).map_err(|e| format!("parse error: {e}"))?;

    let age = now - file.scan_time;
    if age > max_age {
        return Err(format!("list is stale ({} minutes old)", age.num_minutes()));
    }

    let mut symbols = Vec::with_capacity(file.hot_symbols.len());
    for hot in file.hot_symbols {
        match from_exchange_id(&hot.symbol) {
            Ok(symbol) if !symbols.contains(&symbol) => symbols.push(symbol),
            Ok(_) => {}
            Err(e) => tracing::debug!(symbol = %hot.symbol, error = %e, "Skipping unrecognised scanner symbol"),
        }
    }
    if symbols.is_empty() {
        return Err("list is empty".to_string());
    }
    Ok(symbols)
}

/// The symbols to scan this cycle: the scanner's list when it is enabled and
/// fresh, otherwise the static list from the configuration.
pub async fn resolve_universe(config: &Config) -> Vec<String> {
    let fallback = || config.trading.symbols.clone();
    if !config.scanner.enabled {
        return fallback();
    }

    let contents = match tokio::fs::read_to_string(&config.scanner.path).await {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!(path = %config.scanner.path, error = %e, "Scanner file unavailable, using static symbols");
            return fallback();
        }
    };

    let max_age = Duration::minutes(config.scanner.max_age_minutes);
    match parse_scanner(&contents, Utc::now(), max_age) {
        Ok(symbols) => {
            tracing::info!(count = symbols.len(), "Using scanner symbol list");
            symbols
        }
        Err(reason) => {
            tracing::warn!(path = %config.scanner.path, %reason, "Scanner list rejected, using static symbols");
            fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(scan_time: DateTime<Utc>, symbols: &[&str]) -> String {
        let hot: Vec<_> = symbols.iter().map(|s| serde_json::json!({ "symbol": s })).collect();
        serde_json::json!({ "scan_time": scan_time, "hot_symbols": hot }).to_string()
    }

    #[test]
    fn test_fresh_list_is_normalised() {
        let now = Utc::now();
        let contents = file(now - Duration::minutes(5), &["SOLUSDT", "BTC/USDT", "SOLUSDT", "???"]);
        let symbols = parse_scanner(&contents, now, Duration::minutes(30)).unwrap();
        assert_eq!(symbols, vec!["SOL/USDT".to_string(), "BTC/USDT".to_string()]);
    }

    #[test]
    fn test_stale_or_empty_list_is_rejected() {
        let now = Utc::now();
        let stale = file(now - Duration::minutes(31), &["ETHUSDT"]);
        assert!(parse_scanner(&stale, now, Duration::minutes(30)).unwrap_err().contains("stale"));

        let empty = file(now, &[]);
        assert!(parse_scanner(&empty, now, Duration::minutes(30)).is_err());
        assert!(parse_scanner("not json", now, Duration::minutes(30)).is_err());
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_static_list() {
        let mut config = Config::default();
        config.scanner.enabled = true;
        config.scanner.path = "/nonexistent/tradelane/hot_symbols.json".to_string();
        assert_eq!(resolve_universe(&config).await, config.trading.symbols);
    }
}
