use std::path::PathBuf;

/// Runtime configuration, read once from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub country: String,
    pub ecos_api_key: Option<String>,
    pub fred_api_key: Option<String>,
    pub airkorea_api_key: Option<String>,
    pub eia_api_key: Option<String>,
    pub waqi_token: String,
    pub ecos_base: String,
    pub fred_base: String,
    pub airkorea_base: String,
    pub waqi_base: String,
    pub eia_base: String,
    pub stooq_base: String,
    pub cache_ttl_secs: u64,
    pub sqlite_path: Option<String>,
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    pub fetch_timeout_secs: u64,
    pub fetch_retries: u32,
    pub backoff_base_ms: u64,
    pub gauge_catalog: Option<PathBuf>,
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            country: std::env::var("COUNTRY").unwrap_or_else(|_| "KR".to_string()).to_uppercase(),
            ecos_api_key: non_empty("ECOS_API_KEY"),
            fred_api_key: non_empty("FRED_API_KEY"),
            airkorea_api_key: non_empty("AIRKOREA_API_KEY"),
            eia_api_key: non_empty("EIA_API_KEY"),
            waqi_token: non_empty("WAQI_TOKEN").unwrap_or_else(|| "demo".to_string()),
            ecos_base: std::env::var("ECOS_BASE").unwrap_or_else(|_| "https://ecos.bok.or.kr/api".to_string()),
            fred_base: std::env::var("FRED_BASE").unwrap_or_else(|_| "https://api.stlouisfed.org/fred".to_string()),
            airkorea_base: std::env::var("AIRKOREA_BASE").unwrap_or_else(|_| "https://apis.data.go.kr/B552584/ArpltnInforInqireSvc".to_string()),
            waqi_base: std::env::var("WAQI_BASE").unwrap_or_else(|_| "https://api.waqi.info".to_string()),
            eia_base: std::env::var("EIA_BASE").unwrap_or_else(|_| "https://api.eia.gov/v2".to_string()),
            stooq_base: std::env::var("STOOQ_BASE").unwrap_or_else(|_| "https://stooq.com".to_string()),
            cache_ttl_secs: std::env::var("CACHE_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(6 * 3600),
            sqlite_path: non_empty("SQLITE_PATH"),
            batch_size: std::env::var("BATCH_SIZE").ok().and_then(|v| v.parse().ok()).filter(|n| *n > 0).unwrap_or(10),
            batch_pause_ms: std::env::var("BATCH_PAUSE_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(100),
            fetch_timeout_secs: std::env::var("FETCH_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(15),
            fetch_retries: std::env::var("FETCH_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(2),
            backoff_base_ms: std::env::var("BACKOFF_BASE_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(1000),
            gauge_catalog: non_empty("GAUGE_CATALOG").map(PathBuf::from),
        }
    }
}

pub fn now_ts() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// "6h", "90m", "45s"
pub fn ttl_label(secs: u64) -> String {
    if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_label() {
        assert_eq!(ttl_label(21_600), "6h");
        assert_eq!(ttl_label(5_400), "90m");
        assert_eq!(ttl_label(45), "45s");
    }

    #[test]
    fn test_defaults_are_sane() {
        let cfg = Config::from_env();
        assert!(cfg.batch_size > 0);
        assert!(!cfg.waqi_token.is_empty());
        assert_eq!(cfg.country, cfg.country.to_uppercase());
    }
}
