//! Gauge model: static specifications and the observations produced for them.
//!
//! A `GaugeSpec` is configuration. An `Observation` is what a connector or the
//! derived resolver produced for one gauge in one cycle; it is never mutated
//! after construction.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub mod catalog;
pub mod registry;

pub use registry::GaugeRegistry;

// =============================================================================
// Axes (economic subsystems)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Monetary,
    Trade,
    Financial,
    Prices,
    Production,
    Consumption,
    Labor,
    RealEstate,
    Environment,
}

/// Which side of the dual lock an axis feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisGroup {
    /// Monetary, trade and financial-flow axes
    Input,
    /// Production, consumption and labor axes
    Output,
    /// Everything else; reported but never seals
    Context,
}

impl Axis {
    pub const ALL: [Axis; 9] = [
        Axis::Monetary,
        Axis::Trade,
        Axis::Financial,
        Axis::Prices,
        Axis::Production,
        Axis::Consumption,
        Axis::Labor,
        Axis::RealEstate,
        Axis::Environment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Monetary => "monetary",
            Axis::Trade => "trade",
            Axis::Financial => "financial",
            Axis::Prices => "prices",
            Axis::Production => "production",
            Axis::Consumption => "consumption",
            Axis::Labor => "labor",
            Axis::RealEstate => "real_estate",
            Axis::Environment => "environment",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Axis::Monetary => "Monetary conditions",
            Axis::Trade => "External trade",
            Axis::Financial => "Financial stability",
            Axis::Prices => "Price level",
            Axis::Production => "Production",
            Axis::Consumption => "Household consumption",
            Axis::Labor => "Labor market",
            Axis::RealEstate => "Real estate",
            Axis::Environment => "Environment",
        }
    }

    pub fn group(&self) -> AxisGroup {
        match self {
            Axis::Monetary | Axis::Trade | Axis::Financial => AxisGroup::Input,
            Axis::Production | Axis::Consumption | Axis::Labor => AxisGroup::Output,
            Axis::Prices | Axis::RealEstate | Axis::Environment => AxisGroup::Context,
        }
    }
}

// =============================================================================
// Static gauge configuration
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cycle {
    Daily,
    Monthly,
    Quarterly,
    Annual,
}

impl Cycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cycle::Daily => "daily",
            Cycle::Monthly => "monthly",
            Cycle::Quarterly => "quarterly",
            Cycle::Annual => "annual",
        }
    }
}

/// Documents how the bands were authored. Grading never reads it: a
/// low-is-bad gauge simply carries its danger band at low values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    HighIsBad,
    LowIsBad,
    BandIsBad,
}

/// Half-open numeric range `[min, max)`; `None` is unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Band {
    pub const fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    pub const fn below(max: f64) -> Self {
        Self::new(None, Some(max))
    }

    pub const fn between(min: f64, max: f64) -> Self {
        Self::new(Some(min), Some(max))
    }

    pub const fn at_least(min: f64) -> Self {
        Self::new(Some(min), None)
    }

    pub fn contains(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        let above_min = self.min.map_or(true, |m| value >= m);
        let below_max = self.max.map_or(true, |m| value < m);
        above_min && below_max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandName {
    Good,
    Warn,
    Danger,
    WarnLow,
    DangerLow,
}

impl BandName {
    pub fn as_str(&self) -> &'static str {
        match self {
            BandName::Good => "good",
            BandName::Warn => "warn",
            BandName::Danger => "danger",
            BandName::WarnLow => "warn_low",
            BandName::DangerLow => "danger_low",
        }
    }

    pub fn severity(&self) -> u8 {
        match self {
            BandName::Good => 1,
            BandName::Warn | BandName::WarnLow => 3,
            BandName::Danger | BandName::DangerLow => 5,
        }
    }
}

/// Named threshold bands. Two-sided gauges add `warn_low`/`danger_low`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub good: Option<Band>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn: Option<Band>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub danger: Option<Band>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn_low: Option<Band>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub danger_low: Option<Band>,
}

impl Thresholds {
    pub fn three(good: Band, warn: Band, danger: Band) -> Self {
        Self {
            good: Some(good),
            warn: Some(warn),
            danger: Some(danger),
            ..Default::default()
        }
    }

    pub fn with_low(mut self, warn_low: Band, danger_low: Band) -> Self {
        self.warn_low = Some(warn_low);
        self.danger_low = Some(danger_low);
        self
    }

    /// Declared bands, most severe first.
    pub fn bands(&self) -> Vec<(BandName, Band)> {
        [
            (BandName::Danger, self.danger),
            (BandName::DangerLow, self.danger_low),
            (BandName::Warn, self.warn),
            (BandName::WarnLow, self.warn_low),
            (BandName::Good, self.good),
        ]
        .into_iter()
        .filter_map(|(name, band)| band.map(|b| (name, b)))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.bands().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaMetric {
    Mom,
    Wow,
}

/// Period-over-period sensitivity. Can only raise severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaRule {
    pub enabled: bool,
    pub metric: DeltaMetric,
    pub warn_abs: f64,
    pub danger_abs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Scale(f64),
    Offset(f64),
    Negate,
}

impl Transform {
    pub fn apply(&self, raw: f64) -> f64 {
        match self {
            Transform::Scale(k) => raw * k,
            Transform::Offset(k) => raw + k,
            Transform::Negate => -raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Ecos,
    Fred,
    AirQuality,
    Commodity,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ecos => "ecos",
            Provider::Fred => "fred",
            Provider::AirQuality => "air_quality",
            Provider::Commodity => "commodity",
        }
    }
}

/// Provider-specific request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProviderRequest {
    Ecos { stat_code: String, item_code: String },
    Fred { series_id: String },
    AirQuality { sido: String, item: String, waqi_city: String },
    Commodity { eia_series: String, stooq_symbol: String },
}

impl ProviderRequest {
    pub fn provider(&self) -> Provider {
        match self {
            ProviderRequest::Ecos { .. } => Provider::Ecos,
            ProviderRequest::Fred { .. } => Provider::Fred,
            ProviderRequest::AirQuality { .. } => Provider::AirQuality,
            ProviderRequest::Commodity { .. } => Provider::Commodity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "formula", rename_all = "snake_case")]
pub enum Formula {
    Difference { minuend: String, subtrahend: String },
    Sum { terms: Vec<String> },
    Ratio { numerator: String, denominator: String },
    /// `(current - previous) / previous * 100` of a single dependency
    PeriodChange { source: String },
}

impl Formula {
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            Formula::Difference { minuend, subtrahend } => vec![minuend, subtrahend],
            Formula::Sum { terms } => terms.iter().map(String::as_str).collect(),
            Formula::Ratio { numerator, denominator } => vec![numerator, denominator],
            Formula::PeriodChange { source } => vec![source],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    DirectApi(ProviderRequest),
    Derived(Formula),
    Manual,
    SatellitePending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaugeSpec {
    pub id: String,
    pub name: String,
    pub axis: Axis,
    pub source: SourceKind,
    pub cycle: Cycle,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    pub polarity: Polarity,
    pub thresholds: Thresholds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<DeltaRule>,
}

// =============================================================================
// Observations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObsStatus {
    Ok,
    NoData,
    ApiError,
    Pending,
    NeedsCalc,
}

impl ObsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObsStatus::Ok => "OK",
            ObsStatus::NoData => "NO_DATA",
            ObsStatus::ApiError => "API_ERROR",
            ObsStatus::Pending => "PENDING",
            ObsStatus::NeedsCalc => "NEEDS_CALC",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "OK" => ObsStatus::Ok,
            "NO_DATA" => ObsStatus::NoData,
            "PENDING" => ObsStatus::Pending,
            "NEEDS_CALC" => ObsStatus::NeedsCalc,
            _ => ObsStatus::ApiError,
        }
    }
}

/// Classified failure carried on an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Timeout,
    RateLimited,
    ServerError,
    InvalidKey,
    NoData,
    AllSourcesFailed,
    NeedsCalc,
    Pending,
    /// Transport or parse failure outside the named classes
    Transport,
}

impl ErrorKind {
    pub fn status(&self) -> ObsStatus {
        match self {
            ErrorKind::NoData => ObsStatus::NoData,
            ErrorKind::NeedsCalc => ObsStatus::NeedsCalc,
            ErrorKind::Pending => ObsStatus::Pending,
            _ => ObsStatus::ApiError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub gauge_id: String,
    pub value: Option<f64>,
    pub prev_value: Option<f64>,
    pub date: Option<NaiveDate>,
    pub status: ObsStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    pub latency_ms: u64,
    pub source: String,
}

impl Observation {
    pub fn ok(
        gauge_id: &str,
        value: f64,
        prev_value: Option<f64>,
        date: NaiveDate,
        latency_ms: u64,
        source: &str,
    ) -> Self {
        Self {
            gauge_id: gauge_id.to_string(),
            value: Some(value),
            prev_value,
            date: Some(date),
            status: ObsStatus::Ok,
            error: None,
            latency_ms,
            source: source.to_string(),
        }
    }

    pub fn failed(gauge_id: &str, error: ErrorKind, latency_ms: u64, source: &str) -> Self {
        Self {
            gauge_id: gauge_id.to_string(),
            value: None,
            prev_value: None,
            date: None,
            status: error.status(),
            error: Some(error),
            latency_ms,
            source: source.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ObsStatus::Ok && self.value.map_or(false, f64::is_finite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_half_open() {
        let band = Band::between(1300.0, 1450.0);
        assert!(band.contains(1300.0));
        assert!(band.contains(1449.99));
        assert!(!band.contains(1450.0));
        assert!(!band.contains(f64::NAN));
    }

    #[test]
    fn test_unbounded_band() {
        assert!(Band::below(2.5).contains(-1e9));
        assert!(Band::at_least(4.0).contains(1e12));
        assert!(!Band::at_least(4.0).contains(3.99));
    }

    #[test]
    fn test_axis_groups() {
        assert_eq!(Axis::Trade.group(), AxisGroup::Input);
        assert_eq!(Axis::Labor.group(), AxisGroup::Output);
        assert_eq!(Axis::Prices.group(), AxisGroup::Context);
    }

    #[test]
    fn test_error_kind_status() {
        assert_eq!(ErrorKind::NoData.status(), ObsStatus::NoData);
        assert_eq!(ErrorKind::RateLimited.status(), ObsStatus::ApiError);
        assert_eq!(ErrorKind::NeedsCalc.status(), ObsStatus::NeedsCalc);
    }

    #[test]
    fn test_source_kind_serde_tagging() {
        let kind = SourceKind::DirectApi(ProviderRequest::Fred {
            series_id: "VIXCLS".into(),
        });
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], "direct_api");
        assert_eq!(json["provider"], "fred");
        let back: SourceKind = serde_json::from_value(json).unwrap();
        assert_eq!(back, kind);
    }
}
