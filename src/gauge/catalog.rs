//! Built-in gauge catalog.
//!
//! Threshold values are versioned independently of code; bump
//! `THRESHOLD_VERSION` whenever a band changes.

use super::{
    Axis, Band, Cycle, DeltaMetric, DeltaRule, Formula, GaugeSpec, Polarity, ProviderRequest,
    SourceKind, Thresholds, Transform,
};

pub const THRESHOLD_VERSION: &str = "thr-2026.3";

#[allow(clippy::too_many_arguments)]
fn spec(
    id: &str,
    name: &str,
    axis: Axis,
    source: SourceKind,
    cycle: Cycle,
    unit: &str,
    polarity: Polarity,
    thresholds: Thresholds,
) -> GaugeSpec {
    GaugeSpec {
        id: id.to_string(),
        name: name.to_string(),
        axis,
        source,
        cycle,
        unit: unit.to_string(),
        transform: None,
        polarity,
        thresholds,
        delta: None,
    }
}

fn ecos(stat_code: &str, item_code: &str) -> SourceKind {
    SourceKind::DirectApi(ProviderRequest::Ecos {
        stat_code: stat_code.to_string(),
        item_code: item_code.to_string(),
    })
}

fn fred(series_id: &str) -> SourceKind {
    SourceKind::DirectApi(ProviderRequest::Fred {
        series_id: series_id.to_string(),
    })
}

fn air(item: &str) -> SourceKind {
    SourceKind::DirectApi(ProviderRequest::AirQuality {
        sido: "서울".to_string(),
        item: item.to_string(),
        waqi_city: "seoul".to_string(),
    })
}

fn difference(minuend: &str, subtrahend: &str) -> SourceKind {
    SourceKind::Derived(Formula::Difference {
        minuend: minuend.to_string(),
        subtrahend: subtrahend.to_string(),
    })
}

fn period_change(source: &str) -> SourceKind {
    SourceKind::Derived(Formula::PeriodChange {
        source: source.to_string(),
    })
}

/// good below `warn`, warn in `[warn, danger)`, danger from `danger` up
fn high_is_bad(warn: f64, danger: f64) -> Thresholds {
    Thresholds::three(Band::below(warn), Band::between(warn, danger), Band::at_least(danger))
}

/// danger below `danger`, warn in `[danger, warn)`, good from `warn` up
fn low_is_bad(danger: f64, warn: f64) -> Thresholds {
    Thresholds::three(Band::at_least(warn), Band::between(danger, warn), Band::below(danger))
}

fn delta(metric: DeltaMetric, warn_abs: f64, danger_abs: f64) -> Option<DeltaRule> {
    Some(DeltaRule {
        enabled: true,
        metric,
        warn_abs,
        danger_abs,
    })
}

pub fn builtin_gauges() -> Vec<GaugeSpec> {
    use Axis::*;
    use Cycle::*;
    use Polarity::*;

    let mut ktb = spec(
        "I2", "KTB 3Y yield", Monetary, ecos("817Y002", "010200000"), Daily, "%",
        HighIsBad, high_is_bad(3.5, 4.5),
    );
    ktb.delta = delta(DeltaMetric::Wow, 0.25, 0.5);

    let mut fx = spec(
        "I4", "USD/KRW exchange rate", Monetary, ecos("731Y001", "0000001"), Daily, "KRW",
        HighIsBad,
        Thresholds::three(Band::between(1050.0, 1300.0), Band::between(1300.0, 1450.0), Band::at_least(1450.0)),
    );
    fx.delta = delta(DeltaMetric::Wow, 25.0, 50.0);

    let mut exports = spec(
        "E1", "Exports", Trade, ecos("403Y003", "*AA"), Monthly, "100M USD",
        LowIsBad, low_is_bad(450.0, 520.0),
    );
    exports.transform = Some(Transform::Scale(0.01));
    let mut imports = spec(
        "E2", "Imports", Trade, ecos("403Y005", "*AA"), Monthly, "100M USD",
        HighIsBad, high_is_bad(620.0, 700.0),
    );
    imports.transform = Some(Transform::Scale(0.01));

    let mut kospi = spec(
        "F3", "KOSPI index", Financial, ecos("802Y001", "0001000"), Daily, "pt",
        LowIsBad, low_is_bad(2000.0, 2400.0),
    );
    kospi.delta = delta(DeltaMetric::Wow, 100.0, 200.0);

    let mut unemployment = spec(
        "L1", "Unemployment rate", Labor, ecos("901Y027", "I61BC"), Monthly, "%",
        HighIsBad, high_is_bad(3.5, 4.5),
    );
    unemployment.delta = delta(DeltaMetric::Mom, 0.3, 0.6);

    let mut wti = spec(
        "P3", "WTI crude oil", Prices,
        SourceKind::DirectApi(ProviderRequest::Commodity {
            eia_series: "PET.RWTC.D".to_string(),
            stooq_symbol: "cl.f".to_string(),
        }),
        Daily, "USD/bbl", BandIsBad,
        Thresholds::three(Band::between(50.0, 85.0), Band::between(85.0, 100.0), Band::at_least(100.0))
            .with_low(Band::between(35.0, 50.0), Band::below(35.0)),
    );
    wti.delta = delta(DeltaMetric::Wow, 8.0, 15.0);

    vec![
        // Monetary
        spec("I1", "Base rate", Monetary, ecos("722Y001", "0101000"), Monthly, "%",
            HighIsBad, high_is_bad(3.0, 4.0)),
        ktb,
        spec("I3", "US effective federal funds rate", Monetary, fred("DFF"), Daily, "%",
            HighIsBad, high_is_bad(4.0, 5.5)),
        fx,
        spec("I5", "KR-US policy rate gap", Monetary, difference("I1", "I3"), Daily, "%p",
            LowIsBad, low_is_bad(-1.5, -0.5)),
        // Trade
        exports,
        imports,
        spec("E3", "Trade balance", Trade, difference("E1", "E2"), Monthly, "100M USD",
            LowIsBad, low_is_bad(-50.0, 0.0)),
        spec("E4", "Export growth", Trade, period_change("E1"), Monthly, "%",
            LowIsBad, low_is_bad(-10.0, -2.0)),
        // Financial
        spec("F1", "Corporate bond AA- 3Y yield", Financial, ecos("817Y002", "010300000"), Daily, "%",
            HighIsBad, high_is_bad(4.0, 5.5)),
        spec("F2", "Credit spread", Financial, difference("F1", "I2"), Daily, "%p",
            HighIsBad, high_is_bad(1.0, 1.5)),
        kospi,
        spec("F4", "VIX", Financial, fred("VIXCLS"), Daily, "pt",
            HighIsBad, high_is_bad(20.0, 30.0)),
        spec("F5", "US high-yield spread", Financial, fred("BAMLH0A0HYM2"), Daily, "%p",
            HighIsBad, high_is_bad(4.0, 6.0)),
        // Prices
        spec("P1", "Consumer price inflation", Prices, ecos("901Y009", "0"), Monthly, "%",
            HighIsBad, high_is_bad(2.5, 4.0)),
        spec("P2", "Producer price inflation", Prices, ecos("404Y014", "*AA"), Monthly, "%",
            HighIsBad, high_is_bad(3.0, 6.0)),
        wti,
        // Production
        spec("O1", "Industrial production growth", Production, ecos("901Y033", "A00"), Monthly, "%",
            LowIsBad, low_is_bad(-3.0, 0.0)),
        spec("O2", "Manufacturing capacity utilization", Production, ecos("901Y034", "I32A"), Monthly, "%",
            LowIsBad, low_is_bad(65.0, 72.0)),
        spec("O3", "Night-light activity index", Production, SourceKind::SatellitePending, Monthly, "idx",
            LowIsBad, low_is_bad(0.9, 0.95)),
        // Consumption
        spec("C1", "Retail sales growth", Consumption, ecos("901Y100", "AA"), Monthly, "%",
            LowIsBad, low_is_bad(-3.0, 0.0)),
        spec("C2", "Consumer sentiment index", Consumption, ecos("511Y002", "FME"), Monthly, "pt",
            LowIsBad, low_is_bad(90.0, 100.0)),
        // Labor
        unemployment,
        spec("L2", "Employment growth", Labor, ecos("901Y027", "I62AB"), Monthly, "%",
            LowIsBad, low_is_bad(-0.5, 0.0)),
        // Real estate
        spec("R1", "Housing price change", RealEstate, ecos("901Y062", "P63AC"), Monthly, "%",
            BandIsBad,
            Thresholds::three(Band::between(-0.5, 0.5), Band::between(0.5, 1.0), Band::at_least(1.0))
                .with_low(Band::between(-1.0, -0.5), Band::below(-1.0))),
        spec("R2", "Unsold housing units", RealEstate, SourceKind::Manual, Monthly, "units",
            HighIsBad, high_is_bad(60_000.0, 75_000.0)),
        // Environment
        spec("A1", "PM2.5 concentration", Environment, air("pm25Value"), Daily, "ug/m3",
            HighIsBad, high_is_bad(15.0, 35.0)),
        spec("A2", "PM10 concentration", Environment, air("pm10Value"), Daily, "ug/m3",
            HighIsBad, high_is_bad(30.0, 80.0)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_ids_unique() {
        let gauges = builtin_gauges();
        let ids: HashSet<_> = gauges.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids.len(), gauges.len());
    }

    #[test]
    fn test_every_gauge_has_bands() {
        for g in builtin_gauges() {
            assert!(!g.thresholds.is_empty(), "{} has no bands", g.id);
        }
    }

    #[test]
    fn test_fx_bands_match_catalog() {
        let fx = builtin_gauges().into_iter().find(|g| g.id == "I4").unwrap();
        assert_eq!(fx.thresholds.danger, Some(Band::at_least(1450.0)));
        assert_eq!(fx.thresholds.good, Some(Band::between(1050.0, 1300.0)));
    }
}
