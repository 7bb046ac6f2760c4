//! Pipeline Regression Tests
//!
//! Exercises the full segment pipeline on synthetic survey data: triwave
//! correction, subsample cycling, filter stages and interval refinement,
//! driven through `SurveyConfig::build_processor`.

use approx::assert_relative_eq;
use chrono::{DateTime, TimeZone, Utc};
use echoqc::signal::general_triangle;
use echoqc::types::{FileRemovalReason, IntervalRemovalReason, StageKind};
use echoqc::{NavTrack, PingSeries, SurveyConfig};
use ndarray::Array2;

const TRIWAVE_PERIOD: f64 = 2721.0;

fn ping_times(n: usize, start_hour: u32) -> Vec<DateTime<Utc>> {
    let t0 = Utc
        .with_ymd_and_hms(2024, 6, 10, start_hour, 0, 0)
        .single()
        .expect("valid timestamp");
    (0..n)
        .map(|i| t0 + chrono::Duration::seconds(i as i64))
        .collect()
}

/// Flat-power segment: `base` dB everywhere, 10 one-metre bins.
fn flat_segment(n: usize, base: f64) -> PingSeries {
    PingSeries::new(
        Array2::from_elem((n, 10), base),
        None,
        (0..10).map(|i| i as f64).collect(),
        ping_times(n, 12),
        vec![0.0; n],
    )
    .expect("consistent axes")
}

fn steady_nav(n: usize, speed: f64) -> NavTrack {
    NavTrack {
        latitude: vec![57.0; n],
        longitude: vec![-170.0; n],
        speed_knots: vec![speed; n],
    }
}

fn config_from(text: &str) -> SurveyConfig {
    use std::io::Write;
    let mut f = tempfile::NamedTempFile::new().expect("temp file");
    write!(f, "{text}").expect("write");
    SurveyConfig::load_from_file(f.path()).expect("config parses")
}

#[test]
fn triwave_correction_flattens_the_gain_wave() {
    let n = 3000;
    let mut series = flat_segment(n, -60.0);
    for (i, mut row) in series.power.rows_mut().into_iter().enumerate() {
        let wave = general_triangle(i as f64, 1.5, TRIWAVE_PERIOD, 500.0, 0.0);
        row.mapv_inplace(|v| v + wave);
    }
    let mut nav = steady_nav(n, 10.0);

    let config = config_from(
        r#"
[subsample]
enabled = false

[removal]
enabled = false

[triwave]
enabled = true
start_sample = 0
end_sample = 10
"#,
    );
    let processor = config.build_processor().expect("processor builds");
    let report = processor
        .process(&mut series, &mut nav, None)
        .expect("segment processes");

    let fit = report.triwave.expect("wave was fitted");
    assert_relative_eq!(fit.amplitude, 1.5, epsilon = 1e-3);
    assert_relative_eq!(fit.period_offset, 500.0, epsilon = 0.5);
    assert!(fit.r_squared > 0.99);

    // After subtraction every ping is flat at the base level again.
    for row in series.power.rows() {
        for &v in row {
            assert_relative_eq!(v, -60.0, epsilon = 1e-2);
        }
    }
}

#[test]
fn subsample_cycles_walk_consecutive_chunks() {
    let n = 1000;
    let mut series = flat_segment(n, -60.0);
    let mut nav = steady_nav(n, 10.0);

    let config = config_from(
        r#"
[subsample]
enabled = true
percent = 5.0
chunk_size = 50
chunk_start = 1
iterations = 3

[removal]
enabled = false
"#,
    );
    let report = config
        .build_processor()
        .expect("processor builds")
        .process(&mut series, &mut nav, None)
        .expect("segment processes");

    assert_eq!(report.cycles.len(), 3);
    // 5% of 1000 pings in 50-ping chunks: one chunk per cycle, stepping by
    // one chunk each cycle.
    assert_eq!(report.cycles[0].chunks, vec![(0, 49)]);
    assert_eq!(report.cycles[1].chunks, vec![(50, 99)]);
    assert_eq!(report.cycles[2].chunks, vec![(100, 149)]);
    for (i, c) in report.cycles.iter().enumerate() {
        assert_eq!(c.line, i + 1);
        assert_eq!(c.kept, 50);
    }
}

#[test]
fn ringdown_interval_removal_drops_the_whole_span() {
    let n = 200;
    let mut series = flat_segment(n, -10.0);
    // Ten scattered pings in the first 50 jump 8 dB: 20% of the first block.
    for i in (0..50).step_by(5) {
        series.power.row_mut(i).fill(-2.0);
    }
    let mut nav = steady_nav(n, 10.0);

    let config = config_from(
        r#"
[subsample]
enabled = false

[removal]
enabled = true
statistic_interval = 50
threshold_percent = 15.0

[output]
minimum_pings_to_write = 100

[[filters]]
kind = "ringdown"
window = 5
tolerance_db = 3.0
range_start = 0.0
range_end = 9.0
"#,
    );
    let report = config
        .build_processor()
        .expect("processor builds")
        .process(&mut series, &mut nav, None)
        .expect("segment processes");

    let cycle = &report.cycles[0];
    let refinement = cycle.refinement.as_ref().expect("refinement ran");
    assert_eq!(
        refinement.tracker.interval_removed,
        vec![true, false, false, false]
    );
    assert_eq!(
        refinement.tracker.interval_reason[0],
        Some(IntervalRemovalReason::Stage(StageKind::Ringdown))
    );
    // The whole first block span goes, clean pings included.
    assert!(cycle.keep[..50].iter().all(|&b| !b));
    assert!(cycle.keep[50..].iter().all(|&b| b));
    assert_eq!(cycle.kept, 150);
    assert!(cycle.writeable);
}

#[test]
fn slow_segment_is_removed_at_file_scope() {
    let n = 200;
    let mut series = flat_segment(n, -60.0);
    let mut nav = steady_nav(n, 1.0);

    let config = config_from(
        r#"
[subsample]
enabled = false

[removal]
enabled = true
statistic_interval = 50
threshold_percent = 15.0

[[filters]]
kind = "speed_limit"
min_knots = 5.0
"#,
    );
    let report = config
        .build_processor()
        .expect("processor builds")
        .process(&mut series, &mut nav, None)
        .expect("segment processes");

    let cycle = &report.cycles[0];
    let tracker = &cycle.refinement.as_ref().expect("refinement ran").tracker;
    assert!(tracker.file_removed);
    assert_eq!(
        tracker.file_reason,
        Some(FileRemovalReason::Stage(StageKind::Speed))
    );
    assert_eq!(cycle.kept, 0);
    assert!(!cycle.writeable);
}

#[test]
fn daylight_table_gates_pings_by_time_of_day() {
    use std::io::Write;
    let mut table = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(table, "start_date,end_date,sunrise,sunset").expect("write");
    writeln!(table, "2024-06-01,2024-06-30,06:00,22:00").expect("write");

    // Two pings: one minute after sunrise and one minute after sunset.
    let times = vec![
        Utc.with_ymd_and_hms(2024, 6, 10, 6, 1, 0)
            .single()
            .expect("valid timestamp"),
        Utc.with_ymd_and_hms(2024, 6, 10, 22, 1, 0)
            .single()
            .expect("valid timestamp"),
    ];
    let mut series = PingSeries::new(
        Array2::from_elem((2, 10), -60.0),
        None,
        (0..10).map(|i| i as f64).collect(),
        times,
        vec![0.0; 2],
    )
    .expect("consistent axes");
    let mut nav = steady_nav(2, 10.0);

    let config = config_from(&format!(
        r#"
[subsample]
enabled = false

[removal]
enabled = false

[[filters]]
kind = "time_limit"
source = {{ mode = "table", table_path = "{}" }}
"#,
        table.path().display()
    ));
    let report = config
        .build_processor()
        .expect("processor builds")
        .process(&mut series, &mut nav, None)
        .expect("segment processes");

    assert_eq!(report.cycles[0].keep, vec![true, false]);
}

#[test]
fn filter_failure_never_aborts_the_segment() {
    let n = 100;
    let mut series = flat_segment(n, -60.0);
    // No navigation at all: speed and position stages both fail softly.
    let mut nav = NavTrack {
        latitude: vec![f64::NAN; n],
        longitude: vec![f64::NAN; n],
        speed_knots: vec![f64::NAN; n],
    };

    let config = config_from(
        r#"
[subsample]
enabled = false

[removal]
enabled = false

[[filters]]
kind = "speed_limit"
min_knots = 5.0
"#,
    );
    let report = config
        .build_processor()
        .expect("processor builds")
        .process(&mut series, &mut nav, None)
        .expect("segment processes");

    assert_eq!(report.engine.successes, 0);
    assert_eq!(report.cycles[0].kept, n);
}
