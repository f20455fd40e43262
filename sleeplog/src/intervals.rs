//! Sleep interval arithmetic.
//!
//! A night is logged as a calendar date plus two `HH:MM` clock readings. This module turns
//! those readings into numbers that can be compared and plotted:
//!
//! - [`compute_duration`] gives the elapsed hours between falling asleep and waking up. When
//!   the wake reading is earlier in the day than the sleep reading, the wake moment belongs to
//!   the following calendar day.
//! - [`compute_normalized_hour`] maps a clock reading onto a continuous plotting axis. Sleep
//!   times in the small hours are pushed past 24 so a 23:30 bedtime and a 00:15 bedtime sit
//!   next to each other instead of at opposite ends of the chart.
//! - [`build_chart_series`] windows a record set to the most recent nights and derives one
//!   [`DerivedChartPoint`] per night.
//!
//! Everything here is pure; nothing touches the database or the network.

use chrono::{NaiveDate, NaiveTime, TimeDelta, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

/// Accepted clock readings: 24-hour `HH:MM`, leading zero on the hour optional.
pub const CLOCK_TIME_PATTERN: &str = r"^([01]?[0-9]|2[0-3]):[0-5][0-9]$";

static CLOCK_TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(CLOCK_TIME_PATTERN).expect("clock time pattern compiles"));

/// Sleep readings before this hour are treated as belonging to the previous evening.
pub const SLEEP_ROLLOVER_HOUR: u32 = 6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntervalError {
    #[error("invalid time format '{input}', expected HH:MM (00:00-23:59)")]
    InvalidTimeFormat { input: String },
}

/// A validated wall-clock reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockTime(NaiveTime);

impl ClockTime {
    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }

    /// Hour of day as a decimal, e.g. 07:45 is 7.75.
    pub fn decimal_hour(&self) -> f64 {
        self.hour() as f64 + self.minute() as f64 / 60.0
    }
}

impl FromStr for ClockTime {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || IntervalError::InvalidTimeFormat { input: s.to_string() };

        if !CLOCK_TIME_RE.is_match(s) {
            return Err(invalid());
        }
        let (hour, minute) = s.split_once(':').ok_or_else(invalid)?;
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;

        NaiveTime::from_hms_opt(hour, minute, 0).map(ClockTime).ok_or_else(invalid)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// Check a string against [`CLOCK_TIME_PATTERN`] without keeping the parsed value.
pub fn validate_clock_time(input: &str) -> Result<(), IntervalError> {
    input.parse::<ClockTime>().map(|_| ())
}

/// Which end of the night a clock reading belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSide {
    Sleep,
    Wake,
}

/// Round half away from zero to one decimal place.
fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Hours slept, rounded to one decimal.
///
/// Both readings are anchored to `date`. If the wake timestamp comes strictly before the sleep
/// timestamp, exactly 24 hours are added to it. Equal readings are a zero-length night, not a
/// full day.
pub fn compute_duration(date: NaiveDate, sleep: ClockTime, wake: ClockTime) -> f64 {
    let sleep_at = date.and_time(sleep.as_naive());
    let mut wake_at = date.and_time(wake.as_naive());
    if wake_at < sleep_at {
        wake_at += TimeDelta::hours(24);
    }

    let minutes = (wake_at - sleep_at).num_minutes();
    round_to_tenth(minutes as f64 / 60.0)
}

/// [`compute_duration`] over raw `HH:MM` strings.
pub fn duration_between(date: NaiveDate, sleep_time: &str, wake_time: &str) -> Result<f64, IntervalError> {
    Ok(compute_duration(date, sleep_time.parse()?, wake_time.parse()?))
}

/// Plot value for a clock reading.
///
/// Sleep-side readings with `hour < 6` are shifted by 24 hours (00:15 becomes 24.25). Wake-side
/// readings are never shifted and stay in `[0, 24)`.
pub fn compute_normalized_hour(time: ClockTime, side: ClockSide) -> f64 {
    if side == ClockSide::Sleep && time.hour() < SLEEP_ROLLOVER_HOUR {
        time.decimal_hour() + 24.0
    } else {
        time.decimal_hour()
    }
}

/// Axis tick label for a normalized hour. Values past midnight wrap back, so 25.5 is "1.5시".
pub fn format_axis_hour(value: f64) -> String {
    let shown = if value >= 24.0 { value - 24.0 } else { value };
    format!("{shown}시")
}

/// Tooltip label for a normalized hour, e.g. 24.25 is "0시 15분".
pub fn format_tooltip_time(value: f64) -> String {
    let hour = value.floor();
    let minute = ((value - hour) * 60.0).round() as i64;
    let hour = hour as i64;
    let shown = if hour >= 24 { hour - 24 } else { hour };
    format!("{shown}시 {minute}분")
}

/// Tooltip label for a duration, e.g. "7.5시간".
pub fn format_duration_hours(value: f64) -> String {
    format!("{value}시간")
}

/// One labelled tick on a chart axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AxisTick {
    pub value: f64,
    pub label: String,
}

/// Value range and tick labels for one chart axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChartAxis {
    pub min: f64,
    pub max: f64,
    pub ticks: Vec<AxisTick>,
}

impl ChartAxis {
    /// Ticks every `step` hours across `[min, max]`, labelled by `label`.
    fn hours(min: u32, max: u32, step: usize, label: fn(f64) -> String) -> Self {
        let ticks = (min..=max)
            .step_by(step)
            .map(|hour| AxisTick {
                value: hour as f64,
                label: label(hour as f64),
            })
            .collect();
        Self {
            min: min as f64,
            max: max as f64,
            ticks,
        }
    }
}

/// Axes for the duration chart and the bedtime/wake-time chart.
///
/// The sleep axis runs 18 to 30 so that bedtimes shifted past midnight stay in range; its
/// ticks past 24 wrap back to clock hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChartAxes {
    pub duration: ChartAxis,
    pub sleep: ChartAxis,
    pub wake: ChartAxis,
}

impl Default for ChartAxes {
    fn default() -> Self {
        Self {
            duration: ChartAxis::hours(0, 12, 2, format_duration_hours),
            sleep: ChartAxis::hours(18, 30, 2, format_axis_hour),
            wake: ChartAxis::hours(0, 12, 2, format_axis_hour),
        }
    }
}

/// How many of the most recent nights a chart covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ChartWindow {
    #[default]
    Week,
    TwoWeeks,
    Month,
    Quarter,
}

impl ChartWindow {
    pub const ALL: [ChartWindow; 4] = [ChartWindow::Week, ChartWindow::TwoWeeks, ChartWindow::Month, ChartWindow::Quarter];

    pub fn nights(self) -> usize {
        match self {
            ChartWindow::Week => 7,
            ChartWindow::TwoWeeks => 14,
            ChartWindow::Month => 30,
            ChartWindow::Quarter => 90,
        }
    }
}

impl TryFrom<u32> for ChartWindow {
    type Error = String;

    fn try_from(nights: u32) -> Result<Self, Self::Error> {
        ChartWindow::ALL
            .into_iter()
            .find(|w| w.nights() == nights as usize)
            .ok_or_else(|| format!("unsupported chart window {nights}, expected one of 7, 14, 30, 90"))
    }
}

impl From<ChartWindow> for u32 {
    fn from(window: ChartWindow) -> Self {
        window.nights() as u32
    }
}

impl FromStr for ChartWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let nights: u32 = s.parse().map_err(|_| format!("chart window must be a number of nights, got '{s}'"))?;
        ChartWindow::try_from(nights)
    }
}

impl fmt::Display for ChartWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nights())
    }
}

/// Anything that describes one logged night.
pub trait SleepInterval {
    /// The calendar date the night begins on.
    fn night(&self) -> NaiveDate;
    fn sleep_time(&self) -> &str;
    fn wake_time(&self) -> &str;
}

/// One chart row, derived on demand from a logged night.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DerivedChartPoint {
    /// `MM/dd` label for the night
    pub display_date: String,
    pub duration_hours: f64,
    pub sleep_hour_value: f64,
    pub wake_hour_value: f64,
    /// The stored sleep reading, unmodified
    pub sleep_time_display: String,
    /// The stored wake reading, unmodified
    pub wake_time_display: String,
    /// e.g. "7.5시간"
    pub duration_label: String,
    /// Bedtime as shown in the tooltip, e.g. "0시 30분"
    pub sleep_time_label: String,
    pub wake_time_label: String,
}

impl DerivedChartPoint {
    pub fn derive<T: SleepInterval + ?Sized>(record: &T) -> Result<Self, IntervalError> {
        let sleep: ClockTime = record.sleep_time().parse()?;
        let wake: ClockTime = record.wake_time().parse()?;

        let duration_hours = compute_duration(record.night(), sleep, wake);
        let sleep_hour_value = compute_normalized_hour(sleep, ClockSide::Sleep);
        let wake_hour_value = compute_normalized_hour(wake, ClockSide::Wake);

        Ok(Self {
            display_date: record.night().format("%m/%d").to_string(),
            duration_hours,
            sleep_hour_value,
            wake_hour_value,
            sleep_time_display: record.sleep_time().to_string(),
            wake_time_display: record.wake_time().to_string(),
            duration_label: format_duration_hours(duration_hours),
            sleep_time_label: format_tooltip_time(sleep_hour_value),
            wake_time_label: format_tooltip_time(wake_hour_value),
        })
    }
}

/// The trailing `window` nights of `records`, oldest first.
///
/// Records are sorted ascending by date (stable, so same-date records keep their input order)
/// before the window is applied.
pub fn recent_window<T: SleepInterval>(records: &[T], window: ChartWindow) -> Vec<&T> {
    let mut sorted: Vec<&T> = records.iter().collect();
    sorted.sort_by_key(|r| r.night());
    let start = sorted.len().saturating_sub(window.nights());
    sorted.split_off(start)
}

/// Chart series for the trailing `window` nights, oldest first. Empty input gives an empty series.
pub fn build_chart_series<T: SleepInterval>(records: &[T], window: ChartWindow) -> Result<Vec<DerivedChartPoint>, IntervalError> {
    recent_window(records, window)
        .into_iter()
        .map(|record| DerivedChartPoint::derive(record))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Night {
        date: NaiveDate,
        sleep: &'static str,
        wake: &'static str,
    }

    impl SleepInterval for Night {
        fn night(&self) -> NaiveDate {
            self.date
        }
        fn sleep_time(&self) -> &str {
            self.sleep
        }
        fn wake_time(&self) -> &str {
            self.wake
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn clock(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    fn night(d: &str, sleep: &'static str, wake: &'static str) -> Night {
        Night { date: date(d), sleep, wake }
    }

    #[test]
    fn test_clock_time_accepts_optional_leading_zero() {
        assert_eq!(clock("9:30"), clock("09:30"));
        assert_eq!(clock("0:05").to_string(), "00:05");
        assert_eq!(clock("23:59").decimal_hour(), 23.0 + 59.0 / 60.0);
    }

    #[test]
    fn test_clock_time_rejects_malformed_input() {
        for bad in ["24:00", "12:60", "7", "07:5", "ab:cd", "", " 07:00", "07:00 ", "007:00", "-1:00"] {
            let err = bad.parse::<ClockTime>().unwrap_err();
            assert_eq!(err, IntervalError::InvalidTimeFormat { input: bad.to_string() }, "{bad:?}");
        }
    }

    #[test]
    fn test_duration_same_day() {
        let d = date("2024-03-01");
        assert_eq!(compute_duration(d, clock("23:00"), clock("23:00")), 0.0);
        assert_eq!(compute_duration(d, clock("06:00"), clock("14:30")), 8.5);
        assert_eq!(compute_duration(d, clock("13:15"), clock("14:00")), 0.8);
    }

    #[test]
    fn test_duration_rolls_over_midnight() {
        let d = date("2024-03-01");
        assert_eq!(compute_duration(d, clock("23:00"), clock("07:00")), 8.0);
        assert_eq!(compute_duration(d, clock("22:30"), clock("06:30")), 8.0);
        assert_eq!(compute_duration(d, clock("23:59"), clock("00:00")), 0.0);
        assert_eq!(compute_duration(d, clock("21:10"), clock("05:55")), 8.8);
    }

    #[test]
    fn test_duration_matches_rollover_formula() {
        let d = date("2024-06-15");
        for (sleep, wake) in [("23:45", "06:10"), ("20:00", "19:59"), ("12:30", "00:00"), ("01:00", "00:30")] {
            let (s, w) = (clock(sleep), clock(wake));
            assert!(w < s);
            let expected = round_to_tenth(24.0 - s.decimal_hour() + w.decimal_hour());
            assert_eq!(compute_duration(d, s, w), expected, "{sleep} -> {wake}");
        }
    }

    #[test]
    fn test_duration_after_midnight_bedtime() {
        // A bedtime already past midnight compares directly on the same date
        assert_eq!(compute_duration(date("2024-03-05"), clock("00:00"), clock("07:30")), 7.5);
    }

    #[test]
    fn test_duration_ignores_dst_dates() {
        // Naive local times: the spring-forward night in most of Europe still counts 8 hours
        assert_eq!(compute_duration(date("2024-03-30"), clock("23:00"), clock("07:00")), 8.0);
    }

    #[test]
    fn test_duration_between_reports_invalid_format() {
        let d = date("2024-03-01");
        assert_eq!(duration_between(d, "23:00", "07:00"), Ok(8.0));
        assert_eq!(
            duration_between(d, "23:00", "7am"),
            Err(IntervalError::InvalidTimeFormat { input: "7am".to_string() })
        );
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let d = date("2024-03-01");
        let first = (
            compute_duration(d, clock("23:10"), clock("06:40")),
            compute_normalized_hour(clock("01:20"), ClockSide::Sleep),
        );
        let second = (
            compute_duration(d, clock("23:10"), clock("06:40")),
            compute_normalized_hour(clock("01:20"), ClockSide::Sleep),
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_sleep_side_normalization() {
        assert_eq!(compute_normalized_hour(clock("23:30"), ClockSide::Sleep), 23.5);
        assert_eq!(compute_normalized_hour(clock("00:15"), ClockSide::Sleep), 24.25);
        assert!((compute_normalized_hour(clock("05:59"), ClockSide::Sleep) - 29.983333).abs() < 1e-5);
        assert_eq!(compute_normalized_hour(clock("06:00"), ClockSide::Sleep), 6.0);
    }

    #[test]
    fn test_wake_side_never_shifts() {
        assert_eq!(compute_normalized_hour(clock("00:15"), ClockSide::Wake), 0.25);
        assert_eq!(compute_normalized_hour(clock("05:59"), ClockSide::Wake), 5.0 + 59.0 / 60.0);
        assert_eq!(compute_normalized_hour(clock("07:00"), ClockSide::Wake), 7.0);
    }

    #[test]
    fn test_axis_and_tooltip_labels() {
        assert_eq!(format_axis_hour(25.5), "1.5시");
        assert_eq!(format_axis_hour(24.0), "0시");
        assert_eq!(format_axis_hour(23.0), "23시");
        assert_eq!(format_axis_hour(22.5), "22.5시");

        assert_eq!(format_tooltip_time(24.25), "0시 15분");
        assert_eq!(format_tooltip_time(23.5), "23시 30분");
        assert_eq!(format_tooltip_time(7.0), "7시 0분");
    }

    #[test]
    fn test_default_axes() {
        let axes = ChartAxes::default();

        assert_eq!((axes.sleep.min, axes.sleep.max), (18.0, 30.0));
        let labels: Vec<&str> = axes.sleep.ticks.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, ["18시", "20시", "22시", "0시", "2시", "4시", "6시"]);

        assert_eq!((axes.wake.min, axes.wake.max), (0.0, 12.0));
        assert_eq!(axes.wake.ticks.last().unwrap().label, "12시");

        assert_eq!(axes.duration.ticks[4].value, 8.0);
        assert_eq!(axes.duration.ticks[4].label, "8시간");
    }

    #[test]
    fn test_chart_window_parsing() {
        assert_eq!("14".parse::<ChartWindow>(), Ok(ChartWindow::TwoWeeks));
        assert_eq!(ChartWindow::try_from(90), Ok(ChartWindow::Quarter));
        assert!("10".parse::<ChartWindow>().is_err());
        assert!("week".parse::<ChartWindow>().is_err());
        assert_eq!(ChartWindow::default().nights(), 7);
        assert_eq!(serde_json::to_string(&ChartWindow::Month).unwrap(), "30");
    }

    #[test]
    fn test_window_keeps_last_n_in_date_order() {
        // Ten nights, inserted out of order
        let mut records: Vec<Night> = (1..=10).map(|day| night(&format!("2024-03-{day:02}"), "23:00", "07:00")).collect();
        records.reverse();
        records.swap(2, 7);

        let window = recent_window(&records, ChartWindow::Week);
        let dates: Vec<u32> = window.iter().map(|r| chrono::Datelike::day(&r.night())).collect();
        assert_eq!(dates, vec![4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_window_smaller_than_n_returns_everything() {
        let records = vec![
            night("2024-03-03", "23:00", "07:00"),
            night("2024-03-01", "22:00", "06:00"),
            night("2024-03-02", "00:30", "08:00"),
        ];
        let series = build_chart_series(&records, ChartWindow::Week).unwrap();
        let labels: Vec<&str> = series.iter().map(|p| p.display_date.as_str()).collect();
        assert_eq!(labels, vec!["03/01", "03/02", "03/03"]);
    }

    #[test]
    fn test_empty_record_set_yields_empty_series() {
        let records: Vec<Night> = Vec::new();
        assert_eq!(build_chart_series(&records, ChartWindow::Quarter).unwrap(), Vec::new());
    }

    #[test]
    fn test_two_night_scenario() {
        let records = vec![night("2024-03-01", "23:00", "07:00"), night("2024-03-02", "22:30", "06:30")];
        let series = build_chart_series(&records, ChartWindow::Week).unwrap();

        let durations: Vec<f64> = series.iter().map(|p| p.duration_hours).collect();
        let sleeps: Vec<f64> = series.iter().map(|p| p.sleep_hour_value).collect();
        let wakes: Vec<f64> = series.iter().map(|p| p.wake_hour_value).collect();
        assert_eq!(durations, vec![8.0, 8.0]);
        assert_eq!(sleeps, vec![23.0, 22.5]);
        assert_eq!(wakes, vec![7.0, 6.5]);
        assert_eq!(series[1].sleep_time_display, "22:30");
        assert_eq!(series[1].wake_time_display, "06:30");
    }

    #[test]
    fn test_chart_point_keeps_original_strings() {
        let point = DerivedChartPoint::derive(&night("2024-12-31", "0:45", "9:05")).unwrap();
        assert_eq!(point.display_date, "12/31");
        assert_eq!(point.sleep_time_display, "0:45");
        assert_eq!(point.wake_time_display, "9:05");
        assert_eq!(point.sleep_hour_value, 24.75);
        assert_eq!(point.duration_hours, 8.3);
        assert_eq!(point.duration_label, "8.3시간");
        assert_eq!(point.sleep_time_label, "0시 45분");
        assert_eq!(point.wake_time_label, "9시 5분");
    }

    #[test]
    fn test_chart_point_serializes_camel_case() {
        let point = DerivedChartPoint::derive(&night("2024-03-01", "23:00", "07:00")).unwrap();
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["displayDate"], "03/01");
        assert_eq!(json["durationHours"], 8.0);
        assert_eq!(json["sleepHourValue"], 23.0);
        assert_eq!(json["wakeHourValue"], 7.0);
    }

    #[test]
    fn test_series_surfaces_bad_stored_times() {
        let records = vec![night("2024-03-01", "23:00", "25:00")];
        assert!(matches!(
            build_chart_series(&records, ChartWindow::Week),
            Err(IntervalError::InvalidTimeFormat { .. })
        ));
    }
}
