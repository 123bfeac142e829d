//! Schedule/realtime reconciliation.
//!
//! Takes the scheduled arrivals for a stop and the outcome of a live
//! prediction fetch and produces one merged, time-ordered list with
//! explicit provenance per row. The two sources are joined on the loose
//! `(route, destination)` key; the feeds share no trip identifier, so a
//! route with several simultaneous trips to one destination can have a
//! prediction attached to the wrong physical trip. The tie-break below
//! (soonest not-yet-departed scheduled entry) keeps that ambiguity
//! deterministic.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone};
use chrono_tz::Tz;
use serde::Serialize;
use utoipa::ToSchema;

use crate::providers::realtime::{PredictionClient, PredictionOutcome};
use crate::providers::timetables::gtfs::{ScheduledArrival, StopInfo, TimetableProvider};

/// Sort sentinel for rows with neither countdown; such rows go last.
const NO_TIME_SENTINEL: i64 = i64::MAX;

/// Which data source produced a merged row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Schedule,
    Realtime,
    Both,
}

/// One row in the merged arrivals list.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MergedArrival {
    /// Route designator (e.g. "61A")
    pub route: String,
    pub route_name: String,
    pub destination: String,
    /// Scheduled wall-clock time "HH:MM:SS" on the service date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<String>,
    /// Minutes from query time to the scheduled arrival
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_minutes: Option<i64>,
    /// Live countdown in minutes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime_minutes: Option<i64>,
    /// Predicted arrival clock time from the live feed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delayed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
    pub source: Source,
}

/// Parse a wall-clock time "HH:MM" or "HH:MM:SS" to seconds since
/// midnight. Hours up to 47 are accepted for post-midnight trips on the
/// previous service date.
pub fn parse_clock_time(s: &str) -> Option<i64> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }
    let hours: i64 = parts[0].trim().parse().ok()?;
    let minutes: i64 = parts[1].parse().ok()?;
    let seconds: i64 = if parts.len() == 3 {
        parts[2].parse().ok()?
    } else {
        0
    };
    if !(0..48).contains(&hours) || !(0..60).contains(&minutes) || !(0..60).contains(&seconds) {
        return None;
    }
    Some(hours * 3600 + minutes * 60 + seconds)
}

/// Minutes from `now` until `secs` past midnight of `date` in now's zone.
fn minutes_from_now(date: NaiveDate, secs: i64, now: &DateTime<Tz>) -> Option<i64> {
    let midnight = now
        .timezone()
        .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
        .single()?;
    let when = midnight + Duration::seconds(secs);
    Some((when - *now).num_minutes())
}

fn merge_key(route: &str, destination: &str) -> (String, String) {
    (route.trim().to_string(), destination.trim().to_string())
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Compute per-entry countdowns, apply the display window, and pre-sort
/// by scheduled clock time.
///
/// Entries with a parseable time are kept only when their countdown lies
/// in `[0, window_minutes]`. Entries whose time string is empty or
/// unparseable pass through unwindowed with both time fields unset.
fn windowed_schedule(
    scheduled: &[ScheduledArrival],
    date: NaiveDate,
    now: &DateTime<Tz>,
    window_minutes: i64,
) -> Vec<MergedArrival> {
    let mut rows: Vec<MergedArrival> = scheduled
        .iter()
        .filter_map(|entry| {
            let parsed = parse_clock_time(&entry.scheduled_time)
                .and_then(|secs| minutes_from_now(date, secs, now));
            let (scheduled_time, scheduled_minutes) = match parsed {
                Some(minutes) => {
                    if minutes < 0 || minutes > window_minutes {
                        return None;
                    }
                    (Some(entry.scheduled_time.clone()), Some(minutes))
                }
                // Unparseable times pass through rather than being dropped
                None => (None, None),
            };
            Some(MergedArrival {
                route: entry.route_id.clone(),
                route_name: entry.route_name.clone(),
                destination: entry.destination.clone(),
                scheduled_time,
                scheduled_minutes,
                realtime_minutes: None,
                realtime_time: None,
                delayed: None,
                vehicle_id: None,
                source: Source::Schedule,
            })
        })
        .collect();

    // Lexicographic sort on the clock string is enough inside a window
    // that never crosses midnight.
    rows.sort_by(|a, b| {
        a.scheduled_time
            .as_deref()
            .unwrap_or("")
            .cmp(b.scheduled_time.as_deref().unwrap_or(""))
    });
    rows
}

fn sort_key(row: &MergedArrival) -> i64 {
    row.realtime_minutes
        .or(row.scheduled_minutes)
        .unwrap_or(NO_TIME_SENTINEL)
}

/// Merge live predictions into the windowed schedule.
///
/// The schedule collapses to one row per `(route, destination)` key;
/// when several trips share a key, the soonest not-yet-departed one
/// represents it. Predictions matching a key annotate that row in place
/// (`source = both`); the rest become synthetic realtime-only rows. A
/// configuration error from the live feed is carried out as a string and
/// never suppresses the schedule rows.
fn merge(
    scheduled_rows: Vec<MergedArrival>,
    outcome: Option<&PredictionOutcome>,
) -> (Vec<MergedArrival>, Option<String>) {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut by_key: HashMap<(String, String), MergedArrival> = HashMap::new();

    for row in scheduled_rows {
        let key = merge_key(&row.route, &row.destination);
        match by_key.entry(key.clone()) {
            Entry::Vacant(slot) => {
                order.push(key);
                slot.insert(row);
            }
            Entry::Occupied(mut slot) => {
                // Prefer the first (soonest) occurrence unless it has
                // already departed or has no countdown and this one is
                // still pending.
                let current_pending = slot.get().scheduled_minutes.is_some_and(|m| m >= 0);
                let candidate_pending = row.scheduled_minutes.is_some_and(|m| m >= 0);
                if !current_pending && candidate_pending {
                    slot.insert(row);
                }
            }
        }
    }

    let mut realtime_error = None;

    match outcome {
        None | Some(PredictionOutcome::Empty) | Some(PredictionOutcome::Unavailable) => {}
        Some(PredictionOutcome::ConfigError(msg)) => realtime_error = Some(msg.clone()),
        Some(PredictionOutcome::Predictions(predictions)) => {
            for prediction in predictions {
                let key = merge_key(&prediction.route, &prediction.destination);
                if let Some(row) = by_key.get_mut(&key) {
                    row.realtime_minutes = prediction.minutes;
                    row.realtime_time = non_empty(&prediction.predicted_time);
                    row.delayed = Some(prediction.delayed);
                    row.vehicle_id = prediction.vehicle_id.clone();
                    row.source = Source::Both;
                } else {
                    let row = MergedArrival {
                        route: prediction.route.clone(),
                        route_name: prediction.route.clone(),
                        destination: prediction.destination.clone(),
                        scheduled_time: None,
                        scheduled_minutes: None,
                        realtime_minutes: prediction.minutes,
                        realtime_time: non_empty(&prediction.predicted_time),
                        delayed: Some(prediction.delayed),
                        vehicle_id: prediction.vehicle_id.clone(),
                        source: Source::Realtime,
                    };
                    order.push(key.clone());
                    by_key.insert(key, row);
                }
            }
        }
    }

    let mut arrivals: Vec<MergedArrival> = order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect();
    arrivals.sort_by_key(sort_key);

    (arrivals, realtime_error)
}

/// Which sources contributed to the merged rows: "schedule",
/// "realtime", "schedule+realtime", or "none".
pub fn provenance_summary(arrivals: &[MergedArrival]) -> String {
    let has_schedule = arrivals
        .iter()
        .any(|a| matches!(a.source, Source::Schedule | Source::Both));
    let has_realtime = arrivals
        .iter()
        .any(|a| matches!(a.source, Source::Realtime | Source::Both));
    match (has_schedule, has_realtime) {
        (true, true) => "schedule+realtime",
        (true, false) => "schedule",
        (false, true) => "realtime",
        (false, false) => "none",
    }
    .to_string()
}

/// Diagnostic message covering the cross-product of timetable and live
/// feed availability. Advisory text only; nothing branches on it.
fn availability_message(
    timetable_available: bool,
    arrivals: &[MergedArrival],
    outcome: Option<&PredictionOutcome>,
    window_minutes: i64,
) -> String {
    enum Live {
        Present,
        Empty,
        Unreachable,
        Misconfigured,
        NotQueried,
    }
    let live = match outcome {
        Some(PredictionOutcome::Predictions(_)) => Live::Present,
        Some(PredictionOutcome::Empty) => Live::Empty,
        Some(PredictionOutcome::Unavailable) => Live::Unreachable,
        Some(PredictionOutcome::ConfigError(_)) => Live::Misconfigured,
        None => Live::NotQueried,
    };

    match (timetable_available, live) {
        (true, Live::Present) => {
            "Showing scheduled arrivals with live predictions merged in.".to_string()
        }
        (true, Live::Empty) => {
            if arrivals.is_empty() {
                format!(
                    "No scheduled trips in the next {} minutes and no live predictions for this stop.",
                    window_minutes
                )
            } else {
                "Showing scheduled arrivals; the live feed has no predictions for this stop right now."
                    .to_string()
            }
        }
        (true, Live::Unreachable) => {
            "Showing scheduled arrivals only; the live prediction feed is currently unreachable."
                .to_string()
        }
        (true, Live::Misconfigured) => {
            "Showing scheduled arrivals only; live predictions are disabled by a configuration problem (see realtime_error)."
                .to_string()
        }
        (true, Live::NotQueried) => {
            "Showing scheduled arrivals; live predictions were not requested.".to_string()
        }
        (false, Live::Present) => {
            "Static timetable is not loaded; showing live predictions only.".to_string()
        }
        (false, Live::Empty) => {
            "Static timetable is not loaded and the live feed has no predictions for this stop."
                .to_string()
        }
        (false, Live::Unreachable) => {
            "Static timetable is not loaded and the live prediction feed is unreachable; no arrival data available."
                .to_string()
        }
        (false, Live::Misconfigured) => {
            "Static timetable is not loaded and live predictions are disabled by a configuration problem (see realtime_error)."
                .to_string()
        }
        (false, Live::NotQueried) => {
            "Static timetable is not loaded; no data sources available.".to_string()
        }
    }
}

// --- Request orchestration ---

/// Parameters of one arrivals query.
#[derive(Debug, Clone)]
pub struct ArrivalsQuery {
    pub stop_id: String,
    pub route: Option<String>,
    /// Service date; defaults to today in the timetable's zone.
    pub date: Option<NaiveDate>,
    /// Whether the caller wants live predictions (default true).
    pub realtime: bool,
}

/// The reconciled answer for one stop.
#[derive(Debug)]
pub struct StopArrivals {
    pub stop: Option<StopInfo>,
    pub date: NaiveDate,
    pub arrivals: Vec<MergedArrival>,
    pub sources: String,
    pub realtime_error: Option<String>,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ArrivalsError {
    #[error("Stop '{0}' not found in the static timetable. Search for it by name at /api/stops.")]
    StopNotFound(String),
}

/// Ties the two providers together for the arrivals endpoint.
pub struct ArrivalsService {
    timetable: Arc<TimetableProvider>,
    predictions: Arc<PredictionClient>,
}

impl ArrivalsService {
    pub fn new(timetable: Arc<TimetableProvider>, predictions: Arc<PredictionClient>) -> Self {
        Self {
            timetable,
            predictions,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timetable.timezone()
    }

    /// Answer one arrivals query at the given instant.
    ///
    /// Failures in the live path degrade to schedule-only results and
    /// vice versa; the only hard failure is a stop id the loaded
    /// timetable does not know.
    pub async fn arrivals_for_stop(
        &self,
        query: &ArrivalsQuery,
        now: DateTime<Tz>,
    ) -> Result<StopArrivals, ArrivalsError> {
        let date = query.date.unwrap_or_else(|| now.date_naive());
        let timetable_available = self.timetable.is_available().await;

        // The timetable is authoritative on stop ids when present; when
        // absent, an unknown stop is not distinguishable and the live
        // feed gets to answer.
        let stop = if timetable_available {
            match self.timetable.stop(&query.stop_id).await {
                Some(info) => Some(info),
                None => return Err(ArrivalsError::StopNotFound(query.stop_id.clone())),
            }
        } else {
            None
        };

        let scheduled = if timetable_available {
            self.timetable
                .schedule_for_stop(&query.stop_id, date, query.route.as_deref())
                .await
        } else {
            Vec::new()
        };

        let window_minutes = self.timetable.window_minutes();
        let windowed = windowed_schedule(&scheduled, date, &now, window_minutes);

        // Query live when asked, and also whenever the windowed schedule
        // is empty so a stop can be served from predictions alone.
        let outcome = if query.realtime || windowed.is_empty() {
            Some(
                self.predictions
                    .fetch_predictions(&query.stop_id, query.route.as_deref())
                    .await,
            )
        } else {
            None
        };

        let (arrivals, realtime_error) = merge(windowed, outcome.as_ref());
        let sources = provenance_summary(&arrivals);
        let message =
            availability_message(timetable_available, &arrivals, outcome.as_ref(), window_minutes);

        Ok(StopArrivals {
            stop,
            date,
            arrivals,
            sources,
            realtime_error,
            message,
        })
    }
}
