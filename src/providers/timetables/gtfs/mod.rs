//! GTFS-based static timetable provider.
//!
//! Loads a local GTFS zip into memory once at startup and answers
//! "what trips are scheduled at stop S on date D" queries from it. The
//! zip being absent is an expected deployment state, not an error: the
//! provider then reports itself unavailable and the service runs on live
//! predictions alone.

pub mod error;
pub mod static_data;

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::config::TimetableConfig;

use error::TimetableError;
use static_data::GtfsSchedule;

/// One scheduled trip-at-stop occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledArrival {
    /// Public route designator (GTFS route_short_name when present),
    /// aligned with the codes the live feed uses.
    pub route_id: String,
    pub route_name: String,
    pub destination: String,
    /// Wall-clock time "HH:MM:SS" on the service date; empty when the
    /// feed had no usable time for this stop_time.
    pub scheduled_time: String,
}

/// Stop metadata returned alongside arrivals.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StopInfo {
    pub id: String,
    pub name: Option<String>,
    /// Rider-facing stop code, when distinct from the id
    pub code: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

pub struct TimetableProvider {
    config: TimetableConfig,
    timezone: chrono_tz::Tz,
    schedule: Arc<RwLock<Option<GtfsSchedule>>>,
}

impl TimetableProvider {
    pub fn new(config: TimetableConfig) -> Self {
        let timezone = config.parsed_timezone();
        Self {
            config,
            timezone,
            schedule: Arc::new(RwLock::new(None)),
        }
    }

    /// Load the GTFS zip into memory. Idempotent: a second call replaces
    /// the previous snapshot. A missing file leaves the provider
    /// unavailable and is logged at warn level only.
    pub async fn load(&self) -> Result<(), TimetableError> {
        let path = self.config.gtfs_path.clone();
        if !Path::new(&path).exists() {
            warn!(path = %path, "GTFS zip not found; timetable unavailable, serving realtime-only");
            return Ok(());
        }

        let schedule =
            tokio::task::spawn_blocking(move || static_data::load_schedule(Path::new(&path)))
                .await??;

        info!(
            stops = schedule.stops.len(),
            routes = schedule.routes.len(),
            trips = schedule.trips.len(),
            "Loaded static GTFS timetable into memory"
        );

        let mut guard = self.schedule.write().await;
        *guard = Some(schedule);

        Ok(())
    }

    /// Whether the static timetable has been loaded.
    pub async fn is_available(&self) -> bool {
        self.schedule.read().await.is_some()
    }

    /// Look up stop metadata by id. `None` means the stop is unknown to a
    /// loaded timetable; callers must check `is_available` to tell that
    /// apart from "no timetable at all".
    pub async fn stop(&self, stop_id: &str) -> Option<StopInfo> {
        let guard = self.schedule.read().await;
        let schedule = guard.as_ref()?;
        schedule.stops.get(stop_id).map(|s| StopInfo {
            id: s.stop_id.clone(),
            name: s.stop_name.clone(),
            code: s.stop_code.clone(),
            lat: s.lat,
            lon: s.lon,
        })
    }

    /// All scheduled arrivals at a stop on the given service date,
    /// optionally filtered to one route designator. Empty when the
    /// timetable is not loaded.
    pub async fn schedule_for_stop(
        &self,
        stop_id: &str,
        date: NaiveDate,
        route: Option<&str>,
    ) -> Vec<ScheduledArrival> {
        let guard = self.schedule.read().await;
        match guard.as_ref() {
            Some(schedule) => schedule.schedule_for_stop(stop_id, date, route),
            None => Vec::new(),
        }
    }

    /// Search loaded stops by name or code substring (case-insensitive).
    pub async fn search_stops(&self, query: &str, limit: usize) -> Vec<StopInfo> {
        let guard = self.schedule.read().await;
        let Some(schedule) = guard.as_ref() else {
            return Vec::new();
        };

        let needle = query.to_lowercase();
        let mut matches: Vec<StopInfo> = schedule
            .stops
            .values()
            .filter(|s| {
                s.stop_name
                    .as_deref()
                    .is_some_and(|n| n.to_lowercase().contains(&needle))
                    || s.stop_code.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(query))
                    || s.stop_id.eq_ignore_ascii_case(query)
            })
            .map(|s| StopInfo {
                id: s.stop_id.clone(),
                name: s.stop_name.clone(),
                code: s.stop_code.clone(),
                lat: s.lat,
                lon: s.lon,
            })
            .collect();

        matches.sort_by(|a, b| a.id.cmp(&b.id));
        matches.truncate(limit);
        matches
    }

    /// Counts for the health endpoint: (stops, routes, trips).
    pub async fn counts(&self) -> (usize, usize, usize) {
        let guard = self.schedule.read().await;
        match guard.as_ref() {
            Some(s) => (s.stops.len(), s.routes.len(), s.trips.len()),
            None => (0, 0, 0),
        }
    }

    /// The timezone the timetable's clock times are expressed in.
    pub fn timezone(&self) -> chrono_tz::Tz {
        self.timezone
    }

    /// Display window in minutes for upcoming arrivals.
    pub fn window_minutes(&self) -> i64 {
        self.config.window_minutes
    }

    /// Inject a pre-built schedule (tests).
    #[cfg(test)]
    pub async fn set_schedule(&self, schedule: GtfsSchedule) {
        let mut guard = self.schedule.write().await;
        *guard = Some(schedule);
    }
}
