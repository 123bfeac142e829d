use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{Datelike, NaiveDate, Weekday};
use tracing::{info, warn};

use super::error::TimetableError;
use super::ScheduledArrival;

/// Maximum allowed total decompressed size for the GTFS zip (2 GB)
const MAX_DECOMPRESSED_SIZE: u64 = 2 * 1024 * 1024 * 1024;

// --- Public types for the in-memory timetable ---

/// A GTFS stop (from stops.txt).
#[derive(Debug, Clone)]
pub struct GtfsStop {
    pub stop_id: String,
    pub stop_name: Option<String>,
    /// Rider-facing stop code, when the agency publishes one distinct
    /// from stop_id.
    pub stop_code: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// A GTFS route (from routes.txt).
#[derive(Debug, Clone)]
pub struct GtfsRoute {
    pub route_id: String,
    pub route_short_name: Option<String>,
    pub route_long_name: Option<String>,
}

impl GtfsRoute {
    /// The public route designator riders (and the live feed) know the
    /// route by: short name when present, raw route_id otherwise.
    pub fn designator(&self) -> &str {
        self.route_short_name.as_deref().unwrap_or(&self.route_id)
    }

    /// Display name for the route.
    pub fn display_name(&self) -> &str {
        self.route_long_name
            .as_deref()
            .or(self.route_short_name.as_deref())
            .unwrap_or(&self.route_id)
    }
}

/// A GTFS trip (from trips.txt).
#[derive(Debug, Clone)]
pub struct GtfsTrip {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    pub trip_headsign: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GtfsStopTime {
    pub stop_sequence: i32,
    pub stop_id: String,
    /// Seconds since midnight (can exceed 86400 for trips crossing midnight)
    pub arrival_time: Option<i32>,
    /// Seconds since midnight
    pub departure_time: Option<i32>,
}

/// A GTFS calendar entry (from calendar.txt).
#[derive(Debug, Clone)]
pub struct GtfsCalendar {
    pub service_id: String,
    pub days: [bool; 7], // mon, tue, wed, thu, fri, sat, sun
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct GtfsCalendarDate {
    pub date: NaiveDate,
    /// 1 = service added, 2 = service removed
    pub exception_type: i32,
}

/// The full in-memory GTFS timetable.
pub struct GtfsSchedule {
    pub stops: HashMap<String, GtfsStop>,
    pub routes: HashMap<String, GtfsRoute>,
    pub trips: HashMap<String, GtfsTrip>,
    /// trip_id -> ordered stop_times
    pub stop_times: HashMap<String, Vec<GtfsStopTime>>,
    pub calendars: HashMap<String, GtfsCalendar>,
    /// service_id -> list of exceptions
    pub calendar_dates: HashMap<String, Vec<GtfsCalendarDate>>,
    /// stop_id -> set of trip_ids visiting that stop (for fast filtering)
    pub trips_by_stop: HashMap<String, HashSet<String>>,
    pub loaded_at: chrono::DateTime<chrono::Utc>,
}

impl GtfsSchedule {
    /// Check if a service is active on the given date.
    pub fn is_service_active(&self, service_id: &str, date: NaiveDate) -> bool {
        // Check calendar_dates exceptions first (they override regular calendar)
        if let Some(exceptions) = self.calendar_dates.get(service_id) {
            for exc in exceptions {
                if exc.date == date {
                    return exc.exception_type == 1;
                }
            }
        }

        // Check regular calendar
        if let Some(cal) = self.calendars.get(service_id) {
            if date < cal.start_date || date > cal.end_date {
                return false;
            }
            let day_index = match date.weekday() {
                Weekday::Mon => 0,
                Weekday::Tue => 1,
                Weekday::Wed => 2,
                Weekday::Thu => 3,
                Weekday::Fri => 4,
                Weekday::Sat => 5,
                Weekday::Sun => 6,
            };
            return cal.days[day_index];
        }

        // If only calendar_dates exist (no calendar entry), service is active
        // only on dates explicitly listed with exception_type=1.
        // We already checked above and found no matching date, so inactive.
        false
    }

    /// All scheduled arrivals at a stop on the given service date,
    /// optionally filtered to one route designator.
    ///
    /// A stop_time with no usable time field still yields an entry with an
    /// empty `scheduled_time` rather than being dropped.
    pub fn schedule_for_stop(
        &self,
        stop_id: &str,
        date: NaiveDate,
        route: Option<&str>,
    ) -> Vec<ScheduledArrival> {
        let Some(trip_ids) = self.trips_by_stop.get(stop_id) else {
            return Vec::new();
        };

        let mut arrivals = Vec::new();

        for trip_id in trip_ids {
            let Some(trip) = self.trips.get(trip_id) else {
                continue;
            };
            if !self.is_service_active(&trip.service_id, date) {
                continue;
            }

            let gtfs_route = self.routes.get(&trip.route_id);
            let designator = gtfs_route
                .map(|r| r.designator().to_string())
                .unwrap_or_else(|| trip.route_id.clone());

            if let Some(filter) = route {
                if designator != filter {
                    continue;
                }
            }

            let route_name = gtfs_route
                .map(|r| r.display_name().to_string())
                .unwrap_or_else(|| designator.clone());
            let destination = trip
                .trip_headsign
                .clone()
                .unwrap_or_else(|| "Unknown".to_string());

            let Some(stop_times) = self.stop_times.get(trip_id) else {
                continue;
            };
            for st in stop_times.iter().filter(|st| st.stop_id == stop_id) {
                let secs = st.arrival_time.or(st.departure_time);
                arrivals.push(ScheduledArrival {
                    route_id: designator.clone(),
                    route_name: route_name.clone(),
                    destination: destination.clone(),
                    scheduled_time: secs.map(format_gtfs_time).unwrap_or_default(),
                });
            }
        }

        arrivals
    }
}

// --- Loading ---

/// Load a GTFS zip into an in-memory timetable (blocking; call on
/// spawn_blocking).
pub fn load_schedule(zip_path: &Path) -> Result<GtfsSchedule, TimetableError> {
    let file = std::fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    // ZIP bomb protection: check total uncompressed size
    let mut total_uncompressed: u64 = 0;
    for i in 0..archive.len() {
        if let Ok(entry) = archive.by_index(i) {
            total_uncompressed += entry.size();
        }
    }
    if total_uncompressed > MAX_DECOMPRESSED_SIZE {
        return Err(TimetableError::ParseError(format!(
            "GTFS zip decompressed size {} bytes exceeds limit {} bytes",
            total_uncompressed, MAX_DECOMPRESSED_SIZE
        )));
    }

    let stops = parse_stops(&mut archive)?;
    info!(count = stops.len(), "Parsed GTFS stops");

    let routes = parse_routes(&mut archive)?;
    info!(count = routes.len(), "Parsed GTFS routes");

    let trips = parse_trips(&mut archive)?;
    info!(count = trips.len(), "Parsed GTFS trips");

    let stop_times = parse_stop_times(&mut archive)?;
    let total_st: usize = stop_times.values().map(|v| v.len()).sum();
    info!(trips_with_times = stop_times.len(), total_stop_times = total_st, "Parsed GTFS stop_times");

    let calendars = parse_calendar(&mut archive);
    info!(count = calendars.len(), "Parsed GTFS calendar");

    let calendar_dates = parse_calendar_dates(&mut archive);
    let total_cd: usize = calendar_dates.values().map(|v| v.len()).sum();
    info!(services = calendar_dates.len(), total_exceptions = total_cd, "Parsed GTFS calendar_dates");

    // Build reverse index: stop_id -> trip_ids
    let mut trips_by_stop: HashMap<String, HashSet<String>> = HashMap::new();
    for (trip_id, sts) in &stop_times {
        for st in sts {
            trips_by_stop
                .entry(st.stop_id.clone())
                .or_default()
                .insert(trip_id.clone());
        }
    }
    info!(stops_indexed = trips_by_stop.len(), "Built trips-by-stop index");

    Ok(GtfsSchedule {
        stops,
        routes,
        trips,
        stop_times,
        calendars,
        calendar_dates,
        trips_by_stop,
        loaded_at: chrono::Utc::now(),
    })
}

// --- Helper functions ---

/// Parse GTFS time string "HH:MM:SS" to seconds since midnight.
/// Supports hours >= 24 for trips crossing midnight.
pub fn parse_gtfs_time(time_str: &str) -> Option<i32> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: i32 = parts[0].trim().parse().ok()?;
    let minutes: i32 = parts[1].parse().ok()?;
    let seconds: i32 = parts[2].parse().ok()?;
    Some(hours * 3600 + minutes * 60 + seconds)
}

/// Format seconds since midnight back to "HH:MM:SS". Hours are kept
/// unwrapped (a post-midnight trip stays "25:10:00") so string ordering
/// within a service day remains correct.
pub fn format_gtfs_time(secs: i32) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Parse GTFS date string "YYYYMMDD" to NaiveDate.
fn parse_gtfs_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 8 {
        return None;
    }
    let year: i32 = s[0..4].parse().ok()?;
    let month: u32 = s[4..6].parse().ok()?;
    let day: u32 = s[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

// --- CSV parsing ---

fn parse_stops(
    archive: &mut zip::ZipArchive<std::fs::File>,
) -> Result<HashMap<String, GtfsStop>, TimetableError> {
    info!("Parsing stops.txt");
    let file = archive.by_name("stops.txt")?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers = rdr.headers()?.clone();

    let idx_id = headers
        .iter()
        .position(|h| h == "stop_id")
        .ok_or_else(|| TimetableError::ParseError("stops.txt missing stop_id".into()))?;
    let idx_name = headers.iter().position(|h| h == "stop_name");
    let idx_code = headers.iter().position(|h| h == "stop_code");
    let idx_lat = headers.iter().position(|h| h == "stop_lat");
    let idx_lon = headers.iter().position(|h| h == "stop_lon");

    let mut stops = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result?;
        let stop_id = record.get(idx_id).unwrap_or("").to_string();
        if stop_id.is_empty() {
            skipped += 1;
            continue;
        }
        stops.insert(
            stop_id.clone(),
            GtfsStop {
                stop_id,
                stop_name: idx_name.and_then(|i| record.get(i)).and_then(non_empty),
                stop_code: idx_code.and_then(|i| record.get(i)).and_then(non_empty),
                lat: idx_lat
                    .and_then(|i| record.get(i))
                    .and_then(|s| s.parse().ok()),
                lon: idx_lon
                    .and_then(|i| record.get(i))
                    .and_then(|s| s.parse().ok()),
            },
        );
    }
    if skipped > 0 {
        warn!(skipped, "Skipped stops.txt records with empty stop_id");
    }
    Ok(stops)
}

fn parse_routes(
    archive: &mut zip::ZipArchive<std::fs::File>,
) -> Result<HashMap<String, GtfsRoute>, TimetableError> {
    info!("Parsing routes.txt");
    let file = archive.by_name("routes.txt")?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers = rdr.headers()?.clone();

    let idx_id = headers
        .iter()
        .position(|h| h == "route_id")
        .ok_or_else(|| TimetableError::ParseError("routes.txt missing route_id".into()))?;
    let idx_short = headers.iter().position(|h| h == "route_short_name");
    let idx_long = headers.iter().position(|h| h == "route_long_name");

    let mut routes = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result?;
        let route_id = record.get(idx_id).unwrap_or("").to_string();
        if route_id.is_empty() {
            skipped += 1;
            continue;
        }
        routes.insert(
            route_id.clone(),
            GtfsRoute {
                route_id,
                route_short_name: idx_short
                    .and_then(|i| record.get(i))
                    .and_then(non_empty),
                route_long_name: idx_long
                    .and_then(|i| record.get(i))
                    .and_then(non_empty),
            },
        );
    }
    if skipped > 0 {
        warn!(skipped, "Skipped routes.txt records with empty route_id");
    }
    Ok(routes)
}

fn parse_trips(
    archive: &mut zip::ZipArchive<std::fs::File>,
) -> Result<HashMap<String, GtfsTrip>, TimetableError> {
    info!("Parsing trips.txt");
    let file = archive.by_name("trips.txt")?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers = rdr.headers()?.clone();

    let idx_trip = headers
        .iter()
        .position(|h| h == "trip_id")
        .ok_or_else(|| TimetableError::ParseError("trips.txt missing trip_id".into()))?;
    let idx_route = headers
        .iter()
        .position(|h| h == "route_id")
        .ok_or_else(|| TimetableError::ParseError("trips.txt missing route_id".into()))?;
    let idx_service = headers
        .iter()
        .position(|h| h == "service_id")
        .ok_or_else(|| TimetableError::ParseError("trips.txt missing service_id".into()))?;
    let idx_headsign = headers.iter().position(|h| h == "trip_headsign");

    let mut trips = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result?;
        let trip_id = record.get(idx_trip).unwrap_or("").to_string();
        if trip_id.is_empty() {
            skipped += 1;
            continue;
        }
        trips.insert(
            trip_id.clone(),
            GtfsTrip {
                trip_id,
                route_id: record.get(idx_route).unwrap_or("").to_string(),
                service_id: record.get(idx_service).unwrap_or("").to_string(),
                trip_headsign: idx_headsign
                    .and_then(|i| record.get(i))
                    .and_then(non_empty),
            },
        );
    }
    if skipped > 0 {
        warn!(skipped, "Skipped trips.txt records with empty trip_id");
    }
    Ok(trips)
}

fn parse_stop_times(
    archive: &mut zip::ZipArchive<std::fs::File>,
) -> Result<HashMap<String, Vec<GtfsStopTime>>, TimetableError> {
    info!("Parsing stop_times.txt");
    let file = archive.by_name("stop_times.txt")?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers = rdr.headers()?.clone();

    let idx_trip = headers
        .iter()
        .position(|h| h == "trip_id")
        .ok_or_else(|| TimetableError::ParseError("stop_times.txt missing trip_id".into()))?;
    let idx_seq = headers
        .iter()
        .position(|h| h == "stop_sequence")
        .ok_or_else(|| TimetableError::ParseError("stop_times.txt missing stop_sequence".into()))?;
    let idx_stop = headers
        .iter()
        .position(|h| h == "stop_id")
        .ok_or_else(|| TimetableError::ParseError("stop_times.txt missing stop_id".into()))?;
    let idx_arr = headers.iter().position(|h| h == "arrival_time");
    let idx_dep = headers.iter().position(|h| h == "departure_time");

    let mut stop_times: HashMap<String, Vec<GtfsStopTime>> = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result?;
        let trip_id = record.get(idx_trip).unwrap_or("").to_string();
        if trip_id.is_empty() {
            skipped += 1;
            continue;
        }
        let st = GtfsStopTime {
            stop_sequence: record
                .get(idx_seq)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            stop_id: record.get(idx_stop).unwrap_or("").to_string(),
            arrival_time: idx_arr
                .and_then(|i| record.get(i))
                .and_then(parse_gtfs_time),
            departure_time: idx_dep
                .and_then(|i| record.get(i))
                .and_then(parse_gtfs_time),
        };
        stop_times.entry(trip_id).or_default().push(st);
    }
    if skipped > 0 {
        warn!(skipped, "Skipped stop_times.txt records with empty trip_id");
    }

    // Sort each trip's stop_times by stop_sequence
    for sts in stop_times.values_mut() {
        sts.sort_by_key(|st| st.stop_sequence);
    }

    Ok(stop_times)
}

fn parse_calendar(
    archive: &mut zip::ZipArchive<std::fs::File>,
) -> HashMap<String, GtfsCalendar> {
    info!("Parsing calendar.txt");
    let file = match archive.by_name("calendar.txt") {
        Ok(f) => f,
        Err(_) => {
            info!("No calendar.txt in GTFS zip (optional file)");
            return HashMap::new();
        }
    };
    let mut rdr = csv::Reader::from_reader(file);
    let headers = match rdr.headers() {
        Ok(h) => h.clone(),
        Err(_) => return HashMap::new(),
    };

    let idx_service = headers.iter().position(|h| h == "service_id");
    let idx_mon = headers.iter().position(|h| h == "monday");
    let idx_tue = headers.iter().position(|h| h == "tuesday");
    let idx_wed = headers.iter().position(|h| h == "wednesday");
    let idx_thu = headers.iter().position(|h| h == "thursday");
    let idx_fri = headers.iter().position(|h| h == "friday");
    let idx_sat = headers.iter().position(|h| h == "saturday");
    let idx_sun = headers.iter().position(|h| h == "sunday");
    let idx_start = headers.iter().position(|h| h == "start_date");
    let idx_end = headers.iter().position(|h| h == "end_date");

    let Some(idx_service) = idx_service else {
        return HashMap::new();
    };

    let mut calendars = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let Ok(record) = result else {
            skipped += 1;
            continue;
        };
        let service_id = record.get(idx_service).unwrap_or("").to_string();
        if service_id.is_empty() {
            skipped += 1;
            continue;
        }

        let get_bool = |idx: Option<usize>| -> bool {
            idx.and_then(|i| record.get(i))
                .and_then(|s| s.parse::<i32>().ok())
                .map(|v| v == 1)
                .unwrap_or(false)
        };

        let start_date = idx_start
            .and_then(|i| record.get(i))
            .and_then(parse_gtfs_date);
        let end_date = idx_end
            .and_then(|i| record.get(i))
            .and_then(parse_gtfs_date);

        let (Some(start_date), Some(end_date)) = (start_date, end_date) else {
            skipped += 1;
            continue;
        };

        calendars.insert(
            service_id.clone(),
            GtfsCalendar {
                service_id,
                days: [
                    get_bool(idx_mon),
                    get_bool(idx_tue),
                    get_bool(idx_wed),
                    get_bool(idx_thu),
                    get_bool(idx_fri),
                    get_bool(idx_sat),
                    get_bool(idx_sun),
                ],
                start_date,
                end_date,
            },
        );
    }
    if skipped > 0 {
        warn!(skipped, "Skipped calendar.txt records (empty/unparseable)");
    }
    calendars
}

fn parse_calendar_dates(
    archive: &mut zip::ZipArchive<std::fs::File>,
) -> HashMap<String, Vec<GtfsCalendarDate>> {
    info!("Parsing calendar_dates.txt");
    let file = match archive.by_name("calendar_dates.txt") {
        Ok(f) => f,
        Err(_) => {
            info!("No calendar_dates.txt in GTFS zip (optional file)");
            return HashMap::new();
        }
    };
    let mut rdr = csv::Reader::from_reader(file);
    let headers = match rdr.headers() {
        Ok(h) => h.clone(),
        Err(_) => return HashMap::new(),
    };

    let idx_service = headers.iter().position(|h| h == "service_id");
    let idx_date = headers.iter().position(|h| h == "date");
    let idx_type = headers.iter().position(|h| h == "exception_type");

    let (Some(idx_service), Some(idx_date), Some(idx_type)) = (idx_service, idx_date, idx_type)
    else {
        return HashMap::new();
    };

    let mut dates: HashMap<String, Vec<GtfsCalendarDate>> = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let Ok(record) = result else {
            skipped += 1;
            continue;
        };
        let service_id = record.get(idx_service).unwrap_or("").to_string();
        if service_id.is_empty() {
            skipped += 1;
            continue;
        }
        let Some(date) = record.get(idx_date).and_then(parse_gtfs_date) else {
            skipped += 1;
            continue;
        };
        let exception_type = record
            .get(idx_type)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        dates.entry(service_id).or_default().push(GtfsCalendarDate {
            date,
            exception_type,
        });
    }
    if skipped > 0 {
        warn!(skipped, "Skipped calendar_dates.txt records (empty/unparseable)");
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_schedule() -> GtfsSchedule {
        GtfsSchedule {
            stops: HashMap::new(),
            routes: HashMap::new(),
            trips: HashMap::new(),
            stop_times: HashMap::new(),
            calendars: HashMap::new(),
            calendar_dates: HashMap::new(),
            trips_by_stop: HashMap::new(),
            loaded_at: chrono::Utc::now(),
        }
    }

    fn weekday_calendar(service_id: &str) -> GtfsCalendar {
        GtfsCalendar {
            service_id: service_id.into(),
            days: [true, true, true, true, true, false, false],
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
        }
    }

    #[test]
    fn test_parse_gtfs_time() {
        assert_eq!(parse_gtfs_time("08:30:00"), Some(30600));
        assert_eq!(parse_gtfs_time("00:00:00"), Some(0));
        assert_eq!(parse_gtfs_time("24:00:00"), Some(86400));
        assert_eq!(parse_gtfs_time("25:30:00"), Some(91800));
        assert_eq!(parse_gtfs_time("invalid"), None);
        assert_eq!(parse_gtfs_time(""), None);
        assert_eq!(parse_gtfs_time("08:30"), None); // missing seconds
    }

    #[test]
    fn test_format_gtfs_time() {
        assert_eq!(format_gtfs_time(30600), "08:30:00");
        assert_eq!(format_gtfs_time(0), "00:00:00");
        assert_eq!(format_gtfs_time(86399), "23:59:59");
        // Post-midnight hours stay unwrapped
        assert_eq!(format_gtfs_time(91800), "25:30:00");
    }

    #[test]
    fn test_format_parse_round_trip() {
        for secs in [0, 1, 30600, 52200, 86399, 91800] {
            assert_eq!(parse_gtfs_time(&format_gtfs_time(secs)), Some(secs));
        }
    }

    #[test]
    fn test_parse_gtfs_date() {
        assert_eq!(
            parse_gtfs_date("20260201"),
            Some(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap())
        );
        assert_eq!(parse_gtfs_date("20260229"), None); // 2026 is not a leap year
        assert_eq!(parse_gtfs_date("invalid"), None);
        assert_eq!(parse_gtfs_date(""), None);
    }

    #[test]
    fn test_is_service_active() {
        let mut schedule = empty_schedule();

        // Monday 2026-02-02, Saturday 2026-02-07
        let monday = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
        let saturday = NaiveDate::from_ymd_opt(2026, 2, 7).unwrap();

        schedule
            .calendars
            .insert("weekday".into(), weekday_calendar("weekday"));

        assert!(schedule.is_service_active("weekday", monday));
        assert!(!schedule.is_service_active("weekday", saturday));

        // Exception: add service on a Saturday
        schedule.calendar_dates.insert(
            "weekday".into(),
            vec![GtfsCalendarDate {
                date: saturday,
                exception_type: 1,
            }],
        );
        assert!(schedule.is_service_active("weekday", saturday));

        // Unknown service
        assert!(!schedule.is_service_active("unknown", monday));
    }

    #[test]
    fn test_is_service_active_exception_type_2_removes_service() {
        let mut schedule = empty_schedule();
        let monday = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();

        schedule
            .calendars
            .insert("weekday".into(), weekday_calendar("weekday"));
        assert!(schedule.is_service_active("weekday", monday));

        // Exception type 2: remove service on this Monday (e.g., holiday)
        schedule.calendar_dates.insert(
            "weekday".into(),
            vec![GtfsCalendarDate {
                date: monday,
                exception_type: 2,
            }],
        );
        assert!(!schedule.is_service_active("weekday", monday));
    }

    #[test]
    fn test_is_service_active_outside_date_range() {
        let mut schedule = empty_schedule();
        schedule.calendars.insert(
            "short".into(),
            GtfsCalendar {
                service_id: "short".into(),
                days: [true; 7],
                start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            },
        );

        let before = NaiveDate::from_ymd_opt(2026, 2, 15).unwrap();
        let inside = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        let after = NaiveDate::from_ymd_opt(2026, 4, 15).unwrap();
        assert!(!schedule.is_service_active("short", before));
        assert!(schedule.is_service_active("short", inside));
        assert!(!schedule.is_service_active("short", after));
    }

    #[test]
    fn test_is_service_active_calendar_dates_only() {
        let mut schedule = empty_schedule();

        // Some GTFS feeds use only calendar_dates without calendar.txt
        let special_day = NaiveDate::from_ymd_opt(2026, 12, 25).unwrap();
        let normal_day = NaiveDate::from_ymd_opt(2026, 12, 26).unwrap();

        schedule.calendar_dates.insert(
            "holiday_only".into(),
            vec![GtfsCalendarDate {
                date: special_day,
                exception_type: 1,
            }],
        );

        assert!(schedule.is_service_active("holiday_only", special_day));
        assert!(!schedule.is_service_active("holiday_only", normal_day));
    }

    fn schedule_with_one_trip() -> GtfsSchedule {
        let mut schedule = empty_schedule();
        schedule
            .calendars
            .insert("weekday".into(), weekday_calendar("weekday"));
        schedule.routes.insert(
            "route-61a".into(),
            GtfsRoute {
                route_id: "route-61a".into(),
                route_short_name: Some("61A".into()),
                route_long_name: Some("North Braddock".into()),
            },
        );
        schedule.trips.insert(
            "trip1".into(),
            GtfsTrip {
                trip_id: "trip1".into(),
                route_id: "route-61a".into(),
                service_id: "weekday".into(),
                trip_headsign: Some("Downtown".into()),
            },
        );
        schedule.stop_times.insert(
            "trip1".into(),
            vec![GtfsStopTime {
                stop_sequence: 4,
                stop_id: "1001".into(),
                arrival_time: Some(parse_gtfs_time("14:30:00").unwrap()),
                departure_time: Some(parse_gtfs_time("14:30:00").unwrap()),
            }],
        );
        schedule
            .trips_by_stop
            .insert("1001".into(), std::iter::once("trip1".to_string()).collect());
        schedule
    }

    #[test]
    fn test_schedule_for_stop() {
        let schedule = schedule_with_one_trip();
        let monday = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();

        let arrivals = schedule.schedule_for_stop("1001", monday, None);
        assert_eq!(arrivals.len(), 1);
        assert_eq!(arrivals[0].route_id, "61A");
        assert_eq!(arrivals[0].route_name, "North Braddock");
        assert_eq!(arrivals[0].destination, "Downtown");
        assert_eq!(arrivals[0].scheduled_time, "14:30:00");

        // Service not active on Saturday
        let saturday = NaiveDate::from_ymd_opt(2026, 2, 7).unwrap();
        assert!(schedule.schedule_for_stop("1001", saturday, None).is_empty());

        // Unknown stop
        assert!(schedule.schedule_for_stop("9999", monday, None).is_empty());
    }

    #[test]
    fn test_schedule_for_stop_route_filter() {
        let schedule = schedule_with_one_trip();
        let monday = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();

        assert_eq!(schedule.schedule_for_stop("1001", monday, Some("61A")).len(), 1);
        assert!(schedule.schedule_for_stop("1001", monday, Some("71")).is_empty());
    }

    #[test]
    fn test_schedule_for_stop_missing_time_passes_through() {
        let mut schedule = schedule_with_one_trip();
        schedule.stop_times.insert(
            "trip1".into(),
            vec![GtfsStopTime {
                stop_sequence: 4,
                stop_id: "1001".into(),
                arrival_time: None,
                departure_time: None,
            }],
        );

        let monday = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
        let arrivals = schedule.schedule_for_stop("1001", monday, None);
        assert_eq!(arrivals.len(), 1);
        assert!(arrivals[0].scheduled_time.is_empty());
    }

    #[test]
    fn test_schedule_for_stop_headsign_fallback() {
        let mut schedule = schedule_with_one_trip();
        schedule.trips.get_mut("trip1").unwrap().trip_headsign = None;

        let monday = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
        let arrivals = schedule.schedule_for_stop("1001", monday, None);
        assert_eq!(arrivals[0].destination, "Unknown");
    }

    #[test]
    fn test_route_designator_and_display_name() {
        let route = GtfsRoute {
            route_id: "route-61a".into(),
            route_short_name: Some("61A".into()),
            route_long_name: Some("North Braddock".into()),
        };
        assert_eq!(route.designator(), "61A");
        assert_eq!(route.display_name(), "North Braddock");

        let bare = GtfsRoute {
            route_id: "71".into(),
            route_short_name: None,
            route_long_name: None,
        };
        assert_eq!(bare.designator(), "71");
        assert_eq!(bare.display_name(), "71");
    }
}
