pub mod realtime;
pub mod timetables;
