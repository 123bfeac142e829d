//! Client for a BusTime-style real-time prediction API.
//!
//! The upstream answers `getpredictions` requests with a JSON envelope:
//! `{"bustime-response": {"prd": [...]}}` on success, or
//! `{"bustime-response": {"error": [{"msg": "..."}]}}` when it has
//! nothing to say (which covers everything from an unknown stop to a
//! rejected API key). The client folds all of that into a
//! [`PredictionOutcome`] so callers pattern-match instead of inspecting
//! error strings themselves.

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RealtimeConfig;

/// One real-time countdown for a vehicle approaching a stop.
#[derive(Debug, Clone, PartialEq)]
pub struct LivePrediction {
    /// Route code as the feed reports it (e.g. "61A")
    pub route: String,
    pub destination: String,
    /// Minutes until arrival; None when the feed gave a non-numeric
    /// countdown ("DUE") or none at all.
    pub minutes: Option<i64>,
    /// Predicted arrival clock time "HH:MM" as reported by the feed
    /// (may be empty).
    pub predicted_time: String,
    pub delayed: bool,
    pub vehicle_id: Option<String>,
}

/// Outcome of a prediction fetch.
///
/// Transient failures and routine no-data answers degrade to
/// `Unavailable`/`Empty`; only an operator-fixable misconfiguration is
/// reported as `ConfigError`.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionOutcome {
    /// At least one prediction was returned
    Predictions(Vec<LivePrediction>),
    /// Upstream answered but has no predictions for this stop
    Empty,
    /// Missing or rejected API key; the message is operator-actionable
    ConfigError(String),
    /// Timeout, network failure, non-2xx status, or unparseable payload
    Unavailable,
}

pub struct PredictionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl PredictionClient {
    pub fn new(config: &RealtimeConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent("arrivals-api/0.1")
            .connect_timeout(Duration::from_secs(2))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.resolved_api_key(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Whether an API key is configured at all.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Fetch predictions for a stop, optionally filtered to one route.
    ///
    /// The whole call is bounded by the configured timeout; a slow or
    /// hanging upstream yields `Unavailable`, never an error. There is no
    /// retry within a request.
    pub async fn fetch_predictions(
        &self,
        stop_id: &str,
        route: Option<&str>,
    ) -> PredictionOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            return PredictionOutcome::ConfigError(missing_key_message());
        };

        match tokio::time::timeout(self.timeout, self.fetch_inner(api_key, stop_id, route)).await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    stop_id,
                    timeout_secs = self.timeout.as_secs(),
                    "Prediction request timed out"
                );
                PredictionOutcome::Unavailable
            }
        }
    }

    async fn fetch_inner(
        &self,
        api_key: &str,
        stop_id: &str,
        route: Option<&str>,
    ) -> PredictionOutcome {
        let mut url = format!(
            "{}/getpredictions?key={}&stpid={}&format=json",
            self.base_url,
            urlencoding::encode(api_key),
            urlencoding::encode(stop_id)
        );
        if let Some(rt) = route {
            url.push_str("&rt=");
            url.push_str(&urlencoding::encode(rt));
        }

        let response = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(stop_id, error = %e, "Prediction request failed");
                return PredictionOutcome::Unavailable;
            }
        };

        if !response.status().is_success() {
            warn!(stop_id, status = %response.status(), "Prediction API returned HTTP error");
            return PredictionOutcome::Unavailable;
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                warn!(stop_id, error = %e, "Failed to read prediction response body");
                return PredictionOutcome::Unavailable;
            }
        };

        let outcome = outcome_from_body(&body);
        if outcome == PredictionOutcome::Unavailable {
            warn!(
                stop_id,
                body = &body[..body.len().min(500)],
                "Failed to parse prediction response"
            );
        }
        outcome
    }
}

/// Operator guidance for a missing key. Kept in one place so the API
/// error field and the logs say the same thing.
fn missing_key_message() -> String {
    "No API key configured for the real-time prediction feed. Set realtime.api_key in \
     config.yaml or the BUSTIME_API_KEY environment variable; keys are issued through the \
     transit agency's developer portal."
        .to_string()
}

/// Classify an upstream error message as an authentication/key problem.
/// Those escalate to `ConfigError`; everything else (unknown stop, no
/// scheduled service) is a routine no-data answer.
pub fn is_auth_error(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("api key")
        || lower.contains("access key")
        || lower.contains("apikey")
        || lower.contains("invalid key")
        || lower.contains("unauthorized")
        || lower.contains("authentication")
}

/// Fold a raw response body into an outcome. Split out of the HTTP path
/// so the classification is testable without a network.
fn outcome_from_body(body: &str) -> PredictionOutcome {
    let envelope: BustimeEnvelope = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return PredictionOutcome::Unavailable,
    };
    let response = envelope.response;

    if !response.error.is_empty() {
        let msgs: Vec<&str> = response
            .error
            .iter()
            .filter_map(|e| e.msg.as_deref())
            .collect();
        let joined = msgs.join("; ");
        if msgs.iter().any(|m| is_auth_error(m)) {
            return PredictionOutcome::ConfigError(format!(
                "Prediction API rejected the configured key: {}. Check realtime.api_key in \
                 config.yaml or the BUSTIME_API_KEY environment variable.",
                joined
            ));
        }
        debug!(upstream = %joined, "Prediction API reported no data");
        return PredictionOutcome::Empty;
    }

    let predictions = map_predictions(response.prd);
    if predictions.is_empty() {
        PredictionOutcome::Empty
    } else {
        PredictionOutcome::Predictions(predictions)
    }
}

fn map_predictions(prds: Vec<Prd>) -> Vec<LivePrediction> {
    prds.into_iter()
        .filter_map(|prd| {
            // A record without a route code can't be keyed against the
            // schedule; skip it.
            let route = prd.route.as_deref().map(str::trim).filter(|r| !r.is_empty())?;
            Some(LivePrediction {
                route: route.to_string(),
                destination: prd
                    .destination
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .unwrap_or("Unknown")
                    .to_string(),
                minutes: parse_countdown(prd.countdown.as_deref()),
                predicted_time: clock_part(prd.predicted_time.as_deref().unwrap_or("")),
                delayed: prd.delayed,
                vehicle_id: prd.vehicle_id.filter(|v| !v.is_empty()),
            })
        })
        .collect()
}

/// Parse the countdown field permissively: the feed sends minutes as a
/// string but substitutes words like "DUE" when a vehicle is arriving.
fn parse_countdown(s: Option<&str>) -> Option<i64> {
    s?.trim().parse().ok()
}

/// Extract the clock part of a "YYYYMMDD HH:MM" timestamp; anything
/// without a date prefix passes through untouched.
fn clock_part(s: &str) -> String {
    s.split_whitespace().last().unwrap_or("").to_string()
}

// Upstream wire shapes

#[derive(Debug, Deserialize)]
struct BustimeEnvelope {
    #[serde(rename = "bustime-response")]
    response: BustimeResponse,
}

#[derive(Debug, Default, Deserialize)]
struct BustimeResponse {
    #[serde(default)]
    prd: Vec<Prd>,
    #[serde(default)]
    error: Vec<BustimeError>,
}

#[derive(Debug, Deserialize)]
struct Prd {
    #[serde(rename = "rt")]
    route: Option<String>,
    #[serde(rename = "des")]
    destination: Option<String>,
    #[serde(rename = "prdctdn")]
    countdown: Option<String>,
    #[serde(rename = "prdtm")]
    predicted_time: Option<String>,
    #[serde(rename = "dly", default)]
    delayed: bool,
    #[serde(rename = "vid")]
    vehicle_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BustimeError {
    msg: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_countdown() {
        assert_eq!(parse_countdown(Some("25")), Some(25));
        assert_eq!(parse_countdown(Some(" 3 ")), Some(3));
        assert_eq!(parse_countdown(Some("DUE")), None);
        assert_eq!(parse_countdown(Some("")), None);
        assert_eq!(parse_countdown(None), None);
    }

    #[test]
    fn test_clock_part() {
        assert_eq!(clock_part("20260806 14:25"), "14:25");
        assert_eq!(clock_part("14:25"), "14:25");
        assert_eq!(clock_part(""), "");
    }

    #[test]
    fn test_is_auth_error() {
        assert!(is_auth_error("No API access key supplied"));
        assert!(is_auth_error("Invalid API access key supplied"));
        assert!(is_auth_error("invalid key"));
        assert!(is_auth_error("Unauthorized"));
        assert!(!is_auth_error("No data found for parameter"));
        assert!(!is_auth_error("No arrival times"));
        assert!(!is_auth_error("No service scheduled"));
    }

    #[test]
    fn predictions_parse_from_payload() {
        let body = r#"{"bustime-response": {"prd": [
            {"rt": "61A", "des": "Downtown", "prdctdn": "25", "prdtm": "20260806 14:25",
             "dly": true, "vid": "3304"},
            {"rt": "71", "des": "Oakland", "prdctdn": "DUE", "prdtm": "20260806 14:01"}
        ]}}"#;

        let PredictionOutcome::Predictions(preds) = outcome_from_body(body) else {
            panic!("expected predictions");
        };
        assert_eq!(preds.len(), 2);
        assert_eq!(preds[0].route, "61A");
        assert_eq!(preds[0].destination, "Downtown");
        assert_eq!(preds[0].minutes, Some(25));
        assert_eq!(preds[0].predicted_time, "14:25");
        assert!(preds[0].delayed);
        assert_eq!(preds[0].vehicle_id.as_deref(), Some("3304"));

        // "DUE" countdown becomes None, missing dly defaults to false
        assert_eq!(preds[1].minutes, None);
        assert!(!preds[1].delayed);
        assert_eq!(preds[1].vehicle_id, None);
    }

    #[test]
    fn record_without_route_is_skipped() {
        let body = r#"{"bustime-response": {"prd": [
            {"des": "Downtown", "prdctdn": "5"},
            {"rt": "  ", "des": "Downtown", "prdctdn": "5"}
        ]}}"#;
        assert_eq!(outcome_from_body(body), PredictionOutcome::Empty);
    }

    #[test]
    fn missing_destination_becomes_unknown() {
        let body = r#"{"bustime-response": {"prd": [{"rt": "28X", "prdctdn": "12"}]}}"#;
        let PredictionOutcome::Predictions(preds) = outcome_from_body(body) else {
            panic!("expected predictions");
        };
        assert_eq!(preds[0].destination, "Unknown");
    }

    #[test]
    fn domain_error_degrades_to_empty() {
        let body =
            r#"{"bustime-response": {"error": [{"msg": "No data found for parameter", "stpid": "9999"}]}}"#;
        assert_eq!(outcome_from_body(body), PredictionOutcome::Empty);
    }

    #[test]
    fn auth_error_escalates_to_config_error() {
        let body =
            r#"{"bustime-response": {"error": [{"msg": "Invalid API access key supplied"}]}}"#;
        match outcome_from_body(body) {
            PredictionOutcome::ConfigError(msg) => {
                assert!(msg.contains("Invalid API access key"));
                assert!(msg.contains("BUSTIME_API_KEY"));
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn garbage_body_is_unavailable() {
        assert_eq!(outcome_from_body("<html>504</html>"), PredictionOutcome::Unavailable);
        assert_eq!(outcome_from_body(""), PredictionOutcome::Unavailable);
    }

    #[test]
    fn empty_prd_list_is_empty_outcome() {
        let body = r#"{"bustime-response": {"prd": []}}"#;
        assert_eq!(outcome_from_body(body), PredictionOutcome::Empty);
    }

    #[tokio::test]
    async fn missing_key_is_config_error_without_network() {
        let config = RealtimeConfig {
            api_key: None,
            ..Default::default()
        };
        // Only run when the env fallback is absent; CI sets no key
        if std::env::var("BUSTIME_API_KEY").is_ok() {
            return;
        }
        let client = PredictionClient::new(&config).unwrap();
        assert!(!client.is_configured());
        match client.fetch_predictions("1001", None).await {
            PredictionOutcome::ConfigError(msg) => {
                assert!(msg.contains("BUSTIME_API_KEY"));
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }
}
