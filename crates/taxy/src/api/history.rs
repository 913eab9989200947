use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::api::auth::Token;
use crate::api::{vendor_headers, ApiRequest};
use crate::Error;

pub const PAGE_SIZE: usize = 100;

/// Seconds before an unresponsive endpoint candidate is skipped.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Candidate ride-history urls; the vendor serves the same endpoint from its
/// own domain and an Akamai gateway, and either may be unreachable.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub candidates: Vec<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            candidates: vec![
                "https://ownership.tesla.com/mobile-app/ride/history".to_string(),
                "https://akamai-apigateway-charging-ownership.tesla.com/mobile-app/ride/history"
                    .to_string(),
            ],
        }
    }
}

impl Endpoints {
    pub fn from_env() -> Self {
        match std::env::var("ROBOTAXI_HISTORY_URL") {
            Ok(url) => Self {
                candidates: vec![url],
            },
            Err(_) => Self::default(),
        }
    }
}

/// One completed trip, as the vendor reports it. Every field is optional:
/// the payload routinely omits whatever does not apply to a ride.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RideRecord {
    pub ride_id: Option<String>,
    pub ride_started_at: Option<String>,
    pub ride_completed_at: Option<String>,
    pub pickup_location_name: Option<String>,
    pub pickup_location_latitude: Option<f64>,
    pub pickup_location_longitude: Option<f64>,
    pub dropoff_location_name: Option<String>,
    pub dropoff_location_latitude: Option<f64>,
    pub dropoff_location_longitude: Option<f64>,
    pub total_distance_miles: Option<f64>,
    pub total_duration_seconds: Option<i64>,
    pub total_due: Option<f64>,
    pub currency_code: Option<String>,
    pub license_plate: Option<String>,
}

/// Everything one run fetched: the typed records plus the raw per-ride
/// payload values, kept verbatim for the archival export.
#[derive(Debug, Default, Clone)]
pub struct RideHistory {
    pub records: Vec<RideRecord>,
    pub raw: Vec<Value>,
}

impl RideHistory {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct HistoryClient {
    endpoints: Endpoints,
    page_size: usize,
}

impl HistoryClient {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            endpoints,
            page_size: PAGE_SIZE,
        }
    }

    /// Walk the paginated history until a short or empty page, preserving
    /// the order the api returned.
    pub async fn fetch_all(&self, token: &Token) -> Result<RideHistory, Error> {
        let mut history = RideHistory::default();
        let mut endpoint: Option<String> = None;
        let mut page = 1usize;

        loop {
            let body = match endpoint.as_deref() {
                Some(url) => self.page(url, token, page, None).await?,
                None => {
                    let (url, body) = self.probe(token).await?;
                    log::info!("using ride history endpoint {url}");
                    endpoint = Some(url);
                    body
                }
            };

            let rides = extract_rides(&body);
            log::info!("page {page}: {} rides", rides.len());
            if rides.is_empty() {
                break;
            }

            let count = rides.len();
            for ride in rides {
                let record = serde_json::from_value(ride.clone()).unwrap_or_else(|err| {
                    log::debug!("unparseable ride entry: {err}");
                    RideRecord::default()
                });
                history.records.push(record);
                history.raw.push(ride);
            }

            if count < self.page_size {
                break;
            }
            page += 1;
        }

        Ok(history)
    }

    /// Try each candidate url for the first page and pin the first one that
    /// answers. Auth failures are real answers and are not retried against
    /// the next candidate.
    async fn probe(&self, token: &Token) -> Result<(String, Value), Error> {
        let mut last_error = None;
        for url in &self.endpoints.candidates {
            match self.page(url, token, 1, Some(PROBE_TIMEOUT)).await {
                Ok(body) => return Ok((url.clone(), body)),
                Err(err @ Error::Auth { .. }) => return Err(err),
                Err(err) => {
                    log::debug!("endpoint {url} unavailable: {err}");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::Request {
            code: 0,
            message: "no ride history endpoint configured".to_string(),
        }))
    }

    async fn page(
        &self,
        url: &str,
        token: &Token,
        page: usize,
        timeout: Option<Duration>,
    ) -> Result<Value, Error> {
        let mut request = vendor_headers(ApiRequest::get(url))
            .param("pageNo", page)
            .param("deviceLanguage", "en")
            .param("deviceCountry", "US")
            .param("ttpLocale", "en_US")
            .bearer(token);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        Ok(serde_json::from_str(&response.body)?)
    }
}

/// The endpoint has been seen answering in three shapes:
/// `{"code":200,"data":{"rides":[..]}}`, `{"rides":[..]}`, and a bare list.
fn extract_rides(body: &Value) -> Vec<Value> {
    match body {
        Value::Array(rides) => rides.clone(),
        Value::Object(map) => {
            if let Some(Value::Object(data)) = map.get("data") {
                match data.get("rides") {
                    Some(Value::Array(rides)) => rides.clone(),
                    _ => Vec::new(),
                }
            } else if let Some(Value::Array(rides)) = map.get("rides") {
                rides.clone()
            } else if let Some(Value::Array(rides)) = map.get("data") {
                rides.clone()
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}
