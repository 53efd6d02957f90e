use super::{ParamKind, ParamSpec, Tool, ToolSpec, required_f64_argument, required_string_argument};
use crate::ToolError;
use serde_json::Value;
use std::time::Duration;

pub const GEOCODE_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
pub const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
const CURRENT_FIELDS: &str = "temperature_2m,is_day,precipitation,rain,showers,snowfall";
const FORECAST_TIMEZONE: &str = "America/Chicago";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin Open-Meteo client shared by the weather tools.
#[derive(Clone, Debug)]
pub struct WeatherClient {
    http: reqwest::Client,
    geocode_url: String,
    forecast_url: String,
}

impl Default for WeatherClient {
    fn default() -> Self {
        let http = build_http(reqwest::Client::builder().timeout(REQUEST_TIMEOUT));
        Self::with_endpoints(http, GEOCODE_URL, FORECAST_URL)
    }
}

/// Falls back to a default client, without the configured timeout, when the
/// builder is rejected.
fn build_http(builder: reqwest::ClientBuilder) -> reqwest::Client {
    builder.build().unwrap_or_else(|error| {
        tracing::warn!(error = %error, "weather http client rejected; requests run without a timeout");
        reqwest::Client::new()
    })
}

impl WeatherClient {
    pub fn with_endpoints(
        http: reqwest::Client,
        geocode_url: impl Into<String>,
        forecast_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            geocode_url: geocode_url.into(),
            forecast_url: forecast_url.into(),
        }
    }

    pub async fn geocode(&self, city_name: &str) -> Result<Value, ToolError> {
        let request = self.http.get(&self.geocode_url).query(&[
            ("name", city_name),
            ("count", "10"),
            ("language", "en"),
            ("format", "json"),
        ]);
        fetch_json(request).await
    }

    pub async fn current_weather(&self, latitude: f64, longitude: f64) -> Result<Value, ToolError> {
        let request = self.http.get(&self.forecast_url).query(&[
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            ("current", CURRENT_FIELDS.to_string()),
            ("timezone", FORECAST_TIMEZONE.to_string()),
        ]);
        fetch_json(request).await
    }
}

async fn fetch_json(request: reqwest::RequestBuilder) -> Result<Value, ToolError> {
    let response = request
        .send()
        .await
        .map_err(|error| ToolError::Execution(format!("request failed: {error}")))?;
    let status = response.status();
    if !status.is_success() {
        return Err(ToolError::Execution(format!("HTTP error occurred: {status}")));
    }
    response
        .json()
        .await
        .map_err(|error| ToolError::Execution(format!("invalid JSON response: {error}")))
}

pub fn geocode_tool(client: WeatherClient) -> ToolSpec {
    ToolSpec::new(
        "geocode",
        "Geocodes a city name into latitude and longitude data",
        Tool::plain(move |args| {
            let client = client.clone();
            async move {
                let city_name = required_string_argument(&args, "city_name")?;
                client.geocode(&city_name).await
            }
        }),
    )
    .param(ParamSpec::required("city_name", ParamKind::String))
}

pub fn weather_tool(client: WeatherClient) -> ToolSpec {
    ToolSpec::new(
        "weather",
        "Returns the weather conditions for a given latitude and longitude",
        Tool::plain(move |args| {
            let client = client.clone();
            async move {
                let latitude = required_f64_argument(&args, "latitude")?;
                let longitude = required_f64_argument(&args, "longitude")?;
                client.current_weather(latitude, longitude).await
            }
        }),
    )
    .param(ParamSpec::required("latitude", ParamKind::Number))
    .param(ParamSpec::required("longitude", ParamKind::Number))
}
