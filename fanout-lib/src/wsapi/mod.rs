//! Client for the Weather Source API, built on the [`Engine`].
//!
//! Every request is posted to `{base_uri}/{version}/{key}/{resource}.json`.
//! Responses are decoded as JSON, failed requests get a `response_code` and
//! a `message` even if the API sent neither, and imperial values can be
//! converted to metric or Celsius before the caller sees them.
//!
//! ```no_run
//! use fanout_lib::wsapi::{ApiClient, ApiConfig, ApiRequest};
//! use http::Method;
//!
//! # async fn run() -> fanout_lib::Result<()> {
//! let config = ApiConfig::load_from_file("fanout.toml")?;
//! let mut client = ApiClient::new(config)?;
//!
//! for _ in 0..10 {
//!     let request = client.prepare(&Method::GET, "account", [("fields", "key,username")]);
//!     client
//!         .request_with_handler(request, |response, _| {
//!             if let Some(account) = response.as_object_mut() {
//!                 account.remove("key");
//!             }
//!         })
//!         .await;
//! }
//!
//! client.finish().await?;
//! println!("{:?}", client.responses());
//! # Ok(())
//! # }
//! ```

mod error_log;
mod request;
mod response;
mod scale;

use std::{fs, path::Path, path::PathBuf, time::Duration};

use http::Method;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

pub use error_log::ErrorLog;
pub use request::ApiRequest;
pub use scale::{Units, scale};

use response::ResponseProcessor;

use crate::{
    Completed, Engine, EngineConfig, ErrorKind, RequestId, RequestStatus, ReqwestTransport,
    ReqwestTransportBuilder, Result, ResultRecord, Transport,
};

/// Unit of precipitation, snowfall and wind speed values
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    /// Inches and miles per hour, as sent by the API
    #[default]
    Imperial,
    /// Centimeters and kilometers per hour
    Metric,
}

/// Unit of temperature values
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    /// Degrees Fahrenheit, as sent by the API
    #[default]
    Fahrenheit,
    /// Degrees Celsius
    Celsius,
}

/// Default API location
pub const DEFAULT_BASE_URI: &str = "https://api.weathersource.com";
/// Default API version
pub const DEFAULT_VERSION: &str = "v1";
/// Default directory of the error log
pub const DEFAULT_ERROR_LOG_DIRECTORY: &str = "error_logs/";
/// Default number of API requests in flight, 10.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;
/// Default delay between two API requests, 50 milliseconds.
pub const DEFAULT_LAUNCH_INTERVAL: Duration = Duration::from_millis(50);
/// Default time allowed per API request, 60 seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings of an [`ApiClient`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    /// Scheme and host of the API
    pub base_uri: String,
    /// API version, part of every request path
    pub version: String,
    /// API key, part of every request path
    pub key: String,
    /// Ask the API to include diagnostics in responses
    pub return_diagnostics: bool,
    /// Ask the API to always answer with `200 OK`
    pub suppress_response_codes: bool,
    /// Unit of distances in processed responses
    pub distance_unit: DistanceUnit,
    /// Unit of temperatures in processed responses
    pub temperature_unit: TemperatureUnit,
    /// Append failed requests to the error log
    pub log_errors: bool,
    /// Directory of the error log
    pub error_log_directory: PathBuf,
    /// Maximum number of requests in flight
    pub max_concurrency: usize,
    /// Delay between two admissions
    #[serde(with = "humantime_serde")]
    pub launch_interval: Duration,
    /// Retries for requests failing with a recoverable error
    pub max_retries: u64,
    /// Delay before retrying a failed request
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    /// Total time allowed per request
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Time allowed to establish a connection
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_uri: DEFAULT_BASE_URI.to_string(),
            version: DEFAULT_VERSION.to_string(),
            key: String::new(),
            return_diagnostics: false,
            suppress_response_codes: false,
            distance_unit: DistanceUnit::default(),
            temperature_unit: TemperatureUnit::default(),
            log_errors: false,
            error_log_directory: PathBuf::from(DEFAULT_ERROR_LOG_DIRECTORY),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            launch_interval: DEFAULT_LAUNCH_INTERVAL,
            max_retries: crate::DEFAULT_MAX_RETRIES,
            retry_delay: crate::DEFAULT_RETRY_DELAY,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: crate::DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ApiConfig {
    /// Load the configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid
    /// configuration.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| ErrorKind::Io(Some(path.to_path_buf()), e))?;
        Ok(toml::from_str(&contents)?)
    }

    /// Engine settings derived from this configuration
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_concurrency: self.max_concurrency,
            launch_interval: self.launch_interval,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            ..EngineConfig::default()
        }
    }

    /// Units processed responses are converted to
    #[must_use]
    pub const fn units(&self) -> Units {
        Units {
            distance: self.distance_unit,
            temperature: self.temperature_unit,
        }
    }

    fn processor(&self) -> ResponseProcessor {
        ResponseProcessor {
            return_diagnostics: self.return_diagnostics,
            units: self.units(),
            error_log: self
                .log_errors
                .then(|| ErrorLog::new(&self.error_log_directory)),
        }
    }
}

/// Called with the processed response of an API request.
///
/// The value left in the response is what [`ApiClient::responses`] returns.
pub type ApiHandler = Box<dyn FnOnce(&mut Value, &Completed<'_, ()>) + Send>;

/// Sends API requests through an [`Engine`]
#[derive(Debug)]
pub struct ApiClient<T> {
    config: ApiConfig,
    engine: Engine<T>,
}

impl ApiClient<ReqwestTransport> {
    /// Create a client sending requests with reqwest
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let transport = ReqwestTransportBuilder::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .transport()?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> ApiClient<T> {
    /// Create a client sending requests through `transport`
    #[must_use]
    pub fn with_transport(config: ApiConfig, transport: T) -> Self {
        let engine = Engine::with_config(transport, config.engine_config());
        Self { config, engine }
    }

    /// The configuration of this client
    #[must_use]
    pub const fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Assemble a request to `resource_path`
    pub fn prepare<I, K, V>(&self, method: &Method, resource_path: &str, parameters: I) -> ApiRequest
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        ApiRequest::new(&self.config, method, resource_path, parameters)
    }

    /// Submit a request
    pub async fn request(&mut self, request: ApiRequest) -> RequestId {
        self.submit(request, None).await
    }

    /// Submit a request and call `handler` with its processed response
    pub async fn request_with_handler<F>(&mut self, request: ApiRequest, handler: F) -> RequestId
    where
        F: FnOnce(&mut Value, &Completed<'_, ()>) + Send + 'static,
    {
        self.submit(request, Some(Box::new(handler))).await
    }

    async fn submit(&mut self, request: ApiRequest, handler: Option<ApiHandler>) -> RequestId {
        let processor = self.config.processor();
        let request_uri = request.request_uri();

        let request = request
            .into_request()
            .handler(move |response: &mut String, completed: &Completed<'_, ()>| {
                let mut value = processor.process(response, completed.http_code, &request_uri);
                if let Some(handler) = handler {
                    handler(&mut value, completed);
                }
                *response = value.to_string();
            });
        self.engine.submit(request).await
    }

    /// Wait for all outstanding requests
    ///
    /// # Errors
    ///
    /// Returns an error if the transport failed, see [`Engine::finish`].
    pub async fn finish(&mut self) -> Result<()> {
        self.engine.finish().await
    }

    /// Where the request with the given id is in its lifecycle
    #[must_use]
    pub fn status(&self, id: RequestId) -> RequestStatus {
        self.engine.status(id)
    }

    /// Processed response of a finished request
    #[must_use]
    pub fn response(&self, id: RequestId) -> Option<Value> {
        self.engine.result(id).map(decode)
    }

    /// Processed responses of all finished requests, in the order in which
    /// they finished
    #[must_use]
    pub fn responses(&self) -> Vec<Value> {
        self.engine.results().iter().map(decode).collect()
    }

    /// Complete results of all finished requests
    #[must_use]
    pub fn results(&self) -> &[ResultRecord] {
        self.engine.results()
    }

    /// The underlying engine
    #[must_use]
    pub const fn engine(&self) -> &Engine<T> {
        &self.engine
    }
}

fn decode(record: &ResultRecord) -> Value {
    serde_json::from_str(&record.response).unwrap_or_else(|e| {
        warn!("Response of {} is not JSON: {e}", record.id);
        Value::Null
    })
}
