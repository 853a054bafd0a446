use std::fmt::{self, Display};

use http::{HeaderMap, HeaderValue, Method, header};
use url::form_urlencoded;

use super::ApiConfig;
use crate::{Request, RequestOptions};

/// Parameters set from the method and configuration
const RESERVED: &[&str] = &["_method", "_diagnostics", "_suppress_response_codes"];

/// A single request to the API, ready to be sent.
///
/// Whatever the API method, the request is sent as a form-encoded `POST`.
/// The API method travels in the `_method` parameter instead.
///
/// ```
/// use fanout_lib::wsapi::{ApiConfig, ApiRequest};
/// use http::Method;
///
/// let config = ApiConfig {
///     key: "secret".to_string(),
///     ..ApiConfig::default()
/// };
/// let request = ApiRequest::new(&config, &Method::GET, "account", [("fields", "key,email")]);
///
/// assert_eq!(request.url(), "https://api.weathersource.com/v1/secret/account.json");
/// assert_eq!(request.body(), "fields=key%2Cemail&_method=get");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    url: String,
    body: String,
    timeout: std::time::Duration,
}

impl ApiRequest {
    /// Assemble the request for `resource_path` (e.g. `history_by_postal_code`)
    pub fn new<I, K, V>(config: &ApiConfig, method: &Method, resource_path: &str, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let url = format!(
            "{}/{}/{}/{}.json",
            config.base_uri.trim_end_matches('/'),
            config.version,
            config.key,
            resource_path.trim_matches('/')
        );

        let mut form = form_urlencoded::Serializer::new(String::new());
        for (key, value) in parameters {
            let key = key.as_ref();
            if RESERVED.contains(&key) {
                continue;
            }
            form.append_pair(key, value.as_ref());
        }
        form.append_pair("_method", &method.as_str().to_lowercase());
        if config.return_diagnostics {
            form.append_pair("_diagnostics", "1");
        }
        if config.suppress_response_codes {
            form.append_pair("_suppress_response_codes", "1");
        }

        Self {
            url,
            body: form.finish(),
            timeout: config.timeout,
        }
    }

    /// URL the request is posted to
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Form-encoded request parameters
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// URL and parameters combined, as used in logs
    #[must_use]
    pub fn request_uri(&self) -> String {
        format!("{}?{}", self.url, self.body)
    }

    pub(crate) fn into_request<M>(self) -> Request<M> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        let options = RequestOptions::builder()
            .method(Method::POST)
            .headers(headers)
            .body(self.body)
            .timeout(self.timeout)
            .build();
        Request::new(self.url).options(options)
    }
}

impl Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "POST {}", self.request_uri())
    }
}
