use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    time::Duration,
};

use http::{HeaderMap, Method};
use serde::{Serialize, Serializer};
use typed_builder::TypedBuilder;

use super::handler::{Completed, Handler};

/// Opaque identifier of a submitted request.
///
/// Identifiers are assigned by the [`Engine`](crate::Engine) at submission
/// time. They are never reused within one engine and never collide with
/// identifiers of another engine in the same process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestId {
    engine: u64,
    seq: u64,
}

impl RequestId {
    pub(crate) const fn new(engine: u64, seq: u64) -> Self {
        Self { engine, seq }
    }

    /// Position of this request in the submission order of its engine,
    /// starting at 0
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.engine, self.seq)
    }
}

/// Transport configuration of a single request.
///
/// ```
/// use fanout_lib::RequestOptions;
/// use http::Method;
/// use std::time::Duration;
///
/// let options = RequestOptions::builder()
///     .method(Method::POST)
///     .body("a=1".to_string())
///     .timeout(Duration::from_secs(60))
///     .build();
/// assert_eq!(options.method, Method::POST);
/// ```
#[derive(TypedBuilder, Debug, Clone, PartialEq, Eq, Serialize)]
#[builder(field_defaults(default, setter(into)))]
pub struct RequestOptions {
    /// HTTP method, `GET` unless set otherwise
    #[builder(default = Method::GET)]
    #[serde(serialize_with = "serialize_method")]
    pub method: Method,

    /// Headers sent in addition to the transport's default headers
    #[serde(serialize_with = "serialize_headers")]
    pub headers: HeaderMap,

    /// Request body
    #[builder(setter(strip_option))]
    pub body: Option<String>,

    /// Total time allowed for this request, including reading the body
    #[builder(setter(strip_option))]
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn serialize_method<S>(method: &Method, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(method.as_str())
}

fn serialize_headers<S>(headers: &HeaderMap, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let map: BTreeMap<String, String> = headers
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or("").to_string()))
        .collect();
    map.serialize(serializer)
}

/// A request waiting to be submitted to an [`Engine`](crate::Engine).
///
/// `M` is the type of the caller-supplied metadata, which is passed through
/// to the handler and the [`ResultRecord`](crate::ResultRecord) untouched.
pub struct Request<M = ()> {
    pub(crate) url: String,
    pub(crate) options: RequestOptions,
    pub(crate) handler: Option<Box<dyn Handler<M>>>,
    pub(crate) metadata: Option<M>,
}

impl<M> Request<M> {
    /// Create a `GET` request without handler or metadata
    #[must_use]
    pub fn new<S: Into<String>>(url: S) -> Self {
        Request {
            url: url.into(),
            options: RequestOptions::default(),
            handler: None,
            metadata: None,
        }
    }

    /// Set the transport options of this request
    #[must_use]
    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Set a closure to be called once this request is finalized.
    ///
    /// The closure may modify the response; whatever it leaves in the string
    /// is stored in the result.
    #[must_use]
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(&mut String, &Completed<'_, M>) + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Set a handler implementing [`Handler`] directly
    #[must_use]
    pub fn boxed_handler(mut self, handler: Box<dyn Handler<M>>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Attach metadata to this request
    #[must_use]
    pub fn metadata(mut self, metadata: M) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// The URL of this request
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl<M: fmt::Debug> fmt::Debug for Request<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("url", &self.url)
            .field("options", &self.options)
            .field("handler", &self.handler.as_ref().map(|_| "<handler>"))
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl<M> Display for Request<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.options.method, self.url)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::{HeaderMap, Method, header};
    use pretty_assertions::assert_eq;

    use super::{Request, RequestId, RequestOptions};

    #[test]
    fn test_default_options() {
        let options = RequestOptions::default();
        assert_eq!(options.method, Method::GET);
        assert!(options.headers.is_empty());
        assert_eq!(options.body, None);
        assert_eq!(options.timeout, None);
    }

    #[test]
    fn test_options_serialization() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, "application/json".parse().unwrap());
        let options = RequestOptions::builder()
            .method(Method::POST)
            .headers(headers)
            .body("fields=key".to_string())
            .timeout(Duration::from_secs(60))
            .build();

        assert_eq!(
            serde_json::to_value(&options).unwrap(),
            serde_json::json!({
                "method": "POST",
                "headers": { "accept": "application/json" },
                "body": "fields=key",
                "timeout": "1m",
            })
        );
    }

    #[test]
    fn test_request_display() {
        let request: Request = Request::new("https://example.com/a");
        assert_eq!(request.to_string(), "GET https://example.com/a");
    }

    #[test]
    fn test_request_id_display() {
        let id = RequestId::new(3, 17);
        assert_eq!(id.to_string(), "3#17");
        assert_eq!(id.seq(), 17);
    }
}
