//! [`Transport`] implementation on top of [reqwest](https://docs.rs/reqwest).
//!
//! Every registered operation runs as its own tokio task on a shared
//! `reqwest::Client`, whose connection pool is reused across operations.
//! Finished tasks report back through an unbounded channel, which is drained
//! by [`Transport::drive_progress`] and awaited by [`Transport::wait`].
use std::{
    collections::{HashMap, HashSet, VecDeque},
    error::Error,
    time::Duration,
};

use async_trait::async_trait;
use http::header::{self, HeaderMap, HeaderValue};
use log::{debug, warn};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use typed_builder::TypedBuilder;

use super::{Completion, Progress, Transport};
use crate::{ErrorKind, RequestId, RequestOptions, Result};

/// Default number of redirects followed before a request is deemed as failed, 5.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;
/// Default time allowed to establish a connection, 5 seconds.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default user agent, `fanout-<PKG_VERSION>`.
pub const DEFAULT_USER_AGENT: &str = concat!("fanout/", env!("CARGO_PKG_VERSION"));

/// Builder for [`ReqwestTransport`].
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
pub struct ReqwestTransportBuilder {
    /// User-agent sent with every request.
    #[builder(default = String::from(DEFAULT_USER_AGENT))]
    user_agent: String,
    /// Time allowed to establish a connection.
    #[builder(default = DEFAULT_CONNECT_TIMEOUT)]
    connect_timeout: Duration,
    /// Total time allowed per request, unless the request sets its own.
    timeout: Option<Duration>,
    /// Headers sent with every request.
    ///
    /// Headers set in [`RequestOptions::headers`] take precedence.
    custom_headers: HeaderMap,
    /// Maximum number of redirects per request before returning an error.
    #[builder(default = DEFAULT_MAX_REDIRECTS)]
    max_redirects: usize,
    /// When `true`, accept invalid SSL certificates.
    ///
    /// ## Warning
    ///
    /// If invalid certificates are trusted, any certificate for any site
    /// will be trusted for use, including expired certificates. Only use
    /// this as a last resort.
    allow_insecure: bool,
}

impl Default for ReqwestTransportBuilder {
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ReqwestTransportBuilder {
    /// Instantiates a [`ReqwestTransport`].
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - The user-agent is invalid.
    /// - The request client cannot be created.
    ///   See [here](https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#errors).
    pub fn transport(self) -> Result<ReqwestTransport> {
        let Self {
            user_agent,
            connect_timeout,
            timeout,
            custom_headers: mut headers,
            max_redirects,
            allow_insecure,
        } = self;

        headers.insert(header::USER_AGENT, HeaderValue::from_str(&user_agent)?);

        let builder = reqwest::ClientBuilder::new()
            .gzip(true)
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .danger_accept_invalid_certs(allow_insecure)
            .redirect(reqwest::redirect::Policy::limited(max_redirects));

        let client = (match timeout {
            Some(t) => builder.timeout(t),
            None => builder,
        })
        .build()
        .map_err(ErrorKind::BuildRequestClient)?;

        Ok(ReqwestTransport::new(client))
    }
}

/// Runs operations concurrently on a shared `reqwest::Client`.
///
/// Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    sender: UnboundedSender<Completion>,
    receiver: UnboundedReceiver<Completion>,
    /// Tasks of registered operations, until deregistered
    in_flight: HashMap<RequestId, JoinHandle<()>>,
    /// Operations whose completion was already received
    reported: HashSet<RequestId>,
    ready: VecDeque<Completion>,
}

impl ReqwestTransport {
    /// Create a transport using an existing client
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            client,
            sender,
            receiver,
            in_flight: HashMap::new(),
            reported: HashSet::new(),
            ready: VecDeque::new(),
        }
    }

    /// Number of registered operations which were not deregistered yet
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn build_request(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> std::result::Result<reqwest::Request, String> {
        let url = reqwest::Url::parse(url).map_err(|e| format!("Cannot parse URL `{url}`: {e}"))?;

        let mut builder = self
            .client
            .request(options.method.clone(), url)
            .headers(options.headers.clone());
        if let Some(body) = &options.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        builder.build().map_err(|e| describe_error(&e))
    }

    fn receive(&mut self, completion: Completion) {
        self.reported.insert(completion.id);
        self.ready.push_back(completion);
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    fn register(&mut self, id: RequestId, url: &str, options: &RequestOptions) -> Result<()> {
        let request = match self.build_request(url, options) {
            Ok(request) => request,
            Err(detail) => {
                debug!("Request {id} cannot be sent: {detail}");
                self.receive(Completion::failure(id, detail));
                return Ok(());
            }
        };

        let client = self.client.clone();
        let sender = self.sender.clone();
        let task = tokio::spawn(async move {
            let completion = execute(&client, id, request).await;
            // The receiver is gone if the transport was dropped in the meantime
            let _ = sender.send(completion);
        });
        self.in_flight.insert(id, task);
        Ok(())
    }

    fn deregister(&mut self, id: RequestId) {
        self.reported.remove(&id);
        if let Some(task) = self.in_flight.remove(&id) {
            task.abort();
        }
    }

    fn drive_progress(&mut self) -> Result<Progress> {
        // Take the snapshot before draining: a task sends its completion
        // before it finishes.
        let finished: Vec<RequestId> = self
            .in_flight
            .iter()
            .filter(|(_, task)| task.is_finished())
            .map(|(id, _)| *id)
            .collect();

        // The transport holds a sender itself, so the channel never disconnects
        while let Ok(completion) = self.receiver.try_recv() {
            self.receive(completion);
        }

        for id in finished {
            if !self.reported.contains(&id) {
                warn!("Task of request {id} ended without reporting a result");
                self.receive(Completion::failure(id, "Request task aborted"));
            }
        }

        Ok(Progress::Idle)
    }

    async fn wait(&mut self, timeout: Duration) -> bool {
        if !self.ready.is_empty() {
            return true;
        }

        match tokio::time::timeout(timeout, self.receiver.recv()).await {
            Ok(Some(completion)) => {
                self.receive(completion);
                true
            }
            Ok(None) | Err(_) => false,
        }
    }

    fn next_completed(&mut self) -> Option<Completion> {
        self.ready.pop_front()
    }

    fn close(&mut self) {
        for (_, task) in self.in_flight.drain() {
            task.abort();
        }
        self.reported.clear();
        self.ready.clear();
        while self.receiver.try_recv().is_ok() {}
    }
}

async fn execute(client: &reqwest::Client, id: RequestId, request: reqwest::Request) -> Completion {
    let response = match client.execute(request).await {
        Ok(response) => response,
        Err(e) => return Completion::failure(id, describe_error(&e)),
    };

    let status = response.status().as_u16();
    match response.text().await {
        Ok(body) => Completion::response(id, status, body),
        Err(e) => Completion::failure(id, describe_error(&e)),
    }
}

/// Extract a concise description of what went wrong from a reqwest error.
///
/// The outermost message (e.g. "error sending request for url") says little,
/// so this prefers the innermost cause of the error chain.
fn describe_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        return "Operation timed out".to_string();
    }

    let mut message = None;
    let mut source = error.source();
    while let Some(err) = source {
        if let Some(io_error) = err.downcast_ref::<std::io::Error>() {
            return describe_io_error(io_error);
        }
        message = Some(err.to_string());
        source = err.source();
    }

    message.unwrap_or_else(|| error.to_string())
}

fn describe_io_error(error: &std::io::Error) -> String {
    match error.kind() {
        std::io::ErrorKind::ConnectionRefused => "Connection refused".to_string(),
        std::io::ErrorKind::ConnectionReset => "Connection reset by peer".to_string(),
        std::io::ErrorKind::TimedOut => "Operation timed out".to_string(),
        std::io::ErrorKind::UnexpectedEof => "Connection closed unexpectedly".to_string(),
        _ => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::{Method, StatusCode};
    use test_utils::{flaky_mock_server, mock_response, mock_server};
    use wiremock::matchers::{body_string, header, method};

    use super::ReqwestTransportBuilder;
    use crate::{Completion, Progress, RequestId, RequestOptions, Transport};

    const WAIT: Duration = Duration::from_secs(5);

    async fn complete(transport: &mut impl Transport, id: RequestId) -> Completion {
        loop {
            assert_eq!(transport.drive_progress().unwrap(), Progress::Idle);
            if let Some(completion) = transport.next_completed() {
                assert_eq!(completion.id, id);
                transport.deregister(id);
                return completion;
            }
            assert!(transport.wait(WAIT).await, "no completion within {WAIT:?}");
        }
    }

    #[tokio::test]
    async fn test_success_body() {
        let mock_server = mock_response!("hello");
        let mut transport = ReqwestTransportBuilder::default().transport().unwrap();

        let id = RequestId::new(0, 0);
        transport
            .register(id, &mock_server.uri(), &RequestOptions::default())
            .unwrap();
        let completion = complete(&mut transport, id).await;

        assert_eq!(completion, Completion::response(id, 200, "hello"));
        assert_eq!(transport.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let mock_server = mock_server!(StatusCode::SERVICE_UNAVAILABLE);
        let mut transport = ReqwestTransportBuilder::default().transport().unwrap();

        let id = RequestId::new(0, 1);
        transport
            .register(id, &mock_server.uri(), &RequestOptions::default())
            .unwrap();
        let completion = complete(&mut transport, id).await;

        assert_eq!(completion.status_code, 503);
        assert_eq!(completion.error, None);
    }

    #[tokio::test]
    async fn test_flaky_server() {
        let mock_server = flaky_mock_server!(StatusCode::SERVICE_UNAVAILABLE, 1, "recovered");
        let mut transport = ReqwestTransportBuilder::default().transport().unwrap();

        let first = RequestId::new(0, 0);
        transport
            .register(first, &mock_server.uri(), &RequestOptions::default())
            .unwrap();
        assert_eq!(complete(&mut transport, first).await.status_code, 503);

        let second = RequestId::new(0, 1);
        transport
            .register(second, &mock_server.uri(), &RequestOptions::default())
            .unwrap();
        assert_eq!(
            complete(&mut transport, second).await,
            Completion::response(second, 200, "recovered")
        );
    }

    #[tokio::test]
    async fn test_method_headers_and_body() {
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(method("POST"))
            .and(header("x-api", "1"))
            .and(body_string("fields=key"))
            .respond_with(wiremock::ResponseTemplate::new(201))
            .mount(&mock_server)
            .await;

        let mut headers = http::HeaderMap::new();
        headers.insert("x-api", "1".parse().unwrap());
        let options = RequestOptions::builder()
            .method(Method::POST)
            .headers(headers)
            .body("fields=key".to_string())
            .build();

        let mut transport = ReqwestTransportBuilder::default().transport().unwrap();
        let id = RequestId::new(0, 0);
        transport.register(id, &mock_server.uri(), &options).unwrap();

        assert_eq!(complete(&mut transport, id).await.status_code, 201);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Nothing listens on port 1
        let mut transport = ReqwestTransportBuilder::default().transport().unwrap();
        let id = RequestId::new(0, 0);
        transport
            .register(id, "http://127.0.0.1:1/", &RequestOptions::default())
            .unwrap();

        let completion = complete(&mut transport, id).await;
        assert_eq!(completion.status_code, 0);
        assert!(completion.error.is_some());
        assert!(completion.body.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let mut transport = ReqwestTransportBuilder::default().transport().unwrap();
        let id = RequestId::new(0, 0);
        transport
            .register(id, "not a url", &RequestOptions::default())
            .unwrap();

        // Reported without waiting
        let completion = transport.next_completed().unwrap();
        assert_eq!(completion.status_code, 0);
        assert!(completion.error.unwrap().starts_with("Cannot parse URL"));
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let mock_server = mock_server!(StatusCode::OK, set_delay(Duration::from_millis(500)));
        let mut transport = ReqwestTransportBuilder::default().transport().unwrap();

        let options = RequestOptions::builder()
            .timeout(Duration::from_millis(50))
            .build();
        let id = RequestId::new(0, 0);
        transport.register(id, &mock_server.uri(), &options).unwrap();

        let completion = complete(&mut transport, id).await;
        assert_eq!(completion.status_code, 0);
        assert_eq!(completion.error.as_deref(), Some("Operation timed out"));
    }

    #[tokio::test]
    async fn test_task_without_result_is_reported() {
        let mut transport = ReqwestTransportBuilder::default().transport().unwrap();
        let id = RequestId::new(0, 0);

        let task = tokio::spawn(async {});
        while !task.is_finished() {
            tokio::task::yield_now().await;
        }
        transport.in_flight.insert(id, task);

        assert_eq!(transport.drive_progress().unwrap(), Progress::Idle);
        assert_eq!(
            transport.next_completed(),
            Some(Completion::failure(id, "Request task aborted"))
        );
        assert!(transport.next_completed().is_none());
    }

    #[tokio::test]
    async fn test_wait_times_out_without_work() {
        let mut transport = ReqwestTransportBuilder::default().transport().unwrap();
        assert!(!transport.wait(Duration::from_millis(10)).await);
        assert!(transport.next_completed().is_none());
    }

    #[tokio::test]
    async fn test_close_discards_in_flight() {
        let mock_server = mock_server!(StatusCode::OK, set_delay(Duration::from_secs(10)));
        let mut transport = ReqwestTransportBuilder::default().transport().unwrap();

        transport
            .register(RequestId::new(0, 0), &mock_server.uri(), &RequestOptions::default())
            .unwrap();
        assert_eq!(transport.in_flight(), 1);

        transport.close();
        assert_eq!(transport.in_flight(), 0);
        assert!(transport.next_completed().is_none());
    }
}
