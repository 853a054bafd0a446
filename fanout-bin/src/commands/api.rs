use anyhow::{Result, bail};
use fanout_lib::{
    ReqwestTransportBuilder,
    wsapi::{ApiClient, ApiConfig},
};
use http::HeaderMap;
use log::{debug, warn};

use super::Batch;
use crate::options::{ApiArgs, Config, HeaderMapExt};

/// Settings of the `[api]` section, overridden by the command line
fn api_config(config: &Config) -> ApiConfig {
    let mut api = config.api.clone();
    if let Some(max_concurrency) = config.max_concurrency {
        api.max_concurrency = max_concurrency;
    }
    if let Some(launch_interval) = config.launch_interval {
        api.launch_interval = launch_interval;
    }
    if let Some(max_retries) = config.max_retries {
        api.max_retries = max_retries;
    }
    if let Some(retry_delay) = config.retry_delay {
        api.retry_delay = retry_delay;
    }
    if let Some(timeout) = config.timeout {
        api.timeout = timeout;
    }
    api
}

/// Send `args.repeat` identical requests to the API
pub(crate) async fn api(args: &ApiArgs, config: &Config) -> Result<Batch> {
    let api = api_config(config);
    if api.key.is_empty() {
        bail!("No API key configured. Set `key` in the `[api]` section of the configuration file");
    }
    if args.repeat == 0 {
        warn!("Nothing to do, `--repeat` is 0");
    }

    let transport = ReqwestTransportBuilder::builder()
        .custom_headers(HeaderMap::from_header_pairs(&config.header)?)
        .connect_timeout(api.connect_timeout)
        .build()
        .transport()?;
    let mut client = ApiClient::with_transport(api, transport);

    let request = client.prepare(
        &args.method,
        &args.resource,
        args.params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    );
    debug!("Sending {request} {} times", args.repeat);
    for _ in 0..args.repeat {
        client.request(request.clone()).await;
    }

    let outcome = client.finish().await;
    Ok(Batch {
        records: client.results().to_vec(),
        submitted: client.engine().submitted(),
        outcome,
    })
}
