use anyhow::Result;
use fanout_lib::{
    DEFAULT_LAUNCH_INTERVAL, DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY,
    Engine, EngineConfig, Request, RequestOptions, ReqwestTransportBuilder,
};
use http::HeaderMap;
use log::debug;

use super::Batch;
use crate::options::{Config, FetchArgs, HeaderMapExt};

/// Send one request per URL and wait for all of them
pub(crate) async fn fetch(args: &FetchArgs, config: &Config) -> Result<Batch> {
    let transport = ReqwestTransportBuilder::builder()
        .custom_headers(HeaderMap::from_header_pairs(&config.header)?)
        .timeout(config.timeout)
        .build()
        .transport()?;

    let engine_config = EngineConfig {
        max_concurrency: config.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
        launch_interval: config.launch_interval.unwrap_or(DEFAULT_LAUNCH_INTERVAL),
        max_retries: config.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        retry_delay: config.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
        ..EngineConfig::default()
    };
    debug!("Fetching {} URLs with {engine_config:?}", args.urls.len());
    let mut engine: Engine<_> = Engine::with_config(transport, engine_config);

    for url in &args.urls {
        let mut options = RequestOptions::builder().method(args.method.clone()).build();
        options.body.clone_from(&args.body);
        engine.submit(Request::new(url.as_str()).options(options)).await;
    }

    let outcome = engine.finish().await;
    let submitted = engine.submitted();
    Ok(Batch {
        records: engine.into_results(),
        submitted,
        outcome,
    })
}
