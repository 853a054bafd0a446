use anyhow::{Context, Result};
use fanout_lib::ResultRecord;
use serde::Serialize;

use super::ResultsFormatter;
use crate::stats::Summary;

#[derive(Serialize)]
struct Output<'a> {
    results: &'a [ResultRecord],
    summary: &'a Summary,
}

pub(crate) struct Json;

impl Json {
    pub(crate) const fn new() -> Self {
        Self {}
    }
}

impl ResultsFormatter for Json {
    /// Format results and summary as one JSON object
    fn format(&self, records: &[ResultRecord], summary: &Summary) -> Result<String> {
        serde_json::to_string_pretty(&Output {
            results: records,
            summary,
        })
        .context("Cannot format results as JSON")
    }
}
