pub(crate) mod color;
pub(crate) mod log;

mod compact;
mod json;

use anyhow::Result;
use fanout_lib::ResultRecord;

use crate::{options::OutputFormat, stats::Summary};

pub(crate) trait ResultsFormatter {
    /// Format the results of a batch and its summary
    fn format(&self, records: &[ResultRecord], summary: &Summary) -> Result<String>;
}

pub(crate) fn get_formatter(format: &OutputFormat) -> Box<dyn ResultsFormatter> {
    match format {
        OutputFormat::Compact => Box::new(compact::Compact::new()),
        OutputFormat::Json => Box::new(json::Json::new()),
    }
}
