use std::{
    fmt::{self, Display, Write},
    time::Duration,
};

use anyhow::Result;
use fanout_lib::ResultRecord;

use super::ResultsFormatter;
use crate::{
    formatters::color::{BOLD_GREEN, BOLD_PINK, DIM, color, color_for_code},
    stats::Summary,
};

struct CompactRecord<'a>(&'a ResultRecord);

impl Display for CompactRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.0;
        write!(
            f,
            "{} {}",
            color_for_code(&record.http_code).apply_to(format!("[{}]", record.http_code)),
            record.url
        )?;
        color!(f, DIM, " ({})", format_latency(record.latency))?;
        if !record.is_success() {
            write!(f, " | {}", record.response)?;
        }
        Ok(())
    }
}

/// Latency rounded to milliseconds, e.g. `1s 250ms`
fn format_latency(latency: Duration) -> String {
    let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
    humantime::format_duration(Duration::from_millis(millis)).to_string()
}

pub(crate) struct Compact;

impl Compact {
    pub(crate) const fn new() -> Self {
        Self {}
    }
}

impl ResultsFormatter for Compact {
    fn format(&self, records: &[ResultRecord], summary: &Summary) -> Result<String> {
        let mut out = String::new();
        for record in records {
            writeln!(out, "{}", CompactRecord(record))?;
        }

        let f = &mut out;
        if summary.is_success() {
            color!(f, BOLD_GREEN, "{}", summary)?;
        } else {
            color!(f, BOLD_PINK, "{}", summary)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::format_latency;

    #[test]
    fn test_format_latency() {
        assert_eq!(format_latency(Duration::from_micros(1_250_700)), "1s 250ms");
        assert_eq!(format_latency(Duration::from_micros(300)), "0s");
    }
}
