use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local, SecondsFormat, TimeZone};
use percent_encoding::percent_decode_str;

use crate::{ErrorKind, Result};

/// Daily log files of failed API requests.
///
/// Each failure is appended as one line to
/// `<directory>/wsapi_errors_<YYYYMMDD>.log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLog {
    directory: PathBuf,
}

impl ErrorLog {
    /// Log into `directory`, which is created on first write if missing
    #[must_use]
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Directory holding the log files
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the log file for the given day
    #[must_use]
    pub fn path<Tz: TimeZone>(&self, date: &DateTime<Tz>) -> PathBuf
    where
        Tz::Offset: std::fmt::Display,
    {
        self.directory
            .join(format!("wsapi_errors_{}.log", date.format("%Y%m%d")))
    }

    /// Append a failure of the request to `request_uri`
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Io`] if the directory cannot be created or the
    /// log file cannot be written.
    pub fn write(&self, http_code: &str, message: &str, request_uri: &str) -> Result<()> {
        self.write_at(&Local::now(), http_code, message, request_uri)
    }

    pub(crate) fn write_at<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        http_code: &str,
        message: &str,
        request_uri: &str,
    ) -> Result<()>
    where
        Tz::Offset: std::fmt::Display,
    {
        fs::create_dir_all(&self.directory)
            .map_err(|e| ErrorKind::Io(Some(self.directory.clone()), e))?;

        let path = self.path(now);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ErrorKind::Io(Some(path.clone()), e))?;
        file.write_all(line(now, http_code, message, request_uri).as_bytes())
            .map_err(|e| ErrorKind::Io(Some(path), e))
    }
}

fn line<Tz: TimeZone>(now: &DateTime<Tz>, http_code: &str, message: &str, request_uri: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "[{}] [Error {http_code} | {message}] [{}]\r\n",
        now.to_rfc3339_opts(SecondsFormat::Secs, false),
        decode(request_uri)
    )
}

/// Decode a form-encoded string for readability
fn decode(input: &str) -> String {
    let input = input.replace('+', " ");
    percent_decode_str(&input).decode_utf8_lossy().into_owned()
}
