use crate::verbosity::Verbosity;
use anyhow::{Context, Error, Result, anyhow};
use clap::builder::PossibleValuesParser;
use clap::{Parser, Subcommand, builder::TypedValueParser};
use const_format::formatcp;
use fanout_lib::wsapi::ApiConfig;
use http::{
    HeaderMap, Method,
    header::{HeaderName, HeaderValue},
};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::Path;
use std::{fs, path::PathBuf, str::FromStr, time::Duration};
use strum::{Display, EnumString, VariantNames};

pub(crate) const FANOUT_CONFIG_FILE: &str = "fanout.toml";

// We use a custom help message here because we want to show the default
// value of the config file, but also be able to check if the user has
// provided a custom value. If they didn't, we won't throw an error if
// the file doesn't exist.
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    FANOUT_CONFIG_FILE,
);

#[derive(
    Debug, Deserialize, Default, Clone, Copy, Display, EnumString, VariantNames, PartialEq, Eq,
)]
pub(crate) enum OutputFormat {
    /// One line per result, followed by a summary
    #[serde(rename = "compact")]
    #[strum(serialize = "compact", ascii_case_insensitive)]
    #[default]
    Compact,

    /// All results and the summary as one JSON document
    #[serde(rename = "json")]
    #[strum(serialize = "json", ascii_case_insensitive)]
    Json,
}

/// A parser for HTTP methods, e.g. `get` or `POST`
fn parse_method(method: &str) -> Result<Method> {
    Method::from_str(&method.to_uppercase()).map_err(|_| anyhow!("Invalid HTTP method `{method}`"))
}

/// Parse a single header into a [`HeaderName`] and [`HeaderValue`]
///
/// Headers are expected to be in format `Header-Name: Header-Value`.
/// The header name and value are trimmed of whitespace.
///
/// If the header contains multiple colons, the part after the first colon is
/// considered the value.
///
/// # Errors
///
/// This fails if the header does not contain a `:` character or
/// if the header name contains non-ASCII characters.
fn parse_single_header(header: &str) -> Result<(HeaderName, HeaderValue)> {
    let parts: Vec<&str> = header.splitn(2, ':').collect();
    match parts.as_slice() {
        [name, value] => {
            let name = name.trim();
            let name = HeaderName::from_str(name)
                .map_err(|e| anyhow!("Unable to convert header name '{name}': {e}"))?;
            let value = HeaderValue::from_str(value.trim())
                .map_err(|e| anyhow!("Unable to read value of header with name '{name}': {e}"))?;
            Ok((name, value))
        }
        _ => Err(anyhow!(
            "Invalid header format. Expected colon-separated string in the format 'HeaderName: HeaderValue'"
        )),
    }
}

/// Parses a single HTTP header into a tuple of (String, String)
///
/// This does NOT merge multiple headers into one.
#[derive(Clone, Debug)]
struct HeaderParser;

impl TypedValueParser for HeaderParser {
    type Value = (String, String);

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let header_str = value.to_str().ok_or_else(|| {
            clap::Error::raw(
                clap::error::ErrorKind::InvalidValue,
                "Header value contains invalid UTF-8",
            )
        })?;

        match parse_single_header(header_str) {
            Ok((name, value)) => {
                let Ok(value) = value.to_str() else {
                    return Err(clap::Error::raw(
                        clap::error::ErrorKind::InvalidValue,
                        "Header value contains invalid UTF-8",
                    ));
                };

                Ok((name.to_string(), value.to_string()))
            }
            Err(e) => Err(clap::Error::raw(
                clap::error::ErrorKind::InvalidValue,
                e.to_string(),
            )),
        }
    }
}

impl clap::builder::ValueParserFactory for HeaderParser {
    type Parser = HeaderParser;
    fn value_parser() -> Self::Parser {
        HeaderParser
    }
}

/// Parse an API parameter given as `key=value`
fn parse_param(param: &str) -> Result<(String, String)> {
    match param.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(anyhow!(
            "Invalid parameter `{param}`. Expected the format 'key=value'"
        )),
    }
}

/// Extension trait for converting a Vec of header pairs to a `HeaderMap`
pub(crate) trait HeaderMapExt {
    /// Convert a collection of header key-value pairs to a `HeaderMap`
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error>;
}

impl HeaderMapExt for HeaderMap {
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| anyhow!("Invalid header name '{name}': {e}"))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| anyhow!("Invalid header value '{value}': {e}"))?;
            header_map.insert(header_name, header_value);
        }
        Ok(header_map)
    }
}

/// fanout sends many HTTP requests with a bounded number of them in flight,
/// retrying requests which fail with a recoverable error.
///
/// fanout is powered by fanout-lib, the Rust library for multiplexing requests.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct FanoutOptions {
    #[command(subcommand)]
    pub(crate) command: Command,

    /// Configuration file to use
    #[arg(short, long = "config", global = true)]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Command {
    /// Send a request to each of the given URLs
    Fetch(FetchArgs),

    /// Send requests to the Weather Source API.
    ///
    /// The API is configured in the `[api]` section of the configuration file.
    Api(ApiArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub(crate) struct FetchArgs {
    /// URLs to send requests to
    #[arg(required = true)]
    pub(crate) urls: Vec<String>,

    /// HTTP method of all requests
    #[arg(short = 'X', long, default_value = "GET", value_parser = parse_method)]
    pub(crate) method: Method,

    /// Request body of all requests
    #[arg(short = 'd', long)]
    pub(crate) body: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub(crate) struct ApiArgs {
    /// Resource path, e.g. `history_by_postal_code`
    pub(crate) resource: String,

    /// API method, sent as the `_method` parameter
    #[arg(short = 'X', long, default_value = "GET", value_parser = parse_method)]
    pub(crate) method: Method,

    /// Resource parameter in the format `key=value`. Can be repeated.
    #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub(crate) params: Vec<(String, String)>,

    /// Send the same request this many times
    #[arg(long, default_value_t = 1)]
    pub(crate) repeat: usize,
}

// Custom deserializer function for the header field
fn deserialize_headers<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = BTreeMap::<String, String>::deserialize(deserializer)?;
    Ok(map.into_iter().collect())
}

/// Options shared by all commands.
///
/// Engine settings are optional: unset values fall back to the library
/// defaults for `fetch` and to the `[api]` section for `api`.
#[derive(clap::Args, Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Verbose program output
    #[clap(flatten)]
    #[serde(default)]
    pub(crate) verbose: Verbosity,

    /// Maximum number of requests in flight at once
    #[arg(long, global = true)]
    #[serde(default)]
    pub(crate) max_concurrency: Option<usize>,

    /// Minimum delay between starting two requests, e.g. `50ms`
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) launch_interval: Option<Duration>,

    /// Maximum number of retries per request failing with a connection
    /// error or status 500, 503 or 504
    #[arg(long, global = true)]
    #[serde(default)]
    pub(crate) max_retries: Option<u64>,

    /// Delay before retrying a failed request, e.g. `2s`
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) retry_delay: Option<Duration>,

    /// Total time allowed per request, e.g. `30s`
    #[arg(short, long, global = true, value_parser = humantime::parse_duration)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) timeout: Option<Duration>,

    /// Custom request header. Can be repeated.
    #[arg(
        short = 'H',
        long = "header",
        global = true,
        value_name = "HEADER:VALUE",
        value_parser = HeaderParser,
        help = "Set custom header for requests",
        long_help = "Set custom header for requests

Some websites require custom headers to be passed in order to return valid responses.
You can specify custom headers in the format 'Name: Value'. For example, 'Accept: text/html'.
This is the same format that other tools like curl or wget use.
Multiple headers can be specified by using the flag multiple times."
    )]
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_headers")]
    pub(crate) header: Vec<(String, String)>,

    /// Output format of the results
    #[arg(
        short,
        long,
        global = true,
        default_value = "compact",
        value_parser = PossibleValuesParser::new(OutputFormat::VARIANTS)
            .map(|s| s.parse::<OutputFormat>().unwrap_or_default())
    )]
    #[serde(default)]
    pub(crate) format: OutputFormat,

    /// Weather Source API settings, only read from the configuration file
    #[arg(skip)]
    #[serde(default)]
    pub(crate) api: ApiConfig,
}

// Macro for merging configuration values
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

impl Config {
    /// Special handling for merging headers
    ///
    /// Headers from `other` are added unless `self` already sets a header
    /// with the same name.
    fn merge_headers(&mut self, other: &[(String, String)]) {
        for (name, value) in other {
            if !self.header.iter().any(|(set, _)| set.eq_ignore_ascii_case(name)) {
                self.header.push((name.clone(), value.clone()));
            }
        }
    }

    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| "Failed to parse configuration file")
    }

    /// Merge the configuration from TOML into the CLI configuration
    pub(crate) fn merge(&mut self, toml: Config) {
        self.merge_headers(&toml.header);

        // Only available in TOML
        self.api = toml.api;

        // NOTE: if you see an error within this macro call, check to make sure that
        // that the fields provided to fold_in! match all the fields of the Config struct.
        fold_in! {
            // Destination and source configs
            self, toml;

            Config {
                // Keys which are handled outside of fold_in
                ..header,
                ..api,

                // Keys with defaults to assign
                verbose: Verbosity::default(),
                max_concurrency: None,
                launch_interval: None,
                max_retries: None,
                retry_delay: None,
                timeout: None,
                format: OutputFormat::default(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;
    use http::Method;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn verify_app() {
        use clap::CommandFactory;
        FanoutOptions::command().debug_assert();
    }

    #[test]
    fn test_parse_custom_headers() {
        assert_eq!(
            parse_single_header("accept:text/html").unwrap(),
            (
                HeaderName::from_static("accept"),
                HeaderValue::from_static("text/html")
            )
        );
    }

    #[test]
    fn test_parse_custom_header_multiple_colons() {
        assert_eq!(
            parse_single_header("key:x-test:check=this").unwrap(),
            (
                HeaderName::from_static("key"),
                HeaderValue::from_static("x-test:check=this")
            )
        );
    }

    #[test]
    fn test_does_not_echo_sensitive_data() {
        let error = parse_single_header("My-Header💣: secret")
            .expect_err("Should not allow unicode as key");
        assert!(!error.to_string().contains("secret"));

        let error = parse_single_header("secret").expect_err("Should fail when no `:` given");
        assert!(!error.to_string().contains("secret"));
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("fields=key,email").unwrap(),
            ("fields".to_string(), "key,email".to_string())
        );
        assert_eq!(
            parse_param("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
        assert!(parse_param("fields").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("post").unwrap(), Method::POST);
        assert!(parse_method("not a method").is_err());
    }

    #[test]
    fn test_fetch_arguments() {
        let opts = FanoutOptions::parse_from([
            "fanout",
            "fetch",
            "https://example.com",
            "https://example.org",
            "--max-concurrency",
            "4",
            "--retry-delay",
            "500ms",
            "-H",
            "Accept: text/html",
            "--format",
            "json",
        ]);

        let Command::Fetch(args) = opts.command else {
            panic!("expected the fetch command");
        };
        assert_eq!(args.urls.len(), 2);
        assert_eq!(args.method, Method::GET);
        assert_eq!(opts.config.max_concurrency, Some(4));
        assert_eq!(opts.config.retry_delay, Some(Duration::from_millis(500)));
        assert_eq!(
            opts.config.header,
            vec![("accept".to_string(), "text/html".to_string())]
        );
        assert_eq!(opts.config.format, OutputFormat::Json);
    }

    #[test]
    fn test_api_arguments() {
        let opts = FanoutOptions::parse_from([
            "fanout",
            "api",
            "account",
            "--param",
            "fields=key,username",
            "--repeat",
            "10",
        ]);

        let Command::Api(args) = opts.command else {
            panic!("expected the api command");
        };
        assert_eq!(args.resource, "account");
        assert_eq!(args.repeat, 10);
        assert_eq!(
            args.params,
            vec![("fields".to_string(), "key,username".to_string())]
        );
    }

    #[test]
    fn test_merge_prefers_cli() {
        let mut cli = FanoutOptions::parse_from(["fanout", "--max-retries", "1", "fetch", "x"]).config;
        let toml: Config = toml::from_str(
            r#"
            max_retries = 3
            max_concurrency = 8
            format = "json"
            header = { "X-Api" = "1" }

            [api]
            key = "secret"
            "#,
        )
        .unwrap();

        cli.merge(toml);
        assert_eq!(cli.max_retries, Some(1));
        assert_eq!(cli.max_concurrency, Some(8));
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.header, vec![("X-Api".to_string(), "1".to_string())]);
        assert_eq!(cli.api.key, "secret");
    }

    #[test]
    fn test_merge_headers_prefers_cli() {
        let mut cli = FanoutOptions::parse_from([
            "fanout",
            "-H",
            "Accept: text/html",
            "fetch",
            "https://example.com",
        ])
        .config;
        let toml: Config = toml::from_str(
            r#"
            [header]
            Accept = "application/json"
            X-Trace = "1"
            Authorization = "token"
            "#,
        )
        .unwrap();

        cli.merge(toml);
        assert_eq!(
            cli.header,
            vec![
                ("accept".to_string(), "text/html".to_string()),
                ("Authorization".to_string(), "token".to_string()),
                ("X-Trace".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_unknown_config_key() {
        assert!(toml::from_str::<Config>("threads = 4").is_err());
    }
}
