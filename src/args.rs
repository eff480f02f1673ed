use crate::{TradeViewError, TradeViewResult};

use clap::{Parser, ValueEnum};
use regex::Regex;
use std::{fmt, path::PathBuf, sync::LazyLock};

/// Host names, IPv4 addresses and bracketed IPv6 addresses.
static HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9](?:[A-Za-z0-9.\-]*[A-Za-z0-9])?|\[[0-9A-Fa-f:.]+\])$")
        .expect("valid host regex")
});

// https://stackoverflow.com/questions/74068168/clap-rs-not-printing-colors-during-help
fn get_styles() -> clap::builder::Styles {
    let cyan = anstyle::Color::Ansi(anstyle::AnsiColor::Cyan);
    let green = anstyle::Color::Ansi(anstyle::AnsiColor::Green);
    let yellow = anstyle::Color::Ansi(anstyle::AnsiColor::Yellow);

    clap::builder::Styles::styled()
        .placeholder(anstyle::Style::new().fg_color(Some(yellow)))
        .usage(anstyle::Style::new().fg_color(Some(cyan)).bold())
        .header(
            anstyle::Style::new()
                .fg_color(Some(cyan))
                .bold()
                .underline(),
        )
        .literal(anstyle::Style::new().fg_color(Some(green)))
}

// https://docs.rs/clap/latest/clap/struct.Command.html#method.help_template
const APPLET_TEMPLATE: &str = "\
{before-help}
{about-with-newline}
{usage-heading} {usage}

{all-args}
{after-help}";

const EX1: &str = r#" trade-view"#;
const EX2: &str = r#" trade-view --host 13.229.109.174 --port 8099"#;
const EX3: &str = r#" trade-view --scheme https --host pinot.example.com --timeout 10 --retries 0"#;
const EX4: &str = r#" trade-view --local ./snapshots --row-limit 1000"#;

/// Transport used to reach the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scheme {
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => f.write_str("http"),
            Scheme::Https => f.write_str("https"),
        }
    }
}

/// Command-line arguments for the Trade View dashboard.
#[derive(Parser, Debug, Clone)]
#[command(
    // Read from `Cargo.toml`.
    author, version, about,
    long_about = None,
    next_line_help = true,
    help_template = APPLET_TEMPLATE,
    styles=get_styles(),
    after_help = format!("EXAMPLES:\n{EX1}\n{EX2}\n{EX3}\n{EX4}")
)]
pub struct Arguments {
    /// Broker host name or address.
    #[arg(
        long,
        default_value = "localhost",
        value_name = "HOST",
        help = "Broker host name or address",
        value_parser = validate_host
    )]
    pub host: String,

    /// Broker port.
    #[arg(
        short = 'p',
        long,
        default_value_t = 8099,
        value_name = "PORT",
        help = "Broker port [Default: 8099]"
    )]
    pub port: u16,

    /// HTTP path of the SQL endpoint.
    #[arg(
        long,
        default_value = "/query/sql",
        value_name = "URL_PATH",
        help = "HTTP path of the broker's SQL endpoint"
    )]
    pub path: String,

    /// Transport scheme.
    #[arg(long, value_enum, default_value_t = Scheme::Http)]
    pub scheme: Scheme,

    /// Per-attempt request timeout in seconds.
    #[arg(
        short = 't',
        long,
        default_value_t = 30,
        value_name = "SECONDS",
        help = "Request timeout per attempt, in seconds",
        long_help = "Upper bound for one attempt, connection included.\n\
        An attempt that takes longer fails with a timeout and may be retried.",
        value_parser = validate_timeout
    )]
    pub timeout: u64,

    /// Retries after a connection failure or timeout.
    #[arg(
        short = 'r',
        long,
        default_value_t = 2,
        value_name = "COUNT",
        help = "Retries after a connection failure or timeout",
        long_help = "Number of extra attempts after a transient failure, with\n\
        exponential backoff starting at 250 ms. Rejected queries are never retried."
    )]
    pub retries: u32,

    /// Optional LIMIT appended to every generated query.
    #[arg(
        short = 'l',
        long,
        value_name = "ROWS",
        help = "LIMIT appended to every query",
        long_help = "\
Appends `LIMIT ROWS` to every generated query.
Pinot answers with at most 10 rows when a query has no LIMIT,
so set this when a panel groups more than 10 combinations.",
        value_parser = validate_row_limit
    )]
    pub row_limit: Option<usize>,

    /// Directory of CSV/Parquet snapshots served by the local engine.
    #[arg(
        long,
        value_name = "DIR",
        help = "Query CSV/Parquet snapshots in DIR instead of the broker",
        long_help = "Loads every *.csv and *.parquet file of DIR as a table named\n\
        after the file stem (e.g. trade_user.csv -> trade_user)."
    )]
    pub local: Option<PathBuf>,
}

impl Arguments {
    /// Build `Arguments` struct.
    pub fn build() -> Arguments {
        Arguments::parse()
    }
}

// --- Validation Functions ---

fn invalid(arg_name: &str, reason: impl Into<String>) -> TradeViewError {
    TradeViewError::InvalidArgument {
        arg_name: arg_name.to_string(),
        reason: reason.into(),
    }
}

/// clap validator for '--host': a bare host, without scheme, port or path.
fn validate_host(s: &str) -> TradeViewResult<String> {
    if HOST.is_match(s) {
        Ok(s.to_string())
    } else {
        Err(invalid(
            "--host",
            "expected a host name or address without scheme, port or path",
        ))
    }
}

/// clap validator for '--timeout': whole seconds, at least one.
fn validate_timeout(s: &str) -> TradeViewResult<u64> {
    match s.parse::<u64>() {
        Ok(0) => Err(invalid("--timeout", "must be at least 1 second")),
        Ok(seconds) => Ok(seconds),
        Err(e) => Err(invalid("--timeout", format!("not a number of seconds: {e}"))),
    }
}

/// clap validator for '--row-limit': a positive row count.
fn validate_row_limit(s: &str) -> TradeViewResult<usize> {
    match s.parse::<usize>() {
        Ok(0) => Err(invalid("--row-limit", "must be at least 1")),
        Ok(rows) => Ok(rows),
        Err(e) => Err(invalid("--row-limit", format!("not a row count: {e}"))),
    }
}

//----------------------------------------------------------------------------//
//                                   Tests                                    //
//----------------------------------------------------------------------------//

/// Run tests with:
/// `cargo test -- --show-output tests_args`
#[cfg(test)]
mod tests_args {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Arguments::parse_from(["trade-view"]);

        assert_eq!(args.host, "localhost");
        assert_eq!(args.port, 8099);
        assert_eq!(args.path, "/query/sql");
        assert_eq!(args.scheme, Scheme::Http);
        assert_eq!(args.timeout, 30);
        assert_eq!(args.retries, 2);
        assert_eq!(args.row_limit, None);
        assert_eq!(args.local, None);
    }

    #[test]
    fn test_args_all_options_short() {
        let args = Arguments::parse_from([
            "trade-view",
            "-p",
            "9000",
            "-t",
            "5",
            "-r",
            "0",
            "-l",
            "250",
        ]);

        assert_eq!(args.port, 9000);
        assert_eq!(args.timeout, 5);
        assert_eq!(args.retries, 0);
        assert_eq!(args.row_limit, Some(250));
    }

    #[test]
    fn test_args_all_options_long() {
        let args = Arguments::parse_from([
            "trade-view",
            "--host",
            "pinot.example.com",
            "--scheme",
            "https",
            "--path",
            "/query/sql",
            "--local",
            "snapshots",
        ]);

        assert_eq!(args.host, "pinot.example.com");
        assert_eq!(args.scheme, Scheme::Https);
        assert_eq!(args.scheme.to_string(), "https");
        assert_eq!(args.local, Some(PathBuf::from("snapshots")));
    }

    #[test]
    fn test_args_rejects_url_as_host() {
        let result = Arguments::try_parse_from(["trade-view", "--host", "http://localhost:8099"]);
        assert!(result.is_err());
        assert!(validate_host("[::1]").is_ok());
        assert!(validate_host("13.229.109.174").is_ok());
    }

    #[test]
    fn test_args_rejects_zero_timeout_and_limit() {
        assert!(Arguments::try_parse_from(["trade-view", "--timeout", "0"]).is_err());
        assert!(Arguments::try_parse_from(["trade-view", "--row-limit", "0"]).is_err());
        assert!(matches!(
            validate_timeout("soon"),
            Err(TradeViewError::InvalidArgument { arg_name, .. }) if arg_name == "--timeout"
        ));
    }
}
