//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Download firmware images and update artifacts.
///
/// Streams to a file or stdout, resumes partial files, throttles bandwidth,
/// and authenticates with client certificates. Ctrl-C cancels every transfer.
#[derive(Parser, Debug)]
#[command(name = "fwdl")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download a URL to a file, or to stdout without --output
    Fetch(FetchArgs),
    /// Save the response headers of a HEAD request
    Head(HeadArgs),
    /// Send an empty PUT and print the response
    Put(PutArgs),
    /// POST a JSON body and print the response
    Rpc(RpcArgs),
    /// Check that an HTTP endpoint answers
    Check(CheckArgs),
    /// Percent-encode text for use in a URL
    Encode(EncodeArgs),
}

/// Client certificate and TLS options.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct TlsArgs {
    /// Client certificate for mutual TLS
    #[arg(long, value_name = "PATH")]
    pub cert: Option<PathBuf>,

    /// Certificate container: "P12" for PKCS#12, anything else is read as PEM
    #[arg(long, value_name = "TYPE", default_value = "P12")]
    pub cert_type: String,

    /// Passphrase for the certificate's private key
    #[arg(long, value_name = "PASS", requires = "cert")]
    pub key_pass: Option<String>,

    /// Skip server certificate verification
    #[arg(long)]
    pub insecure: bool,
}

#[derive(ClapArgs, Debug)]
pub struct FetchArgs {
    /// URL to download
    pub url: String,

    /// Destination file (stdout when omitted)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Append to the destination, requesting bytes from this offset
    #[arg(long, value_name = "BYTES", requires = "output")]
    pub resume_from: Option<u64>,

    /// Maximum transfer rate in bytes per second
    #[arg(long, value_name = "BYTES_PER_SEC", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_rate: Option<u64>,

    /// Extra attempts after a dropped connection (0-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub retries: Option<u32>,

    /// Extra request header, "Name: value"
    #[arg(short = 'H', long, value_name = "LINE")]
    pub header: Option<String>,

    /// Request body; sends the request as a POST
    #[arg(short, long, value_name = "BODY")]
    pub data: Option<String>,

    /// Authorization header line from a provider (repeatable)
    #[arg(long = "auth-header", value_name = "LINE")]
    pub auth_headers: Vec<String>,

    /// Bearer token for an Authorization header
    #[arg(long, value_name = "TOKEN", conflicts_with = "auth_headers")]
    pub bearer: Option<String>,

    /// Write the response header block to this file
    #[arg(long, value_name = "PATH")]
    pub dump_headers: Option<PathBuf>,

    /// Append progress lines to this file
    #[arg(long, value_name = "PATH")]
    pub progress_file: Option<PathBuf>,

    /// Expected content hash, logged with the transfer
    #[arg(long, value_name = "HASH")]
    pub hash: Option<String>,

    /// Fail with a non-zero exit code on HTTP status >= 400
    #[arg(long)]
    pub fail: bool,

    #[command(flatten)]
    pub tls: TlsArgs,
}

impl FetchArgs {
    /// True when the transfer goes through an authorization provider.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !self.auth_headers.is_empty() || self.bearer.is_some()
    }
}

#[derive(ClapArgs, Debug)]
pub struct HeadArgs {
    /// URL to probe
    pub url: String,

    /// File receiving the status line and headers
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,

    #[command(flatten)]
    pub tls: TlsArgs,
}

#[derive(ClapArgs, Debug)]
pub struct PutArgs {
    /// Target URL
    pub url: String,

    /// Token header line, e.g. "Authorization: Bearer abc"
    #[arg(long, value_name = "LINE")]
    pub token: Option<String>,

    #[command(flatten)]
    pub tls: TlsArgs,
}

#[derive(ClapArgs, Debug)]
pub struct RpcArgs {
    /// JSON-RPC endpoint
    pub url: String,

    /// JSON request body
    #[arg(short, long, value_name = "JSON")]
    pub data: String,

    /// Token header line, e.g. "Authorization: Bearer abc"
    #[arg(long, value_name = "LINE")]
    pub token: Option<String>,

    #[command(flatten)]
    pub tls: TlsArgs,
}

#[derive(ClapArgs, Debug)]
pub struct CheckArgs {
    /// URL to probe (defaults to the configured connectivity URL)
    #[arg(long)]
    pub url: Option<String>,

    /// Probe timeout in milliseconds (0 for the default of 5 seconds)
    #[arg(long, value_name = "MS", default_value_t = 0)]
    pub timeout_ms: u64,
}

#[derive(ClapArgs, Debug)]
pub struct EncodeArgs {
    /// Text to encode
    pub text: String,
}
