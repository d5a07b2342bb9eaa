use clap::Parser;

/// Sync engine configuration
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Base URL of the dashboard REST API.
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    pub api_base: String,

    /// Connect to host:port for the push event stream.
    #[arg(long, value_name = "HOST:PORT", default_value = "127.0.0.1:9100")]
    pub push_connect: String,

    /// Seconds between periodic full refreshes.
    #[arg(long, default_value_t = 60)]
    pub refresh_interval: u64,

    /// Directory for derived state files (layers.json, status.json). Empty = no file writes.
    #[arg(long, value_name = "DIR", default_value = "")]
    pub work_dir: String,

    /// Status logging interval in seconds, -1 to disable
    #[arg(long, default_value_t = 15)]
    pub status_interval: i32,

    /// Serve the work directory over HTTP on this port.
    #[arg(long, value_name = "PORT")]
    pub http_port: Option<u16>,

    /// Verbose logging (DEBUG level)
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}
