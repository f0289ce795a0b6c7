use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Interactive remote code-execution server")]
pub struct Cli {
    /// Port the HTTP/WebSocket listener binds to.
    #[arg(long, short = 'p', default_value_t = 8000)]
    pub port: u16,

    /// Number of sandbox boxes to initialize at startup and keep pooled.
    /// This bounds the number of concurrent sessions.
    #[arg(long, default_value_t = 100)]
    pub max_boxes: usize,
}
