use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "stomp")]
#[command(version)]
#[command(about = "Send to, read from, or listen on a STOMP queue")]
pub struct Cli {
    /// Broker host name
    #[arg(short, long, default_value = "localhost")]
    pub server: String,

    /// Broker STOMP port
    #[arg(short = 'P', long, default_value_t = 61613)]
    pub port: u16,

    /// Login username
    #[arg(short, long, default_value = "artemis")]
    pub username: String,

    /// Passcode
    #[arg(short, long, default_value = "artemis")]
    pub password: String,

    /// Client heart-beat header (client-send,client-receive in ms)
    #[arg(long, default_value = "10000,10000")]
    pub heartbeat: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Send one message and wait for the broker's receipt
    Send {
        /// Queue name (without the /queue/ prefix)
        queue: String,
        /// Message body
        body: String,
        /// Content type of the body
        #[arg(long, default_value = "text/plain")]
        content_type: String,
    },
    /// Receive one message and print its body
    Get {
        /// Queue name (without the /queue/ prefix)
        queue: String,
        /// Give up after this many seconds (waits forever when omitted)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Print every message until Ctrl-C
    Listen {
        /// Queue name (without the /queue/ prefix)
        queue: String,
    },
}
