use clap::Parser;
use simple_stomp::{ClientConfig, MessageClient, StompConnector, SystemHostIdentity, TcpTransport};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::args::Cli;
use cli::exit_codes;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::new(&cli.username, &cli.password, &cli.server, cli.port);
    let address = config.address();

    let client = Arc::new(MessageClient::with_collaborators(
        config,
        Arc::new(TcpTransport),
        Arc::new(StompConnector::new().heartbeat(&cli.heartbeat)),
        Arc::new(SystemHostIdentity),
    ));

    match cli::commands::execute(client, cli.command).await {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS),
        Err(err) => {
            let (message, code) = cli::describe_error(&err, &address);
            eprintln!("{}", message);
            ExitCode::from(code)
        }
    }
}
