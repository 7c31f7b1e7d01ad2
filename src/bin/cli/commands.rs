use simple_stomp::{CancellationToken, MessageClient, Result};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::args::Command;

/// Run one subcommand against `client`. The client is closed afterwards
/// whatever the outcome.
pub async fn execute(client: Arc<MessageClient>, command: Command) -> Result<()> {
    let result = match command {
        Command::Send {
            queue,
            body,
            content_type,
        } => {
            client
                .send_message(&queue, &content_type, body)
                .await
                .map(|()| println!("Sent to /queue/{}", queue))
        }
        Command::Get { queue, timeout } => {
            let body = match timeout {
                Some(secs) => {
                    client
                        .get_message_within(&queue, Duration::from_secs(secs))
                        .await
                }
                None => client.get_message(&queue).await,
            };
            body.map(|b| println!("{}", b))
        }
        Command::Listen { queue } => listen(&client, &queue).await,
    };

    let closed = client.close().await;
    result.and(closed)
}

async fn listen(client: &MessageClient, queue: &str) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            on_signal.cancel();
        }
    });

    println!("Listening on /queue/{} (Ctrl-C to stop)", queue);
    let mut count = 0u64;
    client
        .process_messages(queue, cancel, |message| {
            count += 1;
            let mut out = std::io::stdout().lock();
            writeln!(out, "[{}] {}", count, message.body_text())?;
            for (k, v) in &message.headers {
                writeln!(out, "  {}: {}", k, v)?;
            }
            Ok(())
        })
        .await
}
