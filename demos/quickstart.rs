use simple_stomp::{CancellationToken, ClientConfig, MessageClient};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Expects an ActiveMQ Artemis broker (or any STOMP 1.2 broker) on
    // localhost:61613 with the default artemis/artemis credentials.
    let config = ClientConfig::new("artemis", "artemis", "localhost", 61613);
    let client = Arc::new(MessageClient::new(config));

    client
        .send_message("testqueue", "text/plain", "This is a test!")
        .await?;

    let body = client
        .get_message_within("testqueue", Duration::from_secs(5))
        .await?;
    println!("received: {}", body);

    // Process a queue in the background for a few seconds.
    let cancel = CancellationToken::new();
    let worker = {
        let client = client.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            client
                .process_messages("testqueue", cancel, |message| {
                    println!("processed: {}", message.body_text());
                    Ok(())
                })
                .await
        })
    };

    for i in 0..3 {
        client
            .send_message("testqueue", "text/plain", format!("message {}", i))
            .await?;
    }
    tokio::time::sleep(Duration::from_secs(2)).await;
    cancel.cancel();
    worker.await??;

    client.close().await?;
    Ok(())
}
