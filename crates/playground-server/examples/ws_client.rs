use std::env;
use std::io::{self, Write};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use playground_protocol::{decode_client, decode_server, encode_client};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Where to connect: env override or default.
    let url = env::var("PLAYGROUND_CLIENT_URL").unwrap_or_else(|_| "ws://127.0.0.1:9000".to_string());

    println!("Connecting to {}...", url);
    let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    println!("Connected.");
    println!("Type JSON packets like:");
    println!(r#"  {{"kind":"join-room","room":"plaza","name":"ada"}}"#);
    println!(r#"  {{"kind":"move","x":0.5,"y":0.5}}"#);
    println!(r#"  {{"kind":"chat","message":"hello"}}"#);
    println!(r#"  {{"kind":"queue-join","sponsorId":"acme"}}"#);
    println!("Type 'quit' or 'exit' to leave.\n");

    let stdin = io::stdin();

    loop {
        print!(">> ");
        io::stdout().flush()?;

        let mut line = String::new();
        let n = stdin.read_line(&mut line)?;
        if n == 0 {
            println!("\nEOF on stdin, exiting client.");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            println!("Exiting client.");
            break;
        }

        // Check locally first so typos don't count against the server's
        // decode-error limit.
        let request = match decode_client(trimmed.as_bytes()) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("Not a valid packet: {e}");
                continue;
            }
        };
        ws.send(Message::text(encode_client(&request)?)).await?;

        // Print everything that arrives shortly after.
        loop {
            match timeout(Duration::from_millis(150), ws.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => match decode_server(text.as_bytes()) {
                    Ok(msg) => println!("<< {:?}", msg),
                    Err(e) => println!("<< (undecodable: {e}) {}", text.as_str()),
                },
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                    println!("Server closed the connection.");
                    return Ok(());
                }
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(e))) => {
                    eprintln!("Read error: {e}");
                    return Ok(());
                }
                // Timed out waiting for the next packet: done for this command.
                Err(_) => break,
            }
        }
    }

    ws.close(None).await?;
    Ok(())
}
