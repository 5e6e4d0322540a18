use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use shared::protocol::{decode_frame, encode_frame, ClientMessage, GameSpec, Outbound};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Connects to a server, names itself, opens a game and prints what comes back
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(long, default_value = "ws://127.0.0.1:8080")]
    url: String,
    #[clap(long, default_value = "tester")]
    name: String,
    #[clap(long, default_value = "3")]
    board: String,
    #[clap(long, default_value = "3 3 e e e e e e e e k")]
    formation: String,
    #[clap(long, default_value = "")]
    options: String,
    /// Seconds to keep listening once nothing more arrives
    #[clap(long, default_value = "2")]
    idle: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("Connecting to {}", args.url);
    let (mut ws, _) = connect_async(args.url.as_str()).await?;

    let requests = vec![
        ClientMessage::SetName {
            name: args.name.clone(),
        },
        ClientMessage::CreateGame {
            game: GameSpec {
                board: args.board.clone(),
                formation: args.formation.clone(),
                options: args.options.clone(),
            },
        },
    ];
    let frame = encode_frame(&requests)?;
    println!("Sending {}", frame);
    ws.send(Message::Text(frame)).await?;

    let idle = Duration::from_secs(args.idle);
    while let Ok(Some(frame)) = timeout(idle, ws.next()).await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        for message in decode_frame::<Outbound>(&text)? {
            match message {
                Ok(Outbound::Message(msg)) => println!("  {:?}", msg),
                Ok(Outbound::CodedError { code, data }) => println!("  error_{} {}", code, data),
                Err(e) => println!("  undecodable message: {}", e),
            }
        }
    }

    ws.close(None).await?;
    println!("Test client finished");
    Ok(())
}
