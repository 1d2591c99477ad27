//! WebSocket echo server.
//!
//! Run with: cargo run --example echo_server
//! Then connect with any WebSocket client to ws://127.0.0.1:9001, for
//! example `websocat ws://127.0.0.1:9001 --protocol chat`.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use wsframe::server::accept_with;
use wsframe::{Config, HeaderLookup, Message, Timeouts};

const ADDR: &str = "127.0.0.1:9001";

#[tokio::main]
async fn main() -> wsframe::Result<()> {
    simple_logger::init_with_level(log::Level::Debug).expect("log");

    let listener = TcpListener::bind(ADDR).await?;
    log::info!("Echo server listening on {}", ADDR);

    loop {
        let (stream, addr) = listener.accept().await?;
        log::info!("New connection from {}", addr);

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream).await {
                log::warn!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

async fn handle_connection(stream: TcpStream) -> wsframe::Result<()> {
    let config = Config::new()
        .with_fragment_size(16 * 1024)
        .with_timeouts(Timeouts::new(
            Duration::from_secs(10),
            Duration::from_secs(300),
            Duration::from_secs(30),
        ));

    // Speak "chat" when the client offers it
    let mut ws = accept_with(stream, config, |head| {
        head.header("Sec-WebSocket-Protocol")?
            .split(',')
            .map(str::trim)
            .find(|p| *p == "chat")
            .map(String::from)
    })
    .await?;

    while let Some(message) = ws.recv().await? {
        match message {
            Message::Text(text) => {
                log::info!("Received text: {}", text);
                ws.send(Message::Text(text)).await?;
            }
            Message::Binary(data) => {
                log::info!("Received binary: {} bytes", data.len());
                ws.send(Message::Binary(data)).await?;
            }
            // Pings are answered inside recv()
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(frame) => {
                log::info!("Peer closed: {:?}", frame);
            }
            _ => {}
        }
    }

    log::info!("Session ended");
    Ok(())
}
