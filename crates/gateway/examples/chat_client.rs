//! Manual chat client for a running gateway.
//!
//! Usage:
//!   cargo run -p gateway --example chat_client -- <url> <user_id> [<receiver_id> <room_id> <text>]
//!
//! Authenticates as `user_id`, optionally sends one message, then prints
//! every frame the gateway pushes until Ctrl+C.

use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::env;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("usage: chat_client <url> <user_id> [<receiver_id> <room_id> <text>]");
        std::process::exit(2);
    }
    let url = &args[0];
    let user_id = &args[1];

    let mut request = url.as_str().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "test_client".parse().unwrap());

    println!("Connecting to {}...", url);
    let (mut ws, response) =
        match tokio::time::timeout(Duration::from_secs(10), connect_async(request)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                println!("WebSocket error: {:?}", e);
                return;
            }
            Err(_) => {
                println!("WebSocket connection timed out!");
                return;
            }
        };
    println!("WebSocket connected! Status: {:?}", response.status());

    let auth = json!({"type": "auth", "user_id": user_id});
    ws.send(Message::Text(auth.to_string().into())).await.unwrap();

    if let [_, _, receiver_id, room_id, text, ..] = args.as_slice() {
        let msg = json!({
            "text": text,
            "receiver_id": receiver_id,
            "room_id": room_id,
        });
        ws.send(Message::Text(msg.to_string().into())).await.unwrap();
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                let _ = ws.close(None).await;
                break;
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => println!("<- {}", text),
                Some(Ok(Message::Close(frame))) => {
                    println!("Closed by server: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    println!("WebSocket error: {:?}", e);
                    break;
                }
                None => break,
            }
        }
    }
}
