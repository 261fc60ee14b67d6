// crates/drop-cli/src/main.rs

use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::{SinkExt, StreamExt};
use payment_gateway::signature;
use serde_json::{json, Value};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "Price Drop CLI")]
#[command(about = "Client CLI for the collaborative price-drop auction", long_about = None)]
struct Cli {
    // Base URL server HTTP (WebSocket diturunkan dari sini)
    #[arg(long, env = "DROP_SERVER", default_value = "http://127.0.0.1:8000", global = true)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    // Menonton update harga sebuah drop
    Watch {
        #[arg(short, long)]
        product: String,
    },
    // Share sekali (menurunkan harga untuk semua orang)
    Share {
        #[arg(short, long)]
        product: String,
        #[arg(short, long)]
        user: String,
        // Berapa lama menunggu balasan
        #[arg(long, default_value_t = 3)]
        wait_secs: u64,
    },
    // Daftar produk
    Products,
    // Membuat order pembayaran pada harga saat ini
    CreateOrder {
        #[arg(short, long)]
        amount: f64,
        #[arg(short, long)]
        product: Option<String>,
        #[arg(short, long, default_value = "INR")]
        currency: String,
    },
    // Verifikasi pembayaran
    Verify {
        #[arg(long)]
        order_id: String,
        #[arg(long)]
        payment_id: String,
        #[arg(long)]
        signature: String,
    },
    // Membuat signature seperti yang akan dikirim gateway (untuk testing)
    Sign {
        #[arg(long, env = "RAZORPAY_KEY_SECRET")]
        secret: String,
        #[arg(long)]
        order_id: String,
        #[arg(long)]
        payment_id: String,
    },
}

fn ws_url(server: &str, product: &str) -> String {
    let base = server.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/ws/auction/{product}")
}

async fn print_response(response: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    println!("STATUS: {status}");
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let http = reqwest::Client::new();
    let server = cli.server.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Watch { product } => {
            let url = ws_url(&server, &product);
            println!("Connecting to {url} ...");
            let (ws, _) = connect_async(url.as_str()).await?;
            let (_, mut rx) = ws.split();

            while let Some(msg) = rx.next().await {
                match msg? {
                    Message::Text(text) => {
                        println!("{text}");
                        // Drop selesai: berhenti, jangan reconnect
                        if text.contains("The drop has ended") {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
        Commands::Share { product, user, wait_secs } => {
            let (ws, _) = connect_async(ws_url(&server, &product).as_str()).await?;
            let (mut tx, mut rx) = ws.split();

            // Frame pertama selalu snapshot
            if let Some(Ok(Message::Text(snapshot))) = rx.next().await {
                println!("SNAPSHOT: {snapshot}");
            }

            let frame = json!({"action": "share_click", "user_id": user}).to_string();
            tx.send(Message::Text(frame)).await?;
            println!("Sending SHARE... user: {user}");

            let deadline = tokio::time::sleep(Duration::from_secs(wait_secs));
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    msg = rx.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            println!("RESPONSE: {text}");
                            let value: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
                            if value.get("error").is_some() || value.get("message").is_some() {
                                break;
                            }
                        }
                        Some(Ok(_)) => {}
                        _ => break,
                    }
                }
            }
            let _ = tx.close().await;
        }
        Commands::Products => {
            let response = http.get(format!("{server}/products")).send().await?;
            print_response(response).await?;
        }
        Commands::CreateOrder { amount, product, currency } => {
            let mut body = json!({"amount": amount, "currency": currency});
            if let Some(product) = product {
                body["product_id"] = json!(product);
            }
            let response = http
                .post(format!("{server}/razorpay/create-order"))
                .json(&body)
                .send()
                .await?;
            print_response(response).await?;
        }
        Commands::Verify { order_id, payment_id, signature } => {
            let response = http
                .post(format!("{server}/razorpay/verify-payment"))
                .json(&json!({"order_id": order_id, "payment_id": payment_id, "signature": signature}))
                .send()
                .await?;
            print_response(response).await?;
        }
        Commands::Sign { secret, order_id, payment_id } => {
            println!("{}", signature::sign_payment(&secret, &order_id, &payment_id)?);
        }
    }

    Ok(())
}
