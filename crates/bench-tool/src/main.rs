// crates/bench-tool/src/main.rs

use clap::Parser;
use futures::{SinkExt, StreamExt};
use hdrhistogram::Histogram;
use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[command(name = "Price Drop Benchmark")]
struct Args {
    // Jumlah user concurrent (masing-masing satu koneksi WebSocket)
    #[arg(short, long, default_value_t = 200)]
    users: usize,

    // Produk yang di-share
    #[arg(short, long, default_value = "6ca22814-c1a4-42e2-bec5-fdb388806692")]
    product: String,

    // URL Server WebSocket
    #[arg(long, default_value = "ws://127.0.0.1:8000")]
    url: String,

    // Batas tunggu balasan per user
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Accepted,
    Rejected,
    TimedOut,
}

struct UserResult {
    outcome: Outcome,
    latency_us: u64,
    // total_shares dari snapshot awal dan terbesar yang pernah dilihat
    initial_total_shares: u64,
    max_total_shares: u64,
}

type BenchError = Box<dyn std::error::Error + Send + Sync>;
type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// Server memproses frame satu per satu per koneksi: penolakan share selalu
// tiba sebelum pong dari ping berikutnya. Pong tanpa penolakan = diterima.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Rejected,
    Acked,
}

fn verdict(frame: &Value) -> Option<Verdict> {
    if frame.get("error").is_some() || frame.get("message").is_some() {
        return Some(Verdict::Rejected);
    }
    match frame.get("type").and_then(Value::as_str) {
        Some("pong") => Some(Verdict::Acked),
        _ => None,
    }
}

fn total_shares(frame: &Value) -> Option<u64> {
    frame.get("total_shares").and_then(Value::as_u64)
}

async fn connect(url: &str) -> Result<(WsStream, u64), BenchError> {
    let (mut ws, _) = connect_async(url).await?;
    // Snapshot awal
    let initial = match ws.next().await {
        Some(Ok(Message::Text(text))) => {
            let frame: Value = serde_json::from_str(&text)?;
            total_shares(&frame).unwrap_or(0)
        }
        Some(Ok(other)) => return Err(format!("unexpected first frame: {other:?}").into()),
        Some(Err(e)) => return Err(e.into()),
        None => return Err("connection closed before snapshot".into()),
    };
    Ok((ws, initial))
}

async fn run_user(url: String, user_id: String, barrier: Arc<Barrier>, timeout: Duration) -> Result<UserResult, BenchError> {
    // 1. Koneksi + snapshot. Barrier tetap ditunggu walau gagal, supaya user lain tidak hang
    let connected = connect(&url).await;
    barrier.wait().await;
    let (ws, initial_total_shares) = connected?;
    let (mut tx, mut rx) = ws.split();

    // 2. Share, lalu ping sebagai penanda akhir balasan
    let start = Instant::now();
    tx.send(Message::Text(json!({"action": "share_click", "user_id": user_id}).to_string()))
        .await?;
    tx.send(Message::Text(json!({"action": "ping"}).to_string())).await?;

    let mut outcome = Outcome::TimedOut;
    let mut latency_us = timeout.as_micros() as u64;
    let mut max_total_shares = initial_total_shares;
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            msg = rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let frame: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
                    if let Some(shares) = total_shares(&frame) {
                        max_total_shares = max_total_shares.max(shares);
                    }
                    if let Some(result) = verdict(&frame) {
                        latency_us = start.elapsed().as_micros() as u64;
                        outcome = match result {
                            Verdict::Rejected => Outcome::Rejected,
                            Verdict::Acked => Outcome::Accepted,
                        };
                        break;
                    }
                }
                Some(Ok(_)) => {}
                _ => break,
            }
        }
    }
    let _ = tx.close().await;

    Ok(UserResult {
        outcome,
        latency_us,
        initial_total_shares,
        max_total_shares,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let url = format!("{}/ws/auction/{}", args.url.trim_end_matches('/'), args.product);
    let timeout = Duration::from_secs(args.timeout_secs);

    println!("Starting Benchmark: {} users sharing once", args.users);
    println!("Target: {}", url);

    // Suffix acak supaya run berulang tidak kena DuplicateShare
    let run_tag: u32 = rand::rng().random();
    let barrier = Arc::new(Barrier::new(args.users));
    let mut handles = Vec::with_capacity(args.users);

    let start_time = Instant::now();

    // 1. Spawn Virtual Users
    for i in 0..args.users {
        let user_id = format!("bench-{run_tag:08x}-{i}");
        handles.push(tokio::spawn(run_user(url.clone(), user_id, barrier.clone(), timeout)));
    }

    // 2. Collect Results
    let mut total_hist = Histogram::<u64>::new(3)?;
    let (mut accepted, mut rejected, mut timed_out, mut failed) = (0usize, 0usize, 0usize, 0usize);
    let mut initial_shares = u64::MAX;
    let mut final_shares = 0;

    for handle in handles {
        match handle.await? {
            Ok(result) => {
                match result.outcome {
                    Outcome::Accepted => accepted += 1,
                    Outcome::Rejected => rejected += 1,
                    Outcome::TimedOut => timed_out += 1,
                }
                if result.outcome != Outcome::TimedOut {
                    total_hist += result.latency_us;
                }
                initial_shares = initial_shares.min(result.initial_total_shares);
                final_shares = final_shares.max(result.max_total_shares);
            }
            Err(e) => {
                failed += 1;
                eprintln!("user failed: {e}");
            }
        }
    }

    let total_duration = start_time.elapsed();
    let server_growth = final_shares.saturating_sub(initial_shares.min(final_shares));
    let throughput = (accepted + rejected) as f64 / total_duration.as_secs_f64();

    // 3. Print Report
    println!("\n========================================");
    println!("BENCHMARK COMPLETE");
    println!("========================================");
    println!("Total Time     : {:.2?}", total_duration);
    println!("Throughput     : {:.2} Shares/sec", throughput);
    println!("Accepted       : {}", accepted);
    println!("Rejected       : {}", rejected);
    println!("Timed Out      : {}", timed_out);
    println!("Conn Failed    : {}", failed);
    println!("Total Shares   : {} (+{} seen by clients)", final_shares, server_growth);
    println!("----------------------------------------");
    if total_hist.is_empty() {
        println!("LATENCY: no responses recorded");
    } else {
        println!("SHARE VERDICT LATENCY (Microseconds):");
        println!("   Avg            : {:.2} us", total_hist.mean());
        println!("   Min            : {} us", total_hist.min());
        println!("   p50 (Median)   : {} us", total_hist.value_at_quantile(0.5));
        println!("   p90            : {} us", total_hist.value_at_quantile(0.9));
        println!("   p99            : {} us", total_hist.value_at_quantile(0.99));
        println!("   Max            : {} us", total_hist.max());
    }
    println!("========================================");

    Ok(())
}
