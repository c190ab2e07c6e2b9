//! Load test for the helicopter relay.
//!
//! Spawns multiple fake WebSocket clients that:
//! - Connect to the server with distinct player names
//! - Periodically send partial state updates (and the occasional projectile)
//! - Receive and count Data/Removed/Projectile broadcasts
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of clients to spawn (default: 100)
//!   --duration S     Test duration in seconds (default: 30)
//!   --update-rate R  State updates per second per client (default: 5)
//!   --url URL        Server URL (default: ws://127.0.0.1:8081/ws)

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

// === Protocol types (minimal subset) ===

#[derive(Deserialize)]
#[serde(tag = "responseType")]
enum ServerMsg {
    Connection { data: String },
    Data {},
    Removed {},
    Projectile {},
}

// === Metrics ===

struct Metrics {
    connected: AtomicU64,
    messages_received: AtomicU64,
    data_received: AtomicU64,
    removed_received: AtomicU64,
    projectiles_received: AtomicU64,
    updates_sent: AtomicU64,
    projectiles_sent: AtomicU64,
    errors: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,
}

impl Metrics {
    fn new() -> Self {
        Self {
            connected: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            data_received: AtomicU64::new(0),
            removed_received: AtomicU64::new(0),
            projectiles_received: AtomicU64::new(0),
            updates_sent: AtomicU64::new(0),
            projectiles_sent: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            latency_sum_ms: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
        }
    }
}

// === Client task ===

async fn run_client(
    client_id: u32,
    url: String,
    update_rate: f64,
    duration: Duration,
    metrics: Arc<Metrics>,
) {
    let connect_start = Instant::now();

    let connect_url = format!("{}?playerName=bot-{}", url, client_id);
    let (mut ws, _) = match connect_async(&connect_url).await {
        Ok(conn) => conn,
        Err(e) => {
            if client_id < 5 {
                eprintln!("Client {} failed to connect: {}", client_id, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    let connect_latency = connect_start.elapsed();
    metrics
        .latency_sum_ms
        .fetch_add(connect_latency.as_millis() as u64, Ordering::Relaxed);
    metrics.latency_count.fetch_add(1, Ordering::Relaxed);
    metrics.connected.fetch_add(1, Ordering::Relaxed);

    // Wait for the Connection reply to learn the assigned id
    let my_id = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                    if let Ok(ServerMsg::Connection { data }) =
                        serde_json::from_str::<ServerMsg>(&text)
                    {
                        return Some(data);
                    }
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                _ => {}
            }
        }
        None
    })
    .await;

    let my_id = match my_id {
        Ok(Some(id)) => id,
        _ => {
            if client_id < 3 {
                eprintln!("Client {} never received its Connection reply", client_id);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            metrics.connected.fetch_sub(1, Ordering::Relaxed);
            return;
        }
    };

    if client_id < 3 {
        eprintln!("Client {} joined as {}", client_id, my_id);
    }

    let update_interval = if update_rate > 0.0 {
        Duration::from_secs_f64(1.0 / update_rate)
    } else {
        Duration::from_secs(3600) // Effectively never
    };

    let mut update_timer = tokio::time::interval(update_interval);
    update_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let test_end = Instant::now() + duration;
    let mut rng_state: u64 = client_id as u64 * 12345 + 67890;
    let mut updates_from_this_client: u64 = 0;

    loop {
        if Instant::now() >= test_end {
            break;
        }

        tokio::select! {
            _ = update_timer.tick() => {
                // Simple LCG for jittery flight coordinates
                rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1);
                let x = ((rng_state >> 32) as f64 / u32::MAX as f64) * 200.0 - 100.0;
                let y = 50.0 + ((rng_state >> 16) as f64 / u32::MAX as f64) * 30.0;
                let z = ((rng_state >> 8) as f64 / u32::MAX as f64) * 200.0 - 100.0;

                updates_from_this_client += 1;
                let json = if updates_from_this_client % 10 == 0 {
                    // Every tenth message fires a projectile through the relay
                    let projectile = serde_json::json!({
                        "id": format!("proj-{}-{}", client_id, updates_from_this_client),
                        "xPos": x, "yPos": y, "zPos": z,
                        "xVel": 10.0, "yVel": 0.0, "zVel": 10.0,
                        "type": 0,
                        "timestamp": updates_from_this_client as f64,
                        "shooter": my_id,
                    });
                    metrics.projectiles_sent.fetch_add(1, Ordering::Relaxed);
                    serde_json::json!({
                        "responseType": "Projectile",
                        "data": projectile.to_string(),
                    }).to_string()
                } else {
                    metrics.updates_sent.fetch_add(1, Ordering::Relaxed);
                    serde_json::json!({
                        "id": my_id,
                        "xPos": x, "yPos": y, "zPos": z,
                        "timestamp": updates_from_this_client as f64,
                    }).to_string()
                };

                if ws.send(Message::Text(json.into())).await.is_err() {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }

            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                        if let Ok(server_msg) = serde_json::from_str::<ServerMsg>(&text) {
                            match server_msg {
                                ServerMsg::Data {} => {
                                    metrics.data_received.fetch_add(1, Ordering::Relaxed);
                                }
                                ServerMsg::Removed {} => {
                                    metrics.removed_received.fetch_add(1, Ordering::Relaxed);
                                }
                                ServerMsg::Projectile {} => {
                                    metrics.projectiles_received.fetch_add(1, Ordering::Relaxed);
                                }
                                ServerMsg::Connection { .. } => {}
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        if client_id < 3 {
                            eprintln!("Client {} error: {}", client_id, e);
                        }
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    Some(_) => {}
                }
            }
        }
    }

    let _ = ws.close(None).await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 100;
    let mut duration_secs: u64 = 30;
    let mut update_rate: f64 = 5.0;
    let mut url = "ws://127.0.0.1:8081/ws".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(100);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--update-rate" => {
                i += 1;
                update_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(5.0);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }

    println!("=== Helicopter Relay Load Test ===");
    println!("Clients: {}", num_clients);
    println!("Duration: {}s", duration_secs);
    println!("Update rate: {}/s per client", update_rate);
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::new());
    let duration = Duration::from_secs(duration_secs);

    let mut handles = Vec::with_capacity(num_clients as usize);

    println!("Spawning {} clients...", num_clients);
    let spawn_start = Instant::now();

    for client_id in 0..num_clients {
        let url = url.clone();
        let metrics = Arc::clone(&metrics);

        handles.push(tokio::spawn(async move {
            run_client(client_id, url, update_rate, duration, metrics).await;
        }));

        // Stagger spawns slightly to avoid thundering herd
        if client_id % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    println!("All clients spawned in {:?}", spawn_start.elapsed());
    println!();

    // Print stats periodically
    let metrics_clone = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();

        loop {
            interval.tick().await;
            let elapsed = start.elapsed().as_secs();
            if elapsed >= duration_secs + 5 {
                break;
            }

            let connected = metrics_clone.connected.load(Ordering::Relaxed);
            let msgs = metrics_clone.messages_received.load(Ordering::Relaxed);
            let data = metrics_clone.data_received.load(Ordering::Relaxed);
            let projectiles = metrics_clone.projectiles_received.load(Ordering::Relaxed);
            let updates = metrics_clone.updates_sent.load(Ordering::Relaxed);
            let errors = metrics_clone.errors.load(Ordering::Relaxed);

            println!(
                "[{:3}s] connected={}, msgs={}, data={}, projectiles={}, updates_sent={}, errors={}",
                elapsed, connected, msgs, data, projectiles, updates, errors
            );
        }
    });

    // Wait for all clients to finish
    for handle in handles {
        let _ = handle.await;
    }

    stats_handle.abort();

    // Final stats
    println!();
    println!("=== Final Results ===");
    let msgs = metrics.messages_received.load(Ordering::Relaxed);
    let data = metrics.data_received.load(Ordering::Relaxed);
    let removed = metrics.removed_received.load(Ordering::Relaxed);
    let projectiles_in = metrics.projectiles_received.load(Ordering::Relaxed);
    let updates = metrics.updates_sent.load(Ordering::Relaxed);
    let projectiles_out = metrics.projectiles_sent.load(Ordering::Relaxed);
    let errors = metrics.errors.load(Ordering::Relaxed);
    let latency_sum = metrics.latency_sum_ms.load(Ordering::Relaxed);
    let latency_count = metrics.latency_count.load(Ordering::Relaxed);

    println!("Total messages received: {}", msgs);
    println!("Total Data broadcasts: {}", data);
    println!("Total Removed broadcasts: {}", removed);
    println!("Total Projectile relays received: {}", projectiles_in);
    println!("Total updates sent: {}", updates);
    println!("Total projectiles sent: {}", projectiles_out);
    println!("Total errors: {}", errors);

    if latency_count > 0 {
        println!("Average connect latency: {}ms", latency_sum / latency_count);
    }

    let msgs_per_sec = msgs as f64 / duration_secs as f64;
    let expected_data = updates as f64 * num_clients as f64;
    println!();
    println!("Messages/sec (total): {:.0}", msgs_per_sec);
    println!(
        "Expected Data broadcasts (updates x clients): {:.0}",
        expected_data
    );
    if expected_data > 0.0 {
        println!(
            "Delivery rate: {:.1}%",
            data as f64 / expected_data * 100.0
        );
    }
}
