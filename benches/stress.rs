use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use futures::future::join_all;
use ulid::Ulid;

use innledger::engine::{AccountDraft, Ledger, LedgerError, RoomDraft};
use innledger::model::{Role, RoomType};
use innledger::notify::NotifyHub;

fn bench_wal_path() -> PathBuf {
    let dir = std::env::temp_dir().join("innledger_bench");
    std::fs::create_dir_all(&dir).expect("create bench dir");
    let path = dir.join(format!("stress_{}.wal", Ulid::new()));
    let _ = std::fs::remove_file(&path);
    path
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 1).expect("valid date")
}

fn night(offset: u64) -> (NaiveDate, NaiveDate) {
    let check_in = epoch() + Days::new(offset);
    (check_in, check_in + Days::new(1))
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

async fn setup(ledger: &Ledger, n_rooms: usize) -> (Vec<Ulid>, Ulid) {
    let mut rooms = Vec::with_capacity(n_rooms);
    for i in 0..n_rooms {
        let room = ledger
            .create_room(RoomDraft {
                number: format!("{:04}", i + 1),
                room_type: RoomType {
                    name: "Standard".into(),
                    capacity: 2,
                },
                price: 9_900,
                description: None,
                image_url: None,
            })
            .await
            .expect("create room");
        rooms.push(room.id);
    }
    let guest = ledger
        .create_account(AccountDraft {
            email: "bench@example.com".into(),
            name: "Bench".into(),
            phone: None,
            role: Role::Customer,
            password: "benchmark-password".into(),
        })
        .await
        .expect("create account");
    println!("  created {} rooms", rooms.len());
    (rooms, guest.id)
}

async fn phase1_sequential(ledger: &Ledger, room_id: Ulid, user_id: Ulid) {
    let n = 2000;
    let mut latencies = Vec::with_capacity(n as usize);
    let start = Instant::now();

    for i in 0..n {
        let (check_in, check_out) = night(i);
        let t = Instant::now();
        ledger
            .reserve(room_id, user_id, check_in, check_out, &[])
            .await
            .expect("sequential reserve");
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("reserve latency", &mut latencies);
}

async fn phase2_concurrent(ledger: Arc<Ledger>, rooms: &[Ulid], user_id: Ulid) {
    let n_per_task = 200;
    let start = Instant::now();

    let tasks = rooms.iter().map(|&room_id| {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            for j in 0..n_per_task {
                let (check_in, check_out) = night(j);
                ledger
                    .reserve(room_id, user_id, check_in, check_out, &[])
                    .await
                    .expect("concurrent reserve");
            }
        })
    });
    for result in join_all(tasks).await {
        result.expect("task panicked");
    }

    let elapsed = start.elapsed();
    let total = rooms.len() as u64 * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {} rooms x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        rooms.len(),
        elapsed.as_secs_f64()
    );
}

/// Many guests race for the same night; exactly one must win each round.
async fn phase3_contention(ledger: Arc<Ledger>, room_id: Ulid, user_id: Ulid) {
    let rounds = 100;
    let contenders = 32;
    let start = Instant::now();

    for round in 0..rounds {
        let (check_in, check_out) = night(10_000 + round);
        let attempts = (0..contenders).map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                ledger
                    .reserve(room_id, user_id, check_in, check_out, &[])
                    .await
            })
        });
        let mut wins = 0;
        for result in join_all(attempts).await {
            match result.expect("task panicked") {
                Ok(_) => wins += 1,
                Err(LedgerError::DateConflict { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(wins, 1, "round {round}: {wins} winners");
    }

    println!(
        "  {rounds} rounds x {contenders} contenders: one winner each, {:.2}s",
        start.elapsed().as_secs_f64()
    );
}

async fn phase4_read_under_load(ledger: Arc<Ledger>, rooms: &[Ulid], user_id: Ulid) {
    let writer_rooms = rooms.to_vec();
    let writer_ledger = ledger.clone();
    let writer = tokio::spawn(async move {
        for j in 0..300 {
            for &room_id in &writer_rooms {
                let (check_in, check_out) = night(20_000 + j);
                let _ = writer_ledger
                    .reserve(room_id, user_id, check_in, check_out, &[])
                    .await;
            }
        }
    });

    let mut latencies = Vec::new();
    while !writer.is_finished() {
        let room_id = rooms[latencies.len() % rooms.len()];
        let (check_in, _) = night(20_000);
        let t = Instant::now();
        ledger
            .is_available(room_id, check_in, check_in + Days::new(30))
            .await
            .expect("availability");
        latencies.push(t.elapsed());
        tokio::task::yield_now().await;
    }
    writer.await.expect("writer panicked");
    print_latency("is_available latency", &mut latencies);
}

#[tokio::main]
async fn main() {
    let path = bench_wal_path();
    let ledger = Arc::new(Ledger::new(path.clone(), Arc::new(NotifyHub::new())).expect("open ledger"));

    println!("=== innledger stress benchmark ===");
    println!("wal: {}\n", path.display());

    println!("[setup]");
    let (rooms, user_id) = setup(&ledger, 10).await;

    println!("\n[phase 1] sequential reserve throughput");
    phase1_sequential(&ledger, rooms[0], user_id).await;

    println!("\n[phase 2] concurrent reserves across rooms");
    phase2_concurrent(ledger.clone(), &rooms[1..], user_id).await;

    println!("\n[phase 3] contention on a single night");
    phase3_contention(ledger.clone(), rooms[0], user_id).await;

    println!("\n[phase 4] read latency under write load");
    phase4_read_under_load(ledger.clone(), &rooms, user_id).await;

    let appends = ledger.wal_appends_since_compact().await;
    let t = Instant::now();
    ledger.compact_wal().await.expect("compact");
    println!(
        "\n[compaction] {appends} appends compacted in {:.2}ms",
        t.elapsed().as_secs_f64() * 1000.0
    );

    let _ = std::fs::remove_file(&path);
    println!("\n=== benchmark complete ===");
}
