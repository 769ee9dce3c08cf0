//! Shared helpers: a scripted in-memory engine and an in-process server.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use analysis_worker::config::{EngineOptions, WorkerConfig};
use analysis_worker::EngineSession;
use reqwest::Client;
use tokio::io::{duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader};

pub type Received = Arc<Mutex<Vec<String>>>;

/// Search output keyed by (FEN, depth). Unscripted searches report a level
/// score and no legal move.
#[derive(Clone, Default)]
pub struct EngineScript {
    answers: HashMap<(String, u32), Vec<String>>,
}

impl EngineScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Centipawn score with `best` as the whole PV.
    pub fn cp(self, fen: &str, depth: u32, cp: i32, best: &str) -> Self {
        self.lines(
            fen,
            depth,
            vec![
                format!("info depth 1 score cp {} pv {best}", cp / 2),
                format!("info depth {depth} seldepth {} score cp {cp} nodes 4242 pv {best}", depth + 4),
                format!("bestmove {best}"),
            ],
        )
    }

    /// Mate-in-`n` score (negative when the side to move is mated).
    pub fn mate(self, fen: &str, depth: u32, n: i32, best: &str) -> Self {
        self.lines(
            fen,
            depth,
            vec![
                format!("info depth {depth} score mate {n} pv {best}"),
                format!("bestmove {best}"),
            ],
        )
    }

    /// Same answer at every listed depth.
    pub fn cp_at(mut self, fen: &str, depths: &[u32], cp: i32, best: &str) -> Self {
        for depth in depths {
            self = self.cp(fen, *depth, cp, best);
        }
        self
    }

    pub fn lines(mut self, fen: &str, depth: u32, lines: Vec<String>) -> Self {
        self.answers.insert((fen.to_string(), depth), lines);
        self
    }

    fn answer(&self, fen: &str, depth: u32) -> Vec<String> {
        self.answers.get(&(fen.to_string(), depth)).cloned().unwrap_or_else(|| {
            vec![
                format!("info depth {depth} score cp 0"),
                "bestmove (none)".to_string(),
            ]
        })
    }
}

pub fn test_config() -> WorkerConfig {
    WorkerConfig {
        engine_options: EngineOptions::new(1, 16),
        search_timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    }
}

/// Start a session against a scripted engine and wait for it to be ready.
/// Returns the session and every command line the engine received.
pub async fn scripted_session(script: EngineScript) -> (EngineSession, Received) {
    let (client, server) = duplex(64 * 1024);
    let received: Received = Arc::new(Mutex::new(Vec::new()));

    let log = received.clone();
    tokio::spawn(async move {
        let (reader, mut writer) = split(server);
        let mut lines = BufReader::new(reader).lines();
        let mut fen = String::new();

        while let Ok(Some(line)) = lines.next_line().await {
            log.lock().unwrap().push(line.clone());

            let replies = if line == "uci" {
                vec!["id name FakeFish 1.0".to_string(), "uciok".to_string()]
            } else if line == "isready" {
                vec!["readyok".to_string()]
            } else if line == "quit" {
                break;
            } else if let Some(position) = line.strip_prefix("position fen ") {
                fen = position.to_string();
                vec![]
            } else if let Some(depth) = line.strip_prefix("go depth ") {
                script.answer(&fen, depth.parse().unwrap())
            } else {
                vec![]
            };

            for reply in replies {
                if writer.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    });

    let (reader, writer) = split(client);
    let session = EngineSession::from_io(reader, writer, &test_config())
        .await
        .expect("Failed to start session");
    assert!(session
        .wait_until_ready(Duration::from_secs(5))
        .await
        .expect("Engine closed during handshake"));

    (session, received)
}

/// Commands of the given kind ("go", "position", ...) in the order received.
pub fn commands(received: &Received, prefix: &str) -> Vec<String> {
    received
        .lock()
        .unwrap()
        .iter()
        .filter(|line| line.starts_with(prefix))
        .cloned()
        .collect()
}

/// Wait until the engine has logged a command starting with `prefix`.
pub async fn received_eventually(received: &Received, prefix: &str) -> bool {
    for _ in 0..100 {
        if !commands(received, prefix).is_empty() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Serve the app on an ephemeral port and return its base URL.
pub async fn spawn_server(config: server::config::Config) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, server::app(config)).await.expect("Server error");
    });
    format!("http://{addr}")
}

/// Build a reqwest client for tests.
pub fn client() -> Client {
    Client::new()
}
