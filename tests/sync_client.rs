use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use leaderboard_sync::{
    ClientConfig, Connectivity, SyncClient, SyncState,
    config::ReconnectPolicy,
    dto::{
        leaderboard::{HistoricalPeriodSummary, LeaderboardSnapshot, PeriodWinner},
        ws::Framing,
    },
};
use serde_json::{Value, json};
use time::macros::datetime;
use tokio::net::TcpListener;

const END_DATE: &str = "2099-01-01T00:00:00.000Z";

#[derive(Clone)]
struct Backend {
    snapshot: Value,
    update_requests: Arc<AtomicUsize>,
}

fn snapshot_json(players: u32) -> Value {
    let entries = (1..=players)
        .map(|rank| {
            json!({
                "rank": rank,
                "username": format!("player{rank}"),
                "userId": format!("user-{rank}"),
                "wagered": 10_000.0 / f64::from(rank),
                "prize": 0
            })
        })
        .collect::<Vec<_>>();
    let split = entries.len().min(3);
    json!({
        "topThree": entries[..split].to_vec(),
        "challengers": entries[split..].to_vec(),
        "history": null
    })
}

async fn current_leaderboard(State(backend): State<Backend>) -> Json<Value> {
    Json(backend.snapshot.clone())
}

async fn historical_leaderboard(Query(query): Query<HashMap<String, String>>) -> Response {
    match query.get("endDate").map(String::as_str) {
        Some("2025-03-13T00:00:00.000Z") => Json(snapshot_json(14)).into_response(),
        Some("2025-03-06T00:00:00.000Z") => {
            let partial = snapshot_json(5);
            Json(json!({"challengers": partial["challengers"]})).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn socket_io(ws: WebSocketUpgrade, State(backend): State<Backend>) -> Response {
    ws.on_upgrade(move |socket| serve_socket_io(socket, backend))
}

async fn serve_socket_io(mut socket: WebSocket, backend: Backend) {
    let open = r#"0{"sid":"fake","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
    if socket.send(Message::Text(open.into())).await.is_err() {
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let replies = match text.as_str() {
            "40" => vec![r#"40{"sid":"namespace"}"#.to_string()],
            r#"42["request_update"]"# => {
                backend.update_requests.fetch_add(1, Ordering::SeqCst);
                vec![
                    format!("42{}", json!(["leaderboard_update", backend.snapshot])),
                    format!("42{}", json!(["countdown_update", {"endDate": END_DATE}])),
                ]
            }
            _ => Vec::new(),
        };
        for reply in replies {
            if socket.send(Message::Text(reply.into())).await.is_err() {
                return;
            }
        }
    }
}

async fn json_socket(ws: WebSocketUpgrade, State(backend): State<Backend>) -> Response {
    ws.on_upgrade(move |socket| serve_json(socket, backend))
}

async fn serve_json(mut socket: WebSocket, backend: Backend) {
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(envelope) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        if envelope["event"] != "request_update" {
            continue;
        }
        backend.update_requests.fetch_add(1, Ordering::SeqCst);
        let replies = [
            json!({"event": "leaderboard_update", "data": backend.snapshot}),
            json!({"event": "countdown_update", "data": {"endInstant": END_DATE}}),
        ];
        for reply in replies {
            if socket
                .send(Message::Text(reply.to_string().into()))
                .await
                .is_err()
            {
                return;
            }
        }
    }
}

async fn spawn_backend(with_push: bool) -> (SocketAddr, Backend) {
    let backend = Backend {
        snapshot: snapshot_json(6),
        update_requests: Arc::new(AtomicUsize::new(0)),
    };

    let mut router = Router::new()
        .route("/api/leaderboard", get(current_leaderboard))
        .route("/api/leaderboard/historical", get(historical_leaderboard));
    if with_push {
        router = router
            .route("/socket.io/", get(socket_io))
            .route("/ws", get(json_socket));
    }
    let app = router.with_state(backend.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, backend)
}

fn config_for(addr: SocketAddr) -> ClientConfig {
    let mut config = ClientConfig::default().with_backend_url(format!("http://{addr}"));
    config.reconnect = ReconnectPolicy {
        max_attempts: Some(2),
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(50),
        jitter: 0.0,
    };
    config.connect_timeout = Duration::from_secs(2);
    config.pull_timeout = Duration::from_secs(2);
    config
}

async fn wait_for(client: &SyncClient, predicate: impl FnMut(&SyncState) -> bool) -> SyncState {
    let mut rx = client.subscribe();
    let state = tokio::time::timeout(Duration::from_secs(10), rx.wait_for(predicate))
        .await
        .expect("state condition not reached")
        .expect("driver stopped");
    state.clone()
}

#[tokio::test]
async fn socket_io_push_reaches_the_exposed_state() {
    let (addr, backend) = spawn_backend(true).await;
    let client = SyncClient::start(&config_for(addr)).unwrap();
    let expected = LeaderboardSnapshot::from_json_value(backend.snapshot.clone()).unwrap();

    let state = wait_for(&client, |state| {
        state.connectivity == Connectivity::Connected && state.end_instant.is_some()
    })
    .await;

    assert_eq!(*state.leaderboard, expected);
    assert_eq!(state.end_instant, Some(datetime!(2099-01-01 0:00 UTC)));
    assert!(state.countdown.days > 0);
    assert_eq!(backend.update_requests.load(Ordering::SeqCst), 1);
    client.dispose().await;
}

#[tokio::test]
async fn json_framing_push_reaches_the_exposed_state() {
    let (addr, backend) = spawn_backend(true).await;
    let mut config = config_for(addr);
    config.framing = Framing::Json;
    let client = SyncClient::start(&config).unwrap();

    let state = wait_for(&client, |state| {
        state.connectivity == Connectivity::Connected && state.end_instant.is_some()
    })
    .await;

    assert_eq!(state.leaderboard.ranked_entries().len(), 6);
    assert_eq!(backend.update_requests.load(Ordering::SeqCst), 1);
    client.dispose().await;
}

#[tokio::test]
async fn backend_without_push_still_populates_via_pull() {
    let (addr, backend) = spawn_backend(false).await;
    let client = SyncClient::start(&config_for(addr)).unwrap();

    let state = wait_for(&client, |state| {
        state.connectivity == Connectivity::Disconnected && !state.leaderboard.is_empty()
    })
    .await;

    assert_eq!(state.leaderboard.top_three.len(), 3);
    assert_eq!(state.leaderboard.challengers.len(), 3);
    assert!(state.leaderboard.history.is_empty());
    assert_eq!(state.end_instant, None);
    assert_eq!(backend.update_requests.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(client.connectivity(), Connectivity::Disconnected);
    client.dispose().await;
}

#[tokio::test]
async fn historical_period_is_fetched_by_end_date() {
    let (addr, _backend) = spawn_backend(false).await;
    let client = SyncClient::start(&config_for(addr)).unwrap();

    let mut summary = HistoricalPeriodSummary {
        id: "week-10".into(),
        period: "Week 10".into(),
        date: "March 6 - March 13".into(),
        winner: PeriodWinner {
            username: "player1".into(),
            total_wagered: Some(10_000.0),
            prize: 400.0,
        },
        leaderboard_data: None,
        end_date: Some("2025-03-13T00:00:00.000Z".into()),
    };

    let period = client.load_period(&summary).await.unwrap();
    assert_eq!(period.top_three.len(), 3);
    assert_eq!(period.challengers.len(), 7);

    summary.end_date = Some("2020-01-01T00:00:00.000Z".into());
    assert!(client.load_period(&summary).await.is_none());
    client.dispose().await;
}

#[tokio::test]
async fn archived_period_without_top_three_still_loads() {
    let (addr, _backend) = spawn_backend(false).await;
    let client = SyncClient::start(&config_for(addr)).unwrap();

    let summary = HistoricalPeriodSummary {
        id: "week-9".into(),
        period: "Week 9".into(),
        date: "February 27 - March 6".into(),
        winner: PeriodWinner {
            username: "player1".into(),
            total_wagered: None,
            prize: 400.0,
        },
        leaderboard_data: None,
        end_date: Some("2025-03-06T00:00:00.000Z".into()),
    };

    let period = client.load_period(&summary).await.unwrap();
    let ranks = period
        .ranked_entries()
        .iter()
        .map(|entry| entry.rank)
        .collect::<Vec<_>>();
    assert_eq!(ranks, vec![4, 5]);
    assert!(period.challengers.is_empty());
    client.dispose().await;
}
