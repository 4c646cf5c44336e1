//! End-to-end protocol exercise over a real loopback UDP socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use warden::{Config, CycleReport, Supervisor, TaskFn, Worker, WorkerState, parse_response};

struct Harness {
    client: UdpSocket,
    server_addr: SocketAddr,
}

impl Harness {
    async fn start() -> Self {
        let cfg = Config {
            addr: "127.0.0.1".into(),
            port: 0,
            ..Config::default()
        };
        let task = TaskFn::arc(|w: Arc<WorkerState>| async move {
            w.set_status("watching");
            CycleReport::idle()
        });
        let workers = vec![
            Worker::new("auth", "authentication", task)
                .with_interval(Duration::from_secs(60))
                .with_auto_restart(false),
        ];

        let mut sup = Supervisor::bind(cfg, workers).await.expect("bind");
        let server_addr = sup.local_addr().expect("local addr");

        // Serve loop: known commands are handled inside next_command();
        // anything opaque gets the stock rejection, like the reference
        // embedding.
        tokio::spawn(async move {
            while let Ok(Some(cmd)) = sup.next_command().await {
                let _ = sup.respond(&cmd, 5, "Unrecognized command").await;
            }
        });

        let client = UdpSocket::bind("127.0.0.1:0").await.expect("client bind");
        Self {
            client,
            server_addr,
        }
    }

    async fn exchange(&self, request: &str) -> String {
        self.client
            .send_to(request.as_bytes(), self.server_addr)
            .await
            .expect("send");
        let mut buf = [0u8; 2048];
        let (len, _) = timeout(Duration::from_secs(5), self.client.recv_from(&mut buf))
            .await
            .expect("response within 5s")
            .expect("recv");
        String::from_utf8(buf[..len].to_vec()).expect("utf8 response")
    }
}

#[tokio::test]
async fn status_query_round_trip() {
    let h = Harness::start().await;

    let resp = parse_response(&h.exchange("42status").await).expect("parse");
    assert_eq!(resp.seq, "42");
    assert_eq!(resp.alert, 0);
    assert_eq!(resp.status, "Ready");
    assert_eq!(resp.lines, vec!["auth: Idle"]);
}

#[tokio::test]
async fn worker_control_round_trip() {
    let h = Harness::start().await;

    assert_eq!(
        h.exchange("1thread auth start").await,
        "1P2Thread auth started\n"
    );

    // The worker's first cycle sets its status text, which shows up in
    // the next status frame.
    let mut status = String::new();
    for _ in 0..50 {
        status = h.exchange("2status").await;
        if status.contains("auth: watching") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, "2P0Ready\n\nauth: watching\n\n");

    assert_eq!(
        h.exchange("3thread auth start").await,
        "3P5Thread auth is already active.\n"
    );
    assert_eq!(
        h.exchange("4thread auth interval 120").await,
        "4P2Thread auth interval set to 120\n"
    );
    assert_eq!(
        h.exchange("5thread auth interval -1").await,
        "5P5Thread auth invalid interval -1\n"
    );
    assert_eq!(
        h.exchange("6thread auth maxcount -1").await,
        "6P2Thread auth maxcount set to -1\n"
    );
    assert_eq!(
        h.exchange("7thread auth stop").await,
        "7P2Thread auth stopped\n"
    );
    assert_eq!(
        h.exchange("8thread ghost stop").await,
        "8P5No such thread\n"
    );
}

#[tokio::test]
async fn opaque_commands_reach_the_embedding() {
    let h = Harness::start().await;

    assert_eq!(
        h.exchange("9purge everything").await,
        "9P5Unrecognized command\n"
    );
    // Sequence prefixes with spaces are echoed verbatim.
    assert_eq!(
        h.exchange("10 frobnicate").await,
        "10 P5Unrecognized command\n"
    );
}

#[tokio::test]
async fn ack_clears_the_aggregate_alert() {
    let h = Harness::start().await;

    let resp = parse_response(&h.exchange("1clear").await).expect("parse");
    assert_eq!(resp.alert, 0);
    assert_eq!(resp.status, "Ready");
}
