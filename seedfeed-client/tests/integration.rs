//! Integration tests against a real SeedLink server.
//!
//! Gated by `SEEDFEED_TEST_SERVER` (e.g., `rtserve.iris.washington.edu:18000`).
//! `SEEDFEED_TEST_STATION` picks the station as `NET.STA` (default `IU.ANMO`).

use std::time::Duration;

use seedfeed_client::{ClientConfig, ClientState, SeedLinkClient};

fn server() -> Option<String> {
    std::env::var("SEEDFEED_TEST_SERVER").ok()
}

fn station() -> (String, String) {
    let id = std::env::var("SEEDFEED_TEST_STATION").unwrap_or_else(|_| "IU.ANMO".into());
    let (net, sta) = id.split_once('.').unwrap();
    (net.to_owned(), sta.to_owned())
}

fn config() -> ClientConfig {
    ClientConfig {
        connect_timeout: Duration::from_secs(15),
        read_timeout: Duration::from_secs(60),
    }
}

#[tokio::test]
async fn live_hello_and_catalog() {
    let Some(addr) = server() else {
        eprintln!("skipping: SEEDFEED_TEST_SERVER not set");
        return;
    };

    let mut client = SeedLinkClient::connect_with_config(&addr, config())
        .await
        .unwrap();
    let info = client.server_info();
    eprintln!(
        "server: {} {} ({})",
        info.software, info.version, info.organization
    );

    let catalog = client.catalog().await.unwrap();
    eprintln!("catalog: {} stations", catalog.len());
    assert!(!catalog.is_empty());
    client.bye().await.unwrap();
}

#[tokio::test]
async fn live_stream_decodes_records() {
    let Some(addr) = server() else {
        eprintln!("skipping: SEEDFEED_TEST_SERVER not set");
        return;
    };
    let (net, sta) = station();

    let mut client = SeedLinkClient::connect_with_config(&addr, config())
        .await
        .unwrap();
    client.station(&sta, &net).await.unwrap();
    client.data().await.unwrap();
    client.end_stream().await.unwrap();
    assert_eq!(client.state(), ClientState::Streaming);

    for i in 0..3 {
        let frame = tokio::time::timeout(Duration::from_secs(60), client.next_frame())
            .await
            .unwrap_or_else(|_| panic!("timeout waiting for frame {i}"))
            .unwrap()
            .expect("server closed the stream");
        let record = frame.decode().unwrap();
        eprintln!(
            "frame {i}: seq={} {}.{}.{}.{} n={} rate={}",
            frame.sequence(),
            record.network,
            record.station,
            record.location,
            record.channel,
            record.samples.len(),
            record.sample_rate
        );
    }

    let state = client.connection_state(None);
    assert!(state.get(&net, &sta).is_some());
    client.bye().await.unwrap();
}
