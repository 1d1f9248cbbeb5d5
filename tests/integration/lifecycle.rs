//! Startup failures and shutdown.

use dome_core::config::{ConfigError, DomeConfig};
use dome_services::{FramePublisher, ReceiverError, ReceiverStats, VideoReceiver};
use tokio::sync::broadcast;

use crate::{chunk, Harness};

async fn start_fails(config: DomeConfig) -> ReceiverError {
    let (publisher, _frames) = FramePublisher::new();
    let (_shutdown, rx) = broadcast::channel(1);
    match VideoReceiver::start(&config, publisher, ReceiverStats::new(), rx).await {
        Ok(_) => panic!("receiver should not have started"),
        Err(e) => e,
    }
}

#[tokio::test]
async fn shutdown_signal_stops_receiver_cleanly() {
    let mut h = Harness::start().await.unwrap();
    h.send(&chunk(1, 0, 1, b"x")).await.unwrap();
    h.next_frame().await.unwrap();

    h.stop().await.unwrap().unwrap();
}

#[tokio::test]
async fn dropping_every_shutdown_sender_stops_receiver() {
    let h = Harness::start().await.unwrap();
    let Harness { shutdown, task, .. } = h;

    drop(shutdown);
    let result = tokio::time::timeout(std::time::Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn pending_frames_are_not_published_on_shutdown() {
    let h = Harness::start().await.unwrap();
    h.send(&chunk(4, 0, 2, b"half")).await.unwrap();
    h.wait_for_datagrams(1).await.unwrap();

    let frames = h.frames.clone();
    h.stop().await.unwrap().unwrap();
    assert!(frames.latest().is_none());
}

#[tokio::test]
async fn out_of_range_port_is_rejected_before_binding() {
    let mut config = DomeConfig::default();
    config.network.listen_port = 65536;

    let err = start_fails(config).await;
    assert!(matches!(err, ReceiverError::Config(ConfigError::InvalidPort(65536))));

    let mut config = DomeConfig::default();
    config.network.listen_port = -1;
    let err = start_fails(config).await;
    assert!(matches!(err, ReceiverError::Config(ConfigError::InvalidPort(-1))));
}

#[tokio::test]
async fn bad_bind_address_and_zero_timeout_are_rejected() {
    let mut config = DomeConfig::default();
    config.network.bind_addr = "not-an-ip".to_string();
    let err = start_fails(config).await;
    assert!(matches!(err, ReceiverError::Config(ConfigError::InvalidBindAddr(_))));

    let mut config = DomeConfig::default();
    config.receiver.frame_timeout_ms = 0;
    let err = start_fails(config).await;
    assert!(matches!(err, ReceiverError::Config(ConfigError::ZeroFrameTimeout)));
}

#[tokio::test]
async fn undersized_receive_buffer_is_rejected() {
    let mut config = DomeConfig::default();
    config.network.bind_addr = "127.0.0.1".to_string();
    config.network.listen_port = 0;
    config.network.max_datagram_bytes = 12;

    let err = start_fails(config).await;
    assert!(matches!(
        err,
        ReceiverError::Config(ConfigError::DatagramBufferTooSmall(12))
    ));
}
