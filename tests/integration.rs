//! End-to-end tests over an in-memory duplex transport.
//!
//! Each test attaches a [`Link`] to one end of `tokio::io::duplex` and
//! drives the other end as a scripted device, byte-exact on both sides.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::timeout;

use bglink::protocol::{build_frame, Header, HEADER_SIZE};
use bglink::registry::classes;
use bglink::{BgError, FieldValue, Link, LinkBuilder, Message};

const TICK: Duration = Duration::from_millis(20);
const DEADLINE: Duration = Duration::from_secs(5);

fn attach() -> (Link, DuplexStream) {
    let (host_side, device_side) = duplex(4096);
    let link = LinkBuilder::new().attach(host_side);
    (link, device_side)
}

fn response(class: u8, id: u8, payload: &[u8]) -> Vec<u8> {
    build_frame(&Header::command(class, id, payload.len() as u16), payload)
}

fn event(class: u8, id: u8, payload: &[u8]) -> Vec<u8> {
    build_frame(&Header::event(class, id, payload.len() as u16), payload)
}

async fn read_exact(device: &mut DuplexStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    timeout(DEADLINE, device.read_exact(&mut buf))
        .await
        .expect("device read timed out")
        .expect("device read failed");
    buf
}

#[tokio::test]
async fn test_hello_exchange_is_byte_exact() {
    let (link, mut device) = attach();
    link.init_class(classes::SYSTEM);

    let device_task = tokio::spawn(async move {
        let cmd = read_exact(&mut device, 4).await;
        assert_eq!(cmd, [0x00, 0x00, 0x01, 0x00]);
        device.write_all(&response(0x01, 0x00, &[0x00, 0x00])).await.unwrap();
        device
    });

    let result = timeout(DEADLINE, link.system_hello()).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert!(link.is_idle());

    device_task.await.unwrap();
}

#[tokio::test]
async fn test_slot_frees_for_next_command() {
    let (link, mut device) = attach();
    link.init_class(classes::SYSTEM);

    let device_task = tokio::spawn(async move {
        // get_bt_address
        let cmd = read_exact(&mut device, 4).await;
        assert_eq!(cmd, [0x00, 0x00, 0x01, 0x03]);
        device
            .write_all(&response(0x01, 0x03, &[0x66, 0x55, 0x44, 0x33, 0x22, 0x11]))
            .await
            .unwrap();

        // hello immediately after
        let cmd = read_exact(&mut device, 4).await;
        assert_eq!(cmd, [0x00, 0x00, 0x01, 0x00]);
        device.write_all(&response(0x01, 0x00, &[0x00, 0x00])).await.unwrap();
        device
    });

    let address = timeout(DEADLINE, link.system_get_bt_address())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(address.to_string(), "11:22:33:44:55:66");

    let result = timeout(DEADLINE, link.system_hello()).await.unwrap().unwrap();
    assert!(result.is_ok());

    device_task.await.unwrap();
}

#[tokio::test]
async fn test_events_queue_in_arrival_order_around_response() {
    let (link, mut device) = attach();
    link.init_class(classes::SYSTEM);

    let device_task = tokio::spawn(async move {
        let _cmd = read_exact(&mut device, 4).await;

        // E1, response, E2, E3 back to back
        let mut burst = Vec::new();
        burst.extend_from_slice(&event(0x01, 0x03, &[0x01, 0x00, 0x00, 0x00]));
        burst.extend_from_slice(&response(0x01, 0x00, &[0x00, 0x00]));
        burst.extend_from_slice(&event(0x01, 0x03, &[0x02, 0x00, 0x00, 0x00]));
        burst.extend_from_slice(&event(0x01, 0x03, &[0x03, 0x00, 0x00, 0x00]));
        device.write_all(&burst).await.unwrap();
        device
    });

    let result = timeout(DEADLINE, link.system_hello()).await.unwrap().unwrap();
    assert!(result.is_ok());

    for expected in 1u32..=3 {
        let ev = timeout(DEADLINE, link.wait_event()).await.unwrap().unwrap();
        assert_eq!(ev.id.id, 0x03, "only external_signal events were sent");
        assert_eq!(ev.u32_at(0).unwrap(), expected, "arrival order violated");
    }
    assert!(!link.has_pending_events(), "response must not reach the event queue");

    device_task.await.unwrap();
}

#[tokio::test]
async fn test_class_gate_blocks_until_initialized() {
    let (link, mut device) = attach();

    let err = link.gatt_read_characteristic_value(1, 0x0021).await.unwrap_err();
    assert!(matches!(err, BgError::ClassNotInitialized(0x09)));

    link.init_class(classes::GATT);

    let device_task = tokio::spawn(async move {
        // first bytes on the wire are the post-init command
        let cmd = read_exact(&mut device, HEADER_SIZE + 3).await;
        assert_eq!(&cmd[..4], &[0x00, 0x03, 0x09, 0x07]);
        assert_eq!(&cmd[4..], &[0x01, 0x21, 0x00]);
        device.write_all(&response(0x09, 0x07, &[0x00, 0x00])).await.unwrap();
        device
    });

    let result = timeout(DEADLINE, link.gatt_read_characteristic_value(1, 0x0021))
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());

    device_task.await.unwrap();
}

#[tokio::test]
async fn test_second_command_rejected_while_in_flight() {
    let (link, mut device) = attach();
    link.init_class(classes::SYSTEM);
    let link = Arc::new(link);

    let first = {
        let link = Arc::clone(&link);
        tokio::spawn(async move { link.system_hello().await })
    };
    // let the first command reach the device
    let _cmd = read_exact(&mut device, 4).await;

    let err = link.system_get_bt_address().await.unwrap_err();
    assert!(matches!(err, BgError::CommandInFlight));

    device.write_all(&response(0x01, 0x00, &[0x00, 0x00])).await.unwrap();
    assert!(timeout(DEADLINE, first).await.unwrap().unwrap().unwrap().is_ok());
}

#[tokio::test]
async fn test_oversize_payload_rejected_before_any_write() {
    let (link, mut device) = attach();
    link.init_class(classes::SYSTEM);
    link.init_class(classes::GATT);

    // budget for this command is 252 data bytes
    let err = link
        .gatt_write_characteristic_value(1, 0x0021, &[0u8; 253])
        .await
        .unwrap_err();
    assert!(matches!(err, BgError::PayloadTooLong { max: 252, actual: 253, .. }));
    assert!(link.is_idle());

    // the next bytes on the wire must be the follow-up hello, proving the
    // rejected command wrote nothing
    let device_task = tokio::spawn(async move {
        let cmd = read_exact(&mut device, 4).await;
        assert_eq!(cmd, [0x00, 0x00, 0x01, 0x00]);
        device.write_all(&response(0x01, 0x00, &[0x00, 0x00])).await.unwrap();
        device
    });

    assert!(timeout(DEADLINE, link.system_hello()).await.unwrap().unwrap().is_ok());
    device_task.await.unwrap();
}

#[tokio::test]
async fn test_unknown_event_skipped_stream_stays_aligned() {
    let (link, mut device) = attach();
    link.init_class(classes::SYSTEM);

    // unknown event with a 2-byte payload, then a known empty one
    let mut burst = Vec::new();
    burst.extend_from_slice(&event(0x01, 0x7f, &[0xde, 0xad]));
    burst.extend_from_slice(&event(0x01, 0x04, &[]));
    device.write_all(&burst).await.unwrap();

    let ev = timeout(DEADLINE, link.wait_event()).await.unwrap().unwrap();
    assert_eq!((ev.id.class, ev.id.id), (0x01, 0x04));
    assert!(!link.is_closed());
}

#[tokio::test]
async fn test_unexpected_response_tears_session_down() {
    let (link, mut device) = attach();
    link.init_class(classes::SYSTEM);

    // response with nothing in flight
    device.write_all(&response(0x01, 0x00, &[0x00, 0x00])).await.unwrap();

    timeout(DEADLINE, link.closed()).await.unwrap();
    assert!(link.is_closed());

    assert!(matches!(
        link.system_hello().await.unwrap_err(),
        BgError::SessionClosed
    ));
    assert!(matches!(
        link.wait_event().await.unwrap_err(),
        BgError::SessionClosed
    ));
}

#[tokio::test]
async fn test_fragmented_response_reassembled() {
    let (link, mut device) = attach();
    link.init_class(classes::SYSTEM);

    let device_task = tokio::spawn(async move {
        let _cmd = read_exact(&mut device, 4).await;
        for byte in response(0x01, 0x03, &[1, 2, 3, 4, 5, 6]) {
            device.write_all(&[byte]).await.unwrap();
            device.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        device
    });

    let address = timeout(DEADLINE, link.system_get_bt_address())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(address.as_bytes(), &[1, 2, 3, 4, 5, 6]);

    device_task.await.unwrap();
}

#[tokio::test]
async fn test_no_response_command_does_not_occupy_slot() {
    let (link, mut device) = attach();
    link.init_class(classes::SYSTEM);

    link.system_reset(false).await.unwrap();
    assert!(link.is_idle());

    let cmd = read_exact(&mut device, 5).await;
    assert_eq!(cmd, [0x00, 0x01, 0x01, 0x01, 0x00]);

    // a reset into firmware-update mode carries dfu = 1
    link.system_reset(true).await.unwrap();
    let cmd = read_exact(&mut device, 5).await;
    assert_eq!(cmd[4], 0x01);

    // calling it as an RPC is a usage error, and a local one
    let msg = Message::command(classes::SYSTEM, 0x01, vec![FieldValue::U8(0)]);
    let err = link.call(msg).await.unwrap_err();
    assert!(matches!(err, BgError::Usage(_)));
    assert!(!err.is_session_fatal());
}

#[tokio::test]
async fn test_peek_event_drains_without_blocking() {
    let (link, mut device) = attach();

    device.write_all(&event(0x01, 0x04, &[])).await.unwrap();

    // wait for the reader task to queue it
    timeout(DEADLINE, async {
        while !link.has_pending_events() {
            tokio::time::sleep(TICK).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(link.pending_events(), 1);
    assert_eq!(link.peek_event().unwrap().id.id, 0x04);

    // the poll dequeued the event: a second poll finds the queue empty
    assert!(link.peek_event().is_none());
    assert!(!link.has_pending_events());
}

#[tokio::test]
async fn test_tiny_read_buffer_still_makes_progress() {
    let (host_side, mut device) = duplex(4096);
    let link = LinkBuilder::new().read_buffer_size(0).attach(host_side);
    link.init_class(classes::SYSTEM);

    let device_task = tokio::spawn(async move {
        let cmd = read_exact(&mut device, 4).await;
        assert_eq!(cmd, [0x00, 0x00, 0x01, 0x00]);
        device.write_all(&response(0x01, 0x00, &[0x00, 0x00])).await.unwrap();
        device
    });

    let result = timeout(DEADLINE, link.system_hello()).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert!(!link.is_closed(), "a zero-byte read must not look like hang-up");

    device_task.await.unwrap();
}

#[tokio::test]
async fn test_peer_hangup_closes_session_and_fails_in_flight() {
    let (link, mut device) = attach();
    link.init_class(classes::SYSTEM);
    let link = Arc::new(link);

    let pending = {
        let link = Arc::clone(&link);
        tokio::spawn(async move { link.system_hello().await })
    };
    let _cmd = read_exact(&mut device, 4).await;

    drop(device);

    timeout(DEADLINE, link.closed()).await.unwrap();
    assert!(matches!(
        timeout(DEADLINE, pending).await.unwrap().unwrap().unwrap_err(),
        BgError::SessionClosed
    ));
    assert!(link.is_idle());
}

#[tokio::test]
async fn test_queued_events_still_delivered_after_close() {
    let (link, mut device) = attach();

    device.write_all(&event(0x01, 0x04, &[])).await.unwrap();
    device
        .write_all(&event(0x01, 0x03, &[0x2a, 0x00, 0x00, 0x00]))
        .await
        .unwrap();
    device.flush().await.unwrap();
    drop(device);

    timeout(DEADLINE, link.closed()).await.unwrap();

    let first = link.wait_event().await.unwrap();
    assert_eq!(first.id.id, 0x04);
    let second = link.wait_event().await.unwrap();
    assert_eq!(second.u32_at(0).unwrap(), 0x2a);
    assert!(matches!(
        link.wait_event().await.unwrap_err(),
        BgError::SessionClosed
    ));
}

#[tokio::test]
async fn test_variable_length_response_round_trip() {
    let (link, mut device) = attach();
    link.init_class(classes::SYSTEM);

    let device_task = tokio::spawn(async move {
        let cmd = read_exact(&mut device, 5).await;
        assert_eq!(cmd, [0x00, 0x01, 0x01, 0x0b, 0x08]);

        // result + 8 random bytes behind a length prefix
        let mut payload = vec![0x00, 0x00, 0x08];
        payload.extend_from_slice(&[0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80]);
        device.write_all(&response(0x01, 0x0b, &payload)).await.unwrap();
        device
    });

    let (result, data) = timeout(DEADLINE, link.system_get_random_data(8))
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(data, vec![0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80]);

    device_task.await.unwrap();
}

#[tokio::test]
async fn test_abandon_in_flight_after_deadline() {
    let (link, mut device) = attach();
    link.init_class(classes::SYSTEM);
    let link = Arc::new(link);

    let pending = {
        let link = Arc::clone(&link);
        tokio::spawn(async move {
            timeout(Duration::from_millis(50), link.system_hello()).await
        })
    };
    let _cmd = read_exact(&mut device, 4).await;

    // the device never answers; the caller's timeout fires
    assert!(timeout(DEADLINE, pending).await.unwrap().unwrap().is_err());

    let stale = link.in_flight().expect("slot still held by the timed-out call");
    link.abandon_in_flight(stale.id);
    assert!(link.is_idle());

    // slot is usable again
    let device_task = tokio::spawn(async move {
        let _cmd = read_exact(&mut device, 4).await;
        device.write_all(&response(0x01, 0x00, &[0x00, 0x00])).await.unwrap();
        device
    });
    assert!(timeout(DEADLINE, link.system_hello()).await.unwrap().unwrap().is_ok());
    device_task.await.unwrap();
}
