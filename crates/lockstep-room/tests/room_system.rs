//! Integration tests for rooms and their tick task, using a recording sink
//! in place of the battle transport.

use std::sync::Arc;
use std::time::Duration;

use lockstep_protocol::{
    BattleCommand, BincodeCodec, Codec, FrameBroadcast, FrameInput, PlayerId, RoomId,
};
use lockstep_room::{BattleConfig, RoomError, RoomManager, RoomSlot, RoomState};
use lockstep_tick::TickConfig;
use lockstep_transport::{ConnectionId, PacketSink, TransportError};
use parking_lot::Mutex;

// =========================================================================
// Recording sink
// =========================================================================

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(ConnectionId, u8, Vec<u8>)>>,
}

impl PacketSink for RecordingSink {
    fn send_packet(
        &self,
        conn: ConnectionId,
        cmd: u8,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        self.sent.lock().push((conn, cmd, payload.to_vec()));
        Ok(())
    }

    fn disconnect(&self, _conn: ConnectionId) {}
}

impl RecordingSink {
    /// Frame broadcasts delivered to `conn`, decoded, in send order.
    fn frames_for(&self, conn: ConnectionId) -> Vec<FrameBroadcast> {
        self.sent
            .lock()
            .iter()
            .filter(|(c, cmd, _)| *c == conn && *cmd == u8::from(BattleCommand::Frame))
            .map(|(_, _, payload)| BincodeCodec.decode(payload).unwrap())
            .collect()
    }

    fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

// =========================================================================
// Helpers
// =========================================================================

const A: PlayerId = PlayerId(101);
const B: PlayerId = PlayerId(102);
const CONN_A: ConnectionId = ConnectionId::new(1);
const CONN_B: ConnectionId = ConnectionId::new(2);

fn battle_config(max_frames: usize) -> BattleConfig {
    BattleConfig {
        max_frames,
        tick: TickConfig {
            initial_jitter: Duration::ZERO,
            ..TickConfig::with_interval(Duration::from_millis(33))
        },
        ..BattleConfig::default()
    }
}

/// A room with A and B joined and ready, battle started.
fn started_room(rooms: &RoomManager) -> Arc<RoomSlot> {
    let room_id = rooms.create();
    let slot = rooms.get(room_id).unwrap();
    slot.lock().join(A).unwrap();
    slot.lock().join(B).unwrap();
    assert!(slot.ready(A, CONN_A).unwrap().start.is_none());
    assert!(slot.ready(B, CONN_B).unwrap().start.is_some());
    slot
}

fn start_ticking(slot: &Arc<RoomSlot>) -> (Arc<RecordingSink>, tokio::task::JoinHandle<()>) {
    let sink = Arc::new(RecordingSink::default());
    let handle = slot
        .spawn_ticker(Arc::clone(&sink), Arc::new(BincodeCodec))
        .expect("first spawn");
    (sink, handle)
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// =========================================================================
// Tick cadence
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_ticker_broadcasts_increasing_frames_to_every_ready_player() {
    let rooms = RoomManager::new(10_000, battle_config(10_000));
    let slot = started_room(&rooms);
    let (sink, _handle) = start_ticking(&slot);

    sleep_ms(33 * 4 + 1).await;

    for conn in [CONN_A, CONN_B] {
        let frames = sink.frames_for(conn);
        let numbers: Vec<u32> = frames.iter().map(|f| f.frame).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3]);
        assert!(frames.iter().all(|f| f.member_count == 2));
        assert_eq!(frames[0].input_mask, 0b11);
        assert_eq!(frames[0].inputs, vec![0, 1]);
    }
    assert_eq!(slot.lock().authoritative_frame(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_ticker_is_not_running_before_first_interval() {
    let rooms = RoomManager::new(10_000, battle_config(10_000));
    let slot = started_room(&rooms);
    let (sink, _handle) = start_ticking(&slot);

    sleep_ms(32).await;
    assert_eq!(sink.count(), 0);
    sleep_ms(2).await;
    assert_eq!(sink.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_spawn_ticker_only_once() {
    let rooms = RoomManager::new(10_000, battle_config(10_000));
    let slot = started_room(&rooms);
    let (_sink, _handle) = start_ticking(&slot);

    let again = slot.spawn_ticker(Arc::new(RecordingSink::default()), Arc::new(BincodeCodec));
    assert!(again.is_none());
    assert!(slot.ticker_started());
}

// =========================================================================
// Inputs
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_latest_resend_wins_and_low_bit_is_position() {
    let rooms = RoomManager::new(10_000, battle_config(10_000));
    let slot = started_room(&rooms);
    let (sink, _handle) = start_ticking(&slot);

    {
        let mut room = slot.lock();
        room.record_input(A, FrameInput { frame: 5, input: 0b0000_0100 })
            .unwrap();
        room.record_input(A, FrameInput { frame: 5, input: 0b0110_0101 })
            .unwrap();
        room.record_input(B, FrameInput { frame: 5, input: 0b0000_1000 })
            .unwrap();
    }

    sleep_ms(33 * 6 + 1).await;

    let frames = sink.frames_for(CONN_B);
    let frame5 = frames.iter().find(|f| f.frame == 5).unwrap();
    assert_eq!(frame5.inputs, vec![0b0110_0100, 0b0000_1001]);
    assert_eq!(frame5.input_mask, 0b11);

    let frame4 = frames.iter().find(|f| f.frame == 4).unwrap();
    assert_eq!(frame4.inputs, vec![0, 1]);
    assert_eq!(frame4.input_mask, 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_input_does_not_rewrite_sent_frame() {
    let rooms = RoomManager::new(10_000, battle_config(10_000));
    let slot = started_room(&rooms);
    let (sink, _handle) = start_ticking(&slot);

    sleep_ms(34).await;
    slot.lock()
        .record_input(A, FrameInput { frame: 0, input: 0b1110 })
        .unwrap();
    sleep_ms(33).await;

    let frames = sink.frames_for(CONN_A);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].inputs, vec![0, 1]);
    assert_eq!(frames[1].frame, 1);
}

// =========================================================================
// Shutdown paths
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_close_stops_ticker() {
    let rooms = RoomManager::new(10_000, battle_config(10_000));
    let slot = started_room(&rooms);
    let (sink, handle) = start_ticking(&slot);

    sleep_ms(34).await;
    rooms.close(slot.id()).unwrap();
    handle.await.unwrap();

    let sent = sink.count();
    sleep_ms(200).await;
    assert_eq!(sink.count(), sent);
    assert_eq!(slot.lock().state(), RoomState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_every_member_disconnecting_stops_ticker() {
    let rooms = RoomManager::new(10_000, battle_config(10_000));
    let slot = started_room(&rooms);
    let (sink, handle) = start_ticking(&slot);

    sleep_ms(34).await;
    assert!(!slot.disconnect(A).closed);
    sleep_ms(33).await;
    // Only B still receives frames.
    assert_eq!(sink.frames_for(CONN_A).len(), 1);
    assert_eq!(sink.frames_for(CONN_B).len(), 2);

    assert!(slot.disconnect(B).closed);
    handle.await.unwrap();
    assert!(slot.is_stopped());
}

#[tokio::test(start_paused = true)]
async fn test_reready_after_disconnect_resumes_delivery() {
    let rooms = RoomManager::new(10_000, battle_config(10_000));
    let slot = started_room(&rooms);
    let (sink, _handle) = start_ticking(&slot);

    slot.disconnect(A);
    let reconnect = ConnectionId::new(7);
    let outcome = slot.ready(A, reconnect).unwrap();
    assert!(outcome.start.is_none());
    assert_eq!(outcome.position, 0);

    sleep_ms(34).await;
    assert_eq!(sink.frames_for(reconnect).len(), 1);
    assert!(sink.frames_for(CONN_A).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_frame_capacity_closes_room() {
    let rooms = RoomManager::new(10_000, battle_config(3));
    let slot = started_room(&rooms);
    let (sink, handle) = start_ticking(&slot);

    handle.await.unwrap();

    let numbers: Vec<u32> = sink.frames_for(CONN_A).iter().map(|f| f.frame).collect();
    assert_eq!(numbers, vec![0, 1, 2]);
    assert_eq!(slot.lock().state(), RoomState::Closed);
    assert!(slot.is_stopped());
    assert!(matches!(
        slot.ready(A, CONN_A),
        Err(RoomError::Closed(RoomId(10_001)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_manager_shutdown_stops_all_tickers() {
    let rooms = RoomManager::new(10_000, battle_config(10_000));
    let first = started_room(&rooms);
    let second = started_room(&rooms);
    let (_s1, h1) = start_ticking(&first);
    let (_s2, h2) = start_ticking(&second);

    sleep_ms(50).await;
    rooms.shutdown();
    h1.await.unwrap();
    h2.await.unwrap();
    assert_eq!(rooms.room_count(), 2);
    assert_eq!(rooms.reclaim_closed(), 2);
}
