//! A shared room plus its tick task.
//!
//! [`RoomSlot`] is what the manager hands out: the [`Room`] behind a
//! mutex, and the cancellation token of the room's tick task. Battle
//! handlers lock the room for one read-modify-write and send after the
//! guard is dropped; the tick task does the same once per interval.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lockstep_protocol::{BattleCommand, Codec, PlayerId, RoomId};
use lockstep_tick::{TickConfig, TickScheduler};
use lockstep_transport::{ConnectionId, PacketSink};
use parking_lot::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{DisconnectOutcome, ReadyOutcome, Room, RoomError, TickOutput};

/// One room and the handle to stop its tick.
#[derive(Debug)]
pub struct RoomSlot {
    id: RoomId,
    room: Mutex<Room>,
    cancel: CancellationToken,
    tick: TickConfig,
    ticker_started: AtomicBool,
}

impl RoomSlot {
    /// Wraps `room`. Cancelling `cancel` stops the tick task.
    pub fn new(room: Room, cancel: CancellationToken) -> Self {
        Self {
            id: room.id(),
            tick: room.config().tick.clone(),
            room: Mutex::new(room),
            cancel,
            ticker_started: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    /// Locks the room. Don't hold the guard across an `.await`.
    pub fn lock(&self) -> MutexGuard<'_, Room> {
        self.room.lock()
    }

    /// [`Room::ready`] under the lock.
    pub fn ready(&self, player: PlayerId, conn: ConnectionId) -> Result<ReadyOutcome, RoomError> {
        self.room.lock().ready(player, conn)
    }

    /// [`Room::rebind`] under the lock.
    pub fn rebind(&self, player: PlayerId, conn: ConnectionId) -> bool {
        self.room.lock().rebind(player, conn)
    }

    /// [`Room::disconnect`] under the lock. Stops the tick task if this
    /// closed the room.
    pub fn disconnect(&self, player: PlayerId) -> DisconnectOutcome {
        let outcome = self.room.lock().disconnect(player);
        if outcome.closed {
            self.cancel.cancel();
        }
        outcome
    }

    /// Closes the room and stops its tick task.
    pub fn close(&self) {
        self.room.lock().close();
        self.cancel.cancel();
    }

    /// `true` once the tick task has been told to stop.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// `true` once [`spawn_ticker`](Self::spawn_ticker) has run.
    pub fn ticker_started(&self) -> bool {
        self.ticker_started.load(Ordering::Acquire)
    }

    /// Spawns the room's authoritative tick task.
    ///
    /// Only the first call spawns anything; later calls return `None`. The
    /// task broadcasts one [`FrameBroadcast`](lockstep_protocol::FrameBroadcast)
    /// per tick to every ready player through `sink`, and exits when the
    /// room closes or the slot is cancelled.
    pub fn spawn_ticker<S, C>(self: &Arc<Self>, sink: Arc<S>, codec: Arc<C>) -> Option<JoinHandle<()>>
    where
        S: PacketSink,
        C: Codec,
    {
        if self.ticker_started.swap(true, Ordering::AcqRel) {
            return None;
        }
        let scheduler = TickScheduler::new(self.tick.clone());
        Some(tokio::spawn(run_ticker(
            Arc::clone(self),
            sink,
            codec,
            scheduler,
        )))
    }
}

// ---------------------------------------------------------------------------
// Tick task
// ---------------------------------------------------------------------------

async fn run_ticker<S, C>(slot: Arc<RoomSlot>, sink: Arc<S>, codec: Arc<C>, mut scheduler: TickScheduler)
where
    S: PacketSink,
    C: Codec,
{
    tracing::info!(
        room_id = %slot.id,
        interval_ms = scheduler.interval().as_millis() as u64,
        "tick task started"
    );

    loop {
        tokio::select! {
            biased;

            _ = slot.cancel.cancelled() => break,

            _ = scheduler.wait_for_tick() => {
                let output = slot.room.lock().tick();
                let Some(output) = output else {
                    slot.cancel.cancel();
                    break;
                };
                if slot.cancel.is_cancelled() {
                    break;
                }
                broadcast_frame(slot.id, &output, sink.as_ref(), codec.as_ref());
                scheduler.record_tick_end();
                if output.closed {
                    slot.cancel.cancel();
                    break;
                }
            }
        }
    }

    tracing::info!(
        room_id = %slot.id,
        ticks = scheduler.tick_count(),
        overruns = scheduler.metrics().total_overruns,
        "tick task stopped"
    );
}

fn broadcast_frame<S: PacketSink, C: Codec>(room_id: RoomId, output: &TickOutput, sink: &S, codec: &C) {
    let payload = match codec.encode(&output.broadcast) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::error!(%room_id, %error, "failed to encode frame broadcast");
            return;
        }
    };
    tracing::trace!(
        %room_id,
        frame = output.broadcast.frame,
        mask = output.broadcast.input_mask,
        recipients = output.recipients.len(),
        "frame broadcast"
    );
    for conn in &output.recipients {
        if let Err(error) = sink.send_packet(*conn, BattleCommand::Frame.into(), &payload) {
            tracing::debug!(%room_id, %conn, %error, "frame broadcast not delivered");
        }
    }
}
