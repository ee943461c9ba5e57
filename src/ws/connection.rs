//! Per-peer session: the inbound and outbound loops over one WebSocket.
//!
//! Each accepted socket is split in two halves driven by separate tasks:
//!
//! - [`read_loop`] reads frames, tags text envelopes with the peer's
//!   identity and forwards them to the hub. It owns unregistration.
//! - [`write_loop`] drains the session's outbound queue, sends periodic
//!   pings and closes the connection when the hub closes the queue.
//!
//! Each half signals the other through a `oneshot` when it finishes, so
//! neither outlives the other. A writer that dies on a stalled socket ends
//! the reader, which then unregisters the session.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

use super::messages::{ServerMessage, tag_sender};
use crate::config::SessionLimits;
use crate::domain::{HubHandle, Payload, SessionHandle, SessionId};
use crate::error::RelayError;

/// Accepts an upgraded socket as a new peer session.
///
/// Queues the `yourId` greeting, registers the session with the hub and
/// spawns both loops. Returns as soon as the loops are running.
///
/// # Errors
///
/// Returns [`RelayError::HubClosed`] if the hub is not running; the socket
/// is dropped in that case.
pub async fn start_session(
    socket: WebSocket,
    id: SessionId,
    hub: HubHandle,
    limits: SessionLimits,
) -> Result<(), RelayError> {
    let (outbound_tx, outbound_rx) = mpsc::channel(limits.outbound_capacity.max(1));

    // Queued before registration so the greeting precedes any broadcast.
    let greeting = ServerMessage::YourId { id: id.clone() }.encode()?;
    outbound_tx
        .try_send(greeting)
        .map_err(|_| RelayError::QueueSaturated(id.clone()))?;

    hub.register(SessionHandle::new(id.clone(), outbound_tx))
        .await?;

    let (ws_tx, ws_rx) = socket.split();
    let (reader_done_tx, reader_done_rx) = oneshot::channel();
    let (writer_done_tx, writer_done_rx) = oneshot::channel();
    tokio::spawn(write_loop(
        ws_tx,
        id.clone(),
        outbound_rx,
        limits,
        reader_done_rx,
        writer_done_tx,
    ));
    tokio::spawn(read_loop(
        ws_rx,
        id.clone(),
        hub,
        limits,
        writer_done_rx,
        reader_done_tx,
    ));

    tracing::info!(session = %id, "peer connected");
    Ok(())
}

/// Reads frames until the peer leaves, then unregisters the session.
///
/// Text frames are tagged with `id` and broadcast. The read deadline is
/// `limits.pong_wait` and is pushed back on every pong. The loop also stops
/// as soon as `writer_done` resolves, whether the writer signalled or was
/// dropped. Whatever ends the loop, exactly one unregister is sent and
/// `reader_done` is signalled.
pub async fn read_loop<S>(
    mut ws_rx: S,
    id: SessionId,
    hub: HubHandle,
    limits: SessionLimits,
    mut writer_done: oneshot::Receiver<()>,
    reader_done: oneshot::Sender<()>,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    match pump_inbound(&mut ws_rx, &id, &hub, &limits, &mut writer_done).await {
        Ok(()) => tracing::info!(session = %id, "peer disconnected"),
        Err(RelayError::WriterStopped) => {
            tracing::info!(session = %id, "outbound side gone, ending session");
        }
        Err(err) => tracing::warn!(session = %id, error = %err, "read loop stopped"),
    }

    if hub.unregister(id.clone()).await.is_err() {
        tracing::debug!(session = %id, "hub gone before unregister");
    }
    let _ = reader_done.send(());
}

async fn pump_inbound<S>(
    ws_rx: &mut S,
    id: &SessionId,
    hub: &HubHandle,
    limits: &SessionLimits,
    writer_done: &mut oneshot::Receiver<()>,
) -> Result<(), RelayError>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut deadline = Instant::now() + limits.pong_wait;

    loop {
        let next = tokio::select! {
            biased;
            _ = &mut *writer_done => return Err(RelayError::WriterStopped),
            next = tokio::time::timeout_at(deadline, ws_rx.next()) => {
                next.map_err(|_| RelayError::ReadTimeout(limits.pong_wait))?
            }
        };

        let Some(frame) = next else {
            return Ok(());
        };

        match frame? {
            Message::Text(text) => {
                check_size(text.as_str().len(), limits.max_message_size)?;
                match tag_sender(text.as_str(), id) {
                    Ok(tagged) => hub.broadcast(Payload::from(tagged)).await?,
                    Err(err) => {
                        tracing::warn!(session = %id, error = %err, "discarding malformed envelope");
                    }
                }
            }
            Message::Binary(data) => {
                check_size(data.len(), limits.max_message_size)?;
                tracing::debug!(session = %id, len = data.len(), "ignoring binary frame");
            }
            Message::Pong(_) => deadline = Instant::now() + limits.pong_wait,
            // Answered by the transport.
            Message::Ping(_) => {}
            Message::Close(_) => return Ok(()),
        }
    }
}

fn check_size(size: usize, limit: usize) -> Result<(), RelayError> {
    if size > limit {
        return Err(RelayError::MessageTooLarge { size, limit });
    }
    Ok(())
}

/// Writes queued payloads and liveness pings until the session ends.
///
/// Stops when the hub closes `outbound` (after sending a close frame), when
/// any write misses `limits.write_wait`, or when `reader_done` resolves.
/// `writer_done` is signalled before the final close so the reader does not
/// wait on a socket that may never drain. Never unregisters; that belongs to
/// the reader and the hub.
pub async fn write_loop<K>(
    mut ws_tx: K,
    id: SessionId,
    mut outbound: mpsc::Receiver<Payload>,
    limits: SessionLimits,
    mut reader_done: oneshot::Receiver<()>,
    writer_done: oneshot::Sender<()>,
) where
    K: Sink<Message, Error = axum::Error> + Unpin,
{
    match pump_outbound(&mut ws_tx, &mut outbound, &limits, &mut reader_done).await {
        Ok(()) => tracing::debug!(session = %id, "write loop finished"),
        Err(err) => tracing::warn!(session = %id, error = %err, "write loop stopped"),
    }
    let _ = writer_done.send(());

    match tokio::time::timeout(limits.write_wait, ws_tx.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::debug!(session = %id, error = %err, "close failed"),
        Err(_) => tracing::debug!(session = %id, "close timed out"),
    }
}

async fn pump_outbound<K>(
    ws_tx: &mut K,
    outbound: &mut mpsc::Receiver<Payload>,
    limits: &SessionLimits,
    reader_done: &mut oneshot::Receiver<()>,
) -> Result<(), RelayError>
where
    K: Sink<Message, Error = axum::Error> + Unpin,
{
    let period = limits.ping_period();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(payload) => send_within(ws_tx, Message::Text(payload), limits.write_wait).await?,
                None => {
                    send_within(ws_tx, Message::Close(None), limits.write_wait).await?;
                    return Ok(());
                }
            },
            _ = ticker.tick() => {
                send_within(ws_tx, Message::Ping(Bytes::new()), limits.write_wait).await?;
            }
            _ = &mut *reader_done => return Ok(()),
        }
    }
}

async fn send_within<K>(ws_tx: &mut K, message: Message, wait: Duration) -> Result<(), RelayError>
where
    K: Sink<Message, Error = axum::Error> + Unpin,
{
    tokio::time::timeout(wait, ws_tx.send(message))
        .await
        .map_err(|_| RelayError::WriteTimeout(wait))??;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::convert::Infallible;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use futures_util::stream;

    use super::*;
    use crate::domain::{DropPolicy, Hub};

    fn limits() -> SessionLimits {
        SessionLimits {
            max_message_size: 64,
            outbound_capacity: 8,
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
        }
    }

    /// Registers an observer session and returns its queue.
    async fn observer(hub: &HubHandle, id: &str) -> mpsc::Receiver<Payload> {
        let (tx, rx) = mpsc::channel(16);
        let Ok(()) = hub.register(SessionHandle::new(id.into(), tx)).await else {
            panic!("register observer");
        };
        rx
    }

    async fn next_text(rx: &mut mpsc::Receiver<Payload>) -> String {
        let Some(payload) = rx.recv().await else {
            panic!("observer queue closed");
        };
        payload.as_str().to_string()
    }

    fn frames(items: Vec<Message>) -> impl Stream<Item = Result<Message, axum::Error>> + Unpin {
        stream::iter(items.into_iter().map(Ok))
    }

    /// A completion signal nobody listens to.
    fn unheard() -> oneshot::Sender<()> {
        oneshot::channel().0
    }

    fn is_ping(msg: &Message) -> bool {
        matches!(msg, Message::Ping(_))
    }

    #[tokio::test]
    async fn tagged_messages_reach_the_hub() {
        let hub = Hub::spawn(16, DropPolicy::Announce);
        let mut watcher = observer(&hub, "watcher").await;
        let (_writer_done, writer_done) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        read_loop(
            frames(vec![Message::text(r#"{"type":"move","x":1}"#)]),
            "abc".into(),
            hub.clone(),
            limits(),
            writer_done,
            done_tx,
        )
        .await;

        assert_eq!(next_text(&mut watcher).await, r#"{"id":"abc","type":"move","x":1}"#);
        assert!(done_rx.await.is_ok());
    }

    #[tokio::test]
    async fn malformed_envelopes_are_skipped() {
        let hub = Hub::spawn(16, DropPolicy::Announce);
        let mut watcher = observer(&hub, "watcher").await;
        let (_writer_done, writer_done) = oneshot::channel();
        let (done_tx, _done_rx) = oneshot::channel();

        read_loop(
            frames(vec![
                Message::text("not json"),
                Message::binary(vec![1, 2, 3]),
                Message::text(r#"{"type":"chat"}"#),
            ]),
            "abc".into(),
            hub.clone(),
            limits(),
            writer_done,
            done_tx,
        )
        .await;

        assert_eq!(next_text(&mut watcher).await, r#"{"id":"abc","type":"chat"}"#);
    }

    #[tokio::test]
    async fn close_frame_unregisters_with_notice() {
        let hub = Hub::spawn(16, DropPolicy::Announce);
        let mut watcher = observer(&hub, "watcher").await;
        let _peer = observer(&hub, "abc").await;
        let (_writer_done, writer_done) = oneshot::channel();
        let (done_tx, _done_rx) = oneshot::channel();

        read_loop(
            frames(vec![Message::Close(None), Message::text(r#"{"type":"late"}"#)]),
            "abc".into(),
            hub.clone(),
            limits(),
            writer_done,
            done_tx,
        )
        .await;

        assert_eq!(next_text(&mut watcher).await, r#"{"type":"playerLeft","id":"abc"}"#);
        let Ok(members) = hub.members().await else {
            panic!("members");
        };
        assert_eq!(members, [SessionId::from("watcher")]);
    }

    #[tokio::test]
    async fn oversized_message_ends_the_session() {
        let hub = Hub::spawn(16, DropPolicy::Announce);
        let mut watcher = observer(&hub, "watcher").await;
        let _peer = observer(&hub, "abc").await;
        let (_writer_done, writer_done) = oneshot::channel();
        let (done_tx, _done_rx) = oneshot::channel();

        let oversized = format!(r#"{{"type":"blob","data":"{}"}}"#, "x".repeat(100));
        read_loop(
            frames(vec![
                Message::text(oversized),
                Message::text(r#"{"type":"after"}"#),
            ]),
            "abc".into(),
            hub.clone(),
            limits(),
            writer_done,
            done_tx,
        )
        .await;

        assert_eq!(next_text(&mut watcher).await, r#"{"type":"playerLeft","id":"abc"}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out_and_unregisters() {
        let hub = Hub::spawn(16, DropPolicy::Announce);
        let mut watcher = observer(&hub, "watcher").await;
        let _peer = observer(&hub, "abc").await;
        let (_writer_done, writer_done) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let started = Instant::now();

        read_loop(
            stream::pending::<Result<Message, axum::Error>>(),
            "abc".into(),
            hub.clone(),
            limits(),
            writer_done,
            done_tx,
        )
        .await;

        assert!(started.elapsed() >= limits().pong_wait);
        assert_eq!(next_text(&mut watcher).await, r#"{"type":"playerLeft","id":"abc"}"#);
        assert!(done_rx.await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn pongs_extend_the_read_deadline() {
        let hub = Hub::spawn(16, DropPolicy::Announce);
        let (_writer_done, writer_done) = oneshot::channel();
        let (done_tx, _done_rx) = oneshot::channel();
        let started = Instant::now();

        // Three pongs 40s apart, then silence.
        let pongs = stream::unfold(0u8, |sent| async move {
            if sent == 3 {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(Duration::from_secs(40)).await;
            Some((Ok(Message::Pong(Bytes::new())), sent + 1))
        });

        read_loop(
            Box::pin(pongs),
            "abc".into(),
            hub,
            limits(),
            writer_done,
            done_tx,
        )
        .await;

        // Last pong at 120s, deadline 60s later.
        assert!(started.elapsed() >= Duration::from_secs(180));
    }

    fn vec_sink(
        out: &mut Vec<Message>,
    ) -> impl Sink<Message, Error = axum::Error> + Unpin + '_ {
        out.sink_map_err(|never: Infallible| -> axum::Error { match never {} })
    }

    #[tokio::test(start_paused = true)]
    async fn queue_closure_sends_close_frame() {
        let (tx, rx) = mpsc::channel(8);
        let (_done_tx, done_rx) = oneshot::channel();
        let Ok(()) = tx.try_send(Payload::from_static("one")) else {
            panic!("queue");
        };
        let Ok(()) = tx.try_send(Payload::from_static("two")) else {
            panic!("queue");
        };
        drop(tx);

        let mut sent = Vec::new();
        write_loop(vec_sink(&mut sent), "abc".into(), rx, limits(), done_rx, unheard())
            .await;

        assert_eq!(sent.len(), 3);
        assert!(matches!(sent.first(), Some(Message::Text(t)) if t.as_str() == "one"));
        assert!(matches!(sent.get(1), Some(Message::Text(t)) if t.as_str() == "two"));
        assert!(matches!(sent.get(2), Some(Message::Close(None))));
    }

    #[tokio::test(start_paused = true)]
    async fn pings_follow_the_ping_period() {
        let (_tx, rx) = mpsc::channel::<Payload>(8);
        let (_done_tx, done_rx) = oneshot::channel();
        let mut sent = Vec::new();

        // 54s period: pings at 54s and 108s before the 120s cut-off.
        let run = write_loop(
            vec_sink(&mut sent),
            "abc".into(),
            rx,
            limits(),
            done_rx,
            unheard(),
        );
        let _ = tokio::time::timeout(Duration::from_secs(120), run).await;

        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(is_ping));
    }

    #[tokio::test(start_paused = true)]
    async fn reader_exit_stops_the_writer() {
        let (_tx, rx) = mpsc::channel::<Payload>(8);
        let (done_tx, done_rx) = oneshot::channel();
        let mut sent = Vec::new();

        drop(done_tx);
        write_loop(vec_sink(&mut sent), "abc".into(), rx, limits(), done_rx, unheard())
            .await;

        assert!(sent.is_empty());
    }

    /// A sink that never accepts anything.
    struct StalledSink;

    impl Sink<Message> for StalledSink {
        type Error = axum::Error;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _: Message) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_write_hits_the_write_deadline() {
        let (tx, rx) = mpsc::channel(8);
        let (_done_tx, done_rx) = oneshot::channel();
        let Ok(()) = tx.try_send(Payload::from_static("stuck")) else {
            panic!("queue");
        };
        let started = Instant::now();

        write_loop(StalledSink, "abc".into(), rx, limits(), done_rx, unheard()).await;

        // One deadline for the write, one for the close, and no ping yet.
        assert!(started.elapsed() >= limits().write_wait * 2);
        assert!(started.elapsed() < limits().ping_period());
    }

    #[tokio::test(start_paused = true)]
    async fn writer_signal_ends_a_quiet_reader() {
        let hub = Hub::spawn(16, DropPolicy::Announce);
        let mut watcher = observer(&hub, "watcher").await;
        let _peer = observer(&hub, "abc").await;
        let (writer_done_tx, writer_done) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let started = Instant::now();

        let Ok(()) = writer_done_tx.send(()) else {
            panic!("signal writer exit");
        };
        read_loop(
            stream::pending::<Result<Message, axum::Error>>(),
            "abc".into(),
            hub.clone(),
            limits(),
            writer_done,
            done_tx,
        )
        .await;

        assert!(started.elapsed() < limits().pong_wait);
        assert_eq!(next_text(&mut watcher).await, r#"{"type":"playerLeft","id":"abc"}"#);
        assert!(done_rx.await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn dead_writer_unregisters_before_late_input() {
        let hub = Hub::spawn(16, DropPolicy::Announce);
        let mut watcher = observer(&hub, "watcher").await;
        let _peer = observer(&hub, "abc").await;
        let (reader_done_tx, reader_done_rx) = oneshot::channel();
        let (writer_done_tx, writer_done_rx) = oneshot::channel();
        let (tx, rx) = mpsc::channel(8);
        let Ok(()) = tx.try_send(Payload::from_static("stuck")) else {
            panic!("queue");
        };

        // The peer keeps its socket open and speaks only after the writer died.
        let late = stream::once(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Message::text(r#"{"type":"afterWriterDied"}"#))
        })
        .chain(stream::pending());

        let started = Instant::now();
        tokio::join!(
            write_loop(
                StalledSink,
                "abc".into(),
                rx,
                limits(),
                reader_done_rx,
                writer_done_tx,
            ),
            read_loop(
                Box::pin(late),
                "abc".into(),
                hub.clone(),
                limits(),
                writer_done_rx,
                reader_done_tx,
            ),
        );

        // Write deadline plus close deadline, before the late frame arrives.
        assert!(started.elapsed() < Duration::from_secs(30));
        assert_eq!(next_text(&mut watcher).await, r#"{"type":"playerLeft","id":"abc"}"#);
        assert!(watcher.try_recv().is_err());
        drop(tx);
        let Ok(members) = hub.members().await else {
            panic!("members");
        };
        assert_eq!(members, [SessionId::from("watcher")]);
    }
}
