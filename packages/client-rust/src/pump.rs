//! Background task draining inbound frames from the connection.
//!
//! Every frame is offered to the dispatcher first. Whatever no caller was
//! waiting for is routed on: change events to the [`ChangeRegistry`], all
//! other signals to the application's unmatched channel.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use twinbus_core::{Frame, Signal};

use crate::changes::ChangeRegistry;
use crate::dispatcher::RequestDispatcher;

/// Handle to the running pump task.
pub struct InboundPump {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl InboundPump {
    /// Spawns the pump. It runs until [`stop`](Self::stop) is called or the
    /// inbound channel closes.
    #[must_use]
    pub fn start(
        mut inbound: mpsc::Receiver<Frame>,
        dispatcher: Arc<RequestDispatcher>,
        changes: Arc<ChangeRegistry>,
        unmatched: mpsc::UnboundedSender<Signal>,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = inbound.recv() => {
                        match frame {
                            Some(frame) => route(&frame, &dispatcher, &changes, &unmatched),
                            None => break,
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
            debug!("inbound pump stopped");
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the pump and waits for the task to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

fn route(
    frame: &Frame,
    dispatcher: &RequestDispatcher,
    changes: &ChangeRegistry,
    unmatched: &mpsc::UnboundedSender<Signal>,
) {
    // Protocol replies such as `START-SEND-EVENTS:ACK` are plain text.
    if let Frame::Text(text) = frame {
        if !text.trim_start().starts_with('{') {
            debug!(message = %text, "protocol message");
            return;
        }
    }

    match dispatcher.handle_inbound(frame) {
        Ok(None) => trace!("frame delivered to waiting caller"),
        Ok(Some(Signal::Event(event))) => {
            let handlers = changes.dispatch(&event);
            trace!(signal_type = %event.signal_type, handlers, "event dispatched");
        }
        Ok(Some(signal)) => {
            if unmatched.send(signal).is_err() {
                debug!("unmatched signal dropped, no receiver");
            }
        }
        Err(err) => warn!(error = %err, frame_len = frame.len(), "dropping undecodable frame"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use twinbus_core::messages::{Command, Event};
    use twinbus_core::{Headers, JsonPointer};

    use super::*;
    use crate::config::ClientConfig;
    use crate::dispatcher::tests::{frame_of, RecordingTransport};

    struct Fixture {
        pump: InboundPump,
        frames: mpsc::Sender<Frame>,
        unmatched: mpsc::UnboundedReceiver<Signal>,
        changes: Arc<AtomicU32>,
    }

    fn fixture() -> Fixture {
        let (transport, _sent) = RecordingTransport::new();
        let dispatcher = Arc::new(RequestDispatcher::new(&ClientConfig::default(), transport));
        let registry = Arc::new(ChangeRegistry::new(Arc::clone(&dispatcher)));
        let changes = Arc::new(AtomicU32::new(0));
        {
            let changes = Arc::clone(&changes);
            registry.register(move |_| {
                changes.fetch_add(1, Ordering::SeqCst);
            });
        }
        let (frames, inbound) = mpsc::channel(8);
        let (unmatched_tx, unmatched) = mpsc::unbounded_channel();
        let pump = InboundPump::start(inbound, dispatcher, registry, unmatched_tx);
        Fixture {
            pump,
            frames,
            unmatched,
            changes,
        }
    }

    fn change_event() -> Signal {
        Signal::Event(Event {
            signal_type: "things.events:thingModified".to_string(),
            entity_id: "org.acme:lamp".parse().unwrap(),
            resource_path: JsonPointer::root(),
            value: Some(serde_json::json!({"attributes": {}})),
            revision: 3,
            timestamp: None,
            extra: None,
            headers: Headers::new(),
        })
    }

    fn live_command() -> Signal {
        Signal::Command(Command::new(
            "things.commands:modifyAttribute",
            "org.acme:lamp".parse().unwrap(),
            JsonPointer::parse("/attributes/on"),
            Some(serde_json::json!(true)),
            Headers::new().with_correlation_id("from-backend"),
        ))
    }

    #[tokio::test]
    async fn routes_events_and_forwards_other_signals() {
        let mut fx = fixture();

        fx.frames.send(frame_of(&change_event())).await.unwrap();
        fx.frames.send(Frame::Text("not json at all".to_string())).await.unwrap();
        fx.frames.send(Frame::Text("{\"topic\": 1}".to_string())).await.unwrap();
        fx.frames.send(frame_of(&live_command())).await.unwrap();

        let forwarded = fx.unmatched.recv().await.unwrap();
        assert_eq!(forwarded, live_command());
        // Frames are handled in order, so the event has been dispatched.
        assert_eq!(fx.changes.load(Ordering::SeqCst), 1);
        assert!(fx.pump.is_running());

        fx.pump.stop().await;
        assert!(!fx.pump.is_running());
    }

    #[tokio::test]
    async fn closing_inbound_channel_ends_pump() {
        let Fixture { pump, frames, .. } = fixture();
        drop(frames);
        tokio::time::timeout(Duration::from_secs(1), async {
            while pump.is_running() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
