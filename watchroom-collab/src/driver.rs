use std::time::Instant;

use log::{info, warn};
use tokio::{
    select,
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
    time::sleep_until,
};
use watchroom_core::{PeerTransport, TransportEvent};

use crate::{RoomSession, SignalMessage, SignalingChannel, UserIntent};

/// Everything that can happen to a running session.
#[derive(Debug)]
pub enum SessionInput {
    Signal(SignalMessage),
    Transport(TransportEvent),
    Intent(UserIntent),
    SignalingReconnected,
    Shutdown,
}

pub type InputSender = UnboundedSender<SessionInput>;
pub type InputReceiver = UnboundedReceiver<SessionInput>;

/// Creates the input channel of a session.
pub fn session_inputs() -> (InputSender, InputReceiver) {
    unbounded_channel()
}

/// Joins the room and runs the session until it is shut down or every input sender is gone.
///
/// Inputs and timers are handled one at a time, in arrival order.
pub async fn run_session<S, T>(mut session: RoomSession<S, T>, mut inputs: InputReceiver)
where
    S: SignalingChannel,
    T: PeerTransport,
{
    if let Err(e) = session.join(Instant::now()) {
        warn!("Could not join room {}: {}", session.room_id(), e);
        return;
    }

    loop {
        let deadline = session.next_deadline();

        select! {
            input = inputs.recv() => {
                let now = Instant::now();

                match input {
                    Some(SessionInput::Signal(message)) => session.handle_signal(message, now),
                    Some(SessionInput::Transport(event)) => session.handle_transport(event, now),
                    Some(SessionInput::Intent(intent)) => {
                        if let Err(e) = session.handle_intent(intent, now) {
                            warn!("Rejected intent: {}", e);
                        }
                    }
                    Some(SessionInput::SignalingReconnected) => session.signaling_reconnected(now),
                    Some(SessionInput::Shutdown) | None => break,
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(far_future).into()), if deadline.is_some() => {
                session.tick(Instant::now());
            }
        }
    }

    info!("Session for room {} ended", session.room_id());
}

/// Spawns [run_session] on the current tokio runtime.
pub fn spawn_session<S, T>(session: RoomSession<S, T>, inputs: InputReceiver) -> JoinHandle<()>
where
    S: SignalingChannel,
    T: PeerTransport,
{
    tokio::spawn(run_session(session, inputs))
}

fn far_future() -> Instant {
    Instant::now() + std::time::Duration::from_secs(60 * 60 * 24)
}
