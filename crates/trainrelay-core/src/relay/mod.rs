//! Event relay: one upstream connection to the job's event stream, fanned out
//! to any number of downstream subscribers.
//!
//! `connect()` spawns a task that owns the upstream connection and returns as
//! soon as the attempt is under way. The outcome is observed through synthetic
//! status events (`connected`, `error`, `disconnected`). There is no automatic
//! reconnect.

pub mod error;
pub mod hub;
pub mod transport;

pub use error::{RelayError, RelayResult};
pub use hub::{EventHub, Subscription};
pub use transport::{UpstreamConnector, UpstreamFrame, UpstreamStream, WebSocketConnector};

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use trainrelay_training::{RelayEvent, StatusUpdate, Topic, TrainingState, TrainingStatus, UpstreamEvent};

use crate::session::{ConnectionState, SessionState};

struct RelayTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the upstream subscription and its lifecycle.
#[derive(Clone)]
pub struct TrainingEventRelay {
    connector: Arc<dyn UpstreamConnector>,
    session: Arc<SessionState>,
    hub: EventHub,
    task: Arc<Mutex<Option<RelayTask>>>,
}

impl TrainingEventRelay {
    pub fn new(connector: Arc<dyn UpstreamConnector>, session: Arc<SessionState>, hub: EventHub) -> Self {
        Self { connector, session, hub, task: Arc::new(Mutex::new(None)) }
    }

    #[must_use]
    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.session.connection()
    }

    /// Subscribes to relay events on `topics` (all topics when empty).
    pub fn subscribe(&self, topics: impl IntoIterator<Item = Topic>) -> Subscription {
        self.hub.subscribe(topics)
    }

    /// Starts connecting unless a connection is already open or being opened.
    ///
    /// Returns the state right after the call, normally `connecting`.
    pub async fn connect(&self) -> ConnectionState {
        let mut task = self.task.lock().await;
        if !self.session.transition(ConnectionState::Disconnected, ConnectionState::Connecting) {
            let state = self.session.connection();
            debug!(state = %state, "Connect ignored");
            return state;
        }

        // A previous task that ended on its own has already released its connection.
        if let Some(finished) = task.take() {
            finished.cancel.cancel();
        }

        info!("Connecting to training event stream");
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_upstream(
            Arc::clone(&self.connector),
            Arc::clone(&self.session),
            self.hub.clone(),
            cancel.clone(),
        ));
        *task = Some(RelayTask { cancel, handle });
        ConnectionState::Connecting
    }

    /// Closes the upstream connection if any and leaves the relay disconnected.
    ///
    /// Safe to call from any state, including while a connect is in flight.
    pub async fn disconnect(&self) -> ConnectionState {
        let mut task = self.task.lock().await;
        if let Some(running) = task.take() {
            running.cancel.cancel();
            if let Err(e) = running.handle.await {
                warn!(error = %e, "Relay task ended abnormally");
            }
        }

        let previous = self.session.set_connection(ConnectionState::Disconnected);
        if previous == ConnectionState::Connected {
            info!("Disconnected from training event stream");
            self.hub.publish(RelayEvent::status(&StatusUpdate::disconnected()));
        } else {
            debug!(previous = %previous, "Disconnect with no open connection");
        }
        ConnectionState::Disconnected
    }
}

async fn run_upstream(
    connector: Arc<dyn UpstreamConnector>,
    session: Arc<SessionState>,
    hub: EventHub,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!("Connect attempt cancelled");
            return;
        }
        result = connector.connect() => result,
    };

    let mut stream = match connected {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "Training event stream connect failed");
            session.set_connection(ConnectionState::Disconnected);
            session.reset();
            hub.publish(RelayEvent::status(&StatusUpdate::error(&e)));
            return;
        }
    };

    if !session.transition(ConnectionState::Connecting, ConnectionState::Connected) {
        debug!("Relay disconnected while connecting; dropping connection");
        return;
    }
    info!("Connected to training event stream");
    hub.publish(RelayEvent::status(&StatusUpdate::connected()));

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("Relay task cancelled");
                return;
            }
            frame = stream.next() => match frame {
                Some(UpstreamFrame::Text(text)) => dispatch(&session, &hub, &text),
                Some(UpstreamFrame::Error(description)) => {
                    let e = RelayError::Transport(description);
                    error!(error = %e, "Training event stream failed");
                    session.set_connection(ConnectionState::Disconnected);
                    session.reset();
                    hub.publish(RelayEvent::status(&StatusUpdate::error(&e)));
                    hub.publish(RelayEvent::status(&StatusUpdate::disconnected()));
                    return;
                }
                None => {
                    info!("Training event stream closed");
                    session.set_connection(ConnectionState::Disconnected);
                    session.reset();
                    hub.publish(RelayEvent::status(&StatusUpdate::disconnected()));
                    return;
                }
            },
        }
    }
}

/// Classifies one upstream frame, updates the session and publishes it.
fn dispatch(session: &SessionState, hub: &EventHub, text: &str) {
    let event = match UpstreamEvent::decode(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Skipping undecodable upstream frame");
            return;
        }
    };
    debug!(topic = %event.topic(), "Upstream event");

    match &event {
        UpstreamEvent::Status(update) => {
            let previous = session.last_status();
            session.set_last_status(
                TrainingStatus::remote(TrainingState::from_tag(&update.status), update.message.clone())
                    .with_epochs(previous.current_epoch, previous.total_epochs),
            );
        }
        UpstreamEvent::EpochProgress { current_epoch, total_epochs } => {
            session.record_epoch_progress(*current_epoch, *total_epochs);
        }
        _ => {}
    }

    hub.publish(event.to_relay());
}
