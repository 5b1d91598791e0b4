use crate::error::{CameraError, EventBusError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Notifications delivered to the host application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum CameraEvent {
    /// The camera opened and preview is being set up
    CameraReady,
    /// A still capture was delivered to the image sink
    PictureSaved { location: String },
    /// Any reported failure
    Error { message: String },
}

impl CameraEvent {
    pub fn error(error: &CameraError) -> Self {
        CameraEvent::Error {
            message: error.to_string(),
        }
    }

    /// Signal name as registered with the host
    pub fn event_name(&self) -> &'static str {
        match self {
            CameraEvent::CameraReady => "onCameraReady",
            CameraEvent::PictureSaved { .. } => "onPictureSaved",
            CameraEvent::Error { .. } => "onError",
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            CameraEvent::CameraReady => "Camera ready".to_string(),
            CameraEvent::PictureSaved { location } => format!("Picture saved to {}", location),
            CameraEvent::Error { message } => format!("Camera error: {}", message),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CameraEvent::Error { .. })
    }
}

/// Boundary to the host notification channel.
///
/// Delivery is best effort: implementations log and drop rather than fail the
/// session worker.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: CameraEvent);

    async fn ready(&self) {
        self.emit(CameraEvent::CameraReady).await;
    }

    async fn picture_saved(&self, location: String) {
        self.emit(CameraEvent::PictureSaved { location }).await;
    }

    async fn report(&self, error: &CameraError) {
        self.emit(CameraEvent::error(error)).await;
    }
}

/// Async event bus using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<CameraEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<CameraEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter applied on receive
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: CameraEvent) -> Result<usize, EventBusError> {
        match &event {
            CameraEvent::CameraReady => info!("Emitting camera ready event"),
            CameraEvent::PictureSaved { location } => {
                info!("Emitting picture saved event with location: {}", location)
            }
            CameraEvent::Error { message } => error!("Emitting error event: {}", message),
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[async_trait]
impl EventSink for EventBus {
    async fn emit(&self, event: CameraEvent) {
        if let Err(e) = self.publish(event) {
            debug!("Event dropped, no subscribers: {}", e);
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific signal names
    Names(Vec<&'static str>),
    /// Accept only error events
    ErrorsOnly,
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &CameraEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Names(names) => names.contains(&event.event_name()),
            EventFilter::ErrorsOnly => event.is_error(),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<CameraEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<CameraEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<CameraEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<CameraEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Drain everything currently queued
    pub fn drain(&mut self) -> Vec<CameraEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = self.try_recv() {
            events.push(event);
        }
        events
    }
}
