//! In-process named topics and services.
//!
//! Topics are tokio broadcast channels keyed by name; services are request queues
//! with a oneshot reply per request. Both are created on first use and bound to a
//! single message type for the lifetime of the bus.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::msg::Message;

/// Queue depth used when none is configured.
pub const DEFAULT_CAPACITY: usize = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("`{name}` is already bound to a different message type")]
    TypeMismatch { name: String },

    #[error("no subscribers on `{topic}`")]
    NoSubscribers { topic: String },

    #[error("subscriber on `{topic}` lagged behind by {skipped} messages")]
    Lagged { topic: String, skipped: u64 },

    #[error("topic `{topic}` is closed")]
    Closed { topic: String },

    #[error("service `{name}` is already advertised")]
    ServiceExists { name: String },

    #[error("service `{name}` is not available")]
    ServiceUnavailable { name: String },
}

#[derive(Default)]
struct Registry {
    topics: HashMap<String, Box<dyn Any + Send + Sync>>,
    services: HashMap<String, Box<dyn Any + Send + Sync>>,
}

/// Handle to a shared set of topics and services. Clones refer to the same bus.
#[derive(Clone)]
pub struct Bus {
    registry: Arc<Mutex<Registry>>,
    capacity: usize,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Bus {
    /// Create a bus whose topics buffer up to `capacity` messages per subscriber.
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            capacity: capacity.max(1),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // The registry only holds channel handles, a poisoned lock leaves it consistent.
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sender<M: Message>(&self, name: &str) -> Result<broadcast::Sender<M>, BusError> {
        let mut registry = self.registry();
        let entry = registry
            .topics
            .entry(name.to_owned())
            .or_insert_with(|| {
                Box::new(broadcast::channel::<M>(self.capacity).0) as Box<dyn Any + Send + Sync>
            });

        entry
            .downcast_ref::<broadcast::Sender<M>>()
            .cloned()
            .ok_or_else(|| BusError::TypeMismatch {
                name: name.to_owned(),
            })
    }

    pub fn publisher<M: Message>(&self, topic: &str) -> Result<Publisher<M>, BusError> {
        Ok(Publisher {
            topic: topic.to_owned(),
            sender: self.sender(topic)?,
        })
    }

    pub fn subscribe<M: Message>(&self, topic: &str) -> Result<Subscriber<M>, BusError> {
        Ok(Subscriber {
            topic: topic.to_owned(),
            receiver: self.sender::<M>(topic)?.subscribe(),
        })
    }

    /// Advertise a service. Fails if a live server already owns `name`.
    pub fn advertise<Req, Resp>(&self, name: &str) -> Result<ServiceServer<Req, Resp>, BusError>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        let mut registry = self.registry();
        if let Some(existing) = registry.services.get(name) {
            match existing.downcast_ref::<mpsc::Sender<ServiceRequest<Req, Resp>>>() {
                Some(sender) if sender.is_closed() => {}
                _ => {
                    return Err(BusError::ServiceExists {
                        name: name.to_owned(),
                    })
                }
            }
        }

        let (sender, requests) = mpsc::channel(self.capacity);
        registry
            .services
            .insert(name.to_owned(), Box::new(sender) as Box<dyn Any + Send + Sync>);
        tracing::debug!(service = name, "advertised service");

        Ok(ServiceServer {
            name: name.to_owned(),
            requests,
        })
    }

    /// Connect to an advertised service.
    pub fn client<Req, Resp>(&self, name: &str) -> Result<ServiceClient<Req, Resp>, BusError>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        let registry = self.registry();
        let existing = registry
            .services
            .get(name)
            .ok_or_else(|| BusError::ServiceUnavailable {
                name: name.to_owned(),
            })?;
        let sender = existing
            .downcast_ref::<mpsc::Sender<ServiceRequest<Req, Resp>>>()
            .ok_or_else(|| BusError::TypeMismatch {
                name: name.to_owned(),
            })?;

        if sender.is_closed() {
            return Err(BusError::ServiceUnavailable {
                name: name.to_owned(),
            });
        }

        Ok(ServiceClient {
            name: name.to_owned(),
            sender: sender.clone(),
        })
    }

    pub fn topic_count(&self) -> usize {
        self.registry().topics.len()
    }
}

pub struct Publisher<M> {
    topic: String,
    sender: broadcast::Sender<M>,
}

impl<M: Message> Publisher<M> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish `msg`, returning how many subscribers will receive it.
    pub fn publish(&self, msg: M) -> Result<usize, BusError> {
        self.sender
            .send(msg)
            .map_err(|_| BusError::NoSubscribers {
                topic: self.topic.clone(),
            })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<M> Clone for Publisher<M> {
    fn clone(&self) -> Self {
        Self {
            topic: self.topic.clone(),
            sender: self.sender.clone(),
        }
    }
}

pub struct Subscriber<M> {
    topic: String,
    receiver: broadcast::Receiver<M>,
}

impl<M: Message> Subscriber<M> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next message.
    ///
    /// After a [`BusError::Lagged`] the subscriber continues from the oldest
    /// message still buffered.
    pub async fn recv(&mut self) -> Result<M, BusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Lagged(skipped) => BusError::Lagged {
                topic: self.topic.clone(),
                skipped,
            },
            broadcast::error::RecvError::Closed => BusError::Closed {
                topic: self.topic.clone(),
            },
        })
    }

    /// Take the next message if one is already waiting.
    pub fn try_recv(&mut self) -> Option<M> {
        loop {
            match self.receiver.try_recv() {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// A request waiting for a reply from the service owner.
pub struct ServiceRequest<Req, Resp> {
    pub request: Req,
    reply: oneshot::Sender<Resp>,
}

impl<Req, Resp> ServiceRequest<Req, Resp> {
    /// Send the response. The caller may have stopped waiting, which is not an error.
    pub fn respond(self, response: Resp) {
        let _ = self.reply.send(response);
    }
}

pub struct ServiceServer<Req, Resp> {
    name: String,
    requests: mpsc::Receiver<ServiceRequest<Req, Resp>>,
}

impl<Req, Resp> ServiceServer<Req, Resp> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn recv(&mut self) -> Option<ServiceRequest<Req, Resp>> {
        self.requests.recv().await
    }
}

pub struct ServiceClient<Req, Resp> {
    name: String,
    sender: mpsc::Sender<ServiceRequest<Req, Resp>>,
}

impl<Req, Resp> Clone for ServiceClient<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl<Req, Resp> ServiceClient<Req, Resp> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_available(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Send `request` and wait for the server's response.
    pub async fn call(&self, request: Req) -> Result<Resp, BusError> {
        let unavailable = || BusError::ServiceUnavailable {
            name: self.name.clone(),
        };

        let (reply, response) = oneshot::channel();
        self.sender
            .send(ServiceRequest { request, reply })
            .await
            .map_err(|_| unavailable())?;

        response.await.map_err(|_| unavailable())
    }
}
