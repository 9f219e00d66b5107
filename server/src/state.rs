use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// What the socket task should do with a queued item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<Mutex<Broker>>,
}

impl AppState {
    pub fn new(routes: Routes) -> Self {
        Self {
            broker: Arc::new(Mutex::new(Broker::new(routes))),
        }
    }
}

/// Maps application destinations (`/app/...`) onto the topics they fan out to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Routes(HashMap<String, String>);

impl Routes {
    pub fn parse<'a>(entries: impl IntoIterator<Item = &'a str>) -> Result<Self, String> {
        let mut routes = HashMap::new();
        for entry in entries {
            let (from, to) = entry
                .split_once('=')
                .ok_or_else(|| format!("route {entry:?} is not <destination>=<topic>"))?;
            let (from, to) = (from.trim(), to.trim());
            if !from.starts_with('/') || !to.starts_with('/') {
                return Err(format!("route {entry:?} must map absolute destinations"));
            }
            routes.insert(from.to_string(), to.to_string());
        }
        Ok(Self(routes))
    }

    /// Topic a SEND destination publishes to. Topics accept direct sends.
    pub fn resolve<'a>(&'a self, destination: &'a str) -> Option<&'a str> {
        match self.0.get(destination) {
            Some(topic) => Some(topic.as_str()),
            None if destination.starts_with("/topic/") => Some(destination),
            None => None,
        }
    }
}

pub struct Peer {
    pub tx: mpsc::UnboundedSender<Outbound>,
    pub connected: bool,
    /// `(subscription id, destination)` in subscription order.
    pub subscriptions: Vec<(String, String)>,
}

pub struct Broker {
    pub routes: Routes,
    pub peers: HashMap<Uuid, Peer>,
    pub next_message_id: u64,
}

impl Broker {
    pub fn new(routes: Routes) -> Self {
        Self {
            routes,
            peers: HashMap::new(),
            next_message_id: 0,
        }
    }

    pub fn join(&mut self, id: Uuid, tx: mpsc::UnboundedSender<Outbound>) {
        self.peers.insert(
            id,
            Peer {
                tx,
                connected: false,
                subscriptions: Vec::new(),
            },
        );
    }

    pub fn leave(&mut self, id: Uuid) {
        self.peers.remove(&id);
    }
}
