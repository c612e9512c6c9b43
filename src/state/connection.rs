use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{
    dto::ws::ServerMessage,
    state::participant::{ConnectionId, MatchId, Participant},
};

/// Handle used to push messages to one connected client.
#[derive(Debug, Clone)]
struct ConnectionEntry {
    tx: mpsc::UnboundedSender<ServerMessage>,
    participant: Option<Participant>,
    match_id: Option<MatchId>,
}

/// Identity and room binding of a connection at the time it closed.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionBinding {
    pub participant: Option<Participant>,
    pub match_id: Option<MatchId>,
}

/// Live connections keyed by connection id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly opened socket.
    pub fn register(&self, connection: ConnectionId, tx: mpsc::UnboundedSender<ServerMessage>) {
        self.connections.insert(
            connection,
            ConnectionEntry {
                tx,
                participant: None,
                match_id: None,
            },
        );
    }

    /// Cache the identity announced by the client.
    pub fn identify(&self, connection: ConnectionId, participant: Participant) {
        if let Some(mut entry) = self.connections.get_mut(&connection) {
            entry.participant = Some(participant);
        }
    }

    /// Bind the connection to a room seat.
    pub fn bind(&self, connection: ConnectionId, participant: Participant, match_id: MatchId) {
        if let Some(mut entry) = self.connections.get_mut(&connection) {
            entry.participant = Some(participant);
            entry.match_id = Some(match_id);
        }
    }

    /// Drop the room binding, keeping the identity.
    pub fn unbind(&self, connection: ConnectionId) {
        if let Some(mut entry) = self.connections.get_mut(&connection) {
            entry.match_id = None;
        }
    }

    /// Forget the connection and return what it was bound to.
    pub fn unregister(&self, connection: ConnectionId) -> Option<ConnectionBinding> {
        self.connections
            .remove(&connection)
            .map(|(_, entry)| ConnectionBinding {
                participant: entry.participant,
                match_id: entry.match_id,
            })
    }

    /// Cached identity of the connection.
    pub fn participant(&self, connection: ConnectionId) -> Option<Participant> {
        self.connections
            .get(&connection)
            .and_then(|entry| entry.participant.clone())
    }

    /// Current identity and room binding.
    pub fn binding(&self, connection: ConnectionId) -> Option<ConnectionBinding> {
        self.connections.get(&connection).map(|entry| ConnectionBinding {
            participant: entry.participant.clone(),
            match_id: entry.match_id.clone(),
        })
    }

    /// Queue a message on the connection's writer task.
    ///
    /// Returns `false` when the connection is unknown or its writer is gone. The entry
    /// itself stays until [`ConnectionRegistry::unregister`] so the close still reaches the room.
    pub fn send(&self, connection: ConnectionId, message: ServerMessage) -> bool {
        let Some(tx) = self.connections.get(&connection).map(|entry| entry.tx.clone()) else {
            return false;
        };
        if tx.send(message).is_ok() {
            return true;
        }
        debug!(%connection, "writer closed; message dropped");
        false
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::participant::PlayerId;

    fn participant() -> Participant {
        Participant {
            id: PlayerId::new("p-1"),
            name: "P".into(),
            rating: 0,
            grade: 2,
            league: "bronze".into(),
            win_streak: 0,
        }
    }

    #[test]
    fn unregister_returns_binding_once() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let connection = ConnectionId::new();
        registry.register(connection, tx);
        registry.bind(connection, participant(), MatchId::new("m-1"));

        let binding = registry.unregister(connection).unwrap();
        assert_eq!(binding.match_id, Some(MatchId::new("m-1")));
        assert!(registry.unregister(connection).is_none());
    }

    #[test]
    fn send_to_closed_writer_keeps_the_binding() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = ConnectionId::new();
        registry.register(connection, tx);
        registry.bind(connection, participant(), MatchId::new("m-1"));
        assert!(registry.send(connection, ServerMessage::Pong));
        drop(rx);
        assert!(!registry.send(connection, ServerMessage::Pong));
        assert!(registry.unregister(connection).is_some());
    }
}
