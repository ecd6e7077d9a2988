use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::{error::MusicError, sources::Track};

/// Colas de reproducción por guild (FIFO estricto).
///
/// Cada operación toca una sola entrada del mapa; nunca se mantiene un lock
/// de esta estructura mientras se llama a otra.
#[derive(Debug)]
pub struct GuildQueueStore {
    queues: DashMap<GuildId, VecDeque<Track>>,
    max_size: usize,
}

impl GuildQueueStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            queues: DashMap::new(),
            max_size: max_size.max(1),
        }
    }

    /// Agrega un track al final de la cola del guild (creándola si no existe).
    /// Devuelve la nueva longitud, que es la posición del track.
    pub fn enqueue(&self, guild_id: GuildId, track: Track) -> Result<usize, MusicError> {
        let mut queue = self.queues.entry(guild_id).or_default();
        if queue.len() >= self.max_size {
            return Err(MusicError::QueueFull(self.max_size));
        }

        info!("➕ Agregado a la cola de {}: {}", guild_id, track.title);
        queue.push_back(track);
        Ok(queue.len())
    }

    pub fn peek_head(&self, guild_id: GuildId) -> Option<Track> {
        self.queues.get(&guild_id).and_then(|queue| queue.front().cloned())
    }

    /// Quita el primer track; no hace nada si la cola está vacía o no existe
    pub fn pop_head(&self, guild_id: GuildId) -> Option<Track> {
        let popped = self.queues.get_mut(&guild_id).and_then(|mut queue| queue.pop_front());
        if let Some(track) = &popped {
            debug!("⏭️ Sale de la cola de {}: {}", guild_id, track.title);
        }
        popped
    }

    pub fn is_empty(&self, guild_id: GuildId) -> bool {
        self.len(guild_id) == 0
    }

    pub fn len(&self, guild_id: GuildId) -> usize {
        self.queues.get(&guild_id).map_or(0, |queue| queue.len())
    }

    pub fn snapshot(&self, guild_id: GuildId) -> Vec<Track> {
        self.queues
            .get(&guild_id)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Indica si el guild tiene una cola creada (aunque esté vacía)
    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.queues.contains_key(&guild_id)
    }

    /// Elimina la cola del guild. Devuelve cuántos tracks se descartaron.
    pub fn remove_guild(&self, guild_id: GuildId) -> usize {
        match self.queues.remove(&guild_id) {
            Some((_, queue)) => {
                if !queue.is_empty() {
                    info!("🗑️ Cola de {} eliminada con {} tracks pendientes", guild_id, queue.len());
                }
                queue.len()
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::Platform;
    use pretty_assertions::assert_eq;

    fn track(name: &str) -> Track {
        Track::new(name, format!("https://www.youtube.com/watch?v={}", name), Platform::YouTube)
    }

    #[test]
    fn pops_in_enqueue_order() {
        let store = GuildQueueStore::new(10);
        let guild = GuildId::new(1);

        assert_eq!(store.enqueue(guild, track("a")).unwrap(), 1);
        assert_eq!(store.enqueue(guild, track("b")).unwrap(), 2);
        assert_eq!(store.enqueue(guild, track("c")).unwrap(), 3);

        assert_eq!(store.peek_head(guild).map(|t| t.title), Some("a".to_string()));
        let order: Vec<String> = std::iter::from_fn(|| store.pop_head(guild))
            .map(|t| t.title)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);

        // La cola vacía sigue existiendo hasta que se elimina explícitamente
        assert!(store.is_empty(guild));
        assert!(store.contains(guild));
        assert_eq!(store.pop_head(guild), None);
    }

    #[test]
    fn guilds_are_isolated() {
        let store = GuildQueueStore::new(10);
        let (g1, g2) = (GuildId::new(1), GuildId::new(2));

        store.enqueue(g1, track("a")).unwrap();
        store.enqueue(g2, track("x")).unwrap();
        store.enqueue(g1, track("b")).unwrap();

        assert_eq!(store.len(g1), 2);
        assert_eq!(store.len(g2), 1);
        assert_eq!(store.remove_guild(g1), 2);
        assert!(!store.contains(g1));
        assert_eq!(store.snapshot(g2), vec![track("x")]);
    }

    #[test]
    fn rejects_tracks_past_capacity() {
        let store = GuildQueueStore::new(2);
        let guild = GuildId::new(7);

        store.enqueue(guild, track("a")).unwrap();
        store.enqueue(guild, track("b")).unwrap();
        assert_eq!(store.enqueue(guild, track("c")), Err(MusicError::QueueFull(2)));
        assert_eq!(store.len(guild), 2);
    }

    #[test]
    fn absent_guild_is_empty() {
        let store = GuildQueueStore::new(5);
        let guild = GuildId::new(99);

        assert!(store.is_empty(guild));
        assert_eq!(store.peek_head(guild), None);
        assert!(store.snapshot(guild).is_empty());
        assert_eq!(store.remove_guild(guild), 0);
    }
}
