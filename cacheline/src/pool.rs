//! Per-server connection slots.

use crate::connection::Connection;

/// One optional connection per server index.
///
/// Slots are filled all at once by a connect cycle and emptied one at a
/// time as connections fail. The pool never dials; the drain loop owns
/// the connect cycle and installs what it opened.
#[derive(Debug)]
pub(crate) struct ConnectionPool {
    slots: Vec<Option<Connection>>,
}

impl ConnectionPool {
    pub fn new(server_count: usize) -> Self {
        let mut slots = Vec::with_capacity(server_count);
        slots.resize_with(server_count, || None);
        ConnectionPool { slots }
    }

    /// Install a connection under its server's index.
    pub fn install(&mut self, index: usize, connection: Connection) {
        self.slots[index] = Some(connection);
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Connection> {
        self.slots[index].as_mut()
    }

    /// Remove and return the connection at `index`, leaving the slot
    /// empty. Fan-out paths take connections out, run their exchanges on
    /// owned values, and reinstall the survivors.
    pub fn take(&mut self, index: usize) -> Option<Connection> {
        self.slots[index].take()
    }

    /// Drop the connection at `index`, if any.
    pub fn discard(&mut self, index: usize) {
        self.slots[index] = None;
    }

    /// Drop every connection.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    pub fn connected_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Indices with a live connection, in registry order.
    pub fn connected_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|_| index))
            .collect()
    }
}
