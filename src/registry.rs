//! Connection registry
//!
//! In-memory ordered list of known servers plus a monotonic id allocator.
//! The registry mirrors the persisted record but owns the only live copy.

use crate::types::{ConnectionSet, ServerDescriptor, ServerId, LOCAL_SERVER_ID};
use log::{info, warn};
use std::collections::HashSet;

/// Ids are kept below this so `next_id` can always move past them
const ID_CEILING: ServerId = ServerId::MAX;

fn is_usable_id(id: ServerId) -> bool {
    id != 0 && id < ID_CEILING
}

#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    connections: ConnectionSet,
    next_id: ServerId,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Registry seeded with the implicit local connection
    pub fn new() -> Self {
        Self {
            connections: ConnectionSet::seeded(),
            next_id: LOCAL_SERVER_ID + 1,
        }
    }

    pub fn connections(&self) -> &ConnectionSet {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Value the allocator will hand out next
    pub fn next_id(&self) -> ServerId {
        self.next_id
    }

    pub fn get(&self, id: ServerId) -> Option<&ServerDescriptor> {
        self.connections.servers.iter().find(|server| server.id == id)
    }

    fn contains_id(&self, id: ServerId) -> bool {
        self.get(id).is_some()
    }

    pub fn allocate_id(&mut self) -> Option<ServerId> {
        if self.next_id >= ID_CEILING {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        Some(id)
    }

    /// Append a descriptor, assigning an id when it has none, its id is
    /// taken or it is out of range.
    pub fn append(&mut self, mut descriptor: ServerDescriptor) -> Result<&ConnectionSet, String> {
        if is_usable_id(descriptor.id) && !self.contains_id(descriptor.id) {
            self.next_id = self.next_id.max(descriptor.id + 1);
        } else {
            descriptor.id = self
                .allocate_id()
                .ok_or_else(|| "Connection ids are exhausted".to_string())?;
        }

        self.connections.servers.push(descriptor);
        Ok(&self.connections)
    }

    /// Replace the working set with previously persisted data.
    ///
    /// Saved entries with a missing, duplicate or out-of-range id are
    /// dropped first. When nothing usable is left the registry is left
    /// untouched. Entries appended before the restore are discarded;
    /// their ids stay burned because the allocator never moves backwards.
    pub fn restore(&mut self, loaded: Option<ConnectionSet>) -> RestoreReport {
        let mut report = RestoreReport::default();
        let Some(loaded) = loaded else {
            return report;
        };

        let mut seen = HashSet::new();
        let mut servers = Vec::with_capacity(loaded.servers.len());
        for server in loaded.servers {
            if !is_usable_id(server.id) || !seen.insert(server.id) {
                let issue = format!(
                    "Dropped saved connection '{}' with missing, duplicate or invalid id {}",
                    server.name, server.id
                );
                warn!("[Registry] {}", issue);
                report.dropped.push(issue);
                continue;
            }
            servers.push(server);
        }

        if servers.is_empty() {
            return report;
        }

        let discarded = self.connections.len().saturating_sub(1);
        if discarded > 0 {
            warn!(
                "[Registry] Restore replaces {} connection(s) added before saved state loaded",
                discarded
            );
        }

        let max_id = servers.iter().map(|server| server.id).max().unwrap_or(0);
        self.next_id = self.next_id.max(max_id + 1);

        if !servers.iter().any(|server| server.is_local()) {
            let id = if seen.contains(&LOCAL_SERVER_ID) {
                self.allocate_id()
            } else {
                Some(LOCAL_SERVER_ID)
            };
            match id {
                Some(id) => servers.insert(0, ServerDescriptor::implicit_local(id)),
                None => warn!("[Registry] No id left for the local connection"),
            }
        }

        info!("[Registry] Restored {} saved connection(s)", servers.len());
        self.connections = ConnectionSet { servers };
        report.replaced = true;
        report
    }
}

/// What a restore did with the saved set
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// The working set was replaced
    pub replaced: bool,
    /// Saved entries that were dropped, one message each
    pub dropped: Vec<String>,
}

// ============================================================================
// TESTS
// ============================================================================
