use std::collections::HashMap;

use lbs_protocol::ResourceClass;

/// Per-client bookkeeping: one reference count and one optional interval
/// request per resource class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientEntry {
    counts: [u32; ResourceClass::COUNT],
    intervals: [Option<u32>; ResourceClass::COUNT],
}

impl ClientEntry {
    pub fn count(&self, resource: ResourceClass) -> u32 {
        self.counts[resource.index()]
    }

    pub fn interval(&self, resource: ResourceClass) -> Option<u32> {
        self.intervals[resource.index()]
    }

    /// True when no resource class is referenced.
    pub fn all_zero(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }

    /// True when an interval is recorded for a class this client does not
    /// currently reference.
    pub fn has_pending_interval(&self) -> bool {
        ResourceClass::ALL
            .iter()
            .any(|&r| self.count(r) == 0 && self.interval(r).is_some())
    }

    /// An entry with no counts and no pending interval must not stay in the table.
    pub fn is_vacant(&self) -> bool {
        self.all_zero() && !self.has_pending_interval()
    }

    /// Classes this client holds a reference for or has an interval recorded for.
    pub fn touched(&self) -> impl Iterator<Item = ResourceClass> + '_ {
        ResourceClass::ALL
            .into_iter()
            .filter(move |&r| self.count(r) > 0 || self.interval(r).is_some())
    }
}

/// Mapping from client identity to its per-class reference counts.
///
/// The table is plain data: it never deletes entries on its own. The session
/// manager decides when an entry has become vacant and removes it.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    entries: HashMap<String, ClientEntry>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Reference count of `client` for `resource`; zero for unknown clients.
    pub fn get(&self, client: &str, resource: ResourceClass) -> u32 {
        self.entries
            .get(client)
            .map(|e| e.count(resource))
            .unwrap_or(0)
    }

    /// Set a reference count, creating a zeroed entry on first sight.
    pub fn set(&mut self, client: &str, resource: ResourceClass, count: u32) {
        self.entry_mut(client).counts[resource.index()] = count;
    }

    pub fn interval(&self, client: &str, resource: ResourceClass) -> Option<u32> {
        self.entries.get(client).and_then(|e| e.interval(resource))
    }

    /// Record or clear an interval request, creating a zeroed entry on first sight.
    pub fn set_interval(&mut self, client: &str, resource: ResourceClass, interval: Option<u32>) {
        self.entry_mut(client).intervals[resource.index()] = interval;
    }

    pub fn entry(&self, client: &str) -> Option<&ClientEntry> {
        self.entries.get(client)
    }

    pub fn contains(&self, client: &str) -> bool {
        self.entries.contains_key(client)
    }

    /// Remove a client's entry, returning what it held.
    pub fn delete(&mut self, client: &str) -> Option<ClientEntry> {
        self.entries.remove(client)
    }

    /// True when `client` holds no references (including when it is unknown).
    pub fn all_zero(&self, client: &str) -> bool {
        self.entries.get(client).map_or(true, ClientEntry::all_zero)
    }

    pub fn is_vacant(&self, client: &str) -> bool {
        self.entries.get(client).map_or(true, ClientEntry::is_vacant)
    }

    /// True when any tracked client references `resource`. O(clients).
    pub fn any_non_zero(&self, resource: ResourceClass) -> bool {
        self.entries.values().any(|e| e.count(resource) > 0)
    }

    /// Sum of all clients' counts for `resource`.
    pub fn total(&self, resource: ResourceClass) -> u64 {
        self.entries
            .values()
            .map(|e| u64::from(e.count(resource)))
            .sum()
    }

    /// Smallest interval requested by a client that currently references
    /// `resource`. `None` when nobody constrains it.
    pub fn effective_interval(&self, resource: ResourceClass) -> Option<u32> {
        self.entries
            .values()
            .filter(|e| e.count(resource) > 0)
            .filter_map(|e| e.interval(resource))
            .min()
    }

    /// Identities of every tracked client.
    pub fn clients(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(&mut self, client: &str) -> &mut ClientEntry {
        self.entries.entry(client.to_string()).or_default()
    }
}
