use std::{collections::HashMap, hash::Hash};

/// Handler tiers. Higher tiers run first; `Editor` is the engine's own
/// native behavior and runs last.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandPriority {
    Editor,
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Registration(u64);

#[derive(Debug)]
struct Entry<H> {
    id: Registration,
    priority: CommandPriority,
    handler: H,
}

/// Priority-ordered registry of handlers per command. The bus only orders;
/// the owner runs the handlers and stops at the first one that returns true.
#[derive(Debug)]
pub struct CommandBus<K, H> {
    entries: HashMap<K, Vec<Entry<H>>>,
    next_id: u64,
}

impl<K, H> Default for CommandBus<K, H> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<K: Eq + Hash + Copy, H: Clone> CommandBus<K, H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, command: K, priority: CommandPriority, handler: H) -> Registration {
        let id = Registration(self.next_id);
        self.next_id += 1;
        let entries = self.entries.entry(command).or_default();
        // Stable within a tier: earlier registrations run first.
        let position = entries
            .iter()
            .position(|entry| entry.priority < priority)
            .unwrap_or(entries.len());
        entries.insert(
            position,
            Entry {
                id,
                priority,
                handler,
            },
        );
        id
    }

    pub fn unregister(&mut self, registration: Registration) -> bool {
        let mut removed = false;
        for entries in self.entries.values_mut() {
            let before = entries.len();
            entries.retain(|entry| entry.id != registration);
            removed |= entries.len() != before;
        }
        removed
    }

    /// Handlers for `command` in the order they must run.
    pub fn handlers(&self, command: K) -> Vec<H> {
        self.entries
            .get(&command)
            .map(|entries| entries.iter().map(|entry| entry.handler.clone()).collect())
            .unwrap_or_default()
    }

    pub fn is_registered(&self, command: K) -> bool {
        self.entries.get(&command).is_some_and(|entries| !entries.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_tiers_come_first_and_ties_keep_registration_order() {
        let mut bus: CommandBus<&str, &str> = CommandBus::new();
        bus.register("enter", CommandPriority::Editor, "native");
        bus.register("enter", CommandPriority::High, "escaper");
        bus.register("enter", CommandPriority::Normal, "single-line");
        bus.register("enter", CommandPriority::High, "prompt");

        assert_eq!(
            bus.handlers("enter"),
            vec!["escaper", "prompt", "single-line", "native"]
        );
    }

    #[test]
    fn unregister_removes_only_that_handler() {
        let mut bus: CommandBus<&str, &str> = CommandBus::new();
        let prompt = bus.register("tab", CommandPriority::High, "prompt");
        bus.register("tab", CommandPriority::Normal, "indent");

        assert!(bus.unregister(prompt));
        assert!(!bus.unregister(prompt));
        assert_eq!(bus.handlers("tab"), vec!["indent"]);
    }
}
