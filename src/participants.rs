//! Participant registry handed to the manager on every selection

/// Ordered mapping of participant name to one-line description.
///
/// Registration order is preserved; it drives the listing shown to the model
/// and round-robin turn order. Re-registering a name replaces its description
/// in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Participants {
    entries: Vec<(String, String)>,
}

impl Participants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a participant
    pub fn insert(&mut self, name: impl Into<String>, description: impl Into<String>) {
        let name = name.into();
        let description = description.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = description,
            None => self.entries.push((name, description)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn description(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Name at position `index` in registration order
    pub fn nth(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|(n, _)| n.as_str())
    }

    /// Newline-joined `name: description` lines
    pub fn listing(&self) -> String {
        self.entries
            .iter()
            .map(|(n, d)| format!("{n}: {d}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N, D> FromIterator<(N, D)> for Participants
where
    N: Into<String>,
    D: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, D)>>(iter: I) -> Self {
        let mut participants = Participants::new();
        for (name, description) in iter {
            participants.insert(name, description);
        }
        participants
    }
}
