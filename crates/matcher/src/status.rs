use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::broadcast;

const STATUS_CHANNEL_CAPACITY: usize = 64;

/// The data categories whose readiness is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataStream {
    Constituencies,
    Questions,
    Candidates,
    Favourites,
    Mapping,
    Filters,
}

impl DataStream {
    pub const ALL: [Self; 6] = [
        Self::Constituencies,
        Self::Questions,
        Self::Candidates,
        Self::Favourites,
        Self::Mapping,
        Self::Filters,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Constituencies => "constituencies",
            Self::Questions => "questions",
            Self::Candidates => "candidates",
            Self::Favourites => "favourites",
            Self::Mapping => "mapping",
            Self::Filters => "filters",
        }
    }
}

impl fmt::Display for DataStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Updated` means ready and just changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataStatus {
    #[default]
    NotReady,
    Ready,
    Updated,
}

impl DataStatus {
    #[must_use]
    pub fn is_ready(self) -> bool {
        !matches!(self, Self::NotReady)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub stream: DataStream,
    pub status: DataStatus,
}

/// Which publications fire a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// `Ready` or `Updated`
    Available,
    Updated,
}

impl Trigger {
    fn fires_on(self, status: DataStatus) -> bool {
        match self {
            Self::Available => status.is_ready(),
            Self::Updated => status == DataStatus::Updated,
        }
    }
}

/// Work done in response to a publication, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Publish(DataStream, DataStatus),
    RestoreFavourites,
    RebuildFilters,
}

#[derive(Debug, Clone, Copy)]
pub struct CascadeRule {
    pub name: &'static str,
    pub stream: DataStream,
    pub trigger: Trigger,
    pub reactions: &'static [Reaction],
}

/// Every cascading transition the matcher performs.
pub const CASCADE: &[CascadeRule] = &[
    CascadeRule {
        name: "answers_invalidate_mapping",
        stream: DataStream::Questions,
        trigger: Trigger::Updated,
        reactions: &[Reaction::Publish(DataStream::Mapping, DataStatus::NotReady)],
    },
    CascadeRule {
        name: "candidates_rebuild_dependents",
        stream: DataStream::Candidates,
        trigger: Trigger::Available,
        reactions: &[
            Reaction::RestoreFavourites,
            Reaction::Publish(DataStream::Favourites, DataStatus::Ready),
            Reaction::RebuildFilters,
            Reaction::Publish(DataStream::Filters, DataStatus::Ready),
        ],
    },
];

/// Current status per stream plus a broadcast of every publication.
#[derive(Debug)]
pub struct StatusBoard {
    statuses: BTreeMap<DataStream, DataStatus>,
    tx: broadcast::Sender<StatusChange>,
}

impl StatusBoard {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            statuses: DataStream::ALL
                .into_iter()
                .map(|stream| (stream, DataStatus::NotReady))
                .collect(),
            tx,
        }
    }

    #[must_use]
    pub fn get(&self, stream: DataStream) -> DataStatus {
        self.statuses.get(&stream).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<DataStream, DataStatus> {
        self.statuses.clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.tx.subscribe()
    }

    /// Record and broadcast `status`, returning the reactions of every rule
    /// it fires. Publishing the current status again still broadcasts.
    pub fn set(&mut self, stream: DataStream, status: DataStatus) -> Vec<Reaction> {
        self.statuses.insert(stream, status);
        log::debug!("Status {} -> {:?}", stream, status);
        // No subscribers is fine
        let _ = self.tx.send(StatusChange { stream, status });

        CASCADE
            .iter()
            .filter(|rule| rule.stream == stream && rule.trigger.fires_on(status))
            .inspect(|rule| log::debug!("Cascade rule '{}' fired", rule.name))
            .flat_map(|rule| rule.reactions.iter().copied())
            .collect()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn everything_starts_not_ready() {
        let board = StatusBoard::new();
        for stream in DataStream::ALL {
            assert_eq!(board.get(stream), DataStatus::NotReady);
        }
    }

    #[test]
    fn answer_updates_invalidate_mapping() {
        let mut board = StatusBoard::new();
        assert!(board.set(DataStream::Questions, DataStatus::Ready).is_empty());
        assert_eq!(
            board.set(DataStream::Questions, DataStatus::Updated),
            vec![Reaction::Publish(DataStream::Mapping, DataStatus::NotReady)]
        );
    }

    #[test]
    fn candidates_rebuild_on_ready_and_updated() {
        let mut board = StatusBoard::new();
        assert!(board
            .set(DataStream::Candidates, DataStatus::NotReady)
            .is_empty());
        let ready = board.set(DataStream::Candidates, DataStatus::Ready);
        let updated = board.set(DataStream::Candidates, DataStatus::Updated);
        assert_eq!(ready, updated);
        assert_eq!(ready.first(), Some(&Reaction::RestoreFavourites));
        assert_eq!(ready.len(), 4);
    }

    #[test]
    fn publications_are_broadcast_in_order() {
        let mut board = StatusBoard::new();
        let mut rx = board.subscribe();
        board.set(DataStream::Mapping, DataStatus::Ready);
        board.set(DataStream::Mapping, DataStatus::Ready);
        assert_eq!(rx.try_recv().unwrap().status, DataStatus::Ready);
        assert_eq!(rx.try_recv().unwrap().status, DataStatus::Ready);
        assert!(rx.try_recv().is_err());
    }
}
