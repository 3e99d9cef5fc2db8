// Indexed result table for fan-out steps
use crate::error::SlotError;
use serde::Serialize;

/// Lifecycle of one video slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Initializing,
    Generating,
    Complete,
    Failed,
}

impl SlotStatus {
    fn rank(self) -> u8 {
        match self {
            SlotStatus::Initializing => 0,
            SlotStatus::Generating => 1,
            SlotStatus::Complete | SlotStatus::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SlotStatus::Complete | SlotStatus::Failed)
    }

    /// Statuses only move forward and never leave a terminal state.
    pub fn can_advance_to(self, next: SlotStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn label(self) -> &'static str {
        match self {
            SlotStatus::Initializing => "Initializing...",
            SlotStatus::Generating => "Generating...",
            SlotStatus::Complete => "Complete",
            SlotStatus::Failed => "Failed",
        }
    }
}

/// Fixed number of slots, each written at most once by the task that owns it.
#[derive(Debug, Clone)]
pub struct SlotTable<T> {
    entries: Vec<Option<T>>,
}

impl<T> SlotTable<T> {
    pub fn new(len: usize) -> Self {
        Self {
            entries: (0..len).map(|_| None).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fill(&mut self, index: usize, value: T) -> Result<(), SlotError> {
        let len = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(SlotError::OutOfRange { index, len })?;
        if entry.is_some() {
            return Err(SlotError::AlreadyFilled(index));
        }
        *entry = Some(value);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    pub fn is_filled(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    pub fn filled(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Option<&T>)> {
        self.entries.iter().enumerate().map(|(i, e)| (i, e.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_slot_is_written_once() {
        let mut table = SlotTable::new(3);
        table.fill(2, "c").unwrap();
        table.fill(0, "a").unwrap();

        assert_eq!(table.fill(2, "again"), Err(SlotError::AlreadyFilled(2)));
        assert_eq!(table.get(2), Some(&"c"));
        assert_eq!(table.get(1), None);
        assert_eq!(table.filled(), 2);
    }

    #[test]
    fn test_out_of_range_slot_is_rejected() {
        let mut table: SlotTable<u8> = SlotTable::new(1);
        assert_eq!(table.fill(4, 1), Err(SlotError::OutOfRange { index: 4, len: 1 }));
        assert!(SlotTable::<u8>::new(0).is_empty());
    }

    #[test]
    fn test_iteration_follows_slot_order() {
        let mut table = SlotTable::new(3);
        table.fill(1, 'b').unwrap();
        let seen: Vec<_> = table.iter().map(|(i, e)| (i, e.copied())).collect();
        assert_eq!(seen, vec![(0, None), (1, Some('b')), (2, None)]);
    }

    #[test]
    fn test_status_never_regresses() {
        use SlotStatus::*;
        assert!(Initializing.can_advance_to(Generating));
        assert!(Generating.can_advance_to(Complete));
        assert!(Generating.can_advance_to(Failed));
        assert!(!Generating.can_advance_to(Initializing));
        assert!(!Complete.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Complete));
        assert!(!Generating.can_advance_to(Generating));
    }
}
