use crate::{BlockSize, FilterId};

/// A job mutation that has been started but not yet settled, together with
/// the selection to restore if it fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingMutation {
    Filter {
        requested: FilterId,
        previous: FilterId,
    },
    BlockSize {
        requested: BlockSize,
        previous: BlockSize,
    },
}

/// Single-flight guard over all mutations of one job.
///
/// One slot for every mutation kind: a filter application and a block-size
/// change never overlap.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SingleFlight {
    slot: Option<PendingMutation>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.slot.is_some()
    }

    pub fn pending(&self) -> Option<&PendingMutation> {
        self.slot.as_ref()
    }

    /// Claims the slot. Returns `false`, leaving the current flight intact,
    /// when another mutation already holds it.
    pub fn try_begin(&mut self, mutation: PendingMutation) -> bool {
        if self.slot.is_some() {
            return false;
        }
        self.slot = Some(mutation);
        true
    }

    /// Releases the slot, returning the mutation that held it.
    pub fn finish(&mut self) -> Option<PendingMutation> {
        self.slot.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_flight_is_rejected_until_finish() {
        let mut flight = SingleFlight::new();
        assert!(flight.try_begin(PendingMutation::Filter {
            requested: FilterId::new("sepia"),
            previous: FilterId::none(),
        }));
        assert!(!flight.try_begin(PendingMutation::BlockSize {
            requested: BlockSize::Px64,
            previous: BlockSize::Px32,
        }));
        assert!(matches!(
            flight.pending(),
            Some(PendingMutation::Filter { .. })
        ));

        assert!(flight.finish().is_some());
        assert!(!flight.is_busy());
        assert!(flight.finish().is_none());
    }
}
