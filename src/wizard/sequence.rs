//! Stamps background requests so a late answer to a superseded request is
//! dropped instead of overwriting newer state.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug, Clone)]
pub struct Stamped<T> {
    pub ticket: Ticket,
    pub value: T,
}

#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: u64,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new ticket; every earlier ticket becomes stale.
    pub fn issue(&mut self) -> Ticket {
        self.latest += 1;
        Ticket(self.latest)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket.0 == self.latest
    }

    /// Invalidate everything in flight without starting a new request.
    pub fn cancel_all(&mut self) {
        self.latest += 1;
    }

    pub fn accept<T>(&self, stamped: Stamped<T>) -> Option<T> {
        if self.is_current(stamped.ticket) {
            Some(stamped.value)
        } else {
            tracing::debug!(
                ticket = stamped.ticket.0,
                latest = self.latest,
                "dropping stale response"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_latest_ticket_accepted() {
        let mut seq = RequestSequencer::new();
        let first = seq.issue();
        let second = seq.issue();

        assert_eq!(seq.accept(Stamped { ticket: first, value: "old" }), None);
        assert_eq!(seq.accept(Stamped { ticket: second, value: "new" }), Some("new"));
    }

    #[test]
    fn test_cancel_all_invalidates_in_flight() {
        let mut seq = RequestSequencer::new();
        let ticket = seq.issue();
        seq.cancel_all();
        assert!(!seq.is_current(ticket));
    }
}
