//! Bounded FIFO of pending transactions
//!
//! The queue grants the bus to one transaction at a time, in submission
//! order. Submitters hold a [`Ticket`]; the driver pops work with
//! [`RequestQueue::start_next`], stores the finished transaction with
//! [`RequestQueue::finish`], and the submitter collects it once with
//! [`RequestQueue::claim`].
//!
//! Slots carry a generation counter, so a ticket kept around after its slot
//! was reused resolves to [`TicketState::Unknown`] instead of touching the
//! new occupant.
//!
//! The queue itself is plain `&mut self`; whoever shares it across tasks
//! and interrupt context wraps it in a mutex.

use heapless::Deque;

use crate::transaction::Transaction;

/// Handle to a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ticket {
    slot: usize,
    generation: u32,
}

impl Ticket {
    /// Index of the slot backing this ticket, in `0..N`.
    ///
    /// Useful for pairing per-slot completion signals with tickets. The
    /// index is reused once the transaction is claimed or canceled.
    pub fn index(&self) -> usize {
        self.slot
    }
}

/// Where a ticket's transaction currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TicketState {
    /// Waiting its turn in the FIFO.
    Queued,
    /// Owns the bus right now.
    Active,
    /// Completed; waiting to be claimed.
    Finished,
    /// Never existed, already claimed, or canceled.
    Unknown,
}

enum Slot {
    Free,
    Queued(Transaction),
    /// Ownership is with the engine; the slot is a placeholder.
    Active,
    Finished(Transaction),
}

/// FIFO of up to `N` transactions, at most one of them active.
pub struct RequestQueue<const N: usize> {
    slots: [Slot; N],
    generations: [u32; N],
    /// Queued slot indices in submission order.
    order: Deque<usize, N>,
    active: Option<usize>,
    /// Abort requested against the active transaction.
    abort_requested: bool,
}

impl<const N: usize> RequestQueue<N> {
    pub const fn new() -> Self {
        Self {
            slots: [const { Slot::Free }; N],
            generations: [0; N],
            order: Deque::new(),
            active: None,
            abort_requested: false,
        }
    }

    /// Number of transactions waiting their turn.
    pub fn queued(&self) -> usize {
        self.order.len()
    }

    /// True while a transaction owns the bus.
    pub fn has_active(&self) -> bool {
        self.active.is_some()
    }

    /// Enqueues a transaction, handing it back if every slot is taken.
    pub fn submit(&mut self, txn: Transaction) -> Result<Ticket, Transaction> {
        let Some(slot) = self
            .slots
            .iter()
            .position(|entry| matches!(entry, Slot::Free))
        else {
            return Err(txn);
        };
        self.slots[slot] = Slot::Queued(txn);
        let pushed = self.order.push_back(slot);
        debug_assert!(pushed.is_ok());
        Ok(Ticket {
            slot,
            generation: self.generations[slot],
        })
    }

    /// Removes a still-queued transaction and hands it back untouched.
    ///
    /// Returns `None` if the ticket is stale or its transaction already
    /// went active; an active transaction is aborted through
    /// [`RequestQueue::request_abort`] instead.
    pub fn cancel(&mut self, ticket: Ticket) -> Option<Transaction> {
        if !self.current(ticket) {
            return None;
        }
        if !matches!(self.slots[ticket.slot], Slot::Queued(_)) {
            return None;
        }

        let mut remaining = Deque::new();
        while let Some(slot) = self.order.pop_front() {
            if slot != ticket.slot {
                let pushed = remaining.push_back(slot);
                debug_assert!(pushed.is_ok());
            }
        }
        self.order = remaining;

        let entry = core::mem::replace(&mut self.slots[ticket.slot], Slot::Free);
        self.generations[ticket.slot] = self.generations[ticket.slot].wrapping_add(1);
        match entry {
            Slot::Queued(txn) => Some(txn),
            _ => None,
        }
    }

    /// Flags the active transaction for abort at its next safe boundary.
    ///
    /// Returns true if `ticket` is the active transaction. The driver picks
    /// the request up with [`RequestQueue::take_abort_request`].
    pub fn request_abort(&mut self, ticket: Ticket) -> bool {
        if !self.current(ticket) {
            return false;
        }
        if self.active == Some(ticket.slot) {
            self.abort_requested = true;
            true
        } else {
            false
        }
    }

    /// Consumes a pending abort request, if any.
    pub fn take_abort_request(&mut self) -> bool {
        core::mem::take(&mut self.abort_requested)
    }

    /// Hands the FIFO head to the caller and marks it active.
    ///
    /// Returns `None` while a transaction is already active or nothing is
    /// queued.
    pub fn start_next(&mut self) -> Option<(Ticket, Transaction)> {
        if self.active.is_some() {
            return None;
        }
        let slot = self.order.pop_front()?;
        match core::mem::replace(&mut self.slots[slot], Slot::Active) {
            Slot::Queued(txn) => {
                self.active = Some(slot);
                self.abort_requested = false;
                Some((
                    Ticket {
                        slot,
                        generation: self.generations[slot],
                    },
                    txn,
                ))
            }
            entry => {
                debug_assert!(false, "fifo held a non-queued slot");
                self.slots[slot] = entry;
                None
            }
        }
    }

    /// Stores the completed transaction for its ticket.
    ///
    /// # Panics
    ///
    /// If `ticket` is not the active transaction.
    pub fn finish(&mut self, ticket: Ticket, txn: Transaction) {
        assert!(
            self.active == Some(ticket.slot) && self.current(ticket),
            "finish without matching active transaction"
        );
        self.slots[ticket.slot] = Slot::Finished(txn);
        self.active = None;
        self.abort_requested = false;
    }

    /// Takes the finished transaction, freeing its slot.
    ///
    /// Each ticket claims at most once; stale or unfinished tickets return
    /// `None`.
    pub fn claim(&mut self, ticket: Ticket) -> Option<Transaction> {
        if !self.current(ticket) {
            return None;
        }
        if !matches!(self.slots[ticket.slot], Slot::Finished(_)) {
            return None;
        }
        let entry = core::mem::replace(&mut self.slots[ticket.slot], Slot::Free);
        self.generations[ticket.slot] = self.generations[ticket.slot].wrapping_add(1);
        match entry {
            Slot::Finished(txn) => Some(txn),
            _ => None,
        }
    }

    /// Where `ticket`'s transaction currently is.
    pub fn state(&self, ticket: Ticket) -> TicketState {
        if !self.current(ticket) {
            return TicketState::Unknown;
        }
        match self.slots[ticket.slot] {
            Slot::Free => TicketState::Unknown,
            Slot::Queued(_) => TicketState::Queued,
            Slot::Active => TicketState::Active,
            Slot::Finished(_) => TicketState::Finished,
        }
    }

    fn current(&self, ticket: Ticket) -> bool {
        ticket.slot < N && self.generations[ticket.slot] == ticket.generation
    }
}

impl<const N: usize> Default for RequestQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
