//! Queue, pump, and application surface for the I2C1 master.
//!
//! [`BusState`] lives in a static and is shared three ways: the interrupt
//! handlers feed its dispatcher, [`BusHandle`]s submit transactions to its
//! queue, and the [`BusRunner`] task drains both. The runner owns all
//! register sequencing; handlers never drive the bus themselves.
//!
//! Completion is tracked per queue slot. A submitted transaction yields a
//! [`Ticket`]; waiting on the ticket parks the caller on the slot's signal
//! until the runner finishes the transfer and publishes the outcome.

use core::cell::RefCell;
use core::future::pending;

use critical_section::Mutex;
use embassy_futures::select::{select, select3, Either, Either3};
use embassy_stm32::i2c::{self, I2c, Master, SclPin, SdaPin};
use embassy_stm32::mode::Blocking;
use embassy_stm32::time::Hertz;
use embassy_stm32::{pac, peripherals, Peri};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use twine_core::{
    DeviceAddress, Direction, Engine, ErrorKind, Phase, RegisterAddress, RequestQueue, Step,
    Ticket, TicketState, Transaction, TransferError,
};
use twine_hal::{BusConfig, BusEvent, BusSignaling, FaultKind, TimerId};

use crate::dispatcher::EventDispatcher;
use crate::signaling::PeripheralBus;

/// Shared state behind the I2C1 master. Place one in a static and hand it
/// to [`BusRunner::new`] and the two interrupt handlers.
pub struct BusState<const QUEUE: usize = 4, const EVENTS: usize = 8> {
    dispatcher: EventDispatcher<EVENTS>,
    queue: Mutex<RefCell<RequestQueue<QUEUE>>>,
    /// One token per free queue slot; taking one backpressures submitters.
    slots: Channel<CriticalSectionRawMutex, (), QUEUE>,
    /// Completion signal per queue slot.
    done: [Signal<CriticalSectionRawMutex, ()>; QUEUE],
    /// Wakes the runner when work arrives on an idle queue.
    kick: Signal<CriticalSectionRawMutex, ()>,
}

impl<const QUEUE: usize, const EVENTS: usize> BusState<QUEUE, EVENTS> {
    pub const fn new() -> Self {
        Self {
            dispatcher: EventDispatcher::new(),
            queue: Mutex::new(RefCell::new(RequestQueue::new())),
            slots: Channel::new(),
            done: [const { Signal::new() }; QUEUE],
            kick: Signal::new(),
        }
    }
}

/// Event interrupt entry point. Call from the `I2C1_EV` handler.
pub fn handle_event_interrupt<const QUEUE: usize, const EVENTS: usize>(
    state: &BusState<QUEUE, EVENTS>,
) {
    state.dispatcher.handle_event();
}

/// Error interrupt entry point. Call from the `I2C1_ER` handler.
pub fn handle_error_interrupt<const QUEUE: usize, const EVENTS: usize>(
    state: &BusState<QUEUE, EVENTS>,
) {
    state.dispatcher.handle_error();
}

/// Cheap, copyable application handle for submitting transfers.
#[derive(Clone, Copy)]
pub struct BusHandle<const QUEUE: usize = 4, const EVENTS: usize = 8> {
    state: &'static BusState<QUEUE, EVENTS>,
    timeout_ms: u32,
}

impl<const QUEUE: usize, const EVENTS: usize> BusHandle<QUEUE, EVENTS> {
    /// A copy of this handle whose transfers use `timeout_ms` per phase
    /// instead of the config default.
    ///
    /// The handle is `Copy`, so a one-off budget is
    /// `bus.with_timeout(50).read_register(..)`.
    pub fn with_timeout(self, timeout_ms: u32) -> Self {
        Self { timeout_ms, ..self }
    }

    /// Writes `bytes` to `register` on `device` and waits for the outcome.
    pub async fn write_register(
        &self,
        device: DeviceAddress,
        register: RegisterAddress,
        bytes: &[u8],
    ) -> Result<(), TransferError> {
        let ticket = self.submit_write(device, register, bytes).await?;
        self.wait(ticket).await?;
        Ok(())
    }

    /// Reads `buf.len()` bytes from `register` on `device`.
    pub async fn read_register(
        &self,
        device: DeviceAddress,
        register: RegisterAddress,
        buf: &mut [u8],
    ) -> Result<(), TransferError> {
        let ticket = self.submit_read(device, register, buf.len()).await?;
        let txn = self.wait(ticket).await?;
        buf.copy_from_slice(txn.data());
        Ok(())
    }

    /// Queues a register write without waiting for it.
    ///
    /// Suspends while the queue is full. The returned ticket must be either
    /// reaped with [`wait`](Self::wait) or withdrawn with
    /// [`cancel`](Self::cancel) while still queued; an abandoned ticket
    /// keeps its slot occupied.
    pub async fn submit_write(
        &self,
        device: DeviceAddress,
        register: RegisterAddress,
        bytes: &[u8],
    ) -> Result<Ticket, TransferError> {
        let txn = Transaction::write(device, register, bytes, self.timeout_ms)?;
        Ok(self.enqueue(txn).await)
    }

    /// Queues a register read of `length` bytes without waiting for it.
    pub async fn submit_read(
        &self,
        device: DeviceAddress,
        register: RegisterAddress,
        length: usize,
    ) -> Result<Ticket, TransferError> {
        let txn = Transaction::read(device, register, length, self.timeout_ms)?;
        Ok(self.enqueue(txn).await)
    }

    /// Waits for a submitted transaction and claims it.
    ///
    /// On success the transaction is returned with its read data (if any)
    /// filled in. A ticket whose transaction was withdrawn reports
    /// [`ErrorKind::Canceled`].
    pub async fn wait(&self, ticket: Ticket) -> Result<Transaction, TransferError> {
        loop {
            let claimed =
                critical_section::with(|cs| self.state.queue.borrow_ref_mut(cs).claim(ticket));
            if let Some(txn) = claimed {
                let _ = self.state.slots.try_send(());
                if let Some(Err(error)) = txn.result() {
                    return Err(error);
                }
                return Ok(txn);
            }

            let state =
                critical_section::with(|cs| self.state.queue.borrow_ref(cs).state(ticket));
            if state == TicketState::Unknown {
                return Err(TransferError {
                    kind: ErrorKind::Canceled,
                    bytes_completed: 0,
                });
            }

            self.state.done[ticket.index()].wait().await;
        }
    }

    /// Cancels a submitted transaction.
    ///
    /// A queued transaction is withdrawn immediately and its ticket
    /// retires. The active transaction is stopped at the next acknowledge
    /// boundary instead; its waiter then observes
    /// [`ErrorKind::Canceled`] with the progress made so far, unless the
    /// transfer finished first, in which case the finished result stands.
    ///
    /// Returns `false` when the ticket is already finished or retired.
    pub fn cancel(&self, ticket: Ticket) -> bool {
        let withdrawn = critical_section::with(|cs| {
            let mut queue = self.state.queue.borrow_ref_mut(cs);
            if queue.cancel(ticket).is_some() {
                return Some(true);
            }
            if queue.request_abort(ticket) {
                return Some(false);
            }
            None
        });

        match withdrawn {
            Some(true) => {
                // The withdrawn transaction frees its slot right away.
                let _ = self.state.slots.try_send(());
                true
            }
            Some(false) => true,
            None => false,
        }
    }

    /// Current position of a ticket.
    pub fn state(&self, ticket: Ticket) -> TicketState {
        critical_section::with(|cs| self.state.queue.borrow_ref(cs).state(ticket))
    }

    async fn enqueue(&self, txn: Transaction) -> Ticket {
        self.state.slots.receive().await;
        let submitted =
            critical_section::with(|cs| self.state.queue.borrow_ref_mut(cs).submit(txn));
        // A slot token is held, so the queue has room.
        let ticket = submitted.expect("queue full while holding a slot token");
        self.state.kick.signal(());
        ticket
    }
}

/// Owns the peripheral and runs transactions to completion.
pub struct BusRunner<'d, const QUEUE: usize = 4, const EVENTS: usize = 8> {
    bus: PeripheralBus,
    state: &'static BusState<QUEUE, EVENTS>,
    /// Keeps the peripheral clocked and the pins muxed for as long as the
    /// runner lives.
    _driver: I2c<'d, Blocking, Master>,
}

impl<'d, const QUEUE: usize, const EVENTS: usize> BusRunner<'d, QUEUE, EVENTS> {
    /// Claims I2C1, configures it for `config.frequency`, and splits the
    /// bus into a submission handle and the runner that must be spawned.
    ///
    /// The caller still has to route the `I2C1_EV`/`I2C1_ER` interrupts to
    /// [`handle_event_interrupt`] and [`handle_error_interrupt`] and enable
    /// both lines in the NVIC.
    pub fn new<A>(
        peri: Peri<'d, peripherals::I2C1>,
        scl: Peri<'d, impl SclPin<peripherals::I2C1, A>>,
        sda: Peri<'d, impl SdaPin<peripherals::I2C1, A>>,
        state: &'static BusState<QUEUE, EVENTS>,
        config: BusConfig,
    ) -> (BusHandle<QUEUE, EVENTS>, BusRunner<'d, QUEUE, EVENTS>) {
        // The blocking constructor does the heavy lifting: bus clock, pin
        // mux, and CCR/TRISE timing for the requested frequency.
        let mut driver_config = i2c::Config::default();
        driver_config.frequency = Hertz(config.frequency);
        let driver = I2c::new_blocking(peri, scl, sda, driver_config);

        // Interrupt-driven mastering on top of that: errors always fire,
        // event interrupts are gated per primitive by the signaling layer.
        pac::I2C1.cr2().modify(|w| {
            w.set_iterren(true);
            w.set_itbufen(false);
        });

        for _ in 0..QUEUE {
            let _ = state.slots.try_send(());
        }

        let handle = BusHandle {
            state,
            timeout_ms: config.default_timeout_ms,
        };
        let runner = BusRunner {
            bus: PeripheralBus::new(state.dispatcher.read_counter()),
            state,
            _driver: driver,
        };
        (handle, runner)
    }

    /// Transaction pump. Spawn this and let it run forever.
    pub async fn run(mut self) -> ! {
        loop {
            let next =
                critical_section::with(|cs| self.state.queue.borrow_ref_mut(cs).start_next());
            let Some((ticket, txn)) = next else {
                self.state.kick.wait().await;
                continue;
            };
            self.service(ticket, txn).await;
        }
    }

    async fn service(&mut self, ticket: Ticket, txn: Transaction) {
        // Leftovers from a previous transaction, queued events or a
        // latched overflow, would confuse the engine.
        while self.state.dispatcher.try_receive().is_some() {}
        let _ = self.state.dispatcher.take_overflow();

        self.state.dispatcher.expect_read(match txn.direction() {
            Direction::Read => txn.length(),
            Direction::Write => 0,
        });

        defmt::debug!(
            "i2c1: {} {} {} bytes",
            txn.device(),
            txn.direction(),
            txn.length()
        );

        let mut engine = Engine::new(txn);
        let mut armed: Option<(TimerId, Instant)> = None;
        let mut step = engine.begin();

        loop {
            match step {
                Step::Done(result) => {
                    let txn = engine.into_transaction();
                    match result {
                        Ok(count) => {
                            defmt::debug!("i2c1: {} complete, {} bytes", txn.device(), count)
                        }
                        Err(error) => defmt::warn!("i2c1: {} failed: {}", txn.device(), error),
                    }
                    critical_section::with(|cs| {
                        self.state.queue.borrow_ref_mut(cs).finish(ticket, txn)
                    });
                    self.state.done[ticket.index()].signal(());
                    return;
                }
                Step::Act(action) => self.bus.execute(action),
                Step::Wait => {}
            }

            // Mirror the engine's armed timer as a wall-clock deadline. A
            // fresh id restarts the clock; the id is handed back with the
            // expiry so the engine can spot stale timers itself.
            match engine.deadline() {
                Some((id, budget_ms)) => {
                    let current = armed.map(|(armed_id, _)| armed_id);
                    if current != Some(id) {
                        let at = Instant::now() + Duration::from_millis(u64::from(budget_ms));
                        armed = Some((id, at));
                    }
                }
                None => armed = None,
            }

            if critical_section::with(|cs| {
                self.state.queue.borrow_ref_mut(cs).take_abort_request()
            }) {
                engine.request_cancel();
            }

            if self.state.dispatcher.take_overflow() {
                // Events were dropped; the transfer state is unknown.
                defmt::warn!("i2c1: event queue overflow");
                step = engine.handle(BusEvent::BusError(FaultKind::Overrun));
                continue;
            }

            let stimulus = self.next_stimulus(engine.phase(), armed).await;
            step = engine.handle(stimulus);
        }
    }

    /// Waits for whatever moves the engine next: a bus event, the mirrored
    /// timeout, or (while stopping) the peripheral letting go of the stop
    /// bit. Master mode raises no interrupt for a completed stop, so that
    /// last one is a poll.
    async fn next_stimulus(
        &self,
        phase: Phase,
        armed: Option<(TimerId, Instant)>,
    ) -> BusEvent {
        let deadline = async {
            match armed {
                Some((id, at)) => {
                    Timer::at(at).await;
                    BusEvent::TimerExpired(id)
                }
                None => pending::<BusEvent>().await,
            }
        };

        if matches!(phase, Phase::Stopping | Phase::Aborting) {
            match select3(self.state.dispatcher.receive(), deadline, stop_cleared()).await {
                Either3::First(event) => event,
                Either3::Second(event) => event,
                Either3::Third(event) => event,
            }
        } else {
            match select(self.state.dispatcher.receive(), deadline).await {
                Either::First(event) => event,
                Either::Second(event) => event,
            }
        }
    }
}

/// Resolves once CR1 reports the stop condition has left the wire.
async fn stop_cleared() -> BusEvent {
    loop {
        if !pac::I2C1.cr1().read().stop() {
            return BusEvent::StopAsserted;
        }
        Timer::after(Duration::from_micros(20)).await;
    }
}
