//! End-to-end transfers against a scripted device.
//!
//! The harness plays the chip crate's role: it executes every action the
//! engine emits, records the wire-level sequence, and produces the events a
//! device on a healthy (or deliberately broken) wire would send back. The
//! recorded action log is the exact byte traffic a bus analyzer would see.

use std::collections::VecDeque;

use twine_core::{
    DeviceAddress, Engine, ErrorKind, RegisterAddress, Step, Transaction,
    TransferError, TransferResult,
};
use twine_hal::{AckPolicy, BusAction, BusEvent};

const TIMEOUT_MS: u32 = 25;

/// Scripted peer: how the wire behaves for one transaction.
struct Device {
    /// Acknowledge the write-direction address byte.
    ack_write_address: bool,
    /// Acknowledge the read-direction address byte.
    ack_read_address: bool,
    /// Per transmitted non-address byte, front to back; exhausted entries
    /// acknowledge. Sub-address bytes count, they are data on the wire.
    data_acks: VecDeque<bool>,
    /// Bytes the device returns during the read phase.
    read_data: VecDeque<u8>,
    /// Whether start/stop conditions take effect. A held-low wire does
    /// not produce either.
    start_works: bool,
    stop_works: bool,
}

impl Device {
    fn well_behaved() -> Self {
        Self {
            ack_write_address: true,
            ack_read_address: true,
            data_acks: VecDeque::new(),
            read_data: VecDeque::new(),
            start_works: true,
            stop_works: true,
        }
    }

    fn with_read_data(data: &[u8]) -> Self {
        Self {
            read_data: data.iter().copied().collect(),
            ..Self::well_behaved()
        }
    }

    fn absent() -> Self {
        Self {
            ack_write_address: false,
            ack_read_address: false,
            ..Self::well_behaved()
        }
    }

    fn nacking_data_byte(acked_before_nack: usize) -> Self {
        let mut data_acks: VecDeque<bool> = VecDeque::new();
        // The sub-address byte is acknowledged like any other.
        for _ in 0..=acked_before_nack {
            data_acks.push_back(true);
        }
        data_acks.push_back(false);
        Self {
            data_acks,
            ..Self::well_behaved()
        }
    }
}

/// Drives an [`Engine`] against a [`Device`], recording every action.
struct Harness {
    device: Device,
    actions: Vec<BusAction>,
    pending: VecDeque<BusEvent>,
    /// The next transmitted byte follows a start condition.
    address_next: bool,
    /// Deliver every read byte as soon as the first receive is issued, the
    /// way a double-buffered controller runs ahead of the engine.
    pipelined_reads: bool,
}

impl Harness {
    fn new(device: Device) -> Self {
        Self {
            device,
            actions: Vec::new(),
            pending: VecDeque::new(),
            address_next: false,
            pipelined_reads: false,
        }
    }

    fn pipelined_reads(mut self) -> Self {
        self.pipelined_reads = true;
        self
    }

    fn run(mut self, mut engine: Engine) -> (TransferResult, Vec<BusAction>, Transaction) {
        let mut step = engine.begin();
        loop {
            match step {
                Step::Done(result) => {
                    return (result, self.actions, engine.into_transaction());
                }
                Step::Act(action) => {
                    self.execute(action);
                    step = self.feed(&mut engine);
                }
                Step::Wait => {
                    step = self.feed(&mut engine);
                }
            }
        }
    }

    /// Hands the next event to the engine; a quiet wire delivers the armed
    /// timer expiry instead, exactly like the chip crate's driver loop.
    fn feed(&mut self, engine: &mut Engine) -> Step {
        if let Some(event) = self.pending.pop_front() {
            return engine.handle(event);
        }
        let (id, _) = engine
            .deadline()
            .expect("engine stalled with no events and no armed timer");
        engine.handle(BusEvent::TimerExpired(id))
    }

    fn execute(&mut self, action: BusAction) {
        self.actions.push(action);
        match action {
            BusAction::AssertStart => {
                self.address_next = true;
                if self.device.start_works {
                    self.pending.push_back(BusEvent::StartAsserted);
                }
            }
            BusAction::AssertStop => {
                if self.device.stop_works {
                    self.pending.push_back(BusEvent::StopAsserted);
                }
            }
            BusAction::SendByte(byte) => {
                let (sent, acked) = if self.address_next {
                    self.address_next = false;
                    let acked = if byte & 1 == 1 {
                        self.device.ack_read_address
                    } else {
                        self.device.ack_write_address
                    };
                    (BusEvent::AddressByteSent, acked)
                } else {
                    let acked = self.device.data_acks.pop_front().unwrap_or(true);
                    (BusEvent::DataByteSent, acked)
                };
                self.pending.push_back(sent);
                self.pending.push_back(if acked {
                    BusEvent::AckObserved
                } else {
                    BusEvent::NackObserved
                });
            }
            BusAction::ReceiveByte(_) => {
                if self.pipelined_reads {
                    // Later receive requests find the script exhausted and
                    // produce nothing; the flood already covers them.
                    while let Some(byte) = self.device.read_data.pop_front() {
                        self.pending.push_back(BusEvent::DataByteReceived(byte));
                    }
                } else {
                    let byte = self.device.read_data.pop_front().unwrap_or(0xFF);
                    self.pending.push_back(BusEvent::DataByteReceived(byte));
                }
            }
        }
    }
}

fn write_txn(data: &[u8]) -> Transaction {
    Transaction::write(
        DeviceAddress::new(0x5C).unwrap(),
        RegisterAddress::Byte(0x10),
        data,
        TIMEOUT_MS,
    )
    .unwrap()
}

fn read_txn(length: usize) -> Transaction {
    Transaction::read(
        DeviceAddress::new(0x5C).unwrap(),
        RegisterAddress::Byte(0x10),
        length,
        TIMEOUT_MS,
    )
    .unwrap()
}

#[test]
fn test_register_write_wire_sequence() {
    let (result, actions, _) =
        Harness::new(Device::well_behaved()).run(Engine::new(write_txn(&[0x23])));

    assert_eq!(result, Ok(1));
    assert_eq!(
        actions,
        vec![
            BusAction::AssertStart,
            BusAction::SendByte(0xB8),
            BusAction::SendByte(0x10),
            BusAction::SendByte(0x23),
            BusAction::AssertStop,
        ]
    );
}

#[test]
fn test_register_read_wire_sequence() {
    let (result, actions, txn) =
        Harness::new(Device::with_read_data(&[0xAB])).run(Engine::new(read_txn(1)));

    assert_eq!(result, Ok(1));
    assert_eq!(txn.data(), &[0xAB]);
    assert_eq!(
        actions,
        vec![
            BusAction::AssertStart,
            BusAction::SendByte(0xB8),
            BusAction::SendByte(0x10),
            BusAction::AssertStart,
            BusAction::SendByte(0xB9),
            BusAction::ReceiveByte(AckPolicy::Nack),
            BusAction::AssertStop,
        ]
    );
}

#[test]
fn test_pipelined_read_delivery_completes() {
    // Controllers that pace reception in hardware push received bytes
    // ahead of the engine's next receive request; arrival order still
    // rules and the payload lands intact.
    let (result, actions, txn) = Harness::new(Device::with_read_data(&[0x11, 0x22, 0x33]))
        .pipelined_reads()
        .run(Engine::new(read_txn(3)));

    assert_eq!(result, Ok(3));
    assert_eq!(txn.data(), &[0x11, 0x22, 0x33]);
    // The engine still requested every byte with its ack policy.
    assert_eq!(
        actions[5..],
        [
            BusAction::ReceiveByte(AckPolicy::Ack),
            BusAction::ReceiveByte(AckPolicy::Ack),
            BusAction::ReceiveByte(AckPolicy::Nack),
            BusAction::AssertStop,
        ]
    );
}

#[test]
fn test_absent_device_reports_address_nack_and_still_stops() {
    let (result, actions, _) =
        Harness::new(Device::absent()).run(Engine::new(write_txn(&[0x23])));

    assert_eq!(
        result,
        Err(TransferError {
            kind: ErrorKind::AddressNack,
            bytes_completed: 0,
        })
    );
    assert_eq!(
        actions,
        vec![
            BusAction::AssertStart,
            BusAction::SendByte(0xB8),
            BusAction::AssertStop,
        ]
    );
}

#[test]
fn test_nack_on_first_data_byte_reports_zero_completed() {
    let device = Device::nacking_data_byte(0);
    let (result, actions, _) =
        Harness::new(device).run(Engine::new(write_txn(&[0x23, 0x24, 0x25])));

    assert_eq!(
        result,
        Err(TransferError {
            kind: ErrorKind::DataNack,
            bytes_completed: 0,
        })
    );
    // The remaining payload never touches the wire.
    assert_eq!(
        actions,
        vec![
            BusAction::AssertStart,
            BusAction::SendByte(0xB8),
            BusAction::SendByte(0x10),
            BusAction::SendByte(0x23),
            BusAction::AssertStop,
        ]
    );
}

#[test]
fn test_nack_mid_payload_reports_partial_progress() {
    let device = Device::nacking_data_byte(2);
    let (result, _, _) =
        Harness::new(device).run(Engine::new(write_txn(&[0x23, 0x24, 0x25])));

    assert_eq!(
        result,
        Err(TransferError {
            kind: ErrorKind::DataNack,
            bytes_completed: 2,
        })
    );
}

#[test]
fn test_sub_address_nack_sends_no_payload() {
    let mut device = Device::well_behaved();
    device.data_acks.push_back(false);
    let (result, actions, _) =
        Harness::new(device).run(Engine::new(write_txn(&[0x23])));

    assert_eq!(
        result,
        Err(TransferError {
            kind: ErrorKind::SubAddressNack,
            bytes_completed: 0,
        })
    );
    assert_eq!(
        actions,
        vec![
            BusAction::AssertStart,
            BusAction::SendByte(0xB8),
            BusAction::SendByte(0x10),
            BusAction::AssertStop,
        ]
    );
}

#[test]
fn test_word_register_write_wire_sequence() {
    let txn = Transaction::write(
        DeviceAddress::new(0x5C).unwrap(),
        RegisterAddress::Word(0x0102),
        &[0x23],
        TIMEOUT_MS,
    )
    .unwrap();
    let (result, actions, _) = Harness::new(Device::well_behaved()).run(Engine::new(txn));

    assert_eq!(result, Ok(1));
    assert_eq!(
        actions,
        vec![
            BusAction::AssertStart,
            BusAction::SendByte(0xB8),
            BusAction::SendByte(0x01),
            BusAction::SendByte(0x02),
            BusAction::SendByte(0x23),
            BusAction::AssertStop,
        ]
    );
}

#[test]
fn test_dead_wire_times_out_and_releases_the_bus() {
    let mut device = Device::well_behaved();
    device.start_works = false;
    let (result, actions, _) = Harness::new(device).run(Engine::new(write_txn(&[0x23])));

    assert_eq!(
        result,
        Err(TransferError {
            kind: ErrorKind::BusTimeout,
            bytes_completed: 0,
        })
    );
    assert_eq!(
        actions,
        vec![BusAction::AssertStart, BusAction::AssertStop]
    );
}

#[test]
fn test_failed_stop_keeps_the_original_error() {
    let mut device = Device::absent();
    device.stop_works = false;
    let (result, actions, _) = Harness::new(device).run(Engine::new(write_txn(&[0x23])));

    // The address nack is reported, not the stop that never confirmed.
    assert_eq!(
        result,
        Err(TransferError {
            kind: ErrorKind::AddressNack,
            bytes_completed: 0,
        })
    );
    assert_eq!(actions.last(), Some(&BusAction::AssertStop));
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn sent_bytes(actions: &[BusAction]) -> Vec<u8> {
        actions
            .iter()
            .filter_map(|action| match action {
                BusAction::SendByte(byte) => Some(*byte),
                _ => None,
            })
            .collect()
    }

    proptest! {
        #[test]
        fn write_frames_every_payload_exactly_once(
            data in proptest::collection::vec(any::<u8>(), 1..=32)
        ) {
            let (result, actions, _) = Harness::new(Device::well_behaved())
                .run(Engine::new(write_txn(&data)));

            prop_assert_eq!(result, Ok(data.len()));
            prop_assert_eq!(actions.first(), Some(&BusAction::AssertStart));
            prop_assert_eq!(actions.last(), Some(&BusAction::AssertStop));

            // Address byte, sub-address byte, then the payload in order.
            let sent = sent_bytes(&actions);
            prop_assert_eq!(sent.len(), data.len() + 2);
            prop_assert_eq!(sent[0], 0xB8);
            prop_assert_eq!(sent[1], 0x10);
            prop_assert_eq!(&sent[2..], &data[..]);
        }

        #[test]
        fn read_acks_every_byte_but_the_final_one(length in 1usize..=32) {
            let payload: Vec<u8> = (0..length as u8).collect();
            let (result, actions, txn) = Harness::new(Device::with_read_data(&payload))
                .run(Engine::new(read_txn(length)));

            prop_assert_eq!(result, Ok(length));
            prop_assert_eq!(txn.data(), &payload[..]);

            let policies: Vec<AckPolicy> = actions
                .iter()
                .filter_map(|action| match action {
                    BusAction::ReceiveByte(policy) => Some(*policy),
                    _ => None,
                })
                .collect();
            prop_assert_eq!(policies.len(), length);
            prop_assert!(policies[..length - 1]
                .iter()
                .all(|policy| *policy == AckPolicy::Ack));
            prop_assert_eq!(policies[length - 1], AckPolicy::Nack);
        }
    }
}
