//! Link Binding Table
//!
//! OpenTherm transceivers are driven from a pin-change interrupt, and the
//! interrupt controller only takes a bare `fn()` as a handler. There is no
//! room for a closure or a `self` pointer, so every physical link needs its
//! own, statically distinct, function.
//!
//! A [LinkTable] is a fixed arena of `N` slots. Binding a link claims the
//! first free slot, stores the link's [EdgeSampler] there, and hands back a
//! [Binding] holding the slot index and the slot's [LinkPort]. Interrupt
//! handlers then dispatch by index with [LinkTable::on_interrupt()].
//!
//! For the process-wide [LINKS] table, [bind_link()] also hands out the bare
//! interrupt thunk for the slot, which is a monomorphized `fn()` per index.
//!
//! Slots are never released: links live for the whole process.

use core::{
    cell::Cell,
    sync::atomic::{AtomicBool, Ordering},
};

use embassy_sync::{
    blocking_mutex::{raw::CriticalSectionRawMutex, Mutex},
    signal::Signal,
};
use futures::FutureExt;
use grounded::const_init::ConstInit;

use crate::frame::Frame;

/// The number of links that can have their interrupts dispatched
pub const MAX_LINKS: usize = 2;

/// The interrupt-context half of a transceiver
///
/// `on_edge` is called from the pin-change interrupt of the bound link. It
/// advances the bit sampling state machine, and once a complete frame has been
/// received, reports it with [LinkPort::frame_received()].
///
/// Implementations MUST NOT block, allocate, or log.
pub trait EdgeSampler: Sync {
    /// Handle one line edge
    fn on_edge(&self, port: &LinkPort);
}

/// The arrival side of a bound link
///
/// This is the only state shared between the interrupt context and the main
/// context for a link: the most recently completed frame, and whether it has
/// been picked up yet.
pub struct LinkPort {
    arrival: Signal<CriticalSectionRawMutex, Frame>,
}

impl LinkPort {
    /// Create a new, empty port
    pub const fn new() -> Self {
        Self {
            arrival: Signal::new(),
        }
    }

    /// Report a completely received frame
    ///
    /// Safe to call from interrupt context. An unclaimed earlier frame is
    /// overwritten.
    pub fn frame_received(&self, frame: Frame) {
        self.arrival.signal(frame);
    }

    /// Wait for the next frame to arrive
    pub(crate) async fn wait(&self) -> Frame {
        self.arrival.wait().await
    }

    /// Take an already arrived frame, if any, without waiting
    pub(crate) fn try_take(&self) -> Option<Frame> {
        self.arrival.wait().now_or_never()
    }

    /// Forget any frame that arrived but was not picked up
    pub(crate) fn reset(&self) {
        self.arrival.reset();
    }
}

impl Default for LinkPort {
    fn default() -> Self {
        Self::new()
    }
}

struct LinkSlot {
    taken: AtomicBool,
    sampler: Mutex<CriticalSectionRawMutex, Cell<Option<&'static dyn EdgeSampler>>>,
    port: LinkPort,
}

impl ConstInit for LinkSlot {
    #[allow(clippy::declare_interior_mutable_const)]
    const VAL: Self = LinkSlot {
        taken: AtomicBool::new(false),
        sampler: Mutex::new(Cell::new(None)),
        port: LinkPort::new(),
    };
}

/// An error when binding a link
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[non_exhaustive]
pub enum BindError {
    /// All slots are already bound. The link can not be used.
    Exhausted,
}

/// A successfully bound link
///
/// Proof that a link owns a slot. A [Connection][crate::connection::Connection]
/// can only be built from a [Binding].
#[derive(Clone, Copy)]
pub struct Binding {
    index: usize,
    port: &'static LinkPort,
}

impl Binding {
    /// The index of the claimed slot
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The arrival port of the claimed slot
    #[inline]
    pub fn port(&self) -> &'static LinkPort {
        self.port
    }
}

/// A fixed arena of link slots
pub struct LinkTable<const N: usize = MAX_LINKS> {
    slots: [LinkSlot; N],
}

impl<const N: usize> LinkTable<N> {
    /// Create a new table with all slots free
    ///
    /// Intended to be used to create a static.
    pub const fn new() -> Self {
        Self {
            slots: [LinkSlot::VAL; N],
        }
    }

    /// Claim the first free slot for `sampler`
    ///
    /// Fails with [BindError::Exhausted] once all `N` slots are taken. The
    /// failure is logged here, callers should not retry.
    pub fn bind(&'static self, sampler: &'static dyn EdgeSampler) -> Result<Binding, BindError> {
        let claimed = critical_section::with(|cs| {
            let (index, slot) = self
                .slots
                .iter()
                .enumerate()
                .find(|(_i, s)| !s.taken.load(Ordering::Acquire))?;
            slot.taken.store(true, Ordering::Release);
            slot.sampler.borrow(cs).set(Some(sampler));
            Some(index)
        });

        match claimed {
            Some(index) => {
                ot_info!("Bound link to slot {=usize}", index);
                Ok(Binding {
                    index,
                    port: &self.slots[index].port,
                })
            }
            None => {
                ot_error!("No free link slot, all {=usize} are bound", N);
                Err(BindError::Exhausted)
            }
        }
    }

    /// Dispatch a pin-change interrupt to the link bound at `index`
    ///
    /// Does nothing for unbound or out-of-range slots.
    #[inline]
    pub fn on_interrupt(&self, index: usize) {
        let Some(slot) = self.slots.get(index) else {
            return;
        };
        if let Some(sampler) = slot.sampler.lock(|s| s.get()) {
            sampler.on_edge(&slot.port);
        }
    }

    /// The number of bound slots
    pub fn bound(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.taken.load(Ordering::Acquire))
            .count()
    }
}

impl<const N: usize> Default for LinkTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide link table
pub static LINKS: LinkTable = LinkTable::new();

fn link_interrupt<const I: usize>() {
    LINKS.on_interrupt(I);
}

const INTERRUPTS: [fn(); MAX_LINKS] = [link_interrupt::<0>, link_interrupt::<1>];

/// A link bound in the process-wide [LINKS] table
#[derive(Clone, Copy)]
pub struct StaticBinding {
    /// The handler to install for the link's input pin interrupt
    pub interrupt: fn(),
    /// The slot binding
    pub binding: Binding,
}

/// Bind a link in the process-wide [LINKS] table
///
/// On success, `interrupt` must be installed as the pin-change handler for
/// the link's input pin.
pub fn bind_link(sampler: &'static dyn EdgeSampler) -> Result<StaticBinding, BindError> {
    let binding = LINKS.bind(sampler)?;
    Ok(StaticBinding {
        interrupt: INTERRUPTS[binding.index],
        binding,
    })
}
