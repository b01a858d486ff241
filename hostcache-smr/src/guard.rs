//! Guard for read-side critical sections.

use crate::slot::ReaderSlots;
use core::fmt;
use core::marker::PhantomData as marker;

/// RAII guard representing an active read-side critical section.
///
/// While a `Guard` is alive, no item retired after the guard was created can
/// be handed to a reclaimer. Guards are cheap to create, may nest freely, and
/// never block.
///
/// A guard is tied to the thread's reader stripe and is therefore `!Send`.
pub struct Guard<'d> {
    slots: &'d ReaderSlots,
    stripe: usize,
    parity: usize,
    marker: marker<*mut ()>,
}

impl<'d> Guard<'d> {
    #[inline]
    pub(crate) fn new(slots: &'d ReaderSlots, stripe: usize, parity: usize) -> Self {
        Self {
            slots,
            stripe,
            parity,
            marker,
        }
    }
}

impl Drop for Guard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.slots.leave(self.stripe, self.parity);
    }
}

impl fmt::Debug for Guard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("stripe", &self.stripe)
            .field("parity", &self.parity)
            .finish()
    }
}
