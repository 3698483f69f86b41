//! Interrupt-safe locking for ring state.
//!
//! Ring cursors are touched from the interrupt handler and from normal
//! context on other CPUs. Every lock here disables local interrupts while
//! held, so the interrupt path can never spin on a lock its own CPU holds.
//!
//! # Design Notes
//!
//! Interrupt masking is only real on bare-metal x86_64. Hosted builds
//! (tests, tools) get the spinlock without the masking.

use core::ops::{Deref, DerefMut};

use log::warn;
use spin::{Mutex, MutexGuard};

// ═══════════════════════════════════════════════════════════════════════════
// INTERRUPT CONTROL
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod irq {
    /// Check whether interrupts are enabled (IF flag).
    #[inline]
    pub fn enabled() -> bool {
        let rflags: u64;
        unsafe { core::arch::asm!("pushfq; pop {}", out(reg) rflags, options(nomem, preserves_flags)) };
        rflags & (1 << 9) != 0
    }

    #[inline]
    pub fn disable() {
        unsafe { core::arch::asm!("cli", options(nomem, nostack)) };
    }

    #[inline]
    pub fn enable() {
        unsafe { core::arch::asm!("sti", options(nomem, nostack)) };
    }
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
mod irq {
    #[inline]
    pub fn enabled() -> bool {
        false
    }

    #[inline]
    pub fn disable() {}

    #[inline]
    pub fn enable() {}
}

/// Restores the saved interrupt state on drop.
struct IrqRestore {
    were_enabled: bool,
}

impl IrqRestore {
    fn save() -> Self {
        let were_enabled = irq::enabled();
        irq::disable();
        Self { were_enabled }
    }
}

impl Drop for IrqRestore {
    fn drop(&mut self) {
        if self.were_enabled {
            irq::enable();
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// IRQ LOCK
// ═══════════════════════════════════════════════════════════════════════════

/// Spinlock that keeps local interrupts off while held.
pub struct IrqLock<T> {
    name: &'static str,
    inner: Mutex<T>,
}

impl<T> IrqLock<T> {
    /// Create a new lock; `name` shows up in diagnostics.
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            name,
            inner: Mutex::new(data),
        }
    }

    /// Acquire the lock, returns a guard that releases on drop.
    pub fn lock(&self) -> IrqGuard<'_, T> {
        let restore = IrqRestore::save();
        IrqGuard {
            guard: self.inner.lock(),
            _restore: restore,
        }
    }

    /// Try to acquire the lock without spinning.
    pub fn try_lock(&self) -> Option<IrqGuard<'_, T>> {
        let restore = IrqRestore::save();
        // On failure `restore` drops here and interrupts come back.
        self.inner.try_lock().map(|guard| IrqGuard {
            guard,
            _restore: restore,
        })
    }

    /// Check if the lock is currently held (by anyone).
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// Lock name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Flag mutation of lock-protected data without the lock.
    ///
    /// Panics in debug builds, logs a warning otherwise. Only proves that
    /// somebody holds the lock, not that the caller does.
    #[track_caller]
    pub fn assert_held(&self, what: &str) {
        if !self.is_locked() {
            warn!("wlan-dma: {} touched without {} held", what, self.name);
            debug_assert!(false, "{} touched without {} held", what, self.name);
        }
    }

    /// Mutable access through exclusive ownership, no locking needed.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

/// Guard returned by [`IrqLock::lock`].
///
/// Field order matters: the spinlock is released before interrupts are
/// restored.
pub struct IrqGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    _restore: IrqRestore,
}

impl<T> Deref for IrqGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for IrqGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_roundtrip() {
        let lock = IrqLock::new("test_lock", 5u32);
        {
            let mut guard = lock.lock();
            *guard += 1;
            assert!(lock.is_locked());
            assert!(lock.try_lock().is_none());
        }
        assert!(!lock.is_locked());
        assert_eq!(*lock.lock(), 6);
    }

    #[test]
    fn test_assert_held_passes_under_lock() {
        let lock = IrqLock::new("test_lock", ());
        let _guard = lock.lock();
        lock.assert_held("test data");
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn test_assert_held_panics_without_lock() {
        let lock = IrqLock::new("test_lock", ());
        lock.assert_held("test data");
    }
}
