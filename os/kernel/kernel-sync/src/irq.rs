use crate::{Mutex, MutexGuard, RawLock, RawUnlock};
use core::ops::{Deref, DerefMut};

/// Guard returned by [`Mutex::lock_irq`]: the lock plus masked interrupts.
///
/// Interrupts are masked before the lock is taken, so an interrupt handler on
/// this core can never spin on a lock its own interrupted context holds.
/// Dropping the guard unlocks first and then restores the interrupt flag to
/// whatever it was before.
///
/// ```no_run
/// use kernel_sync::SpinMutex;
///
/// static FREE_PAGES: SpinMutex<u64> = SpinMutex::new(0);
///
/// let mut pages = FREE_PAGES.lock_irq();
/// *pages += 1;
/// assert!(!kernel_sync::irq::interrupts_enabled());
/// drop(pages);
/// assert!(kernel_sync::irq::interrupts_enabled());
/// ```
pub struct IrqMutex<'a, T, R: RawLock + RawUnlock> {
    // Field order matters: the lock is released before interrupts are restored.
    g: MutexGuard<'a, T, R>,
    _irq: IrqGuard,
}

impl<T, R: RawLock + RawUnlock> Deref for IrqMutex<'_, T, R> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.g
    }
}

impl<T, R: RawLock + RawUnlock> DerefMut for IrqMutex<'_, T, R> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.g
    }
}

impl<T, R: RawLock + RawUnlock> Mutex<T, R> {
    /// Masks interrupts on this core, then takes the lock.
    #[inline]
    pub fn lock_irq(&self) -> IrqMutex<'_, T, R> {
        let ig = IrqGuard::new();
        let g = self.lock();
        IrqMutex { g, _irq: ig }
    }
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// `IrqGuard::new()` snapshots the interrupt flag. If interrupts were enabled
/// it disables them. On drop, it re-enables them **only** if they were
/// previously enabled, so guards nest correctly.
///
/// ```no_run
/// use kernel_sync::irq::{IrqGuard, interrupts_enabled};
///
/// let before = interrupts_enabled();
/// {
///     let _outer = IrqGuard::new();
///     {
///         let _inner = IrqGuard::new();
///     }
///     assert!(!interrupts_enabled()); // inner drop did not re-enable
/// }
/// assert_eq!(interrupts_enabled(), before);
/// ```
pub struct IrqGuard {
    /// Whether interrupts were enabled when the guard was created.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    /// Disables interrupts if they are currently enabled and remembers the state.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = interrupts_enabled();
        if enabled {
            disable_interrupts();
        }
        Self {
            were_enabled: enabled,
        }
    }
}

impl Drop for IrqGuard {
    /// Restores interrupts only if they were previously enabled.
    fn drop(&mut self) {
        if self.were_enabled {
            enable_interrupts();
        }
    }
}

pub use backend::{disable_interrupts, enable_interrupts, interrupts_enabled};

/// Bare-metal x86-64: the real `IF` flag.
///
/// These operations must run in a context where `cli`/`sti` are legal
/// (ring 0). Calling them from user space faults.
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod backend {
    /// `RFLAGS.IF`.
    const RFLAGS_IF: u64 = 1 << 9;

    /// Returns the current `RFLAGS` value (via `pushfq/pop`).
    #[inline]
    #[must_use]
    pub fn rflags() -> u64 {
        let r: u64;
        unsafe { core::arch::asm!("pushfq; pop {}", out(reg) r, options(nomem, preserves_flags)) }
        r
    }

    #[inline]
    #[must_use]
    pub fn interrupts_enabled() -> bool {
        rflags() & RFLAGS_IF != 0
    }

    /// Disables hardware interrupts (`cli`).
    #[inline]
    pub fn disable_interrupts() {
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    /// Enables hardware interrupts (`sti`).
    #[inline]
    pub fn enable_interrupts() {
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }
}

/// Hosted targets (tests, tooling): a software interrupt flag for a single
/// emulated core. Interrupts start out enabled.
#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
mod backend {
    use core::sync::atomic::{AtomicBool, Ordering};

    static SOFT_IF: AtomicBool = AtomicBool::new(true);

    #[inline]
    #[must_use]
    pub fn interrupts_enabled() -> bool {
        SOFT_IF.load(Ordering::Acquire)
    }

    #[inline]
    pub fn disable_interrupts() {
        SOFT_IF.store(false, Ordering::Release);
    }

    #[inline]
    pub fn enable_interrupts() {
        SOFT_IF.store(true, Ordering::Release);
    }
}
