/// The plugin seam: user code supplies a `UserBreakpoint` instead of
/// subclassing the original's `break_point` base class. The engine owns a
/// registry mapping MI breakpoint numbers back to the trait object that
/// requested them.
use async_trait::async_trait;

use crate::error::EngineError;
use crate::frame::Frame;
use crate::locator::Locator;

/// A user-supplied breakpoint: where to set it, and what to do when the
/// debugger stops there.
#[async_trait]
pub trait UserBreakpoint: Send + Sync {
    /// Where to install this breakpoint.
    fn location(&self) -> Locator;

    /// Extra `-break-insert` flags (e.g. `-t` for temporary), space
    /// separated, or empty for none.
    fn flags(&self) -> &str {
        ""
    }

    /// Called once the breakpoint has been installed at a single location
    /// with the MI-assigned number.
    async fn on_set(&self, _number: u64) {}

    /// Called instead of `on_set` when the location resolved to more than
    /// one address (e.g. an inlined or overloaded function); every number
    /// in `numbers` maps back to this same breakpoint.
    async fn on_set_multiple(&self, numbers: &[u64]) {
        for n in numbers {
            self.on_set(*n).await;
        }
    }

    /// Called when GDB accepted the insert as pending because the location
    /// doesn't resolve yet (the target's shared libraries haven't loaded).
    async fn on_not_found(&self) {}

    /// Called when the debugger stops at this breakpoint, with a frame
    /// bound to the stopped thread's innermost frame.
    async fn invoke(&self, frame: &Frame<'_>, file: Option<&str>, line: Option<u64>) -> Result<(), EngineError>;
}

/// Maps MI breakpoint numbers back to the `UserBreakpoint` that requested
/// them. A single logical breakpoint can own more than one number (the
/// "all-of" rule: every number GDB assigns for one `-break-insert` call
/// maps back to that same trait object), so lookup is by number but
/// registration is by slot.
#[derive(Default)]
pub struct BreakpointRegistry {
    slots: Vec<std::sync::Arc<dyn UserBreakpoint>>,
    numbers: std::collections::HashMap<u64, usize>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `bp` in a fresh slot, to be bound to one or more numbers
    /// once the insert completes.
    pub fn add(&mut self, bp: std::sync::Arc<dyn UserBreakpoint>) -> usize {
        self.slots.push(bp);
        self.slots.len() - 1
    }

    /// Binds `numbers` to the breakpoint previously registered at `slot`.
    pub fn bind(&mut self, slot: usize, numbers: &[u64]) {
        for &n in numbers {
            self.numbers.insert(n, slot);
        }
    }

    pub fn get(&self, slot: usize) -> Option<&std::sync::Arc<dyn UserBreakpoint>> {
        self.slots.get(slot)
    }

    pub fn by_number(&self, number: u64) -> Option<&std::sync::Arc<dyn UserBreakpoint>> {
        self.numbers.get(&number).and_then(|&slot| self.slots.get(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingBreakpoint {
        hits: AtomicUsize,
    }

    #[async_trait]
    impl UserBreakpoint for CountingBreakpoint {
        fn location(&self) -> Locator {
            Locator::Raw("main".into())
        }

        async fn invoke(&self, _frame: &Frame<'_>, _file: Option<&str>, _line: Option<u64>) -> Result<(), EngineError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn all_numbers_from_one_insert_map_to_the_same_slot() {
        let mut registry = BreakpointRegistry::new();
        let bp = Arc::new(CountingBreakpoint { hits: AtomicUsize::new(0) });
        let slot = registry.add(bp.clone());
        registry.bind(slot, &[3, 4, 5]);

        for n in [3, 4, 5] {
            let found = registry.by_number(n).expect("number should resolve");
            assert!(Arc::ptr_eq(found, &(bp.clone() as Arc<dyn UserBreakpoint>)));
        }
        assert!(registry.by_number(6).is_none());
    }
}
