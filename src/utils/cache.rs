use std::cell::OnceCell;

/// A lazily computed value tied to a generation counter.
///
/// Writers call [`Cached::invalidate`] (which needs `&mut`), readers call
/// [`Cached::get_or_compute`] with `&self`. The value is computed at most once
/// per generation, so repeated reads without an intervening write observe the
/// same computation.
#[derive(Debug)]
pub struct Cached<T> {
    generation: u64,
    slot: OnceCell<(u64, T)>,
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Self {
            generation: 0,
            slot: OnceCell::new(),
        }
    }
}

impl<T: Clone> Clone for Cached<T> {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            slot: self.slot.clone(),
        }
    }
}

impl<T> Cached<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation; bumped by every invalidation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Generation the cached value was computed for, if any.
    pub fn computed_generation(&self) -> Option<u64> {
        self.slot.get().map(|(generation, _)| *generation)
    }

    pub fn is_dirty(&self) -> bool {
        self.computed_generation() != Some(self.generation)
    }

    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.slot.take();
    }

    pub fn get(&self) -> Option<&T> {
        match self.slot.get() {
            Some((generation, value)) if *generation == self.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_or_compute(&self, compute: impl FnOnce() -> T) -> &T {
        &self.slot.get_or_init(|| (self.generation, compute())).1
    }
}
