use gpubridge_abi::{Handle, NULL_HANDLE};

/// Append-only slot table mapping opaque u32 handles to values.
/// The guest holds these handles and passes them back through its imports.
///
/// Slot 0 is a permanent empty sentinel, so handle 0 never resolves. Handles
/// are handed out in order and a released slot stays empty for the lifetime
/// of the table; a stale handle can never alias a newer object.
pub struct Registry<T> {
    slots: Vec<Option<T>>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self { slots: vec![None] }
    }

    /// Insert an item and return its handle.
    ///
    /// Returns [`NULL_HANDLE`] (dropping the item) only once the u32 handle
    /// space is exhausted.
    pub fn insert(&mut self, item: T) -> Handle {
        match Handle::try_from(self.slots.len()) {
            Ok(handle) if handle != NULL_HANDLE => {
                self.slots.push(Some(item));
                handle
            }
            _ => {
                log::error!("handle space exhausted after {} slots", self.slots.len());
                NULL_HANDLE
            }
        }
    }

    /// Get an immutable reference by handle.
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slots.get(handle as usize).and_then(Option::as_ref)
    }

    /// Get a mutable reference by handle.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots.get_mut(handle as usize).and_then(Option::as_mut)
    }

    /// Release the slot and return the item it held.
    pub fn take(&mut self, handle: Handle) -> Option<T> {
        self.slots.get_mut(handle as usize).and_then(Option::take)
    }

    /// Release the slot, running the item's destructor. Releasing an empty or
    /// unknown handle is a no-op. Returns whether anything was released.
    pub fn release(&mut self, handle: Handle) -> bool {
        self.take(handle).is_some()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Iterate over live items in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|item| (index as Handle, item)))
    }

    /// Handles of live items matching `predicate`, in handle order.
    pub fn handles_where(&self, mut predicate: impl FnMut(&T) -> bool) -> Vec<Handle> {
        self.iter()
            .filter(|(_, item)| predicate(item))
            .map(|(handle, _)| handle)
            .collect()
    }

    /// Number of live items.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Number of handles ever handed out (live or released).
    pub fn allocated(&self) -> usize {
        self.slots.len() - 1
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
