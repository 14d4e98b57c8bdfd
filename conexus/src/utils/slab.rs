/// A key handed out by [`Slab::insert`].
///
/// The key carries the generation of the slot at insertion time, so a key
/// kept around after its value was removed never resolves to a value that
/// later reuses the same slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Key {
    index: u32,
    generation: u32,
}

impl Key {
    /// Packs the key into a `u64`, e.g. for use as a poller token.
    pub(crate) fn to_u64(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Inverse of [`to_u64`](Self::to_u64).
    pub(crate) fn from_u64(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

enum Entry<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

/// A slab allocator with generation-checked keys.
///
/// A `Slab` stores values of type `T` in a contiguous array and returns
/// small keys that stay stable until the value is removed. Freed slots
/// are reused; each reuse bumps the slot generation so stale keys miss.
pub(crate) struct Slab<T> {
    /// Slot storage.
    entries: Vec<Entry<T>>,
    /// Stack of vacant slot indices.
    free: Vec<usize>,
    /// Number of occupied slots.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates a new `Slab` with room for `size` values before growing.
    pub(crate) fn new(size: usize) -> Self {
        Self {
            entries: Vec::with_capacity(size),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Inserts a value into the slab and returns its key.
    pub(crate) fn insert(&mut self, value: T) -> Key {
        self.insert_with(|_| value).0
    }

    /// Inserts the value built by `f`, which receives the key the value
    /// will be stored under, and returns the key with the stored value.
    pub(crate) fn insert_with(&mut self, f: impl FnOnce(Key) -> T) -> (Key, &T) {
        let (index, generation) = match self.free.pop() {
            Some(index) => match self.entries[index] {
                Entry::Vacant { generation } => (index, generation.wrapping_add(1)),
                Entry::Occupied { .. } => unreachable!("free list points at an occupied slot"),
            },
            None => {
                self.entries.push(Entry::Vacant { generation: 0 });
                (self.entries.len() - 1, 0)
            }
        };

        let key = Key {
            index: index as u32,
            generation,
        };

        self.entries[index] = Entry::Occupied {
            generation,
            value: f(key),
        };
        self.len += 1;

        match &self.entries[index] {
            Entry::Occupied { value, .. } => (key, value),
            Entry::Vacant { .. } => unreachable!("slot was just filled"),
        }
    }

    /// Removes and returns the value stored under `key`.
    ///
    /// Returns `None` if the key is stale or was never issued.
    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        let index = key.index as usize;

        match self.entries.get(index) {
            Some(Entry::Occupied { generation, .. }) if *generation == key.generation => {}
            _ => return None,
        }

        let entry = std::mem::replace(
            &mut self.entries[index],
            Entry::Vacant {
                generation: key.generation,
            },
        );

        self.free.push(index);
        self.len -= 1;

        match entry {
            Entry::Occupied { value, .. } => Some(value),
            Entry::Vacant { .. } => None,
        }
    }

    /// Returns a reference to the value stored under `key`.
    pub(crate) fn get(&self, key: Key) -> Option<&T> {
        match self.entries.get(key.index as usize) {
            Some(Entry::Occupied { generation, value }) if *generation == key.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Returns a mutable reference to the value stored under `key`.
    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        match self.entries.get_mut(key.index as usize) {
            Some(Entry::Occupied { generation, value }) if *generation == key.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Number of live values.
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}
