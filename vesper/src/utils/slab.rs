use std::fmt;

/// Number of generation bits kept in a [`Key`].
///
/// Keeping generations inside this range makes a packed key fit in the
/// 53-bit integer range of an IEEE-754 double, which is how script-visible
/// timer ids are represented. A slot whose generation reaches the maximum
/// is retired rather than wrapped.
const GENERATION_BITS: u32 = 20;
const GENERATION_MASK: u32 = (1 << GENERATION_BITS) - 1;

/// A generation-checked handle into a [`Slab`].
///
/// A key stays valid until the value it points to is removed. Once the slot
/// is reused, the generation differs and lookups with the old key miss
/// instead of aliasing the new occupant.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Key {
    index: u32,
    generation: u32,
}

impl Key {
    /// Packs the key into a single integer.
    ///
    /// The layout is `generation << 32 | index`.
    pub(crate) fn to_bits(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    /// Rebuilds a key from [`to_bits`](Self::to_bits).
    ///
    /// Returns `None` if the upper bits do not form a valid generation.
    pub(crate) fn from_bits(bits: u64) -> Option<Self> {
        let generation = u32::try_from(bits >> 32).ok()?;
        if generation > GENERATION_MASK {
            return None;
        }

        Some(Self {
            index: bits as u32,
            generation,
        })
    }

    /// Converts the key into a poller token.
    pub(crate) fn to_token(self) -> usize {
        self.to_bits() as usize
    }

    /// Converts a poller token back into a key.
    pub(crate) fn from_token(token: usize) -> Option<Self> {
        Self::from_bits(token as u64)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({}v{})", self.index, self.generation)
    }
}

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

/// A slab allocator with generation-checked keys.
///
/// A `Slab` stores values of type `T` in a contiguous array and hands out
/// [`Key`]s that can be used to reach them again in O(1).
///
/// Internally, it keeps track of:
/// - occupied and vacant slots,
/// - a stack of free indices that can be reused,
/// - a generation counter per slot, bumped on every removal.
///
/// The reactor stores connections, listeners, timers and pending blocking
/// jobs in slabs, and uses the packed key as the poller token or the
/// script-visible id.
pub(crate) struct Slab<T> {
    /// Storage for items.
    slots: Vec<Slot<T>>,
    /// Stack of free indices that can be reused.
    free: Vec<usize>,
    /// Number of occupied slots.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates a new `Slab` with room for `capacity` values before it
    /// reallocates.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let slab = Slab::<i32>::with_capacity(16);
    /// ```
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Inserts a value into the slab and returns its key.
    ///
    /// If a free slot is available, it is reused with its current
    /// generation. Otherwise, the slab grows by one slot.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let mut slab = Slab::with_capacity(1);
    /// let key = slab.insert(42);
    /// assert_eq!(slab.get(key), Some(&42));
    /// ```
    pub(crate) fn insert(&mut self, value: T) -> Key {
        self.len += 1;

        if let Some(index) = self.free.pop() {
            if let Slot::Vacant { generation } = self.slots[index] {
                self.slots[index] = Slot::Occupied { generation, value };

                return Key {
                    index: index as u32,
                    generation,
                };
            }
        }

        let index = self.slots.len();
        self.slots.push(Slot::Occupied {
            generation: 0,
            value,
        });

        Key {
            index: index as u32,
            generation: 0,
        }
    }

    /// Removes and returns the value stored under `key`.
    ///
    /// The slot becomes free and its generation is bumped, so `key`
    /// (and any copy of it) misses from now on.
    ///
    /// Returns `None` if the key is stale or was never issued.
    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        let index = key.index as usize;

        match self.slots.get(index) {
            Some(Slot::Occupied { generation, .. }) if *generation == key.generation => {}
            _ => return None,
        }

        let (next, reusable) = vacate(key.generation);
        let Slot::Occupied { value, .. } = std::mem::replace(&mut self.slots[index], next) else {
            return None;
        };

        if reusable {
            self.free.push(index);
        }
        self.len -= 1;

        Some(value)
    }

    /// Returns a shared reference to the value stored under `key`.
    pub(crate) fn get(&self, key: Key) -> Option<&T> {
        match self.slots.get(key.index as usize)? {
            Slot::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    /// Returns a mutable reference to the value stored under `key`.
    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        match self.slots.get_mut(key.index as usize)? {
            Slot::Occupied { generation, value } if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    /// Returns `true` if `key` still points at a live value.
    pub(crate) fn contains(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    /// Number of live values.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes every live value and returns them.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len);

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let generation = match slot {
                Slot::Occupied { generation, .. } => *generation,
                Slot::Vacant { .. } => continue,
            };
            let (next, reusable) = vacate(generation);

            if let Slot::Occupied { value, .. } = std::mem::replace(slot, next) {
                values.push(value);
                if reusable {
                    self.free.push(index);
                }
            }
        }

        self.len = 0;
        values
    }
}

/// The vacant slot left behind by a value of `generation`, and whether it
/// may be handed out again.
///
/// A slot at the last generation is retired for good: reusing it would
/// wrap to generation 0 and let keys from its first life alias again.
fn vacate<T>(generation: u32) -> (Slot<T>, bool) {
    if generation >= GENERATION_MASK {
        (Slot::Vacant { generation }, false)
    } else {
        (
            Slot::Vacant {
                generation: generation + 1,
            },
            true,
        )
    }
}
