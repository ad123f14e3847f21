use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::common::{DbError, PageId, RecordId, Result, SlotId};
use crate::tuple::{Tuple, TupleDesc};

/// Heap page layout:
///
/// ```text
/// +------------------+
/// | Header bitmap    |  ceil(num_slots / 8) bytes
/// +------------------+
/// | [slot 0]         |  tuple_size bytes each
/// | [slot 1]         |
/// | ...              |
/// | [slot n-1]       |
/// +------------------+
/// | Padding (zeros)  |
/// +------------------+
/// ```
///
/// Bit `i % 8` (least significant first) of header byte `i / 8` is set iff slot
/// `i` holds a tuple. Slot `i` starts at `header_size + i * tuple_size`. Bytes of
/// empty slots and the trailing padding are written as zero and ignored on read.
///
/// Each slot costs `tuple_size` bytes plus one header bit, so a page holds
/// `floor(8 * page_size / (8 * tuple_size + 1))` slots.
#[derive(Debug, Clone)]
pub struct HeapPage {
    page_id: PageId,
    desc: Arc<TupleDesc>,
    page_size: usize,
    /// One entry per slot; `Some` iff the slot is occupied
    slots: Vec<Option<Tuple>>,
}

impl HeapPage {
    /// Largest slot count a record id can address.
    pub const MAX_SLOTS: usize = u16::MAX as usize + 1;

    /// Returns the number of slots a page of `page_size` bytes holds for tuples
    /// of `tuple_size` bytes.
    pub fn slots_per_page(page_size: usize, tuple_size: usize) -> usize {
        (page_size * 8) / (tuple_size * 8 + 1)
    }

    /// Returns the header size in bytes for the given slot count.
    pub fn header_size(num_slots: usize) -> usize {
        num_slots.div_ceil(8)
    }

    /// Returns the image of a page with every slot empty.
    pub fn empty_page_data(page_size: usize) -> Bytes {
        Bytes::from(vec![0u8; page_size])
    }

    /// Creates a page with every slot empty.
    pub fn new_empty(page_id: PageId, desc: Arc<TupleDesc>, page_size: usize) -> Self {
        let num_slots = Self::slots_per_page(page_size, desc.size());
        Self {
            page_id,
            desc,
            page_size,
            slots: vec![None; num_slots],
        }
    }

    /// Decodes a page image. The image must be exactly `page_size` bytes.
    pub fn decode(
        page_id: PageId,
        data: &[u8],
        desc: Arc<TupleDesc>,
        page_size: usize,
    ) -> Result<Self> {
        if data.len() != page_size {
            return Err(DbError::CorruptPage {
                page_id,
                reason: format!("expected {} bytes, got {}", page_size, data.len()),
            });
        }

        let tuple_size = desc.size();
        let num_slots = Self::slots_per_page(page_size, tuple_size);
        if num_slots > Self::MAX_SLOTS {
            return Err(DbError::CorruptPage {
                page_id,
                reason: format!("{} slots exceed the addressable {}", num_slots, Self::MAX_SLOTS),
            });
        }
        let header_size = Self::header_size(num_slots);
        let header = &data[..header_size];

        let mut slots = Vec::with_capacity(num_slots);
        for (i, slot_id) in (0..num_slots).zip(0..=u16::MAX) {
            if header[i / 8] & (1 << (i % 8)) == 0 {
                slots.push(None);
                continue;
            }

            let start = header_size + i * tuple_size;
            let mut tuple = Tuple::from_bytes(Arc::clone(&desc), &data[start..start + tuple_size])
                .ok_or_else(|| DbError::CorruptPage {
                    page_id,
                    reason: format!("slot {} does not hold a valid tuple", i),
                })?;
            tuple.set_record_id(Some(RecordId::new(page_id, SlotId::new(slot_id))));
            slots.push(Some(tuple));
        }

        Ok(Self {
            page_id,
            desc,
            page_size,
            slots,
        })
    }

    /// Encodes the page into exactly `page_size` bytes.
    pub fn encode(&self) -> Result<Bytes> {
        let header_size = Self::header_size(self.slots.len());
        let mut buf = BytesMut::with_capacity(self.page_size);

        let mut header = vec![0u8; header_size];
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.is_some() {
                header[i / 8] |= 1 << (i % 8);
            }
        }
        buf.put_slice(&header);

        for slot in &self.slots {
            match slot {
                Some(tuple) => tuple.write_to(&mut buf)?,
                None => buf.put_bytes(0, self.desc.size()),
            }
        }

        buf.put_bytes(0, self.page_size - buf.len());
        Ok(buf.freeze())
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the descriptor of the tuples stored on this page.
    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    /// Returns the total number of slots.
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of empty slots.
    pub fn num_empty_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// Returns true if the given slot holds a tuple.
    pub fn is_slot_used(&self, slot_id: SlotId) -> bool {
        matches!(self.slots.get(slot_id.as_usize()), Some(Some(_)))
    }

    /// Returns the tuple in the given slot.
    pub fn tuple(&self, slot_id: SlotId) -> Option<&Tuple> {
        self.slots.get(slot_id.as_usize()).and_then(|s| s.as_ref())
    }

    /// Stores a tuple in the first empty slot and returns its record id.
    pub fn insert_tuple(&mut self, mut tuple: Tuple) -> Result<RecordId> {
        if **tuple.desc() != *self.desc {
            return Err(DbError::SchemaMismatch {
                expected: self.desc.to_string(),
                actual: tuple.desc().to_string(),
            });
        }

        let slot = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(DbError::PageFull(self.page_id))?;
        // Slots past the addressable range stay unused
        let slot_id = u16::try_from(slot).map_err(|_| DbError::PageFull(self.page_id))?;

        let record_id = RecordId::new(self.page_id, SlotId::new(slot_id));
        tuple.set_record_id(Some(record_id));
        self.slots[slot] = Some(tuple);
        Ok(record_id)
    }

    /// Clears the slot referenced by the tuple's record id.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| DbError::InvalidRecordId("tuple has no record id".into()))?;

        if record_id.page_id != self.page_id {
            return Err(DbError::InvalidRecordId(format!(
                "{} is not on page {}",
                record_id, self.page_id
            )));
        }

        match self.slots.get_mut(record_id.slot_id.as_usize()) {
            Some(slot @ Some(_)) => {
                *slot = None;
                Ok(())
            }
            _ => Err(DbError::InvalidRecordId(format!(
                "slot {} is empty",
                record_id
            ))),
        }
    }

    /// Returns the stored tuples in ascending slot order.
    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }
}

impl PartialEq for HeapPage {
    fn eq(&self, other: &Self) -> bool {
        self.page_id == other.page_id
            && self.page_size == other.page_size
            && self.desc == other.desc
            && self.slots.len() == other.slots.len()
            && self.slots.iter().zip(other.slots.iter()).all(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => a == b && a.record_id() == b.record_id(),
                (None, None) => true,
                _ => false,
            })
    }
}

impl Eq for HeapPage {}
