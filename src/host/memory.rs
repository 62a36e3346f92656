//! Lock-counted temporary image memory.
//!
//! Blocks are addressed by generational handles. A block's bytes may only
//! be touched while it is locked; locks nest, and an unlock with no
//! outstanding lock does nothing. Unlocked blocks may be moved by
//! [`ImageMemoryPool::compact`].

use crate::core::error::{MemoryError, OfxResult};
use crate::core::handle::{EffectHandle, HandleTable, MemoryHandle, MemoryKind};
use log::{debug, warn};
use parking_lot::Mutex;

struct Block {
    owner: Option<EffectHandle>,
    data: Vec<u8>,
    locks: usize,
}

struct PoolInner {
    blocks: HandleTable<MemoryKind, Block>,
    in_use: usize,
}

/// Pool of temporary memory handed to modules.
pub struct ImageMemoryPool {
    inner: Mutex<PoolInner>,
    limit: usize,
}

impl ImageMemoryPool {
    /// A pool that refuses allocations beyond `limit` bytes in total.
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                blocks: HandleTable::new(),
                in_use: 0,
            }),
            limit,
        }
    }

    /// Bytes currently allocated.
    pub fn in_use(&self) -> usize {
        self.inner.lock().in_use
    }

    /// Number of live blocks.
    pub fn len(&self) -> usize {
        self.inner.lock().blocks.len()
    }

    /// True if no block is allocated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocate `bytes` zeroed bytes, unlocked.
    pub fn alloc(&self, owner: Option<EffectHandle>, bytes: usize) -> OfxResult<MemoryHandle> {
        let mut inner = self.inner.lock();
        if inner.in_use.saturating_add(bytes) > self.limit {
            return Err(MemoryError::Exhausted {
                requested: bytes,
                in_use: inner.in_use,
                limit: self.limit,
            }
            .into());
        }
        inner.in_use += bytes;
        let handle = inner.blocks.insert(Block {
            owner,
            data: vec![0; bytes],
            locks: 0,
        });
        debug!("Allocated {} bytes as {}", bytes, handle);
        Ok(handle)
    }

    /// Free a block, locked or not.
    pub fn free(&self, handle: MemoryHandle) -> OfxResult<()> {
        let mut inner = self.inner.lock();
        let block = inner.blocks.remove(handle)?;
        if block.locks > 0 {
            warn!("Freeing {} with {} outstanding lock(s)", handle, block.locks);
        }
        inner.in_use -= block.data.len();
        Ok(())
    }

    /// Free every block owned by `owner`. Returns how many were freed.
    pub fn free_owned(&self, owner: EffectHandle) -> usize {
        let mut inner = self.inner.lock();
        let owned: Vec<MemoryHandle> = inner
            .blocks
            .iter()
            .filter(|(_, block)| block.owner == Some(owner))
            .map(|(handle, _)| handle)
            .collect();
        for handle in &owned {
            if let Ok(block) = inner.blocks.remove(*handle) {
                inner.in_use -= block.data.len();
            }
        }
        owned.len()
    }

    /// Lock a block, returning the new lock count.
    pub fn lock(&self, handle: MemoryHandle) -> OfxResult<usize> {
        let mut inner = self.inner.lock();
        let block = inner.blocks.get_mut(handle)?;
        block.locks += 1;
        Ok(block.locks)
    }

    /// Undo one lock, returning the remaining count. Unlocking a block that
    /// is not locked does nothing.
    pub fn unlock(&self, handle: MemoryHandle) -> OfxResult<usize> {
        let mut inner = self.inner.lock();
        let block = inner.blocks.get_mut(handle)?;
        block.locks = block.locks.saturating_sub(1);
        Ok(block.locks)
    }

    /// Current lock count.
    pub fn lock_count(&self, handle: MemoryHandle) -> OfxResult<usize> {
        Ok(self.inner.lock().blocks.get(handle)?.locks)
    }

    /// Address of a locked block, or `None` while it is unlocked and may
    /// move.
    pub fn address(&self, handle: MemoryHandle) -> OfxResult<Option<usize>> {
        let inner = self.inner.lock();
        let block = inner.blocks.get(handle)?;
        Ok((block.locks > 0).then(|| block.data.as_ptr() as usize))
    }

    /// Run `f` over the bytes of a locked block.
    pub fn access(&self, handle: MemoryHandle, f: &mut dyn FnMut(&mut [u8])) -> OfxResult<()> {
        let mut inner = self.inner.lock();
        let block = inner.blocks.get_mut(handle)?;
        if block.locks == 0 {
            return Err(MemoryError::NotLocked.into());
        }
        f(&mut block.data);
        Ok(())
    }

    /// Move every unlocked block to fresh storage. Returns how many moved.
    pub fn compact(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut moved = 0;
        for (_, block) in inner.blocks.iter_mut() {
            if block.locks == 0 && !block.data.is_empty() {
                let relocated = block.data.clone();
                block.data = relocated;
                moved += 1;
            }
        }
        debug!("Compacted {} block(s)", moved);
        moved
    }
}
