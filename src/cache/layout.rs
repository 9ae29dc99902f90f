/// Fixed geometry of the cache directory and the entries it holds.
///
/// Entries are addressed by `i32` index into the directory arena; hash chains
/// and bucket heads use the same index space.

/// Pixels per cache block. Must be a power of two matching `BLOCK_SHIFT`.
pub const BLOCK_LEN: usize = 2048;
pub const BLOCK_SHIFT: u32 = 11;

const _: () = assert!(1usize << BLOCK_SHIFT == BLOCK_LEN);

/// Mask selecting the in-block part of an offset.
pub const BLOCK_MASK: u64 = BLOCK_LEN as u64 - 1;

/// Hash-table bucket count. Power of two for bitmask hashing.
pub const HASH_SIZE: usize = 1024;

const _: () = assert!(HASH_SIZE.is_power_of_two());

/// Clean blocks skipped while looking for more dirty neighbours during write-back.
pub const WRITE_GAP: u64 = 4;

/// Sentinel value meaning "no entry" at the end of a hash chain.
pub const SLOT_NONE: i32 = -1;

/// Sentinel value meaning "empty bucket" in the hash table.
pub const BUCKET_EMPTY: i32 = SLOT_NONE;

/// First placeholder offset given to unused entries. Real block offsets stay below it.
pub const PLACEHOLDER_BASE: u64 = 1 << 62;

/// One cached block: `BLOCK_LEN` pixels, one byte each.
pub struct CacheEntry {
    /// Block-aligned offset into the logical pixel store.
    pub offset: u64,
    pub hash_link: i32,
    pub dirty: bool,
    pub recently_used: bool,
    pub pixels: [u8; BLOCK_LEN],
}

impl CacheEntry {
    pub fn placeholder(offset: u64) -> Self {
        CacheEntry {
            offset,
            hash_link: SLOT_NONE,
            dirty: false,
            recently_used: false,
            pixels: [0; BLOCK_LEN],
        }
    }
}

/// Bytes of directory memory one entry costs.
pub const ENTRY_SIZE: usize = std::mem::size_of::<CacheEntry>();

/// Hash bucket owning block-aligned `offset`.
#[inline(always)]
pub fn bucket_of(offset: u64) -> usize {
    (offset >> BLOCK_SHIFT) as usize & (HASH_SIZE - 1)
}

/// Block-aligned base of `offset`.
#[inline(always)]
pub fn block_base(offset: u64) -> u64 {
    offset & !BLOCK_MASK
}

/// Position of `offset` inside its block.
#[inline(always)]
pub fn block_subscript(offset: u64) -> usize {
    (offset & BLOCK_MASK) as usize
}

/// Round `n` up to the next multiple of `BLOCK_LEN`.
#[inline(always)]
pub fn round_up_block(n: u64) -> u64 {
    (n + BLOCK_MASK) & !BLOCK_MASK
}
