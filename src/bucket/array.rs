//! Growable bucket array with overflow chains

use std::fmt;
use std::io::{ErrorKind, Read, Write};

use tracing::debug;

use crate::error::{IndexError, Result};
use crate::handler::{KeyHandler, ValueHandler};
use crate::layout::{read_i32, read_i64, write_i32, write_i64};

use super::{
    bucket_address, split_address, ABANDONED_BUCKET, ALLOCATION_FACTOR, BUCKET_DATA_OFFSET,
    BUCKET_DEPTH_OFFSET, BUCKET_FILL_COUNT_OFFSET, BUCKET_ID_OFFSET, BUCKET_OVERFLOW_POINTER_OFFSET,
    BUFFER_BUCKET_COUNT_OFFSET, BUFFER_HEADER_LENGTH, MAIN_BLOCK_COUNT_OFFSET, MAIN_BUCKET_COUNT_OFFSET,
    MAIN_BUFFER_COUNT_OFFSET, MAIN_HEADER_LENGTH, MAIN_HIGHEST_BUCKET_ID_OFFSET, NO_BUCKET,
    OVERFLOW_BUCKET,
};

/// Location of one block: its bucket and its offset inside that bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPosition {
    pub bucket: u64,
    pub offset: usize,
}

/// Buckets of `max_bucket_blocks` key/value blocks, packed into buffers of
/// [`ALLOCATION_FACTOR`] buckets each
///
/// A full bucket is extended with overflow buckets chained through the
/// header's overflow pointer. Overflow buckets carry the id of the bucket
/// they extend and a depth of [`OVERFLOW_BUCKET`].
pub struct BucketArray<K, V> {
    keys: K,
    values: V,

    key_length: usize,
    value_length: usize,
    max_bucket_blocks: usize,
    max_bucket_length: usize,
    max_buffer_length: usize,

    /// Bucket buffers; buffer 0 always exists
    buffers: Vec<Vec<u8>>,

    bucket_count: usize,
    block_count: u64,
    highest_bucket_id: i32,

    /// First buffer with room for another bucket
    next_not_full: usize,
}

impl<K: KeyHandler, V: ValueHandler> BucketArray<K, V> {
    /// Create an array with one empty buffer.
    ///
    /// Fails with `InvalidArgument` if a buffer would not be addressable
    /// with a 32-bit offset.
    pub fn new(keys: K, values: V, max_bucket_blocks: usize) -> Result<Self> {
        if max_bucket_blocks == 0 {
            return Err(IndexError::InvalidArgument(
                "max_bucket_blocks must be at least 1".to_string(),
            ));
        }

        let key_length = keys.key_length();
        let value_length = values.value_length();

        let max_bucket_length = key_length
            .checked_add(value_length)
            .and_then(|block| block.checked_mul(max_bucket_blocks))
            .and_then(|data| data.checked_add(BUCKET_DATA_OFFSET));
        let max_buffer_length = max_bucket_length
            .and_then(|bucket| bucket.checked_mul(ALLOCATION_FACTOR))
            .and_then(|buckets| buckets.checked_add(BUFFER_HEADER_LENGTH))
            .filter(|&len| len <= i32::MAX as usize);

        let (Some(max_bucket_length), Some(max_buffer_length)) = (max_bucket_length, max_buffer_length)
        else {
            return Err(IndexError::InvalidArgument(
                "Maximum bucket buffer length exceeds integer maximum value".to_string(),
            ));
        };

        let mut array = Self {
            keys,
            values,
            key_length,
            value_length,
            max_bucket_blocks,
            max_bucket_length,
            max_buffer_length,
            buffers: Vec::new(),
            bucket_count: 0,
            block_count: 0,
            highest_bucket_id: 0,
            next_not_full: 0,
        };
        array.allocate_buffer();
        Ok(array)
    }

    /// Drop every bucket and release all buffers but the first
    pub fn clear(&mut self) {
        self.buffers.clear();
        self.bucket_count = 0;
        self.block_count = 0;
        self.highest_bucket_id = 0;
        self.next_not_full = 0;
        self.allocate_buffer();
    }

    // -------------------------------------------------------------------------
    // Buckets
    // -------------------------------------------------------------------------

    /// Allocate an empty bucket and return its address.
    ///
    /// `depth` is a split depth (`>= 0`) or [`OVERFLOW_BUCKET`].
    pub fn allocate_new_bucket(&mut self, id: i32, depth: i32) -> Result<u64> {
        if id < 0 || (depth < 0 && depth != OVERFLOW_BUCKET) {
            return Err(IndexError::InvalidArgument(format!(
                "Invalid bucket id {} / depth {}",
                id, depth
            )));
        }

        let mut buffer_id = self.next_not_full;
        let mut count = self.buffer_bucket_count(buffer_id);
        if count >= ALLOCATION_FACTOR {
            buffer_id = self.allocate_buffer();
            self.next_not_full = buffer_id;
            count = 0;
        }

        let offset = BUFFER_HEADER_LENGTH + count * self.max_bucket_length;
        let max_bucket_length = self.max_bucket_length;
        let buffer = &mut self.buffers[buffer_id];

        let bucket = &mut buffer[offset..offset + max_bucket_length];
        bucket.fill(0);
        write_i32(bucket, BUCKET_ID_OFFSET, id);
        write_i32(bucket, BUCKET_DEPTH_OFFSET, depth);
        write_i32(buffer, BUFFER_BUCKET_COUNT_OFFSET, (count + 1) as i32);

        self.bucket_count += 1;
        if id > self.highest_bucket_id {
            self.highest_bucket_id = id;
        }
        if count + 1 == ALLOCATION_FACTOR {
            self.next_not_full = self.find_next_not_full(buffer_id);
        }

        Ok(bucket_address(buffer_id, offset))
    }

    /// Append an overflow bucket to the end of the chain starting at
    /// `address` and return the new bucket's address
    pub fn overflow(&mut self, address: u64) -> Result<u64> {
        let last = self.chain(address)?.last().copied().unwrap_or(address);
        let id = read_i32(self.bucket(last)?, BUCKET_ID_OFFSET);

        let overflow = self.allocate_new_bucket(id, OVERFLOW_BUCKET)?;
        write_i64(self.bucket_mut(last)?, BUCKET_OVERFLOW_POINTER_OFFSET, overflow as i64);
        Ok(overflow)
    }

    /// Unlink `overflow` from the chain starting at `address`.
    ///
    /// The bucket itself stays allocated; release it with
    /// [`remove_bucket`](Self::remove_bucket) once empty.
    pub fn remove_overflow_bucket(&mut self, address: u64, overflow: u64) -> Result<()> {
        let mut before = address;
        loop {
            let next = overflow_pointer(self.bucket(before)?);
            if next == NO_BUCKET {
                return Ok(());
            }
            if next == overflow {
                let after = overflow_pointer(self.bucket(next)?);
                write_i64(self.bucket_mut(before)?, BUCKET_OVERFLOW_POINTER_OFFSET, after as i64);
                return Ok(());
            }
            before = next;
        }
    }

    /// Whether `address` is the last bucket of its buffer
    pub fn is_bucket_removable(&self, address: u64) -> bool {
        let (buffer_id, offset) = split_address(address);
        if buffer_id >= self.buffers.len() {
            return false;
        }
        let count = self.buffer_bucket_count(buffer_id);
        count > 0 && offset == self.bucket_offset(count - 1)
    }

    /// Remove the empty bucket at `address`.
    ///
    /// Only the last bucket of a buffer is released. Any other emptied
    /// overflow bucket is marked [`ABANDONED_BUCKET`] and stays in place.
    /// Returns the address of the bucket to try removing next (the last
    /// bucket still allocated), or [`NO_BUCKET`] once the array is empty.
    pub fn remove_bucket(&mut self, address: u64) -> Result<u64> {
        let (buffer_id, offset) = split_address(address);
        let count = if buffer_id < self.buffers.len() {
            self.buffer_bucket_count(buffer_id)
        } else {
            0
        };
        if count == 0 {
            return Err(IndexError::InvalidArgument(format!(
                "No bucket in buffer {} on offset {}",
                buffer_id, offset
            )));
        }

        let bucket = self.bucket(address)?;
        if fill_count(bucket) > 0 {
            return Err(IndexError::InvalidArgument(
                "Bucket can't be removed, since it is not empty".to_string(),
            ));
        }
        let id = read_i32(bucket, BUCKET_ID_OFFSET);
        let depth = read_i32(bucket, BUCKET_DEPTH_OFFSET);

        let last_offset = self.bucket_offset(count - 1);
        if offset != last_offset {
            if depth == OVERFLOW_BUCKET {
                write_i32(self.bucket_mut(address)?, BUCKET_DEPTH_OFFSET, ABANDONED_BUCKET);
            }
            return Ok(bucket_address(buffer_id, last_offset));
        }

        let next = self.remove_last_bucket(buffer_id, count);
        if depth != OVERFLOW_BUCKET && depth != ABANDONED_BUCKET && id == self.highest_bucket_id {
            self.highest_bucket_id = self.search_highest_bucket_id();
        }
        Ok(next)
    }

    // -------------------------------------------------------------------------
    // Blocks
    // -------------------------------------------------------------------------

    /// Add a block to the first bucket of the chain at `address` with room
    /// for it. Returns `false` if every bucket of the chain is full.
    pub fn add_block(&mut self, address: u64, key: &K::Key, value: &V::Value) -> Result<bool> {
        let block = self.encode_block(key, value)?;

        for bucket in self.chain(address)? {
            if fill_count(self.bucket(bucket)?) < self.max_bucket_blocks {
                self.append_block(bucket, &block)?;
                self.block_count += 1;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Find `key` in the chain starting at `address`
    pub fn find(&self, address: u64, key: &K::Key) -> Result<Option<BlockPosition>> {
        let mut encoded = vec![0u8; self.key_length];
        self.keys.write_key(key, &mut encoded)?;

        for bucket_address in self.chain(address)? {
            let bucket = self.bucket(bucket_address)?;
            for i in 0..fill_count(bucket) {
                let offset = self.block_offset(i);
                if self.keys.key_equals(&encoded, &bucket[offset..offset + self.key_length]) {
                    return Ok(Some(BlockPosition {
                        bucket: bucket_address,
                        offset,
                    }));
                }
            }
        }
        Ok(None)
    }

    pub fn key_equals(&self, address: u64, block_offset: usize, key: &K::Key) -> Result<bool> {
        let mut encoded = vec![0u8; self.key_length];
        self.keys.write_key(key, &mut encoded)?;
        let block = self.block(address, block_offset)?;
        Ok(self.keys.key_equals(&encoded, &block[..self.key_length]))
    }

    pub fn read_key(&self, address: u64, block_offset: usize) -> Result<K::Owned> {
        let block = self.block(address, block_offset)?;
        Ok(self.keys.read_key(&block[..self.key_length]))
    }

    pub fn read_value(&self, address: u64, block_offset: usize) -> Result<V::Owned> {
        let block = self.block(address, block_offset)?;
        Ok(self.values.read_value(&block[self.key_length..]))
    }

    /// Overwrite the value of an existing block
    pub fn update_value(&mut self, address: u64, block_offset: usize, value: &V::Value) -> Result<()> {
        let mut encoded = vec![0u8; self.value_length];
        self.values.write_value(value, &mut encoded)?;

        let key_length = self.key_length;
        let block_length = self.block_length();
        let bucket = self.bucket_mut(address)?;
        check_block(bucket, block_offset, block_length)?;
        bucket[block_offset + key_length..block_offset + block_length].copy_from_slice(&encoded);
        Ok(())
    }

    /// Remove a block, shifting the following blocks down. Returns the
    /// bucket's new fill count.
    pub fn remove_block(&mut self, address: u64, block_offset: usize) -> Result<usize> {
        let fill = self.remove_block_from_bucket(address, block_offset)?;
        self.block_count -= 1;
        Ok(fill)
    }

    /// Move one block into the chain starting at `destination`, adding an
    /// overflow bucket if the whole chain is full
    pub fn relocate_block(&mut self, address: u64, block_offset: usize, destination: u64) -> Result<()> {
        let block_length = self.block_length();
        let block = self.block(address, block_offset)?[..block_length].to_vec();

        let mut target = None;
        for bucket in self.chain(destination)? {
            if fill_count(self.bucket(bucket)?) < self.max_bucket_blocks {
                target = Some(bucket);
                break;
            }
        }
        let target = match target {
            Some(bucket) => bucket,
            None => self.overflow(destination)?,
        };

        self.append_block(target, &block)?;
        self.remove_block_from_bucket(address, block_offset)?;
        Ok(())
    }

    /// Move every block of `address` to the end of `destination`
    pub fn relocate_blocks_from_bucket(&mut self, address: u64, destination: u64) -> Result<()> {
        let source_fill = fill_count(self.bucket(address)?);
        let destination_fill = fill_count(self.bucket(destination)?);

        if address == destination || source_fill + destination_fill > self.max_bucket_blocks {
            return Err(IndexError::InvalidArgument(format!(
                "Blocks can't be relocated from bucket {:#x} to bucket {:#x}: not enough space on destination bucket",
                address, destination
            )));
        }

        let data_end = self.block_offset(source_fill);
        let blocks = self.bucket(address)?[BUCKET_DATA_OFFSET..data_end].to_vec();

        let start = self.block_offset(destination_fill);
        let target = self.bucket_mut(destination)?;
        target[start..start + blocks.len()].copy_from_slice(&blocks);
        write_i32(target, BUCKET_FILL_COUNT_OFFSET, (destination_fill + source_fill) as i32);

        let source = self.bucket_mut(address)?;
        source[BUCKET_DATA_OFFSET..data_end].fill(0);
        write_i32(source, BUCKET_FILL_COUNT_OFFSET, 0);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Bucket Accessors
    // -------------------------------------------------------------------------

    pub fn bucket_fill_count(&self, address: u64) -> Result<usize> {
        Ok(fill_count(self.bucket(address)?))
    }

    pub fn bucket_id(&self, address: u64) -> Result<i32> {
        Ok(read_i32(self.bucket(address)?, BUCKET_ID_OFFSET))
    }

    pub fn bucket_depth(&self, address: u64) -> Result<i32> {
        Ok(read_i32(self.bucket(address)?, BUCKET_DEPTH_OFFSET))
    }

    pub fn bucket_overflow_pointer(&self, address: u64) -> Result<u64> {
        Ok(overflow_pointer(self.bucket(address)?))
    }

    /// Number of overflow buckets chained behind `address`
    pub fn bucket_overflow_count(&self, address: u64) -> Result<usize> {
        Ok(self.chain(address)?.len() - 1)
    }

    /// Bytes in use by the bucket's header and blocks
    pub fn bucket_length(&self, address: u64) -> Result<usize> {
        Ok(self.block_offset(fill_count(self.bucket(address)?)))
    }

    /// Addresses of all allocated buckets, buffer by buffer
    pub fn bucket_addresses(&self) -> Vec<u64> {
        (0..self.buffers.len())
            .flat_map(|buffer_id| {
                (0..self.buffer_bucket_count(buffer_id))
                    .map(move |i| bucket_address(buffer_id, self.bucket_offset(i)))
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Array Accessors
    // -------------------------------------------------------------------------

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Buckets allocated in one buffer
    pub fn buffer_bucket_count(&self, buffer_id: usize) -> usize {
        read_i32(&self.buffers[buffer_id], BUFFER_BUCKET_COUNT_OFFSET).max(0) as usize
    }

    /// Allocated buckets, overflow and abandoned ones included
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Stored blocks
    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    pub fn highest_bucket_id(&self) -> i32 {
        self.highest_bucket_id
    }

    pub fn max_bucket_blocks(&self) -> usize {
        self.max_bucket_blocks
    }

    pub fn max_bucket_length(&self) -> usize {
        self.max_bucket_length
    }

    pub fn max_buffer_length(&self) -> usize {
        self.max_buffer_length
    }

    pub fn block_length(&self) -> usize {
        self.key_length + self.value_length
    }

    pub fn first_bucket_offset(&self) -> usize {
        BUFFER_HEADER_LENGTH
    }

    pub fn first_block_offset(&self) -> usize {
        BUCKET_DATA_OFFSET
    }

    /// Bytes allocated for buffers
    pub fn capacity(&self) -> usize {
        self.buffers.len() * self.max_buffer_length
    }

    /// Bytes a stream of the current contents occupies
    pub fn size(&self) -> usize {
        MAIN_HEADER_LENGTH + self.used_bytes()
    }

    /// Stored blocks over the capacity of all allocated buckets
    pub fn load_factor(&self) -> f64 {
        if self.bucket_count == 0 {
            return 0.0;
        }
        self.block_count as f64 / (self.bucket_count * self.max_bucket_blocks) as f64
    }

    /// Highest id over all allocated buckets
    pub fn search_highest_bucket_id(&self) -> i32 {
        self.bucket_addresses()
            .into_iter()
            .map(|address| {
                let (buffer_id, offset) = split_address(address);
                read_i32(&self.buffers[buffer_id][offset..], BUCKET_ID_OFFSET)
            })
            .max()
            .unwrap_or(0)
            .max(0)
    }

    // -------------------------------------------------------------------------
    // Stream IO
    // -------------------------------------------------------------------------

    /// Write the main header followed by the used part of every buffer.
    /// Returns the number of bytes written.
    pub fn write_to_stream<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let mut header = [0u8; MAIN_HEADER_LENGTH];
        write_i32(&mut header, MAIN_BUFFER_COUNT_OFFSET, self.buffers.len() as i32);
        write_i32(&mut header, MAIN_BUCKET_COUNT_OFFSET, self.bucket_count as i32);
        write_i64(&mut header, MAIN_BLOCK_COUNT_OFFSET, self.block_count as i64);
        write_i32(&mut header, MAIN_HIGHEST_BUCKET_ID_OFFSET, self.highest_bucket_id);
        writer.write_all(&header)?;

        let mut written = MAIN_HEADER_LENGTH;
        for (buffer_id, buffer) in self.buffers.iter().enumerate() {
            let used = self.bucket_offset(self.buffer_bucket_count(buffer_id));
            writer.write_all(&buffer[..used])?;
            written += used;
        }
        writer.flush()?;

        debug!(
            bytes = written,
            buffers = self.buffers.len(),
            buckets = self.bucket_count,
            "Wrote bucket array"
        );
        Ok(written as u64)
    }

    /// Replace the contents with a stream written by
    /// [`write_to_stream`](Self::write_to_stream).
    ///
    /// The stream is validated completely before anything is replaced; on
    /// error the array keeps its previous contents.
    pub fn read_from_stream<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        let mut header = [0u8; MAIN_HEADER_LENGTH];
        read_exact(reader, &mut header, 0)?;

        let buffer_count = read_i32(&header, MAIN_BUFFER_COUNT_OFFSET);
        let bucket_count = read_i32(&header, MAIN_BUCKET_COUNT_OFFSET);
        let block_count = read_i64(&header, MAIN_BLOCK_COUNT_OFFSET);
        let highest_bucket_id = read_i32(&header, MAIN_HIGHEST_BUCKET_ID_OFFSET);

        if buffer_count < 1 || bucket_count < 0 || block_count < 0 || highest_bucket_id < 0 {
            return Err(IndexError::CorruptFormat(format!(
                "Invalid bucket array header: {} buffers, {} buckets, {} blocks, highest id {}",
                buffer_count, bucket_count, block_count, highest_bucket_id
            )));
        }

        let mut buffers = Vec::new();
        let mut buckets_read = 0usize;
        let mut blocks_read = 0u64;
        let mut bytes_read = MAIN_HEADER_LENGTH;

        for buffer_id in 0..buffer_count as usize {
            let mut buffer = vec![0u8; self.max_buffer_length];
            read_exact(reader, &mut buffer[..BUFFER_HEADER_LENGTH], bytes_read)?;
            bytes_read += BUFFER_HEADER_LENGTH;

            let count = read_i32(&buffer, BUFFER_BUCKET_COUNT_OFFSET);
            if count < 0 || count as usize > ALLOCATION_FACTOR {
                return Err(IndexError::CorruptFormat(format!(
                    "Bucket buffer {} claims {} buckets",
                    buffer_id, count
                )));
            }

            let used = self.bucket_offset(count as usize);
            read_exact(reader, &mut buffer[BUFFER_HEADER_LENGTH..used], bytes_read)?;
            bytes_read = bytes_read + used - BUFFER_HEADER_LENGTH;

            for i in 0..count as usize {
                let offset = self.bucket_offset(i);
                let fill = read_i32(&buffer[offset..], BUCKET_FILL_COUNT_OFFSET);
                if fill < 0 || fill as usize > self.max_bucket_blocks {
                    return Err(IndexError::CorruptFormat(format!(
                        "Bucket {:#x} claims {} blocks (max {})",
                        bucket_address(buffer_id, offset),
                        fill,
                        self.max_bucket_blocks
                    )));
                }
                blocks_read += fill as u64;
            }

            buckets_read += count as usize;
            buffers.push(buffer);
        }

        if buckets_read != bucket_count as usize || blocks_read != block_count as u64 {
            return Err(IndexError::CorruptFormat(format!(
                "Bucket array header claims {} buckets / {} blocks, buffers hold {} / {}",
                bucket_count, block_count, buckets_read, blocks_read
            )));
        }

        self.buffers = buffers;
        self.bucket_count = buckets_read;
        self.block_count = blocks_read;
        self.highest_bucket_id = highest_bucket_id;
        self.next_not_full = self.find_next_not_full(0);

        debug!(bytes = bytes_read, buckets = buckets_read, "Read bucket array");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Private Helpers
    // -------------------------------------------------------------------------

    fn allocate_buffer(&mut self) -> usize {
        self.buffers.push(vec![0u8; self.max_buffer_length]);
        let buffer_id = self.buffers.len() - 1;
        debug!(buffer_id, bytes = self.max_buffer_length, "Allocated bucket buffer");
        buffer_id
    }

    /// Drop trailing empty buffers, starting at `buffer_id` if it is the last
    fn release_empty_buffers(&mut self, buffer_id: usize) {
        if buffer_id == 0 || buffer_id != self.buffers.len() - 1 {
            return;
        }

        while self.buffers.len() > 1 && self.buffer_bucket_count(self.buffers.len() - 1) == 0 {
            self.buffers.pop();
            debug!(buffer_id = self.buffers.len(), "Released bucket buffer");
        }
        if self.next_not_full >= self.buffers.len() {
            self.next_not_full = self.buffers.len() - 1;
        }
    }

    fn remove_last_bucket(&mut self, buffer_id: usize, count: usize) -> u64 {
        let remaining = count - 1;
        let offset = self.bucket_offset(remaining);
        let max_bucket_length = self.max_bucket_length;

        let buffer = &mut self.buffers[buffer_id];
        buffer[offset..offset + max_bucket_length].fill(0);
        write_i32(buffer, BUFFER_BUCKET_COUNT_OFFSET, remaining as i32);

        self.bucket_count -= 1;
        self.next_not_full = self.next_not_full.min(buffer_id);

        if remaining > 0 {
            return bucket_address(buffer_id, self.bucket_offset(remaining - 1));
        }

        self.release_empty_buffers(buffer_id);
        let start = buffer_id.min(self.buffers.len() - 1);
        (0..=start)
            .rev()
            .find(|&id| self.buffer_bucket_count(id) > 0)
            .map(|id| bucket_address(id, self.bucket_offset(self.buffer_bucket_count(id) - 1)))
            .unwrap_or(NO_BUCKET)
    }

    /// First buffer from `start` that is not full, or the last buffer
    fn find_next_not_full(&self, start: usize) -> usize {
        (start..self.buffers.len())
            .find(|&id| self.buffer_bucket_count(id) != ALLOCATION_FACTOR)
            .unwrap_or(self.buffers.len() - 1)
    }

    /// Addresses of the chain starting at `address`, `address` first
    fn chain(&self, address: u64) -> Result<Vec<u64>> {
        let mut chain = vec![address];
        let mut next = overflow_pointer(self.bucket(address)?);
        while next != NO_BUCKET {
            if chain.len() >= self.bucket_count {
                return Err(IndexError::CorruptFormat(format!(
                    "Overflow chain of bucket {:#x} loops",
                    address
                )));
            }
            chain.push(next);
            next = overflow_pointer(self.bucket(next)?);
        }
        Ok(chain)
    }

    fn bucket(&self, address: u64) -> Result<&[u8]> {
        let (buffer_id, offset) = self.locate(address)?;
        Ok(&self.buffers[buffer_id][offset..offset + self.max_bucket_length])
    }

    fn bucket_mut(&mut self, address: u64) -> Result<&mut [u8]> {
        let (buffer_id, offset) = self.locate(address)?;
        let max_bucket_length = self.max_bucket_length;
        Ok(&mut self.buffers[buffer_id][offset..offset + max_bucket_length])
    }

    /// Validate `address` against the allocated buckets
    fn locate(&self, address: u64) -> Result<(usize, usize)> {
        let (buffer_id, offset) = split_address(address);
        let index = offset
            .checked_sub(BUFFER_HEADER_LENGTH)
            .filter(|relative| relative % self.max_bucket_length == 0)
            .map(|relative| relative / self.max_bucket_length);

        match index {
            Some(i) if buffer_id < self.buffers.len() && i < self.buffer_bucket_count(buffer_id) => {
                Ok((buffer_id, offset))
            }
            _ => Err(IndexError::InvalidArgument(format!(
                "No bucket at address {:#x}",
                address
            ))),
        }
    }

    fn block(&self, address: u64, block_offset: usize) -> Result<&[u8]> {
        let block_length = self.block_length();
        let bucket = self.bucket(address)?;
        check_block(bucket, block_offset, block_length)?;
        Ok(&bucket[block_offset..block_offset + block_length])
    }

    fn append_block(&mut self, address: u64, block: &[u8]) -> Result<()> {
        let block_length = self.block_length();
        let bucket = self.bucket_mut(address)?;
        let fill = fill_count(bucket);
        let offset = BUCKET_DATA_OFFSET + fill * block_length;
        bucket[offset..offset + block_length].copy_from_slice(block);
        write_i32(bucket, BUCKET_FILL_COUNT_OFFSET, (fill + 1) as i32);
        Ok(())
    }

    fn remove_block_from_bucket(&mut self, address: u64, block_offset: usize) -> Result<usize> {
        let block_length = self.block_length();
        let bucket = self.bucket_mut(address)?;
        check_block(bucket, block_offset, block_length)?;

        let fill = fill_count(bucket);
        let end = BUCKET_DATA_OFFSET + fill * block_length;
        bucket.copy_within(block_offset + block_length..end, block_offset);
        bucket[end - block_length..end].fill(0);
        write_i32(bucket, BUCKET_FILL_COUNT_OFFSET, (fill - 1) as i32);
        Ok(fill - 1)
    }

    fn encode_block(&self, key: &K::Key, value: &V::Value) -> Result<Vec<u8>> {
        let mut block = vec![0u8; self.block_length()];
        let (key_bytes, value_bytes) = block.split_at_mut(self.key_length);
        self.keys.write_key(key, key_bytes)?;
        self.values.write_value(value, value_bytes)?;
        Ok(block)
    }

    fn used_bytes(&self) -> usize {
        (0..self.buffers.len())
            .map(|id| self.bucket_offset(self.buffer_bucket_count(id)))
            .sum()
    }

    /// Offset of the `index`th bucket in a buffer
    fn bucket_offset(&self, index: usize) -> usize {
        BUFFER_HEADER_LENGTH + index * self.max_bucket_length
    }

    /// Offset of the `index`th block in a bucket
    fn block_offset(&self, index: usize) -> usize {
        BUCKET_DATA_OFFSET + index * self.block_length()
    }
}

impl<K, V> fmt::Display for BucketArray<K, V>
where
    K: KeyHandler,
    V: ValueHandler,
    V::Owned: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for address in self.bucket_addresses() {
            let (buffer_id, offset) = split_address(address);
            let bucket = &self.buffers[buffer_id][offset..offset + self.max_bucket_length];
            let fill = fill_count(bucket);
            let depth = read_i32(bucket, BUCKET_DEPTH_OFFSET);

            match depth {
                OVERFLOW_BUCKET => write!(f, "Overflow-")?,
                ABANDONED_BUCKET => write!(f, "Abandoned-")?,
                _ => {}
            }
            write!(
                f,
                "Bucket-{} [depth: {}, fill: {}/{}] {{",
                read_i32(bucket, BUCKET_ID_OFFSET),
                depth,
                fill,
                self.max_bucket_blocks
            )?;
            for i in 0..fill {
                let block = &bucket[self.block_offset(i)..self.block_offset(i + 1)];
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(
                    f,
                    "{:?} => {:?}",
                    self.keys.read_key(&block[..self.key_length]),
                    self.values.read_value(&block[self.key_length..])
                )?;
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Bucket Fields
// =============================================================================

fn fill_count(bucket: &[u8]) -> usize {
    read_i32(bucket, BUCKET_FILL_COUNT_OFFSET).max(0) as usize
}

fn overflow_pointer(bucket: &[u8]) -> u64 {
    read_i64(bucket, BUCKET_OVERFLOW_POINTER_OFFSET) as u64
}

fn check_block(bucket: &[u8], block_offset: usize, block_length: usize) -> Result<()> {
    let valid = block_offset
        .checked_sub(BUCKET_DATA_OFFSET)
        .filter(|relative| relative % block_length == 0)
        .is_some_and(|relative| relative / block_length < fill_count(bucket));

    if !valid {
        return Err(IndexError::InvalidArgument(format!(
            "No block at offset {} (fill count {})",
            block_offset,
            fill_count(bucket)
        )));
    }
    Ok(())
}

fn read_exact<R: Read>(reader: &mut R, dst: &mut [u8], position: usize) -> Result<()> {
    reader.read_exact(dst).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => IndexError::CorruptFormat(format!(
            "Failed to read bucket array, stream ended after {} bytes",
            position
        )),
        _ => IndexError::Io(e),
    })
}
