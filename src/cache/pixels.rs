//! Pixel-level access: palette reads and writes, 24-bit Targa triples,
//! 16-bit potential values and raw byte ranges.
//!
//! Coordinates outside the raster read as 0 and writes to them are dropped.

use super::layout::{block_base, block_subscript, BLOCK_LEN};
use super::{DiskCache, OpenMode};
use crate::error::{DiskVideoError, Result};

impl DiskCache {
    /// Pixel value at column `x` of row `y`.
    pub fn read(&mut self, x: u32, y: u32) -> Result<u8> {
        self.read_at(x as u64, y)
    }

    /// Store `color` at column `x` of row `y`.
    pub fn write(&mut self, x: u32, y: u32, color: u8) -> Result<()> {
        self.write_at(x as u64, y, color)
    }

    /// Read a 24-bit pixel as `(r, g, b)`.
    pub fn read_targa(&mut self, x: u32, y: u32) -> Result<(u8, u8, u8)> {
        let col = x as u64 * 3;
        let b = self.read_at(col, y)?;
        let g = self.read_at(col + 1, y)?;
        let r = self.read_at(col + 2, y)?;
        Ok((r, g, b))
    }

    /// Write a 24-bit pixel. Components land in B, G, R order.
    pub fn write_targa(&mut self, x: u32, y: u32, r: u8, g: u8, b: u8) -> Result<()> {
        let col = x as u64 * 3;
        self.write_at(col, y, b)?;
        self.write_at(col + 1, y, g)?;
        self.write_at(col + 2, y, r)
    }

    /// 16-bit potential at `(x, y)`, high byte from the top half of the rows.
    pub fn read_potential(&mut self, x: u32, y: u32) -> Result<u16> {
        let height = self.potential_height()?;
        if y >= height {
            return Ok(0);
        }
        let high = self.read_at(x as u64, y)?;
        let low = self.read_at(x as u64, y + height)?;
        Ok(u16::from_be_bytes([high, low]))
    }

    pub fn write_potential(&mut self, x: u32, y: u32, value: u16) -> Result<()> {
        let height = self.potential_height()?;
        if y >= height {
            return Ok(());
        }
        let [high, low] = value.to_be_bytes();
        self.write_at(x as u64, y, high)?;
        self.write_at(x as u64, y + height, low)
    }

    /// Copy `out.len()` bytes starting at logical `offset`.
    ///
    /// The range must lie inside one cache block.
    pub fn read_bytes(&mut self, offset: u64, out: &mut [u8]) -> Result<()> {
        let len = out.len();
        let Some(subscript) = self.check_range(offset, len)? else {
            return Ok(());
        };
        let index = self.block_index(offset)?;
        out.copy_from_slice(&self.directory.entry(index).pixels[subscript..subscript + len]);
        Ok(())
    }

    /// Copy `data` into the logical store at `offset`.
    ///
    /// The range must lie inside one cache block.
    pub fn write_bytes(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let Some(subscript) = self.check_range(offset, data.len())? else {
            return Ok(());
        };
        let index = self.block_index(offset)?;
        let entry = self.directory.entry_mut(index);
        entry.pixels[subscript..subscript + data.len()].copy_from_slice(data);
        entry.dirty = true;
        Ok(())
    }

    fn read_at(&mut self, x: u64, y: u32) -> Result<u8> {
        self.report_progress("reading", y);
        let Some(offset) = self.pixel_offset(x, y) else {
            return Ok(0);
        };
        let index = self.block_index(offset)?;
        Ok(self.directory.entry(index).pixels[block_subscript(offset)])
    }

    fn write_at(&mut self, x: u64, y: u32, color: u8) -> Result<()> {
        self.report_progress("writing", y);
        let Some(offset) = self.pixel_offset(x, y) else {
            return Ok(());
        };
        let index = self.block_index(offset)?;
        let entry = self.directory.entry_mut(index);
        let pixel = &mut entry.pixels[block_subscript(offset)];
        if *pixel != color {
            *pixel = color;
            entry.dirty = true;
        }
        Ok(())
    }

    /// Logical offset of `(x, y)`, or `None` outside the raster.
    #[inline]
    fn pixel_offset(&mut self, x: u64, y: u32) -> Option<u64> {
        let base = match self.row_cache {
            Some((row, base)) if row == y => base,
            _ => {
                if y >= self.geometry.row_count {
                    return None;
                }
                let base = y as u64 * self.geometry.row_stride as u64;
                self.row_cache = Some((y, base));
                base
            }
        };
        if x >= self.geometry.row_stride as u64 {
            return None;
        }
        Some(base + x)
    }

    /// Directory index of the block holding `offset`, reusing the last block referenced.
    #[inline]
    fn block_index(&mut self, offset: u64) -> Result<usize> {
        let base = block_base(offset);
        if let Some((current, index)) = self.current {
            if current == base {
                return Ok(index);
            }
        }
        let index = self.resolve(base)?;
        self.current = Some((base, index));
        Ok(index)
    }

    /// Validate a raw byte range. `None` means there is nothing to transfer.
    fn check_range(&self, offset: u64, len: usize) -> Result<Option<usize>> {
        let end = offset.checked_add(len as u64);
        if end.map_or(true, |end| end > self.geometry.logical_len()) {
            return Err(DiskVideoError::OutOfRange { offset, len });
        }
        if len == 0 {
            return Ok(None);
        }
        let subscript = block_subscript(offset);
        if subscript + len > BLOCK_LEN {
            return Err(DiskVideoError::BlockStraddle { offset, len });
        }
        Ok(Some(subscript))
    }

    fn potential_height(&self) -> Result<u32> {
        if self.geometry.mode != OpenMode::Potential {
            return Err(DiskVideoError::WrongMode {
                expected: OpenMode::Potential,
                actual: self.geometry.mode,
            });
        }
        Ok(self.geometry.row_count / 2)
    }

    fn report_progress(&mut self, verb: &str, y: u32) {
        if !self.throttle.tick() {
            return;
        }
        let mut line = y;
        if self.geometry.mode == OpenMode::Potential {
            let height = self.geometry.row_count / 2;
            if line >= height {
                line -= height;
            }
        }
        let message = format!(" {verb} line {line:4}");
        self.status.report(0, &message);
    }
}
