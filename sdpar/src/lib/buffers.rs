// Copyright (c) 2018 King's College London
// created by the Software Development Team <http://soft-dev.org/>
//
// The Universal Permissive License (UPL), Version 1.0
//
// Subject to the condition set forth below, permission is hereby granted to any person obtaining a
// copy of this software, associated documentation and/or data (collectively the "Software"), free
// of charge and under any and all copyright rights in the Software, and any and all patent rights
// owned or freely licensable by each licensor hereunder covering either (i) the unmodified
// Software as contributed to or provided by such licensor, or (ii) the Larger Works (as defined
// below), to deal in both
//
// (a) the Software, and
// (b) any piece of software and/or hardware listed in the lrgrwrks.txt file
// if one is included with the Software (each a "Larger Work" to which the Software is contributed
// by such licensors),
//
// without restriction, including without limitation the rights to copy, create derivative works
// of, display, perform, and distribute the Software and make, use, sell, offer for sale, import,
// export, have made, and have sold the Software and the Larger Work(s), and to sublicense the
// foregoing rights on either these or other terms.
//
// This license is subject to the following condition: The above copyright notice and either this
// complete permission notice or at a minimum a reference to the UPL must be included in all copies
// or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
// BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
// DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Input buffering. Input is read in blocks, each block carrying a sequence number (its
//! `order`) so that positions in different blocks still compare. A `Location` is (order,
//! offset); every location held by a queued token, a parse-stack entry, or a pending message
//! stays valid because blocks are only freed once the line emitter has moved past them.

use std::collections::VecDeque;
use std::io::{self, Read};

/// A position in the input: block sequence number plus byte offset within the block. The
/// derived ordering is the cross-buffer position ordering.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Location {
    pub order: u32,
    pub off: u32
}

impl Location {
    pub fn start() -> Location {
        Location { order: 0, off: 0 }
    }
}

struct Buffer {
    order: u32,
    data: Vec<u8>
}

pub struct BufferList<R: Read> {
    reader: R,
    bufs: VecDeque<Buffer>,
    block: usize,
    next_order: u32,
    eof: bool
}

impl<R: Read> BufferList<R> {
    /// `block` is the read size; tests use tiny blocks to force tokens across boundaries.
    pub fn new(reader: R, block: usize) -> BufferList<R> {
        BufferList {
            reader,
            bufs: VecDeque::new(),
            block,
            next_order: 0,
            eof: false
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        if self.eof {
            return Ok(());
        }
        let mut data = vec![0u8; self.block];
        let mut n = 0;
        // A short read is not end of input; only a zero read is.
        while n < data.len() {
            let r = self.reader.read(&mut data[n..])?;
            if r == 0 {
                break;
            }
            n += r;
        }
        data.truncate(n);
        if n == 0 {
            self.eof = true;
        } else {
            self.bufs.push_back(Buffer {
                order: self.next_order,
                data
            });
            self.next_order += 1;
        }
        Ok(())
    }

    fn buf(&self, order: u32) -> Option<&Buffer> {
        let front = match self.bufs.front() {
            Some(b) => b.order,
            None => return None
        };
        if order < front {
            return None;
        }
        self.bufs.get((order - front) as usize)
    }

    /// Normalize a location so its offset is inside its block (or at the very end of input),
    /// reading further blocks on demand.
    pub fn norm(&mut self, mut loc: Location) -> io::Result<Location> {
        loop {
            let len = match self.buf(loc.order) {
                Some(b) => b.data.len() as u32,
                None => {
                    if loc.order >= self.next_order && !self.eof {
                        self.fill()?;
                        continue;
                    }
                    return Ok(loc);
                }
            };
            if loc.off < len {
                return Ok(loc);
            }
            loc = Location {
                order: loc.order + 1,
                off: loc.off - len
            };
        }
    }

    /// The byte at a normalized location, or `None` at end of input.
    pub fn byte(&mut self, loc: Location) -> io::Result<Option<u8>> {
        let loc = self.norm(loc)?;
        Ok(self.buf(loc.order).map(|b| b.data[loc.off as usize]))
    }

    pub fn advance(&mut self, loc: Location) -> io::Result<Location> {
        let loc = self.norm(loc)?;
        self.norm(Location {
            order: loc.order,
            off: loc.off + 1
        })
    }

    /// Copy the bytes of `[from, to)` into one contiguous string, across block boundaries.
    pub fn copy_span(&self, from: Location, to: Location) -> Vec<u8> {
        let mut out = Vec::new();
        let mut loc = from;
        while loc < to {
            let b = match self.buf(loc.order) {
                Some(b) => b,
                None => break
            };
            let hi = if to.order == loc.order {
                to.off as usize
            } else {
                b.data.len()
            };
            out.extend_from_slice(&b.data[loc.off as usize..hi]);
            loc = Location {
                order: loc.order + 1,
                off: 0
            };
        }
        out
    }

    /// Free every block wholly below `loc`.
    pub fn drop_to(&mut self, loc: Location) {
        while let Some(front) = self.bufs.front().map(|b| b.order) {
            if front < loc.order {
                self.bufs.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn bufs_len(&self) -> usize {
        self.bufs.len()
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::{BufferList, Location};

    #[test]
    fn test_cross_buffer_reads() {
        let mut bl = BufferList::new(Cursor::new(b"abcdef".to_vec()), 2);
        let mut loc = Location::start();
        let mut out = Vec::new();
        while let Some(b) = bl.byte(loc).unwrap() {
            out.push(b);
            loc = bl.advance(loc).unwrap();
        }
        assert_eq!(out, b"abcdef");
        assert_eq!(loc.order, 3);
    }

    #[test]
    fn test_copy_span_across_boundary() {
        let mut bl = BufferList::new(Cursor::new(b"007x".to_vec()), 1);
        let from = Location::start();
        let mut to = from;
        for _ in 0..3 {
            to = bl.advance(to).unwrap();
        }
        assert_eq!(bl.copy_span(from, to), b"007");
    }

    #[test]
    fn test_drop_to_frees_blocks() {
        let mut bl = BufferList::new(Cursor::new(b"abcdef".to_vec()), 2);
        let mut loc = Location::start();
        for _ in 0..5 {
            loc = bl.advance(loc).unwrap();
        }
        assert_eq!(bl.bufs_len(), 3);
        bl.drop_to(loc);
        assert_eq!(bl.bufs_len(), 1);
    }

    #[test]
    fn test_location_ordering() {
        assert!(Location { order: 0, off: 9 } < Location { order: 1, off: 0 });
        assert!(Location { order: 1, off: 1 } < Location { order: 1, off: 2 });
    }
}
