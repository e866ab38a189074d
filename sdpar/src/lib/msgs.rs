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

//! The message queue: errors sorted by input location, drained by the line emitter. Scanner
//! errors carry no text of their own; runs of them on consecutive characters coalesce into a
//! single ranged message.

use buffers::Location;

#[derive(Clone, Debug)]
pub struct Message {
    pub loc: Location,
    /// End of the offending range (scanner errors widen it while coalescing).
    pub end: Location,
    /// `None` marks a scanner error.
    pub text: Option<String>
}

pub struct MessageQueue {
    msgs: Vec<Message>,
    pub count: usize
}

impl MessageQueue {
    pub fn new() -> MessageQueue {
        MessageQueue {
            msgs: Vec::new(),
            count: 0
        }
    }

    /// Record a message, keeping the queue sorted by location (stable for equal locations).
    pub fn record(&mut self, loc: Location, text: Option<String>) {
        self.count += 1;
        let pos = self
            .msgs
            .iter()
            .position(|m| m.loc > loc)
            .unwrap_or(self.msgs.len());
        self.msgs.insert(
            pos,
            Message {
                loc,
                end: loc,
                text
            }
        );
    }

    /// Record a scanner error covering the single byte ending at `next`. If the previous
    /// scanner error ends exactly where this one starts, the two merge into one range.
    pub fn record_scan_error(&mut self, loc: Location, next: Location) {
        if let Some(last) = self
            .msgs
            .iter_mut()
            .rev()
            .find(|m| m.text.is_none())
        {
            if last.end == loc {
                last.end = next;
                return;
            }
        }
        self.count += 1;
        let pos = self
            .msgs
            .iter()
            .position(|m| m.loc > loc)
            .unwrap_or(self.msgs.len());
        self.msgs.insert(
            pos,
            Message {
                loc,
                end: next,
                text: None
            }
        );
    }

    /// Drain every message located strictly before `loc`.
    pub fn drain_before(&mut self, loc: Location) -> Vec<Message> {
        let n = self.msgs.iter().take_while(|m| m.loc < loc).count();
        self.msgs.drain(..n).collect()
    }

    pub fn drain_all(&mut self) -> Vec<Message> {
        self.msgs.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.msgs.is_empty()
    }

    pub fn first_loc(&self) -> Option<Location> {
        self.msgs.first().map(|m| m.loc)
    }
}

#[cfg(test)]
mod test {
    use super::MessageQueue;
    use buffers::Location;

    fn at(order: u32, off: u32) -> Location {
        Location { order, off }
    }

    #[test]
    fn test_sorted_insertion() {
        let mut q = MessageQueue::new();
        q.record(at(0, 5), Some("b".to_owned()));
        q.record(at(0, 1), Some("a".to_owned()));
        q.record(at(1, 0), Some("c".to_owned()));
        let all = q.drain_all();
        let texts: Vec<_> = all.iter().map(|m| m.text.clone().unwrap()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_scan_errors_coalesce() {
        let mut q = MessageQueue::new();
        q.record_scan_error(at(0, 3), at(0, 4));
        q.record_scan_error(at(0, 4), at(0, 5));
        q.record_scan_error(at(0, 5), at(0, 6));
        // A gap starts a fresh range.
        q.record_scan_error(at(0, 9), at(0, 10));
        let all = q.drain_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].loc, at(0, 3));
        assert_eq!(all[0].end, at(0, 6));
        assert_eq!(q.count, 2);
    }

    #[test]
    fn test_drain_before() {
        let mut q = MessageQueue::new();
        q.record(at(0, 1), Some("a".to_owned()));
        q.record(at(2, 0), Some("b".to_owned()));
        let drained = q.drain_before(at(1, 0));
        assert_eq!(drained.len(), 1);
        assert!(!q.is_empty());
    }
}
