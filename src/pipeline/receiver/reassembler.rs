//! Frame reassembler for the decode sink
//!
//! Groups RTP packets that share a timestamp into codec frames. Packets are
//! kept in a sequence-ordered buffer; a group is released once it is
//! contiguous and runs from a partition head to a partition tail.
//!
//! Groups that can no longer complete, or that wait longer than the lookahead
//! window, are resolved according to [`PartialFramePolicy`].

use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use webrtc::rtp::codecs::vp8::Vp8Packet;
use webrtc::rtp::packet::Packet;
use webrtc::rtp::packetizer::Depacketizer;

use crate::assets::REASSEMBLY_MAX_LATE;

/// What to do with a timestamp group that will never be complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartialFramePolicy {
    /// Drop the packets of the group
    #[default]
    Discard,
    /// Hand out whatever was received, flagged as partial
    Release,
}

/// Reassembler configuration
#[derive(Debug, Clone)]
pub struct ReassemblerConfig {
    /// How many sequence numbers past the head of a group may arrive before
    /// the group is given up on
    pub max_late: u16,
    /// Optional wall-clock bound on how long the oldest packet may wait
    pub max_delay: Option<Duration>,
    pub partial_policy: PartialFramePolicy,
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self {
            max_late: REASSEMBLY_MAX_LATE,
            max_delay: None,
            partial_policy: PartialFramePolicy::Discard,
        }
    }
}

/// A reassembled codec frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Bytes,
    pub timestamp: u32,
    pub first_sequence: u16,
    pub packet_count: usize,
    /// Set when the group was released incomplete
    pub partial: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    pub packets_received: u64,
    pub packets_late: u64,
    pub packets_duplicate: u64,
    pub packets_lost: u64,
    pub frames_released: u64,
    pub groups_discarded: u64,
}

struct Entry {
    packet: Packet,
    received_at: Instant,
}

enum GroupStatus {
    Complete,
    /// Cannot complete any more, or waited too long
    Resolved,
    Waiting,
}

/// Check if seq_a comes after seq_b (handling wrapping)
fn seq_comes_after(seq_a: u16, seq_b: u16) -> bool {
    let diff = seq_a.wrapping_sub(seq_b);
    diff > 0 && diff < 0x8000
}

pub struct FrameReassembler<D: Depacketizer> {
    depacketizer: D,
    buffer: VecDeque<Entry>,
    /// First sequence number not yet released or given up on
    cursor: Option<u16>,
    config: ReassemblerConfig,
    stats: ReassemblerStats,
}

impl FrameReassembler<Vp8Packet> {
    pub fn vp8(config: ReassemblerConfig) -> Self {
        Self::new(Vp8Packet::default(), config)
    }
}

impl<D: Depacketizer> FrameReassembler<D> {
    pub fn new(depacketizer: D, config: ReassemblerConfig) -> Self {
        Self {
            depacketizer,
            buffer: VecDeque::new(),
            cursor: None,
            config,
            stats: ReassemblerStats::default(),
        }
    }

    /// Insert a packet in sequence order.
    ///
    /// Duplicates and packets behind the release cursor are dropped.
    pub fn push(&mut self, packet: Packet) {
        self.stats.packets_received += 1;
        let seq = packet.header.sequence_number;

        if let Some(cursor) = self.cursor
            && seq_comes_after(cursor, seq)
        {
            self.stats.packets_late += 1;
            debug!("Reassembler: late packet {} (cursor {})", seq, cursor);
            return;
        }

        if self
            .buffer
            .iter()
            .any(|e| e.packet.header.sequence_number == seq)
        {
            self.stats.packets_duplicate += 1;
            return;
        }

        let entry = Entry {
            packet,
            received_at: Instant::now(),
        };

        // Most packets arrive in order, so search from the back
        let pos = self
            .buffer
            .iter()
            .rposition(|e| seq_comes_after(seq, e.packet.header.sequence_number))
            .map(|i| i + 1)
            .unwrap_or(0);
        self.buffer.insert(pos, entry);
    }

    /// Take the next frame if one is ready. Never blocks.
    pub fn pop(&mut self) -> Option<Frame> {
        loop {
            let run = self.leading_run()?;

            match self.group_status(run) {
                GroupStatus::Waiting => return None,
                GroupStatus::Complete => {
                    let entries = self.take_run(run);
                    match self.assemble(&entries, false) {
                        Some(frame) => {
                            self.stats.frames_released += 1;
                            return Some(frame);
                        }
                        None => {
                            self.stats.groups_discarded += 1;
                        }
                    }
                }
                GroupStatus::Resolved => {
                    let entries = self.take_run(run);
                    if self.config.partial_policy == PartialFramePolicy::Release
                        && let Some(frame) = self.assemble(&entries, true)
                    {
                        self.stats.frames_released += 1;
                        return Some(frame);
                    }
                    self.stats.groups_discarded += 1;
                    debug!(
                        "Reassembler: discarded incomplete group ts={} ({} packets)",
                        entries[0].packet.header.timestamp,
                        entries.len()
                    );
                }
            }
        }
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }

    /// Packets currently buffered
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Length of the contiguous, same-timestamp run at the front of the buffer
    fn leading_run(&self) -> Option<usize> {
        let front = self.buffer.front()?;
        let ts = front.packet.header.timestamp;
        let mut expected = front.packet.header.sequence_number;

        let len = self
            .buffer
            .iter()
            .take_while(|e| {
                let ok = e.packet.header.timestamp == ts
                    && e.packet.header.sequence_number == expected;
                expected = expected.wrapping_add(1);
                ok
            })
            .count();
        Some(len)
    }

    fn group_status(&self, run: usize) -> GroupStatus {
        let first = &self.buffer[0];
        let last = &self.buffer[run - 1];
        let first_seq = first.packet.header.sequence_number;

        let has_head = self.depacketizer.is_partition_head(&first.packet.payload);
        let has_tail = self
            .depacketizer
            .is_partition_tail(last.packet.header.marker, &last.packet.payload);

        if has_head && has_tail {
            return GroupStatus::Complete;
        }

        // Missing packets right before the run could still carry the head
        let gap_before = self.cursor != Some(first_seq);
        if !has_head && !gap_before {
            return GroupStatus::Resolved;
        }

        // The run is followed by the next frame with nothing missing in
        // between, so the tail is gone for good
        if !has_tail
            && let Some(next) = self.buffer.get(run)
            && next.packet.header.sequence_number
                == last.packet.header.sequence_number.wrapping_add(1)
        {
            return GroupStatus::Resolved;
        }

        // The lookahead window opens at the first missing sequence number: the
        // head for a headless run, the packet after the run otherwise. A run
        // that is still arriving in order has no gap and keeps waiting.
        let gap_start = if has_head {
            last.packet.header.sequence_number.wrapping_add(1)
        } else {
            self.cursor.unwrap_or(first_seq)
        };
        if let Some(back) = self.buffer.back() {
            let span = back.packet.header.sequence_number.wrapping_sub(gap_start);
            if span < 0x8000 && span > self.config.max_late {
                return GroupStatus::Resolved;
            }
        }

        if let Some(max_delay) = self.config.max_delay
            && first.received_at.elapsed() > max_delay
        {
            return GroupStatus::Resolved;
        }

        GroupStatus::Waiting
    }

    fn take_run(&mut self, run: usize) -> Vec<Entry> {
        let entries: Vec<Entry> = self.buffer.drain(..run).collect();
        let first_seq = entries[0].packet.header.sequence_number;
        let last_seq = entries[run - 1].packet.header.sequence_number;

        if let Some(cursor) = self.cursor {
            let lost = first_seq.wrapping_sub(cursor);
            if lost > 0 && lost < 0x8000 {
                self.stats.packets_lost += lost as u64;
            }
        }
        self.cursor = Some(last_seq.wrapping_add(1));

        // Anything still buffered behind the new cursor can never be used
        while let Some(front) = self.buffer.front() {
            if seq_comes_after(last_seq.wrapping_add(1), front.packet.header.sequence_number) {
                self.buffer.pop_front();
                self.stats.packets_late += 1;
            } else {
                break;
            }
        }

        entries
    }

    fn assemble(&mut self, entries: &[Entry], partial: bool) -> Option<Frame> {
        let first = &entries[0].packet.header;
        let mut data = BytesMut::new();

        for entry in entries {
            match self.depacketizer.depacketize(&entry.packet.payload) {
                Ok(payload) => data.extend_from_slice(&payload),
                Err(e) => {
                    warn!(
                        "Reassembler: cannot depacketize seq {}: {}",
                        entry.packet.header.sequence_number, e
                    );
                    return None;
                }
            }
        }

        if data.is_empty() {
            return None;
        }

        Some(Frame {
            data: data.freeze(),
            timestamp: first.timestamp,
            first_sequence: first.sequence_number,
            packet_count: entries.len(),
            partial,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use webrtc::rtp::header::Header;

    /// Build one VP8 RTP packet: the first packet of a group carries the
    /// start-of-partition descriptor bit, the last one the marker.
    pub(crate) fn vp8_packet(seq: u16, ts: u32, start: bool, marker: bool, body: &[u8]) -> Packet {
        let mut payload = vec![if start { 0x10 } else { 0x00 }];
        payload.extend_from_slice(body);
        Packet {
            header: Header {
                version: 2,
                payload_type: 96,
                sequence_number: seq,
                timestamp: ts,
                marker,
                ssrc: 1,
                ..Default::default()
            },
            payload: Bytes::from(payload),
        }
    }

    /// A whole group of `count` packets with 4-byte bodies tagged by index
    fn group(first_seq: u16, ts: u32, count: u16) -> Vec<Packet> {
        (0..count)
            .map(|i| {
                vp8_packet(
                    first_seq.wrapping_add(i),
                    ts,
                    i == 0,
                    i == count - 1,
                    &[i as u8; 4],
                )
            })
            .collect()
    }

    fn drain(r: &mut FrameReassembler<Vp8Packet>) -> Vec<Frame> {
        std::iter::from_fn(|| r.pop()).collect()
    }

    #[test]
    fn test_one_frame_per_group() {
        let mut r = FrameReassembler::vp8(ReassemblerConfig::default());
        for g in 0..6u16 {
            for p in group(100 + g * 5, 3000 * g as u32, 5) {
                r.push(p);
            }
        }

        let frames = drain(&mut r);
        assert_eq!(frames.len(), 6);
        for (i, f) in frames.iter().enumerate() {
            assert_eq!(f.timestamp, 3000 * i as u32);
            assert_eq!(f.packet_count, 5);
            assert!(!f.partial);
            // 5 packets x 4 body bytes, descriptors stripped
            assert_eq!(f.data.len(), 20);
        }
        assert!(r.is_empty());
    }

    #[test]
    fn test_frame_waits_for_tail() {
        let mut r = FrameReassembler::vp8(ReassemblerConfig::default());
        let mut pkts = group(10, 90, 4);
        let tail = pkts.pop().unwrap();
        for p in pkts {
            r.push(p);
        }
        assert!(r.pop().is_none());

        r.push(tail);
        let frame = r.pop().expect("frame");
        assert_eq!(frame.packet_count, 4);
        assert!(r.pop().is_none());
    }

    #[test]
    fn test_reordered_packets() {
        let mut r = FrameReassembler::vp8(ReassemblerConfig::default());
        let mut pkts = group(500, 1, 4);
        pkts.extend(group(504, 2, 3));
        pkts.swap(1, 2);
        pkts.swap(4, 6);
        for p in pkts {
            r.push(p);
        }

        let frames = drain(&mut r);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].timestamp, 1);
        assert_eq!(frames[1].timestamp, 2);
        assert_eq!(&frames[0].data[..], &[0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3]);
    }

    #[test]
    fn test_sequence_wraparound() {
        let mut r = FrameReassembler::vp8(ReassemblerConfig::default());
        for p in group(65533, 7, 3).into_iter().chain(group(0, 8, 3)) {
            r.push(p);
        }
        let frames = drain(&mut r);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].first_sequence, 65533);
        assert_eq!(frames[1].first_sequence, 0);
    }

    #[test]
    fn test_missing_tail_discarded_once_window_passes() {
        let mut r = FrameReassembler::vp8(ReassemblerConfig::default());
        let mut first = group(2, 1, 4);
        first.pop();
        for p in group(0, 0, 2) {
            r.push(p);
        }
        assert_eq!(drain(&mut r).len(), 1);

        // seq 5 (tail of ts=1) lost; seq 4 is followed by a gap so keep waiting
        for p in first {
            r.push(p);
        }
        for p in group(6, 2, 2) {
            r.push(p);
        }
        assert!(r.pop().is_none());

        // The window closes once the stream moves far enough ahead
        for g in 0..5u16 {
            for p in group(8 + g * 4, 3 + g as u32, 4) {
                r.push(p);
            }
        }
        let frames = drain(&mut r);
        assert_eq!(frames.first().map(|f| f.timestamp), Some(2));
        assert!(frames.iter().all(|f| f.timestamp != 1));
        assert_eq!(r.stats().groups_discarded, 1);
        assert_eq!(r.stats().packets_lost, 1);
    }

    #[test]
    fn test_long_frame_released_while_arriving() {
        let mut r = FrameReassembler::vp8(ReassemblerConfig::default());
        let mut released = Vec::new();

        // 30 packets in order, popping after every push like the decode sink
        for p in group(0, 77, 30).into_iter().chain(group(30, 78, 2)) {
            r.push(p);
            released.extend(std::iter::from_fn(|| r.pop()));
        }

        assert_eq!(released.len(), 2);
        assert_eq!(released[0].timestamp, 77);
        assert_eq!(released[0].packet_count, 30);
        assert!(!released[0].partial);
        assert_eq!(released[1].timestamp, 78);
        assert_eq!(r.stats().groups_discarded, 0);
        assert_eq!(r.stats().packets_lost, 0);
    }

    #[test]
    fn test_gap_before_headed_run_does_not_close_window() {
        let mut r = FrameReassembler::vp8(ReassemblerConfig::default());
        for p in group(0, 1, 2) {
            r.push(p);
        }
        assert_eq!(drain(&mut r).len(), 1);

        // seq 2 lost, then a long frame starting at seq 3 trickles in
        let mut released = Vec::new();
        for p in group(3, 2, 25) {
            r.push(p);
            released.extend(std::iter::from_fn(|| r.pop()));
        }
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].packet_count, 25);
        assert_eq!(r.stats().packets_lost, 1);
    }

    #[test]
    fn test_headless_group_discarded() {
        let mut r = FrameReassembler::vp8(ReassemblerConfig::default());
        for p in group(0, 0, 2) {
            r.push(p);
        }
        drain(&mut r);

        // Group at ts=1 starts right at the cursor but has no head bit
        r.push(vp8_packet(2, 1, false, false, &[9; 4]));
        r.push(vp8_packet(3, 1, false, true, &[9; 4]));
        for p in group(4, 2, 2) {
            r.push(p);
        }
        let frames = drain(&mut r);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].timestamp, 2);
    }

    #[test]
    fn test_partial_release_policy() {
        let config = ReassemblerConfig {
            max_late: 4,
            partial_policy: PartialFramePolicy::Release,
            ..Default::default()
        };
        let mut r = FrameReassembler::vp8(config);
        r.push(vp8_packet(0, 1, true, false, &[1; 4]));
        r.push(vp8_packet(1, 1, false, false, &[1; 4]));
        // seq 2 lost, stream continues well past the window
        for p in group(3, 2, 3).into_iter().chain(group(6, 3, 3)) {
            r.push(p);
        }

        let frames = drain(&mut r);
        assert_eq!(frames.len(), 3);
        assert!(frames[0].partial);
        assert_eq!(frames[0].timestamp, 1);
        assert!(!frames[1].partial);
    }

    #[test]
    fn test_max_delay_resolves_stuck_group() {
        let config = ReassemblerConfig {
            max_delay: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let mut r = FrameReassembler::vp8(config);
        r.push(vp8_packet(0, 1, true, false, &[1; 4]));
        assert!(r.pop().is_none());

        std::thread::sleep(Duration::from_millis(40));
        assert!(r.pop().is_none());
        assert!(r.is_empty());
        assert_eq!(r.stats().groups_discarded, 1);
    }

    #[test]
    fn test_duplicates_and_late_packets_dropped() {
        let mut r = FrameReassembler::vp8(ReassemblerConfig::default());
        let pkts = group(40, 5, 3);
        for p in pkts.iter().cloned() {
            r.push(p);
        }
        r.push(pkts[1].clone());
        assert_eq!(r.stats().packets_duplicate, 1);

        assert_eq!(drain(&mut r).len(), 1);
        r.push(pkts[0].clone());
        assert_eq!(r.stats().packets_late, 1);
        assert!(r.is_empty());
    }
}
