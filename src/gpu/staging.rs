//! Round-robin staging buffers for non-blocking GPU→CPU readback.
//!
//! A [`StagingRing`] owns a small set of `MAP_READ` buffers (two by
//! default). Each frame the producer copies a storage buffer into the next
//! free slot; one-plus frames later the consumer maps the oldest completed
//! slot and materializes its contents. The issuing thread never waits on
//! the GPU: mapping is polled, not blocked on, and a slot whose map is
//! still outstanding simply skips that frame's copy.

use std::sync::mpsc;

/// Per-slot readback state.
enum SlotState {
    /// Free for the next staging copy.
    Idle,
    /// A copy into this slot has been recorded; map not yet requested.
    CopyQueued,
    /// `map_async` issued; completion arrives on the channel.
    Mapping(mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>),
}

struct Slot {
    buffer: wgpu::Buffer,
    state: SlotState,
    /// Sequence number of the copy occupying this slot.
    seq: u64,
}

/// A ring of staging buffers cycling GPU→CPU copies of `T` records.
pub struct StagingRing<T> {
    slots: Vec<Slot>,
    write_index: usize,
    item_count: usize,
    next_seq: u64,
    last_returned_seq: u64,
    _marker: std::marker::PhantomData<T>,
}

impl<T: bytemuck::Pod> StagingRing<T> {
    /// Create a ring of `slot_count` staging buffers, each sized for
    /// `item_count` elements of `T`.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        item_count: usize,
        slot_count: usize,
    ) -> Self {
        let size = (size_of::<T>() * item_count.max(1)) as u64;
        let slots = (0..slot_count.max(2))
            .map(|i| Slot {
                buffer: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("{label} Staging {i}")),
                    size,
                    usage: wgpu::BufferUsages::COPY_DST
                        | wgpu::BufferUsages::MAP_READ,
                    mapped_at_creation: false,
                }),
                state: SlotState::Idle,
                seq: 0,
            })
            .collect();

        Self {
            slots,
            write_index: 0,
            item_count,
            next_seq: 1,
            last_returned_seq: 0,
            _marker: std::marker::PhantomData,
        }
    }

    /// Record a copy of `src` into the next free slot.
    ///
    /// Returns `false` (and records nothing) when every slot is still
    /// occupied by an outstanding map: the readback side is more than
    /// `slot_count` frames behind and this frame's snapshot is dropped
    /// rather than stalling the command stream.
    pub fn copy_from(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        src: &wgpu::Buffer,
    ) -> bool {
        let size = self.size_in_bytes();
        let slot_count = self.slots.len();
        for probe in 0..slot_count {
            let index = (self.write_index + probe) % slot_count;
            if matches!(self.slots[index].state, SlotState::Idle) {
                encoder.copy_buffer_to_buffer(
                    src,
                    0,
                    &self.slots[index].buffer,
                    0,
                    size,
                );
                self.slots[index].state = SlotState::CopyQueued;
                self.slots[index].seq = self.next_seq;
                self.next_seq += 1;
                self.write_index = (index + 1) % slot_count;
                return true;
            }
        }
        log::trace!("staging ring saturated; dropping this frame's copy");
        false
    }

    /// Drive outstanding maps and return the newest completed snapshot,
    /// if any.
    ///
    /// Must be called after the copies recorded by [`Self::copy_from`]
    /// have been submitted. Non-blocking: issues `map_async` for queued
    /// copies, polls the device once, and harvests whatever has finished.
    /// Older completed snapshots superseded by a newer one are discarded.
    pub fn resolve(&mut self, device: &wgpu::Device) -> Option<Vec<T>> {
        let size = self.size_in_bytes();

        // Kick off maps for copies submitted since the last resolve.
        for slot in &mut self.slots {
            if matches!(slot.state, SlotState::CopyQueued) {
                let (sender, receiver) = mpsc::channel();
                slot.buffer.slice(..size).map_async(
                    wgpu::MapMode::Read,
                    move |result| {
                        let _ = sender.send(result);
                    },
                );
                slot.state = SlotState::Mapping(receiver);
            }
        }

        let _ = device.poll(wgpu::PollType::Poll);

        // Find the newest completed slot; release the rest.
        enum Harvest {
            Done,
            Pending,
            Failed,
        }
        let mut newest: Option<usize> = None;
        for index in 0..self.slots.len() {
            let outcome = match &self.slots[index].state {
                SlotState::Mapping(receiver) => match receiver.try_recv() {
                    Ok(Ok(())) => Harvest::Done,
                    Ok(Err(e)) => {
                        log::warn!("staging map failed: {e}");
                        Harvest::Failed
                    }
                    Err(mpsc::TryRecvError::Empty) => Harvest::Pending,
                    Err(mpsc::TryRecvError::Disconnected) => Harvest::Failed,
                },
                _ => Harvest::Pending,
            };
            match outcome {
                Harvest::Pending => {}
                Harvest::Failed => {
                    // Map never took effect; the buffer is not mapped.
                    self.slots[index].state = SlotState::Idle;
                }
                Harvest::Done => match newest {
                    Some(best)
                        if self.slots[best].seq >= self.slots[index].seq =>
                    {
                        self.release(index);
                    }
                    Some(best) => {
                        self.release(best);
                        newest = Some(index);
                    }
                    None => newest = Some(index),
                },
            }
        }

        let index = newest?;
        if self.slots[index].seq <= self.last_returned_seq {
            // A straggler that completed after a newer snapshot was already
            // returned. Discard to keep readback monotonic.
            self.release(index);
            return None;
        }

        let data = {
            let view = self.slots[index].buffer.slice(..size).get_mapped_range();
            bytemuck::cast_slice::<u8, T>(&view).to_vec()
        };
        self.last_returned_seq = self.slots[index].seq;
        self.release(index);
        Some(data)
    }

    /// Number of elements each slot holds.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /// Number of backing staging buffers.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn size_in_bytes(&self) -> u64 {
        (size_of::<T>() * self.item_count.max(1)) as u64
    }

    fn release(&mut self, index: usize) {
        self.slots[index].buffer.unmap();
        self.slots[index].state = SlotState::Idle;
    }
}
