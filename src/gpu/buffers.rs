//! Typed fixed-size GPU storage buffers.
//!
//! Figure vertex counts never change after construction, so these buffers
//! are sized exactly once. Contents may still be rewritten per frame
//! (channel outputs, bone transforms, child-shadow data).

use wgpu::util::DeviceExt;

/// A fixed-size storage buffer holding `count` elements of `T`.
///
/// The buffer is always created with `STORAGE | COPY_DST` so per-frame
/// `queue.write_buffer` updates work; pass extra usages (e.g. `COPY_SRC`
/// for buffers feeding a staging copy) as needed.
pub struct StructuredBuffer<T> {
    buffer: wgpu::Buffer,
    count: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: bytemuck::Pod> StructuredBuffer<T> {
    /// Zero-initialized buffer holding `count` elements.
    ///
    /// A zero `count` still allocates one element: wgpu rejects zero-sized
    /// bindings.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        count: usize,
        usage: wgpu::BufferUsages,
    ) -> Self {
        let size = (size_of::<T>() * count.max(1)) as u64;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: usage
                | wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            buffer,
            count,
            _marker: std::marker::PhantomData,
        }
    }

    /// Buffer initialized from existing data.
    ///
    /// Empty input allocates a single zeroed element (see [`Self::new`]).
    #[must_use]
    pub fn new_with_data(
        device: &wgpu::Device,
        label: &str,
        data: &[T],
        usage: wgpu::BufferUsages,
    ) -> Self {
        if data.is_empty() {
            return Self::new(device, label, 0, usage);
        }
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(data),
            usage: usage
                | wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST,
        });

        Self {
            buffer,
            count: data.len(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Overwrite buffer contents from the start. `data` must not exceed the
    /// construction-time capacity.
    pub fn write(&self, queue: &wgpu::Queue, data: &[T]) {
        debug_assert!(data.len() <= self.count.max(1));
        if !data.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(data));
        }
    }

    /// The underlying wgpu buffer, for binding or copy sources.
    #[must_use]
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Element count the buffer was sized for.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Size in bytes of the live element range.
    #[must_use]
    pub fn size_in_bytes(&self) -> u64 {
        (size_of::<T>() * self.count.max(1)) as u64
    }
}
