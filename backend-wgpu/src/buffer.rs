//! Auto-growing GPU buffers
//!
//! Frame data is staged on the CPU and uploaded once per submission, so a buffer only has to grow
//! between submissions and never needs to preserve old contents.

/// Initial buffer size (64KB)
const INITIAL_BUFFER_SIZE: u64 = 64 * 1024;

/// Growth factor when buffer needs to expand (2x)
const BUFFER_GROWTH_FACTOR: u64 = 2;

/// GPU buffer that doubles when an upload does not fit
pub struct GrowableBuffer {
    buffer: wgpu::Buffer,
    usage: wgpu::BufferUsages,
    /// Current capacity in bytes
    capacity: u64,
    label: String,
}

impl GrowableBuffer {
    pub fn new(device: &wgpu::Device, usage: wgpu::BufferUsages, label: &str) -> Self {
        Self {
            buffer: create_buffer(device, usage, INITIAL_BUFFER_SIZE, label),
            usage,
            capacity: INITIAL_BUFFER_SIZE,
            label: label.to_string(),
        }
    }

    /// Replace the buffer contents with `data`, growing first if needed.
    ///
    /// Returns true if the buffer was reallocated, in which case bind groups referencing it
    /// must be rebuilt.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[u8]) -> bool {
        let grown = self.ensure_capacity(device, data.len() as u64);
        if !data.is_empty() {
            queue.write_buffer(&self.buffer, 0, data);
        }
        grown
    }

    fn ensure_capacity(&mut self, device: &wgpu::Device, required: u64) -> bool {
        let new_capacity = grown_capacity(self.capacity, required);
        if new_capacity == self.capacity {
            return false;
        }

        tracing::debug!(
            "Growing buffer '{}': {} -> {} bytes",
            self.label,
            self.capacity,
            new_capacity
        );

        self.buffer = create_buffer(device, self.usage, new_capacity, &self.label);
        self.capacity = new_capacity;
        true
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Get current capacity in bytes
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

fn create_buffer(
    device: &wgpu::Device,
    usage: wgpu::BufferUsages,
    size: u64,
    label: &str,
) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: usage | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Capacity after growing `capacity` until `required` bytes fit.
pub(crate) fn grown_capacity(capacity: u64, required: u64) -> u64 {
    let mut new_capacity = capacity.max(1);
    while new_capacity < required {
        new_capacity *= BUFFER_GROWTH_FACTOR;
    }
    new_capacity
}

/// Round `value` up to a multiple of `alignment`.
pub(crate) fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}
