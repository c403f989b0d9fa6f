//! Render target readback

use sheen_core::GpuError;

const BYTES_PER_PIXEL: u32 = 4;

/// Row pitch of a texture-to-buffer copy, aligned to `COPY_BYTES_PER_ROW_ALIGNMENT`.
pub(crate) fn padded_bytes_per_row(width: u32) -> u32 {
    (width * BYTES_PER_PIXEL).div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
        * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

/// Strip row padding from mapped copy data.
pub(crate) fn unpad_rows(padded: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pitch = padded_bytes_per_row(width) as usize;
    let row_bytes = (width * BYTES_PER_PIXEL) as usize;
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in padded.chunks(pitch).take(height as usize) {
        pixels.extend_from_slice(&row[..row_bytes]);
    }
    pixels
}

/// Copy an RGBA8 texture to CPU memory, blocking until the GPU is done.
pub(crate) fn read_texture_pixels(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, GpuError> {
    let pitch = padded_bytes_per_row(width);
    let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging Buffer"),
        size: (pitch * height) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Copy Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging_buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(pitch),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging_buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });

    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| GpuError::Readback(format!("device poll failed: {e}")))?;
    rx.recv()
        .map_err(|e| GpuError::Readback(format!("map callback dropped: {e}")))?
        .map_err(|e| GpuError::Readback(format!("buffer map failed: {e}")))?;

    let pixels = {
        let mapped = slice.get_mapped_range();
        unpad_rows(&mapped, width, height)
    };
    staging_buffer.unmap();
    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_padded_to_256() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
    }

    #[test]
    fn test_unpad_rows() {
        let width = 2;
        let pitch = padded_bytes_per_row(width) as usize;
        let mut padded = vec![0xee; pitch * 2];
        padded[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        padded[pitch..pitch + 8].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);

        let pixels = unpad_rows(&padded, width, 2);
        assert_eq!(pixels, (1..=16).collect::<Vec<u8>>());
    }
}
