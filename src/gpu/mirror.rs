#![cfg(feature = "gpu")]

//! Host to GPU buffer mirroring for container columns.
//!
//! A [`StoreMirror`] owns one storage buffer per mirrored array: the range
//! offsets, the per-slot validity mask, the particle-id column, and every
//! attribute column. Buffers are recreated when a rebuild changes capacity.
//!
//! Upload and download are the only boundary operations; kernels in between
//! see a stable element-grouped layout.

use std::borrow::Cow;

use crate::core::chunked::ChunkedStore;
use crate::core::error::GpuError;
use crate::core::packed::PackedStore;
use crate::core::rebuild::ParticleStore;
use crate::core::types::{AttributeId, ElementId, SlotId};
use crate::gpu::GpuContext;

/// Describes one bindable storage buffer of a mirror.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpuBindingDesc {
    /// Whether the binding is read-only (storage read) or read-write
    /// (storage read_write).
    pub read_only: bool,
}

impl GpuBindingDesc {
    /// Compact key for pipeline-cache hashing.
    #[inline]
    pub fn key(self) -> u8 {
        if self.read_only {
            1
        } else {
            2
        }
    }
}

/// Containers that can be mirrored onto the device.
///
/// Supplies the two index arrays kernels need alongside the columns. The
/// packed layout derives its mask on the fly (every slot is occupied); the
/// chunked layout borrows both arrays from its committed generation.
pub trait MirrorSource: ParticleStore {
    /// Range offsets, one entry per range plus the total.
    fn range_offsets(&self) -> Cow<'_, [SlotId]>;

    /// Owning element per slot, `SENTINEL` for padding lanes.
    fn slot_mask(&self) -> Cow<'_, [ElementId]>;
}

impl MirrorSource for PackedStore {
    fn range_offsets(&self) -> Cow<'_, [SlotId]> {
        Cow::Borrowed(self.offsets())
    }

    fn slot_mask(&self) -> Cow<'_, [ElementId]> {
        Cow::Owned(
            (0..self.capacity() as SlotId)
                .map(|slot| self.element_of_slot(slot))
                .collect(),
        )
    }
}

impl MirrorSource for ChunkedStore {
    fn range_offsets(&self) -> Cow<'_, [SlotId]> {
        Cow::Borrowed(self.offsets())
    }

    fn slot_mask(&self) -> Cow<'_, [ElementId]> {
        Cow::Borrowed(self.slot_elements())
    }
}

struct BufferSlot {
    buffer: wgpu::Buffer,
    len_bytes: u64,
}

/// Device-resident copy of one container's storage.
///
/// ## Synchronization model
/// * `mark_cpu_dirty` after host-side writes, then [`upload_from`].
/// * `mark_pending_download` after device-side writes, then
///   [`download_to`].
///
/// Both transfer methods clear their flag. Offsets and the validity mask
/// are read-only on the device and are never downloaded.
///
/// [`upload_from`]: StoreMirror::upload_from
/// [`download_to`]: StoreMirror::download_to
pub struct StoreMirror {
    offsets: BufferSlot,
    mask: BufferSlot,
    ids: BufferSlot,
    columns: Vec<(AttributeId, BufferSlot)>,
    cpu_dirty: bool,
    pending_download: bool,
}

fn create_slot(ctx: &GpuContext, label: &str, len_bytes: u64) -> BufferSlot {
    BufferSlot {
        buffer: ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: len_bytes.max(4),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        }),
        len_bytes,
    }
}

fn write_slot(
    ctx: &GpuContext,
    slot: &mut BufferSlot,
    label: &str,
    bytes: &[u8],
) -> Result<(), GpuError> {
    if bytes.len() % 4 != 0 {
        return Err(GpuError {
            message: format!(
                "{label}: byte length {} is not 4-aligned; only 4-byte-multiple \
                 element types can be mirrored",
                bytes.len()
            ),
        });
    }
    if slot.len_bytes != bytes.len() as u64 {
        *slot = create_slot(ctx, label, bytes.len() as u64);
    }
    if !bytes.is_empty() {
        ctx.queue.write_buffer(&slot.buffer, 0, bytes);
    }
    Ok(())
}

fn read_slot(ctx: &GpuContext, slot: &BufferSlot, label: &str) -> Result<Vec<u8>, GpuError> {
    if slot.len_bytes == 0 {
        return Ok(Vec::new());
    }
    let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: slot.len_bytes,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("mirror readback"),
        });
    encoder.copy_buffer_to_buffer(&slot.buffer, 0, &staging, 0, slot.len_bytes);
    ctx.queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = ctx.device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|_| GpuError {
            message: format!("{label}: readback channel closed"),
        })?
        .map_err(|e| GpuError {
            message: format!("{label}: buffer mapping failed: {e:?}"),
        })?;

    let data = slice.get_mapped_range().to_vec();
    staging.unmap();
    Ok(data)
}

impl StoreMirror {
    /// Creates device buffers for every mirrored array and uploads the
    /// container's current state.
    pub fn create<S: MirrorSource>(ctx: &GpuContext, src: &S) -> Result<Self, GpuError> {
        let mut mirror = Self {
            offsets: create_slot(ctx, "mirror offsets", 0),
            mask: create_slot(ctx, "mirror slot mask", 0),
            ids: create_slot(ctx, "mirror ids", 0),
            columns: src
                .data()
                .iter_columns()
                .map(|(id, _)| (id, create_slot(ctx, "mirror attribute", 0)))
                .collect(),
            cpu_dirty: true,
            pending_download: false,
        };
        mirror.upload_from(ctx, src)?;
        Ok(mirror)
    }

    /// Flags host-side data as newer than the device copy.
    #[inline]
    pub fn mark_cpu_dirty(&mut self) {
        self.cpu_dirty = true;
    }

    /// Flags device-side data as newer than the host copy.
    #[inline]
    pub fn mark_pending_download(&mut self) {
        self.pending_download = true;
    }

    /// Returns `true` if host-side data has not been uploaded yet.
    #[inline]
    pub fn is_cpu_dirty(&self) -> bool {
        self.cpu_dirty
    }

    /// Returns `true` if device-side data has not been read back yet.
    #[inline]
    pub fn is_pending_download(&self) -> bool {
        self.pending_download
    }

    /// Uploads offsets, mask, ids, and every attribute column from `src`,
    /// recreating buffers whose capacity changed. Clears the dirty flag.
    pub fn upload_from<S: MirrorSource>(
        &mut self,
        ctx: &GpuContext,
        src: &S,
    ) -> Result<(), GpuError> {
        let offsets = src.range_offsets();
        let mask = src.slot_mask();
        write_slot(
            ctx,
            &mut self.offsets,
            "mirror offsets",
            bytemuck::cast_slice(offsets.as_ref()),
        )?;
        write_slot(
            ctx,
            &mut self.mask,
            "mirror slot mask",
            bytemuck::cast_slice(mask.as_ref()),
        )?;
        write_slot(
            ctx,
            &mut self.ids,
            "mirror ids",
            bytemuck::cast_slice(src.data().ids()),
        )?;

        for ((mirror_id, slot), (col_id, col)) in
            self.columns.iter_mut().zip(src.data().iter_columns())
        {
            if *mirror_id != col_id {
                return Err(GpuError {
                    message: format!(
                        "mirror schema mismatch: attribute {mirror_id} vs {col_id}"
                    ),
                });
            }
            write_slot(ctx, slot, col.element_type_name(), col.bytes())?;
        }
        self.cpu_dirty = false;
        Ok(())
    }

    /// Reads ids and attribute columns back into `dst`'s host storage.
    /// Clears the pending-download flag.
    ///
    /// Capacity must not have changed since the last upload; a rebuild
    /// invalidates the device copy and requires a fresh upload instead.
    pub fn download_to<S: MirrorSource>(
        &mut self,
        ctx: &GpuContext,
        dst: &mut S,
    ) -> Result<(), GpuError> {
        let id_bytes = read_slot(ctx, &self.ids, "mirror ids")?;
        {
            let dst_bytes: &mut [u8] = bytemuck::cast_slice_mut(dst.data_mut().ids_mut());
            if dst_bytes.len() != id_bytes.len() {
                return Err(GpuError {
                    message: "mirror capacity does not match container".to_string(),
                });
            }
            dst_bytes.copy_from_slice(&id_bytes);
        }

        for ((mirror_id, slot), (col_id, col)) in
            self.columns.iter().zip(dst.data_mut().iter_columns_mut())
        {
            if *mirror_id != col_id {
                return Err(GpuError {
                    message: format!(
                        "mirror schema mismatch: attribute {mirror_id} vs {col_id}"
                    ),
                });
            }
            let bytes = read_slot(ctx, slot, col.element_type_name())?;
            let dst_bytes = col.bytes_mut();
            if dst_bytes.len() != bytes.len() {
                return Err(GpuError {
                    message: "mirror capacity does not match container".to_string(),
                });
            }
            dst_bytes.copy_from_slice(&bytes);
        }
        self.pending_download = false;
        Ok(())
    }

    /// Binding contract, in buffer order: offsets, mask, ids, attributes.
    pub fn bindings(&self) -> Vec<GpuBindingDesc> {
        let mut out = vec![
            GpuBindingDesc { read_only: true },
            GpuBindingDesc { read_only: true },
            GpuBindingDesc { read_only: false },
        ];
        out.extend(
            self.columns
                .iter()
                .map(|_| GpuBindingDesc { read_only: false }),
        );
        out
    }

    /// Appends bind group entries for every mirrored buffer starting at
    /// binding index `base`.
    pub fn encode_bind_group_entries<'a>(
        &'a self,
        base: u32,
        out: &mut Vec<wgpu::BindGroupEntry<'a>>,
    ) {
        let buffers = [&self.offsets, &self.mask, &self.ids]
            .into_iter()
            .chain(self.columns.iter().map(|(_, slot)| slot));
        for (i, slot) in buffers.enumerate() {
            out.push(wgpu::BindGroupEntry {
                binding: base + i as u32,
                resource: slot.buffer.as_entire_binding(),
            });
        }
    }
}
