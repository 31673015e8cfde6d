use std::marker::PhantomData;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;

use crate::utility::aligned_size;
use crate::vulkan::context::Context;

/// Typed slot addressing for a constant buffer: slot index to byte offset,
/// with the stride rounded up to the device's minimum offset alignment.
#[derive(Debug, Clone, Copy)]
pub struct SlotTable {
    stride: vk::DeviceSize,
    len: usize,
}

impl SlotTable {
    pub fn new(element_size: vk::DeviceSize, alignment: vk::DeviceSize, len: usize) -> Self {
        Self {
            stride: aligned_size(element_size, alignment.max(1)),
            len,
        }
    }

    pub fn offset(&self, slot: usize) -> vk::DeviceSize {
        assert!(
            slot < self.len,
            "buffer slot {} out of range (capacity {})",
            slot,
            self.len
        );
        slot as vk::DeviceSize * self.stride
    }

    pub fn stride(&self) -> vk::DeviceSize {
        self.stride
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn total_size(&self) -> vk::DeviceSize {
        self.stride * self.len as vk::DeviceSize
    }
}

pub fn find_memorytype_index(
    memory_req: &vk::MemoryRequirements,
    memory_prop: &vk::PhysicalDeviceMemoryProperties,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    memory_prop.memory_types[..memory_prop.memory_type_count as usize]
        .iter()
        .enumerate()
        .find(|(index, memory_type)| {
            (memory_req.memory_type_bits & (1 << index)) != 0
                && memory_type.property_flags & flags == flags
        })
        .map(|(index, _memory_type)| index as u32)
}

fn create_buffer(
    context: &Context,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_property_flags: vk::MemoryPropertyFlags,
) -> (vk::Buffer, vk::DeviceMemory) {
    let device = &context.device;

    let create_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer =
        unsafe { device.create_buffer(&create_info, None) }.expect("Could not create buffer");

    let memory_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

    let memorytype_index = find_memorytype_index(
        &memory_requirements,
        &context.device_memory_properties,
        memory_property_flags,
    )
    .expect("Could not find memorytype for buffer");

    let allocate_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(memory_requirements.size)
        .memory_type_index(memorytype_index);

    let memory = unsafe { device.allocate_memory(&allocate_info, None) }
        .expect("Could not allocate memory for buffer");

    unsafe { device.bind_buffer_memory(buffer, memory, 0) }
        .expect("Could not bind buffer memory for buffer");

    (buffer, memory)
}

/// Host-visible, persistently mapped buffer with fixed-stride slots. One
/// lives in every frame resource for each constant/vertex stream the CPU
/// rewrites while the GPU reads an older copy.
pub struct UploadBuffer<T> {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    ptr: *mut u8,
    slots: SlotTable,
    context: Arc<Context>,
    _marker: PhantomData<T>,
}

impl<T: Pod> UploadBuffer<T> {
    /// `alignment` is the slot stride quantum: the device's
    /// minUniformBufferOffsetAlignment for uniform buffers, 1 for tightly
    /// packed vertex data.
    pub fn new(
        context: Arc<Context>,
        len: usize,
        usage: vk::BufferUsageFlags,
        alignment: vk::DeviceSize,
    ) -> Self {
        let slots = SlotTable::new(std::mem::size_of::<T>() as vk::DeviceSize, alignment, len);

        let (buffer, memory) = create_buffer(
            &context,
            slots.total_size(),
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );

        let ptr = unsafe {
            context
                .device
                .map_memory(memory, 0, slots.total_size(), vk::MemoryMapFlags::empty())
        }
        .expect("Could not map upload buffer memory") as *mut u8;

        Self {
            buffer,
            memory,
            ptr,
            slots,
            context,
            _marker: PhantomData,
        }
    }

    pub fn write(&mut self, slot: usize, value: &T) {
        let offset = self.slots.offset(slot);
        let bytes = bytemuck::bytes_of(value);
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.ptr.add(offset as usize),
                bytes.len(),
            )
        };
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn slot_offset(&self, slot: usize) -> vk::DeviceSize {
        self.slots.offset(slot)
    }

    pub fn element_size(&self) -> vk::DeviceSize {
        std::mem::size_of::<T>() as vk::DeviceSize
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

impl<T> Drop for UploadBuffer<T> {
    fn drop(&mut self) {
        let device = &self.context.device;
        unsafe { device.unmap_memory(self.memory) };
        unsafe { device.destroy_buffer(self.buffer, None) };
        unsafe { device.free_memory(self.memory, None) };
    }
}

/// Device-local buffer filled once through a staging copy at setup. All
/// static geometry lives in these.
pub struct DeviceBuffer<T> {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    len: usize,
    context: Arc<Context>,
    _marker: PhantomData<T>,
}

impl<T: Pod> DeviceBuffer<T> {
    pub fn from_data(context: Arc<Context>, data: &[T], usage: vk::BufferUsageFlags) -> Self {
        let size = std::mem::size_of_val(data) as vk::DeviceSize;
        assert!(size > 0, "device buffer must not be empty");

        let (staging_buffer, staging_memory) = create_buffer(
            &context,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );

        let staging_ptr = unsafe {
            context
                .device
                .map_memory(staging_memory, 0, size, vk::MemoryMapFlags::empty())
        }
        .expect("Could not map staging buffer memory") as *mut u8;
        let bytes: &[u8] = bytemuck::cast_slice(data);
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), staging_ptr, bytes.len()) };
        unsafe { context.device.unmap_memory(staging_memory) };

        let (buffer, memory) = create_buffer(
            &context,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        );

        context.one_time_submit(|device, command_buffer| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe {
                device.cmd_copy_buffer(
                    command_buffer,
                    staging_buffer,
                    buffer,
                    std::slice::from_ref(&region),
                )
            };
        });

        unsafe { context.device.destroy_buffer(staging_buffer, None) };
        unsafe { context.device.free_memory(staging_memory, None) };

        Self {
            buffer,
            memory,
            len: data.len(),
            context,
            _marker: PhantomData,
        }
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl<T> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        let device = &self.context.device;
        unsafe { device.destroy_buffer(self.buffer, None) };
        unsafe { device.free_memory(self.memory, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_stride_rounds_up_to_alignment() {
        let table = SlotTable::new(96, 256, 8);
        assert_eq!(table.stride(), 256);
        assert_eq!(table.offset(0), 0);
        assert_eq!(table.offset(3), 768);
        assert_eq!(table.total_size(), 2048);
    }

    #[test]
    fn already_aligned_element_keeps_its_size() {
        let table = SlotTable::new(128, 64, 4);
        assert_eq!(table.stride(), 128);
        assert_eq!(table.offset(2), 256);
    }

    #[test]
    fn unit_alignment_packs_tightly() {
        let table = SlotTable::new(36, 1, 10);
        assert_eq!(table.stride(), 36);
        assert_eq!(table.offset(5), 180);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_slot_panics() {
        let table = SlotTable::new(64, 256, 4);
        table.offset(4);
    }
}
