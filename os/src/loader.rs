//! Loading user programs into an address space
//!
//! A [`ProgramImage`] is an already parsed executable: an entry point plus
//! the segments to place in memory. Parsing an on-disk format is left to
//! whoever builds the image.

use crate::error::Errno;
use crate::mm::{AddressSpace, FrameAllocator, MapPermission, VirtAddr};
use log::debug;

/// One loadable segment.
#[derive(Clone, Debug)]
pub struct Segment {
    /// Virtual address of the first byte.
    pub vaddr: VirtAddr,
    /// Bytes of memory the segment occupies; the part past `data` is zero.
    pub mem_size: usize,
    /// Initialized contents.
    pub data: Vec<u8>,
    pub perm: MapPermission,
}

/// An executable ready to be loaded.
#[derive(Clone, Debug)]
pub struct ProgramImage {
    pub name: String,
    pub entry: VirtAddr,
    pub segments: Vec<Segment>,
}

impl ProgramImage {
    pub fn new(name: &str, entry: VirtAddr) -> Self {
        Self {
            name: name.to_owned(),
            entry,
            segments: Vec::new(),
        }
    }

    /// Add a segment of `mem_size` bytes at `vaddr` starting with `data`.
    pub fn segment(
        mut self,
        vaddr: VirtAddr,
        mem_size: usize,
        data: &[u8],
        perm: MapPermission,
    ) -> Self {
        self.segments.push(Segment {
            vaddr,
            mem_size,
            data: data.to_vec(),
            perm,
        });
        self
    }
}

/// Build a fresh address space holding `image`.
///
/// On error every frame taken so far has been returned.
pub fn load_program(image: &ProgramImage, frames: &FrameAllocator) -> Result<AddressSpace, Errno> {
    let mut space = AddressSpace::new();
    if let Err(e) = populate(&mut space, image, frames) {
        space.destroy(frames);
        return Err(e);
    }
    space.complete_load();
    debug!("loaded {} with entry {:?}", image.name, image.entry);
    Ok(space)
}

fn populate(
    space: &mut AddressSpace,
    image: &ProgramImage,
    frames: &FrameAllocator,
) -> Result<(), Errno> {
    for segment in &image.segments {
        if segment.data.len() > segment.mem_size {
            return Err(Errno::EINVAL);
        }
        space.define_region(segment.vaddr, segment.mem_size, segment.perm)?;
    }
    space.prepare_load(frames)?;
    for segment in &image.segments {
        space.copy_out(frames.ram(), segment.vaddr, &segment.data)?;
    }
    Ok(())
}
