//! Minimal OLE2 compound file writer holding a single stream
//!
//! The stream is stored in regular 512-byte sectors, so it must be at least
//! [`MINI_STREAM_CUTOFF`] bytes long; shorter payloads are zero-padded.
//!
//! Sector layout: stream sectors, one directory sector, FAT sectors, then
//! DIFAT sectors when more than 109 FAT sectors are needed.

use std::io::Write;

use crate::error::Result;

const MAGIC: &[u8; 8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const SECTOR_SIZE: usize = 512;
const IDS_PER_SECTOR: usize = SECTOR_SIZE / 4;
const HEADER_DIFAT_SLOTS: usize = 109;

/// Streams below this size would belong in the mini stream
pub const MINI_STREAM_CUTOFF: usize = 4096;

const DIFSECT: u32 = 0xFFFF_FFFC;
const FATSECT: u32 = 0xFFFF_FFFD;
const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
const FREESECT: u32 = 0xFFFF_FFFF;
const NOSTREAM: u32 = 0xFFFF_FFFF;

const STGTY_STREAM: u8 = 2;
const STGTY_ROOT: u8 = 5;

struct Layout {
    stream_sectors: usize,
    fat_sectors: usize,
    difat_sectors: usize,
}

impl Layout {
    fn compute(stream_len: usize) -> Self {
        let stream_sectors = stream_len.div_ceil(SECTOR_SIZE);
        let mut fat_sectors = 1;
        let mut difat_sectors = 0;
        loop {
            let total = stream_sectors + 1 + fat_sectors + difat_sectors;
            let needed_fat = total.div_ceil(IDS_PER_SECTOR);
            let needed_difat = needed_fat
                .saturating_sub(HEADER_DIFAT_SLOTS)
                .div_ceil(IDS_PER_SECTOR - 1);
            if needed_fat == fat_sectors && needed_difat == difat_sectors {
                break;
            }
            fat_sectors = needed_fat;
            difat_sectors = needed_difat;
        }
        Layout {
            stream_sectors,
            fat_sectors,
            difat_sectors,
        }
    }

    fn dir_sector(&self) -> u32 {
        self.stream_sectors as u32
    }

    fn first_fat_sector(&self) -> u32 {
        self.dir_sector() + 1
    }

    fn first_difat_sector(&self) -> u32 {
        self.first_fat_sector() + self.fat_sectors as u32
    }
}

fn directory_entry(
    name: &str,
    entry_type: u8,
    child: u32,
    start_sector: u32,
    size: u64,
) -> [u8; 128] {
    let mut data = [0u8; 128];
    let utf16: Vec<u16> = name.encode_utf16().take(31).collect();
    for (i, unit) in utf16.iter().enumerate() {
        data[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
    }
    if !utf16.is_empty() {
        let name_len_bytes = ((utf16.len() + 1) * 2) as u16;
        data[64..66].copy_from_slice(&name_len_bytes.to_le_bytes());
    }
    data[66] = entry_type;
    data[67] = 1; // black
    data[68..72].copy_from_slice(&NOSTREAM.to_le_bytes());
    data[72..76].copy_from_slice(&NOSTREAM.to_le_bytes());
    data[76..80].copy_from_slice(&child.to_le_bytes());
    data[116..120].copy_from_slice(&start_sector.to_le_bytes());
    data[120..128].copy_from_slice(&size.to_le_bytes());
    data
}

/// Write a compound file containing one root-level stream named `name`
pub fn write_single_stream<W: Write>(writer: &mut W, name: &str, stream: &[u8]) -> Result<()> {
    let mut payload = stream.to_vec();
    if payload.len() < MINI_STREAM_CUTOFF {
        payload.resize(MINI_STREAM_CUTOFF, 0);
    }
    let layout = Layout::compute(payload.len());

    let fat_ids: Vec<u32> =
        (0..layout.fat_sectors as u32).map(|i| layout.first_fat_sector() + i).collect();

    // Header
    let mut header = [0u8; SECTOR_SIZE];
    header[0..8].copy_from_slice(MAGIC);
    header[24..26].copy_from_slice(&0x003Eu16.to_le_bytes());
    header[26..28].copy_from_slice(&3u16.to_le_bytes());
    header[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
    header[30..32].copy_from_slice(&9u16.to_le_bytes());
    header[32..34].copy_from_slice(&6u16.to_le_bytes());
    header[44..48].copy_from_slice(&(layout.fat_sectors as u32).to_le_bytes());
    header[48..52].copy_from_slice(&layout.dir_sector().to_le_bytes());
    header[56..60].copy_from_slice(&(MINI_STREAM_CUTOFF as u32).to_le_bytes());
    header[60..64].copy_from_slice(&ENDOFCHAIN.to_le_bytes());
    let first_difat = if layout.difat_sectors > 0 {
        layout.first_difat_sector()
    } else {
        ENDOFCHAIN
    };
    header[68..72].copy_from_slice(&first_difat.to_le_bytes());
    header[72..76].copy_from_slice(&(layout.difat_sectors as u32).to_le_bytes());
    for slot in 0..HEADER_DIFAT_SLOTS {
        let id = fat_ids.get(slot).copied().unwrap_or(FREESECT);
        let offset = 76 + slot * 4;
        header[offset..offset + 4].copy_from_slice(&id.to_le_bytes());
    }
    writer.write_all(&header)?;

    // Stream sectors
    writer.write_all(&payload)?;
    let padding = layout.stream_sectors * SECTOR_SIZE - payload.len();
    writer.write_all(&vec![0u8; padding])?;

    // Directory sector
    let mut directory = Vec::with_capacity(SECTOR_SIZE);
    directory.extend_from_slice(&directory_entry("Root Entry", STGTY_ROOT, 1, ENDOFCHAIN, 0));
    directory.extend_from_slice(&directory_entry(
        name,
        STGTY_STREAM,
        NOSTREAM,
        0,
        payload.len() as u64,
    ));
    while directory.len() < SECTOR_SIZE {
        directory.extend_from_slice(&directory_entry("", 0, NOSTREAM, 0, 0));
    }
    writer.write_all(&directory)?;

    // FAT
    let mut fat = vec![FREESECT; layout.fat_sectors * IDS_PER_SECTOR];
    for i in 0..layout.stream_sectors {
        fat[i] = if i + 1 == layout.stream_sectors {
            ENDOFCHAIN
        } else {
            (i + 1) as u32
        };
    }
    fat[layout.dir_sector() as usize] = ENDOFCHAIN;
    for id in &fat_ids {
        fat[*id as usize] = FATSECT;
    }
    for i in 0..layout.difat_sectors {
        fat[layout.first_difat_sector() as usize + i] = DIFSECT;
    }
    for id in &fat {
        writer.write_all(&id.to_le_bytes())?;
    }

    // DIFAT chain for FAT sectors beyond the header's 109 slots
    let overflow = fat_ids.get(HEADER_DIFAT_SLOTS..).unwrap_or(&[]);
    for i in 0..layout.difat_sectors {
        let start = i * (IDS_PER_SECTOR - 1);
        for slot in 0..IDS_PER_SECTOR - 1 {
            let id = overflow.get(start + slot).copied().unwrap_or(FREESECT);
            writer.write_all(&id.to_le_bytes())?;
        }
        let next = if i + 1 == layout.difat_sectors {
            ENDOFCHAIN
        } else {
            layout.first_difat_sector() + i as u32 + 1
        };
        writer.write_all(&next.to_le_bytes())?;
    }

    Ok(())
}
