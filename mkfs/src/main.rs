//! Host-side builder for a FAT32 disk image seeded with the init binary.
//! Used by integration tests to produce a fixture without needing a real
//! FAT32 toolchain on the test machine.

use std::env::args;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;

use bytemuck::{Pod, Zeroable};

const BYTES_PER_SECTOR: u32 = 512;
const SECTORS_PER_CLUSTER: u32 = 1;
const RESERVED_SECTORS: u32 = 32;
const NUM_FATS: u32 = 2;
const SECTORS_PER_FAT: u32 = 256;
/// 4 MiB image: enough room for init plus headroom for tests that append files.
const TOTAL_SECTORS: u32 = 8192;
const ROOT_CLUSTER: u32 = 2;

const FAT_START: u32 = RESERVED_SECTORS;
const DATA_START: u32 = FAT_START + NUM_FATS * SECTORS_PER_FAT;

const FAT32_EOC: u32 = 0x0fff_fff8;
const ATTR_ARCHIVE: u8 = 0x20;

/// One 32-byte short-name (8.3) directory record, byte-identical to the
/// kernel's `fs::fat32::ShortEntry`.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ShortEntry {
    name: [u8; 11],
    attr: u8,
    ntres: u8,
    crt_time_tenth: u8,
    crt_time: u16,
    crt_date: u16,
    lst_acc_date: u16,
    fst_clus_hi: u16,
    wrt_time: u16,
    wrt_date: u16,
    fst_clus_lo: u16,
    file_size: u32,
}

impl ShortEntry {
    fn set_first_cluster(&mut self, cluster: u32) {
        self.fst_clus_hi = (cluster >> 16) as u16;
        self.fst_clus_lo = cluster as u16;
    }
}

fn main() {
    let args = args().collect::<Vec<String>>();

    if args.len() < 3 {
        println!("Usage: mkfs <fs.img> <init-binary>");
        std::process::exit(1);
    }

    let init_bin = std::fs::read(&args[2]).expect("failed to read init binary");

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&args[1])
        .expect("failed to open image file");

    println!(
        "fat32: {TOTAL_SECTORS} sectors, {BYTES_PER_SECTOR} bytes/sector, \
         {SECTORS_PER_CLUSTER} sectors/cluster, root at cluster {ROOT_CLUSTER}"
    );

    let zeros = [0u8; BYTES_PER_SECTOR as usize];
    for i in 0..TOTAL_SECTORS {
        write_sector(&file, i, &zeros);
    }

    write_bpb(&file);

    // FAT[0]/FAT[1] carry the media descriptor and a reserved EOC marker by
    // convention; the root directory occupies cluster 2 from the start.
    write_fat_entry(&file, 0, 0x0fff_fff8);
    write_fat_entry(&file, 1, 0x0fff_ffff);
    write_fat_entry(&file, ROOT_CLUSTER, FAT32_EOC);

    let cluster_bytes = (SECTORS_PER_CLUSTER * BYTES_PER_SECTOR) as usize;
    let clusters_needed = init_bin.len().div_ceil(cluster_bytes).max(1);

    let first_data_cluster = ROOT_CLUSTER + 1;
    let mut cluster = first_data_cluster;
    for i in 0..clusters_needed {
        let next = if i + 1 == clusters_needed {
            FAT32_EOC
        } else {
            cluster + 1
        };
        write_fat_entry(&file, cluster, next);

        let start = i * cluster_bytes;
        let end = (start + cluster_bytes).min(init_bin.len());
        let mut buf = [0u8; BYTES_PER_SECTOR as usize];
        buf[..end - start].copy_from_slice(&init_bin[start..end]);
        write_sector(&file, cluster_to_sector(cluster), &buf);

        cluster += 1;
    }

    let mut entry = ShortEntry::zeroed();
    entry.name.copy_from_slice(b"INIT       ");
    entry.attr = ATTR_ARCHIVE;
    entry.set_first_cluster(first_data_cluster);
    entry.file_size = init_bin.len() as u32;

    let mut root = [0u8; BYTES_PER_SECTOR as usize];
    root[..32].copy_from_slice(bytemuck::bytes_of(&entry));
    write_sector(&file, cluster_to_sector(ROOT_CLUSTER), &root);

    println!(
        "wrote init ({} bytes, {} cluster(s) starting at {})",
        init_bin.len(),
        clusters_needed,
        first_data_cluster
    );
}

fn write_bpb(file: &File) {
    let mut boot = [0u8; BYTES_PER_SECTOR as usize];

    boot[0..3].copy_from_slice(&[0xeb, 0x58, 0x90]);
    boot[3..11].copy_from_slice(b"MKFS0.0 ");
    boot[11..13].copy_from_slice(&(BYTES_PER_SECTOR as u16).to_le_bytes());
    boot[13] = SECTORS_PER_CLUSTER as u8;
    boot[14..16].copy_from_slice(&(RESERVED_SECTORS as u16).to_le_bytes());
    boot[16] = NUM_FATS as u8;
    // root_entry_count (17..19) and total_sectors16 (19..21) stay 0: FAT32
    // has no fixed-size root directory and always uses the 32-bit field.
    boot[21] = 0xf8; // media descriptor, fixed disk
    boot[32..36].copy_from_slice(&TOTAL_SECTORS.to_le_bytes());
    boot[36..40].copy_from_slice(&SECTORS_PER_FAT.to_le_bytes());
    boot[44..48].copy_from_slice(&ROOT_CLUSTER.to_le_bytes());
    boot[48..50].copy_from_slice(&1u16.to_le_bytes()); // fsinfo sector
    boot[50..52].copy_from_slice(&6u16.to_le_bytes()); // backup boot sector
    boot[64] = 0x80; // drive number
    boot[66] = 0x29; // extended boot signature present
    boot[67..71].copy_from_slice(&0x1234_5678u32.to_le_bytes());
    boot[71..82].copy_from_slice(b"NO NAME    ");
    boot[82..90].copy_from_slice(b"FAT32   ");
    boot[510] = 0x55;
    boot[511] = 0xaa;

    write_sector(file, 0, &boot);
}

fn cluster_to_sector(cluster: u32) -> u32 {
    DATA_START + (cluster - ROOT_CLUSTER) * SECTORS_PER_CLUSTER
}

fn fat_entry_location(cluster: u32) -> (u32, u32) {
    let offset = cluster * 4;
    (
        FAT_START + offset / BYTES_PER_SECTOR,
        offset % BYTES_PER_SECTOR,
    )
}

fn write_fat_entry(file: &File, cluster: u32, value: u32) {
    let (sector_offset, idx) = fat_entry_location(cluster);
    let bytes = (value & 0x0fff_ffff).to_le_bytes();
    for fat in 0..NUM_FATS {
        let mut buf = [0u8; BYTES_PER_SECTOR as usize];
        let sector = fat * SECTORS_PER_FAT + sector_offset;
        read_sector(file, sector, &mut buf);
        buf[idx as usize..idx as usize + 4].copy_from_slice(&bytes);
        write_sector(file, sector, &buf);
    }
}

fn write_sector(file: &File, sector: u32, buf: &[u8; BYTES_PER_SECTOR as usize]) {
    file.write_at(buf, (sector * BYTES_PER_SECTOR) as u64)
        .expect("failed to write sector");
}

fn read_sector(file: &File, sector: u32, buf: &mut [u8; BYTES_PER_SECTOR as usize]) {
    file.read_at(buf, (sector * BYTES_PER_SECTOR) as u64)
        .expect("failed to read sector");
}
