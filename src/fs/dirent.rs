//! The dirent cache. FAT32 has no inode numbers, so a dirent's identity is
//! synthesized from (parent cache slot, byte offset within the parent's
//! directory data) instead.

use alloc::string::String;

use crate::fs::fat32::{self, ShortEntry, ATTR_DIRECTORY, ATTR_LONG_NAME, EMPTY_ENTRY,
    END_OF_ENTRY};
use crate::fs::{FsError, InodeType, Stat};
use crate::param::{BSIZE, ENTRY_CACHE_NUM, FAT32_MAX_FILENAME};
use crate::proc::{self, Channel};
use crate::sleeplock::SleepLock;
use crate::spinlock::SpinLock;

/// Sentinel index meaning "no parent" (the root directory).
const NIL: usize = usize::MAX;

struct Slot {
    valid: bool,
    ref_count: usize,
    parent: usize,
    off: u32,
    prev: usize,
    next: usize,
}

impl Slot {
    const fn empty() -> Self {
        Self {
            valid: false,
            ref_count: 0,
            parent: NIL,
            off: 0,
            prev: 0,
            next: 0,
        }
    }
}

/// Mutable, sleeplock-guarded per-entry state.
pub struct Data {
    pub filename: String,
    pub attribute: u8,
    pub first_clus: u32,
    pub file_size: u32,
    pub cur_clus: u32,
    pub clus_cnt: u32,
    pub dev: usize,
    pub dirty: bool,
}

impl Data {
    const fn empty() -> Self {
        Self {
            filename: String::new(),
            attribute: 0,
            first_clus: 0,
            file_size: 0,
            cur_clus: 0,
            clus_cnt: 0,
            dev: 0,
            dirty: false,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.attribute & ATTR_DIRECTORY != 0
    }
}

/// Sentinel slot index used as the head/tail anchor of the LRU ring.
const SENTINEL: usize = ENTRY_CACHE_NUM;
/// The root directory always lives in slot 0 and is never evicted.
const ROOT: usize = 0;

pub struct Table {
    slots: [Slot; ENTRY_CACHE_NUM + 1],
}

impl Table {
    const fn new() -> Self {
        let mut slots = [const { Slot::empty() }; ENTRY_CACHE_NUM + 1];
        let mut i = 0;
        while i < ENTRY_CACHE_NUM {
            slots[i].prev = if i == 0 { SENTINEL } else { i - 1 };
            slots[i].next = if i + 1 == ENTRY_CACHE_NUM { SENTINEL } else { i + 1 };
            i += 1;
        }
        slots[SENTINEL].next = 0;
        slots[SENTINEL].prev = ENTRY_CACHE_NUM - 1;
        Self { slots }
    }

    fn unlink(&mut self, id: usize) {
        let prev = self.slots[id].prev;
        let next = self.slots[id].next;
        self.slots[prev].next = next;
        self.slots[next].prev = prev;
    }

    fn push_front(&mut self, id: usize) {
        let first = self.slots[SENTINEL].next;
        self.slots[id].next = first;
        self.slots[id].prev = SENTINEL;
        self.slots[first].prev = id;
        self.slots[SENTINEL].next = id;
    }

    fn touch(&mut self, id: usize) {
        if id == ROOT {
            return;
        }
        self.unlink(id);
        self.push_front(id);
    }

    fn find(&self, parent: usize, off: u32) -> Option<usize> {
        for i in 0..ENTRY_CACHE_NUM {
            if self.slots[i].valid && self.slots[i].parent == parent && self.slots[i].off == off {
                return Some(i);
            }
        }
        None
    }

    fn find_victim(&self) -> Option<usize> {
        let mut cur = self.slots[SENTINEL].prev;
        while cur != SENTINEL {
            if cur != ROOT && self.slots[cur].ref_count == 0 {
                return Some(cur);
            }
            cur = self.slots[cur].prev;
        }
        None
    }
}

pub static TABLE: SpinLock<Table> = SpinLock::new(Table::new(), "dirent_table");
pub static DATA: [SleepLock<Data>; ENTRY_CACHE_NUM] =
    [const { SleepLock::new(Data::empty(), "dirent") }; ENTRY_CACHE_NUM];

/// A handle into the dirent cache. Cheap to copy; does not itself own a
/// reference count bump (use `dup`/`put` explicitly, matching the rest of
/// this kernel's refcounted handles).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dirent {
    id: usize,
}

/// Sets up the pinned root directory entry. Called once at mount time.
///
/// # Safety
/// Must run after `fat32::mount`.
pub unsafe fn init_root(dev: usize) {
    let mut table = TABLE.lock();
    table.slots[ROOT].valid = true;
    table.slots[ROOT].ref_count = 1;
    table.slots[ROOT].parent = NIL;
    table.slots[ROOT].off = 0;
    drop(table);

    let mut data = DATA[ROOT].lock();
    data.filename = String::from("/");
    data.attribute = fat32::ATTR_DIRECTORY;
    data.first_clus = fat32::root_cluster();
    data.file_size = 0;
    data.cur_clus = data.first_clus;
    data.clus_cnt = 0;
    data.dev = dev;
    data.dirty = false;
}

pub fn root() -> Dirent {
    Dirent { id: ROOT }
}

impl Dirent {
    /// Finds or creates the cached handle identified by `(parent, off)`.
    /// `init` is only consulted on a cache miss (a fresh rebind).
    fn eget(parent: Dirent, off: u32, init: impl FnOnce(&mut Data)) -> Result<Dirent, FsError> {
        let mut table = TABLE.lock();

        if let Some(id) = table.find(parent.id, off) {
            table.slots[id].ref_count += 1;
            table.touch(id);
            return Ok(Dirent { id });
        }

        let id = table.find_victim().ok_or(FsError::CacheFull)?;
        // Snapshot the slot being evicted before overwriting its identity:
        // a dirty entry needs its old (parent, off) to flush correctly, and
        // its hold on that parent needs to be released.
        let evicted_parent = if table.slots[id].valid { table.slots[id].parent } else { NIL };
        let evicted = if evicted_parent != NIL {
            let dirty = unsafe { DATA[id].get_mut_unchecked().dirty };
            dirty.then_some((evicted_parent, table.slots[id].off))
        } else {
            None
        };
        table.slots[id].valid = false;
        table.slots[id].ref_count = 1;
        table.slots[id].parent = parent.id;
        table.slots[id].off = off;
        table.touch(id);
        drop(table);

        if let Some((old_parent, old_off)) = evicted {
            eupdate_at(Dirent { id: old_parent }, old_off, id);
        }
        if evicted_parent != NIL {
            Dirent { id: evicted_parent }.put();
        }

        let mut data = DATA[id].lock();
        init(&mut data);
        drop(data);

        table = TABLE.lock();
        table.slots[id].valid = true;
        drop(table);

        parent.dup();
        Ok(Dirent { id })
    }

    /// Increments the reference count and returns a handle to the same
    /// entry.
    pub fn dup(&self) -> Dirent {
        let mut table = TABLE.lock();
        table.slots[self.id].ref_count += 1;
        *self
    }

    /// Decrements the reference count; on the drop to zero, flushes dirty
    /// metadata and releases this entry's hold on its parent.
    pub fn put(self) {
        let mut table = TABLE.lock();
        assert!(table.slots[self.id].ref_count >= 1, "eput: not held");
        table.slots[self.id].ref_count -= 1;

        if table.slots[self.id].ref_count > 0 || self.id == ROOT {
            return;
        }

        let parent = table.slots[self.id].parent;
        let off = table.slots[self.id].off;
        drop(table);

        let dirty = DATA[self.id].lock().dirty;
        if dirty && parent != NIL {
            eupdate_at(Dirent { id: parent }, off, self.id);
        }

        if parent != NIL {
            Dirent { id: parent }.put();
        }
    }

    pub fn lock(&self) -> crate::sleeplock::SleepLockGuard<'static, Data> {
        DATA[self.id].lock()
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT
    }

    pub fn parent(&self) -> Option<Dirent> {
        let table = TABLE.lock();
        let p = table.slots[self.id].parent;
        if p == NIL {
            None
        } else {
            Some(Dirent { id: p })
        }
    }

    pub fn off(&self) -> u32 {
        TABLE.lock().slots[self.id].off
    }

    pub fn stat(&self) -> Stat {
        let data = self.lock();
        let s = Stat {
            dev: data.dev as u32,
            ino: synthetic_ino(self.id),
            r#type: if data.is_dir() {
                InodeType::Directory
            } else {
                InodeType::File
            },
            nlink: 1,
            size: data.file_size as u64,
        };
        s
    }

    /// Writes this entry's dirty metadata back to its parent directory.
    pub fn update(&self) {
        let (parent, off) = {
            let table = TABLE.lock();
            (table.slots[self.id].parent, table.slots[self.id].off)
        };
        if parent == NIL {
            return;
        }
        eupdate_at(Dirent { id: parent }, off, self.id);
        self.lock().dirty = false;
    }

    /// Frees every cluster but the first and resets the size to zero.
    pub fn trunc(&self) {
        let mut data = self.lock();
        fat32::free_chain_after_first(data.first_clus);
        data.file_size = 0;
        data.cur_clus = data.first_clus;
        data.clus_cnt = 0;
        data.dirty = true;
    }

    /// Marks the on-disk slot empty and frees this entry's cluster chain.
    pub fn remove(&self) {
        let (parent, off, first_clus) = {
            let data = self.lock();
            let table = TABLE.lock();
            (table.slots[self.id].parent, table.slots[self.id].off, data.first_clus)
        };
        if parent != NIL {
            write_marker(Dirent { id: parent }, off, EMPTY_ENTRY);
        }
        if first_clus != 0 {
            fat32::free_chain(first_clus);
        }
        let mut table = TABLE.lock();
        table.slots[self.id].valid = false;
    }

    /// Reads up to `dst.len()` bytes starting at `offset`, clamped to the
    /// entry's recorded size. Returns the number of bytes actually read.
    pub fn read(&self, offset: u32, dst: &mut [u8]) -> Result<usize, FsError> {
        let mut data = self.lock();
        let size = data.file_size;
        if offset >= size {
            return Ok(0);
        }
        let n = dst.len().min((size - offset) as usize);
        read_at(&mut data, offset, &mut dst[..n]);
        Ok(n)
    }

    /// Writes `src` at `offset`, extending the chain and size as needed.
    pub fn write(&self, offset: u32, src: &[u8]) -> Result<usize, FsError> {
        let mut data = self.lock();
        write_at(&mut data, offset, src)?;
        if offset + src.len() as u32 > data.file_size {
            data.file_size = offset + src.len() as u32;
        }
        data.dirty = true;
        Ok(src.len())
    }
}

fn synthetic_ino(id: usize) -> u32 {
    let table = TABLE.lock();
    let slot = &table.slots[id];
    // Combines the parent slot and offset so the value is unique among
    // currently-live entries; it is not stable across a remount.
    (slot.parent as u32).wrapping_mul(2654435761).wrapping_add(slot.off)
}

fn cluster_offset(data: &Data, byte_offset: u32) -> (u32, u32) {
    let cluster_size = fat32::bytes_per_cluster() as u32;
    let cluster_index = byte_offset / cluster_size;
    let within = byte_offset % cluster_size;
    let mut cluster = data.first_clus;
    for _ in 0..cluster_index {
        cluster = fat32::next_cluster(cluster).unwrap_or(cluster);
    }
    (cluster, within)
}

fn read_at(data: &mut Data, offset: u32, dst: &mut [u8]) {
    let mut off = offset;
    let mut written = 0usize;
    while written < dst.len() {
        let (cluster, within) = cluster_offset(data, off);
        let sector_in_cluster = within / BSIZE as u32;
        let byte_in_sector = (within % BSIZE as u32) as usize;

        let mut sector = [0u8; BSIZE];
        fat32::read_sector(cluster, sector_in_cluster, &mut sector);

        let n = (BSIZE - byte_in_sector).min(dst.len() - written);
        dst[written..written + n].copy_from_slice(&sector[byte_in_sector..byte_in_sector + n]);

        written += n;
        off += n as u32;
    }
}

fn write_at(data: &mut Data, offset: u32, src: &[u8]) -> Result<(), FsError> {
    let cluster_size = fat32::bytes_per_cluster() as u32;
    let mut off = offset;
    let mut written = 0usize;

    while written < src.len() {
        while off >= ((count_clusters(data.first_clus)) * cluster_size) {
            let tail = last_cluster(data.first_clus);
            fat32::extend_chain(tail)?;
        }

        let (cluster, within) = cluster_offset(data, off);
        let sector_in_cluster = within / BSIZE as u32;
        let byte_in_sector = (within % BSIZE as u32) as usize;

        let mut sector = [0u8; BSIZE];
        fat32::read_sector(cluster, sector_in_cluster, &mut sector);

        let n = (BSIZE - byte_in_sector).min(src.len() - written);
        sector[byte_in_sector..byte_in_sector + n].copy_from_slice(&src[written..written + n]);
        fat32::write_sector(cluster, sector_in_cluster, &sector);

        written += n;
        off += n as u32;
    }
    Ok(())
}

fn count_clusters(start: u32) -> u32 {
    let mut n = 1;
    let mut cur = start;
    while let Some(next) = fat32::next_cluster(cur) {
        cur = next;
        n += 1;
    }
    n
}

fn last_cluster(start: u32) -> u32 {
    let mut cur = start;
    while let Some(next) = fat32::next_cluster(cur) {
        cur = next;
    }
    cur
}

/// Reads the raw 32-byte record at `off` within `dir`'s data.
fn read_record(dir: &Dirent, off: u32) -> [u8; 32] {
    let mut buf = [0u8; 32];
    let data = dir.lock();
    let mut data = data;
    read_at(&mut data, off, &mut buf);
    buf
}

fn write_record(dir: &Dirent, off: u32, record: &[u8; 32]) {
    let mut data = dir.lock();
    let _ = write_at(&mut data, off, record);
}

fn write_marker(dir: Dirent, off: u32, marker: u8) {
    let mut record = read_record(&dir, off);
    record[0] = marker;
    write_record(&dir, off, &record);
}

fn eupdate_at(parent: Dirent, off: u32, id: usize) {
    let data = DATA[id].lock();
    let (short, _) = fat32::format_short_name(&data.filename);
    let mut entry = ShortEntry::from_bytes(&read_record(&parent, off));
    entry.name = short;
    entry.attr = data.attribute;
    entry.set_first_cluster(data.first_clus);
    entry.file_size = data.file_size;
    write_record(&parent, off, &entry.as_bytes());
}

/// Looks up `name` in directory `dp`, returning the cached child and
/// writing its record offset to `*poff`.
pub fn dirlookup(dp: &Dirent, name: &str) -> Result<(Dirent, u32), FsError> {
    let mut off = 0u32;
    let dir_size = dp.lock().file_size;

    let mut long_name = String::new();
    while off < dir_size || dir_size == 0 {
        let record = read_record(dp, off);
        if record[0] == END_OF_ENTRY {
            break;
        }
        if record[0] == EMPTY_ENTRY {
            long_name.clear();
            off += 32;
            continue;
        }

        if record[11] == ATTR_LONG_NAME {
            let lfn = fat32::LongEntry::from_bytes(&record);
            let mut chunk = String::new();
            lfn.append_chars(&mut chunk);
            long_name = alloc::format!("{chunk}{long_name}");
            off += 32;
            continue;
        }

        let short = ShortEntry::from_bytes(&record);
        let entry_name = if long_name.is_empty() {
            short_name_to_string(&short.name)
        } else {
            long_name.clone()
        };
        long_name.clear();

        if entry_name.eq_ignore_ascii_case(name) {
            let child = Dirent::eget(*dp, off, |d| {
                d.filename = entry_name.clone();
                d.attribute = short.attr;
                d.first_clus = short.first_cluster();
                d.file_size = short.file_size;
                d.cur_clus = d.first_clus;
                d.clus_cnt = 0;
                d.dev = dp.lock().dev;
                d.dirty = false;
            })?;
            return Ok((child, off));
        }

        off += 32;
        if dir_size == 0 && off > 64 * 1024 {
            break; // growable directory cluster chain exhausted without a match
        }
    }

    Err(FsError::NotFound)
}

fn short_name_to_string(raw: &[u8; 11]) -> String {
    let base = core::str::from_utf8(&raw[0..8]).unwrap_or("").trim_end();
    let ext = core::str::from_utf8(&raw[8..11]).unwrap_or("").trim_end();
    if ext.is_empty() {
        String::from(base)
    } else {
        alloc::format!("{base}.{ext}")
    }
}

/// Finds a free run of records in `dp` large enough for `name`'s long-name
/// chain plus its short entry, and returns its offset.
fn find_free_run(dp: &Dirent, needed: usize) -> Result<u32, FsError> {
    let mut off = 0u32;
    let mut run = 0usize;
    let mut run_start = 0u32;

    loop {
        let record = read_record(dp, off);
        if record[0] == EMPTY_ENTRY || record[0] == END_OF_ENTRY {
            if run == 0 {
                run_start = off;
            }
            run += 1;
            if run >= needed {
                return Ok(run_start);
            }
            if record[0] == END_OF_ENTRY {
                // extend the directory with a fresh cluster of empty slots
                let mut data = dp.lock();
                fat32::extend_chain(last_cluster(data.first_clus))?;
                data.file_size += fat32::bytes_per_cluster() as u32;
            }
        } else {
            run = 0;
        }
        off += 32;
    }
}

/// Writes `name`'s directory record(s) at `off` within `dp`.
pub fn emake(dp: &Dirent, off: u32, name: &str, attr: u8, first_clus: u32) {
    let (short, fits) = fat32::format_short_name(name);
    let mut entry = ShortEntry {
        name: short,
        attr,
        ntres: 0,
        crt_time_tenth: 0,
        crt_time: 0,
        crt_date: 0,
        lst_acc_date: 0,
        fst_clus_hi: 0,
        wrt_time: 0,
        wrt_date: 0,
        fst_clus_lo: 0,
        file_size: 0,
    };
    entry.set_first_cluster(first_clus);

    let mut write_off = off;
    if !fits {
        for lfn in fat32::build_long_entries(name, &entry) {
            write_record(dp, write_off, &lfn.as_bytes());
            write_off += 32;
        }
    }
    write_record(dp, write_off, &entry.as_bytes());
}

/// Allocates a fresh dirent named `name` inside directory `dp`.
pub fn ealloc(dp: &Dirent, name: &str, attr: u8) -> Result<Dirent, FsError> {
    if name.len() > FAT32_MAX_FILENAME {
        return Err(FsError::NameTooLong);
    }
    if dirlookup(dp, name).is_ok() {
        return Err(FsError::Exists);
    }

    let needed = if fat32::format_short_name(name).1 {
        1
    } else {
        fat32::long_entry_count(name) + 1
    };
    let off = find_free_run(dp, needed)?;

    let first_clus = fat32::alloc_cluster()?;
    emake(dp, off, name, attr, first_clus);

    if attr & ATTR_DIRECTORY != 0 {
        // seed `.` and `..`
        let dot = ShortEntry {
            name: *b".          ",
            attr: ATTR_DIRECTORY,
            ntres: 0,
            crt_time_tenth: 0,
            crt_time: 0,
            crt_date: 0,
            lst_acc_date: 0,
            fst_clus_hi: 0,
            wrt_time: 0,
            wrt_date: 0,
            fst_clus_lo: 0,
            file_size: 0,
        };
        let mut dot = dot;
        dot.set_first_cluster(first_clus);
        fat32::write_sector(first_clus, 0, &{
            let mut s = [0u8; BSIZE];
            s[0..32].copy_from_slice(&dot.as_bytes());
            let mut dotdot = dot;
            dotdot.name = *b"..         ";
            dotdot.set_first_cluster(dp.lock().first_clus);
            s[32..64].copy_from_slice(&dotdot.as_bytes());
            s
        });
    }

    let (child, _) = dirlookup(dp, name)?;
    Ok(child)
}

/// Moves an entry's on-disk record from its current (parent, off) to a new
/// one under `new_parent`, preserving the in-memory dirent's identity.
pub fn erename(entry: Dirent, new_parent: Dirent, new_name: &str) -> Result<(), FsError> {
    if is_ancestor(entry, new_parent) {
        return Err(FsError::InvalidRename);
    }
    if dirlookup(&new_parent, new_name).is_ok() {
        return Err(FsError::Exists);
    }

    let (old_parent, old_off, attr, first_clus) = {
        let data = entry.lock();
        let table = TABLE.lock();
        (
            table.slots[entry.id].parent,
            table.slots[entry.id].off,
            data.attribute,
            data.first_clus,
        )
    };

    let needed = if fat32::format_short_name(new_name).1 {
        1
    } else {
        fat32::long_entry_count(new_name) + 1
    };
    let new_off = find_free_run(&new_parent, needed)?;
    emake(&new_parent, new_off, new_name, attr, first_clus);

    if old_parent != NIL {
        write_marker(Dirent { id: old_parent }, old_off, EMPTY_ENTRY);
    }

    new_parent.dup();
    let mut table = TABLE.lock();
    table.slots[entry.id].parent = new_parent.id;
    table.slots[entry.id].off = new_off;
    drop(table);

    if old_parent != NIL {
        Dirent { id: old_parent }.put();
    }

    entry.lock().filename = String::from(new_name);
    Ok(())
}

fn is_ancestor(maybe_ancestor: Dirent, mut node: Dirent) -> bool {
    loop {
        if node == maybe_ancestor {
            return true;
        }
        match node.parent() {
            Some(p) => node = p,
            None => return false,
        }
    }
}

/// Yields the next directory entry at or after `off` as
/// `(name, record_offset, bytes_consumed)`. Returns `None` at the end of
/// the directory.
pub fn enext(dp: &Dirent, mut off: u32) -> Option<(String, u32, u32)> {
    let dir_size = dp.lock().file_size;
    let mut long_name = String::new();
    let mut consumed = 0u32;

    loop {
        if dir_size != 0 && off >= dir_size {
            return None;
        }
        let record = read_record(dp, off);
        consumed += 32;
        if record[0] == END_OF_ENTRY {
            return None;
        }
        if record[0] == EMPTY_ENTRY {
            long_name.clear();
            off += 32;
            continue;
        }
        if record[11] == ATTR_LONG_NAME {
            let lfn = fat32::LongEntry::from_bytes(&record);
            let mut chunk = String::new();
            lfn.append_chars(&mut chunk);
            long_name = alloc::format!("{chunk}{long_name}");
            off += 32;
            continue;
        }

        let short = ShortEntry::from_bytes(&record);
        let name = if long_name.is_empty() {
            short_name_to_string(&short.name)
        } else {
            long_name
        };
        return Some((name, off, consumed));
    }
}

pub fn sleep_on_eviction() {
    // Callers that hit `FsError::CacheFull` can block here and retry once
    // another user of the cache calls `put`.
    proc::sleep(Channel::Dirent(0), TABLE.lock());
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Occupies every non-root slot with a distinct `(parent, off)` identity,
    /// mimicking what a run of cache misses would leave behind.
    fn fill(table: &mut Table) {
        for i in 0..ENTRY_CACHE_NUM {
            table.slots[i].valid = true;
            table.slots[i].ref_count = 0;
            table.slots[i].parent = i + 1000;
            table.slots[i].off = i as u32;
        }
    }

    #[test]
    fn find_matches_exact_parent_and_offset_only() {
        let mut table = Table::new();
        fill(&mut table);

        assert_eq!(table.find(1000, 0), Some(0));
        assert_eq!(table.find(1005, 5), Some(5));
        // Same parent, wrong offset: no match.
        assert_eq!(table.find(1005, 6), None);
        // Right offset, wrong parent: no match.
        assert_eq!(table.find(1006, 5), None);
    }

    #[test]
    fn touch_moves_a_slot_to_the_front_and_find_victim_picks_the_tail() {
        let mut table = Table::new();
        fill(&mut table);

        // Touch every non-root slot except 7, so 7 is the only one left
        // sitting at the LRU tail.
        for i in 1..ENTRY_CACHE_NUM {
            if i != 7 {
                table.touch(i);
            }
        }

        assert_eq!(table.find_victim(), Some(7));
    }

    #[test]
    fn find_victim_never_picks_root_even_when_it_is_the_only_candidate() {
        let mut table = Table::new();
        table.slots[ROOT].valid = true;
        table.slots[ROOT].ref_count = 0;
        table.slots[ROOT].parent = NIL;

        assert_eq!(table.find_victim(), None);
    }

    #[test]
    fn find_victim_skips_slots_with_outstanding_references() {
        let mut table = Table::new();
        fill(&mut table);

        // Same as the LRU-tail test: 7 is the only slot left at the tail.
        for i in 1..ENTRY_CACHE_NUM {
            if i != 7 {
                table.touch(i);
            }
        }
        // It would otherwise be the victim, but it's still in use.
        table.slots[7].ref_count = 1;

        let victim = table.find_victim().expect("a free slot exists");
        assert_ne!(victim, 7);
        assert_ne!(victim, ROOT);
    }

    #[test]
    fn eviction_drops_the_old_identity_and_installs_the_new_one() {
        let mut table = Table::new();
        fill(&mut table);
        for i in 1..ENTRY_CACHE_NUM {
            if i != 7 {
                table.touch(i);
            }
        }

        let victim = table.find_victim().expect("slot 7 is free");
        assert_eq!(victim, 7);

        // What `Dirent::eget` does to the victim slot on a cache miss:
        // rebind it to the new identity, same physical slot.
        table.slots[victim].valid = false;
        table.slots[victim].ref_count = 1;
        table.slots[victim].parent = 2000;
        table.slots[victim].off = 99;
        table.touch(victim);
        table.slots[victim].valid = true;

        assert_eq!(table.find(1007, 7), None);
        assert_eq!(table.find(2000, 99), Some(victim));
    }

    #[test]
    fn rename_rebinds_identity_in_place_without_moving_the_slot() {
        let mut table = Table::new();
        fill(&mut table);

        let id = table.find(1010, 10).expect("slot 10 is present");

        // What `erename` does: overwrite the slot's (parent, off) in place.
        table.slots[id].parent = 5000;
        table.slots[id].off = 42;

        assert_eq!(table.find(1010, 10), None);
        assert_eq!(table.find(5000, 42), Some(id));
    }
}
