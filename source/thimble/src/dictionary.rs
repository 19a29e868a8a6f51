use tracing::{debug, trace};

use crate::{
    mem::Arena,
    word::{aligned, UCell, CELLS},
    Error,
};

/// Low 5 bits of the flags byte hold the name length, so names max out at 31
/// bytes.
pub const LEN_MASK: u8 = 0x1F;
pub const HIDDEN_BIT: u8 = 0x20;
pub const IMMEDIATE_BIT: u8 = 0x80;

/// Fill for the alignment gap between a name and its code field.
const PAD_BYTE: u8 = 0xEE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BumpError {
    OutOfMemory,
}

/// One resolved header, as surfaced by [`Dictionary::entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub header: UCell,
    pub link: UCell,
    pub flags: u8,
    pub name: String,
    pub cfa: UCell,
}

impl Entry {
    pub fn is_hidden(&self) -> bool {
        self.flags & HIDDEN_BIT != 0
    }

    pub fn is_immediate(&self) -> bool {
        self.flags & IMMEDIATE_BIT != 0
    }
}

/// The dictionary: a singly linked list of word headers threaded through the
/// arena, plus the bump allocator that feeds it.
///
/// `Here` and `Latest` are themselves cells in the arena; this struct only
/// remembers where they live and where the dictionary region ends. Headers
/// are append-only — flags may be toggled, but nothing is ever unlinked.
///
/// A header is laid out as
/// `link cell | flags+len byte | name bytes | NUL | pad | code cell`,
/// and the code field address is `aligned(header + CELLS + 1 + len + 1)`.
/// Creation and lookup must agree on that formula or the dictionary becomes
/// unreadable.
pub struct Dictionary {
    here_ptr: UCell,
    latest_ptr: UCell,
    limit: UCell,
}

impl Dictionary {
    pub fn new(here_ptr: UCell, latest_ptr: UCell, limit: UCell) -> Self {
        Self {
            here_ptr,
            latest_ptr,
            limit,
        }
    }

    pub fn here(&self, arena: &Arena) -> Result<UCell, Error> {
        Ok(arena.read_cell(self.here_ptr)?)
    }

    pub fn set_here(&self, arena: &mut Arena, val: UCell) -> Result<(), Error> {
        Ok(arena.write_cell(self.here_ptr, val)?)
    }

    pub fn latest(&self, arena: &Arena) -> Result<UCell, Error> {
        Ok(arena.read_cell(self.latest_ptr)?)
    }

    pub fn set_latest(&self, arena: &mut Arena, val: UCell) -> Result<(), Error> {
        Ok(arena.write_cell(self.latest_ptr, val)?)
    }

    /// Append one cell at `Here`.
    pub fn comma(&self, arena: &mut Arena, val: UCell) -> Result<(), Error> {
        let here = self.here(arena)?;
        if here + CELLS > self.limit {
            return Err(BumpError::OutOfMemory.into());
        }
        arena.write_cell(here, val)?;
        self.set_here(arena, here + CELLS)?;
        trace!(here, val, "comma");
        Ok(())
    }

    /// Create a word header named `name` whose code field holds `code`.
    /// Leaves `Here` at the data field.
    pub fn create(
        &self,
        arena: &mut Arena,
        name: &str,
        code: UCell,
        flags: u8,
    ) -> Result<(), Error> {
        let len = name.len();
        if len == 0 || len > LEN_MASK as usize {
            return Err(Error::NameTooLong);
        }

        let header = self.here(arena)?;
        let name_at = header + CELLS + 1;
        let cfa = aligned(name_at + len as UCell + 1);
        if cfa + CELLS > self.limit {
            return Err(BumpError::OutOfMemory.into());
        }

        let latest = self.latest(arena)?;
        arena.write_cell(header, latest)?;
        arena.write_byte(header + CELLS, len as u8 | flags)?;
        for (i, b) in name.bytes().enumerate() {
            arena.write_byte(name_at + i as UCell, b)?;
        }
        arena.write_byte(name_at + len as UCell, 0)?;
        let mut pad = name_at + len as UCell + 1;
        while pad < cfa {
            arena.write_byte(pad, PAD_BYTE)?;
            pad += 1;
        }
        arena.write_cell(cfa, code)?;

        self.set_here(arena, cfa + CELLS)?;
        self.set_latest(arena, header)?;
        debug!(name, header, cfa, "create");
        Ok(())
    }

    /// Find `name` (ASCII case-insensitive), newest definition first,
    /// skipping hidden entries. Returns the code field address and the flags
    /// byte.
    pub fn lookup(&self, arena: &Arena, name: &str) -> Result<Option<(UCell, u8)>, Error> {
        let mut ptr = self.latest(arena)?;
        while ptr != 0 {
            let flags = arena.read_byte(ptr + CELLS)?;
            if flags & HIDDEN_BIT == 0 && self.name_matches(arena, ptr, name)? {
                let len = (flags & LEN_MASK) as UCell;
                let cfa = aligned(ptr + CELLS + 1 + len + 1);
                return Ok(Some((cfa, flags)));
            }
            ptr = arena.read_cell(ptr)?;
        }
        Ok(None)
    }

    fn name_matches(&self, arena: &Arena, header: UCell, name: &str) -> Result<bool, Error> {
        let flags = arena.read_byte(header + CELLS)?;
        let len = (flags & LEN_MASK) as usize;
        if len != name.len() {
            return Ok(false);
        }
        for (i, b) in name.bytes().enumerate() {
            let stored = arena.read_byte(header + CELLS + 1 + i as UCell)?;
            if !stored.eq_ignore_ascii_case(&b) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// XOR the IMMEDIATE bit of the most recent definition.
    pub fn toggle_immediate(&self, arena: &mut Arena) -> Result<(), Error> {
        let latest = self.latest(arena)?;
        if latest == 0 {
            return Err(Error::WordNotInDict);
        }
        self.toggle_flag(arena, latest, IMMEDIATE_BIT)
    }

    /// XOR the HIDDEN bit of the header at `header`.
    pub fn toggle_hidden(&self, arena: &mut Arena, header: UCell) -> Result<(), Error> {
        if header == 0 {
            return Err(Error::WordNotInDict);
        }
        self.toggle_flag(arena, header, HIDDEN_BIT)
    }

    fn toggle_flag(&self, arena: &mut Arena, header: UCell, bit: u8) -> Result<(), Error> {
        let flags = arena.read_byte(header + CELLS)?;
        arena.write_byte(header + CELLS, flags ^ bit)?;
        Ok(())
    }

    /// Walk every header, newest first. Hidden entries are included; callers
    /// filter.
    pub fn entries(&self, arena: &Arena) -> Result<Vec<Entry>, Error> {
        let mut out = Vec::new();
        let mut ptr = self.latest(arena)?;
        while ptr != 0 {
            let link = arena.read_cell(ptr)?;
            let flags = arena.read_byte(ptr + CELLS)?;
            let len = (flags & LEN_MASK) as UCell;
            let mut name = String::with_capacity(len as usize);
            for i in 0..len {
                name.push(arena.read_byte(ptr + CELLS + 1 + i)? as char);
            }
            out.push(Entry {
                header: ptr,
                link,
                flags: flags & !LEN_MASK,
                name,
                cfa: aligned(ptr + CELLS + 1 + len + 1),
            });
            ptr = link;
        }
        Ok(out)
    }
}
