// The VM's machine word. The cell width is a build-time parameter so the
// same interpreter can model a 16-, 32-, or 64-bit machine; signed and
// unsigned views share one in-arena representation.
cfg_if::cfg_if! {
    if #[cfg(feature = "cell-64")] {
        pub type Cell = i64;
        pub type UCell = u64;
    } else if #[cfg(feature = "cell-16")] {
        pub type Cell = i16;
        pub type UCell = u16;
    } else {
        pub type Cell = i32;
        pub type UCell = u32;
    }
}

/// Cell size in bytes.
pub const CELLS: UCell = core::mem::size_of::<Cell>() as UCell;

/// Round `x` up to the next cell boundary.
pub const fn aligned(x: UCell) -> UCell {
    let m = CELLS - 1;
    x.wrapping_add(m) & !m
}

#[cfg(test)]
pub mod test {
    use super::{aligned, CELLS};

    #[test]
    fn alignment() {
        assert_eq!(aligned(0), 0);
        assert_eq!(aligned(1), CELLS);
        assert_eq!(aligned(CELLS - 1), CELLS);
        assert_eq!(aligned(CELLS), CELLS);
        assert_eq!(aligned(CELLS + 1), 2 * CELLS);
    }
}
