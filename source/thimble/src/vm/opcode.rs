use crate::word::UCell;

// Code fields hold these discriminants as plain cells, so the mapping back
// from a cell is fallible: any value outside the table means the dictionary
// is corrupt. Discriminants start at 1 — a zeroed code field must never
// dispatch.
macro_rules! opcodes {
    ($($name:ident = $val:literal,)*) => {
        /// Every primitive operation the inner interpreter can dispatch.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Opcode {
            $($name = $val,)*
        }

        impl TryFrom<UCell> for Opcode {
            type Error = ();

            fn try_from(val: UCell) -> Result<Self, ()> {
                match val {
                    $($val => Ok(Opcode::$name),)*
                    _ => Err(()),
                }
            }
        }
    };
}

opcodes! {
    // threading
    Enter = 1,
    Exit = 2,
    Lit = 3,
    Branch = 4,
    ZeroBranch = 5,
    IncrI = 6,
    LoopBranch = 7,
    Nop = 8,

    // data stack
    Dup = 9,
    Drop = 10,
    Swap = 11,
    Over = 12,
    Rot = 13,
    TwoDup = 14,
    TwoDrop = 15,
    Nip = 16,
    Tuck = 17,

    // return stack
    ToR = 18,
    FromR = 19,
    RFetch = 20,
    LoopI = 21,
    LoopJ = 22,
    LoopK = 23,

    // arithmetic / comparison
    Add = 24,
    Sub = 25,
    Mul = 26,
    Div = 27,
    Mod = 28,
    Eq = 29,
    Ne = 30,
    Lt = 31,
    Le = 32,
    Gt = 33,
    Ge = 34,

    // compiler
    Colon = 35,
    Semicolon = 36,
    If = 37,
    Else = 38,
    Then = 39,
    Do = 40,
    QDo = 41,
    Loop = 42,
    PlusLoop = 43,
    Leave = 44,
    Unloop = 45,
    Tick = 46,
    Comma = 47,
    Here = 48,
    Immediate = 49,
    Hidden = 50,

    // i/o and misc
    Key = 51,
    Word = 52,
    Dot = 53,
    Cr = 54,
    Emit = 55,
    Words = 56,
    DumpMem = 57,
    Must = 58,
    Align = 59,
    RZero = 60,
    SZero = 61,
}

#[cfg(test)]
pub mod test {
    use super::Opcode;
    use crate::word::UCell;

    #[test]
    fn round_trip() {
        for op in [Opcode::Enter, Opcode::Exit, Opcode::Lit, Opcode::SZero] {
            assert_eq!(Opcode::try_from(op as UCell), Ok(op));
        }
    }

    #[test]
    fn unknown_cells_are_rejected() {
        assert_eq!(Opcode::try_from(0), Err(()));
        assert_eq!(Opcode::try_from(0xEEEE), Err(()));
    }
}
