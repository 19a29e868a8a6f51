use core::fmt::Write;

use crate::{
    dictionary::IMMEDIATE_BIT,
    output::OutputError,
    vm::{opcode::Opcode, Forth},
    word::{aligned, Cell, UCell, CELLS},
    Error,
};

pub(crate) struct CoreWord {
    pub name: &'static str,
    pub op: Opcode,
    pub flags: u8,
}

macro_rules! core_word {
    ($name:literal, $op:ident) => {
        CoreWord {
            name: $name,
            op: Opcode::$op,
            flags: 0,
        }
    };
    ($name:literal, $op:ident, immediate) => {
        CoreWord {
            name: $name,
            op: Opcode::$op,
            flags: IMMEDIATE_BIT,
        }
    };
}

/// Every built-in word, installed into the dictionary at startup in this
/// order. Compile-only words are IMMEDIATE so they run while compiling.
pub(crate) const CORE_WORDS: &[CoreWord] = &[
    core_word!("(enter)", Enter),
    core_word!("(exit)", Exit),
    core_word!("(lit)", Lit),
    core_word!("branch", Branch),
    core_word!("0branch", ZeroBranch),
    core_word!("(incr-i)", IncrI),
    core_word!("(loop)", LoopBranch),
    core_word!("nop", Nop),
    core_word!("dup", Dup),
    core_word!("drop", Drop),
    core_word!("swap", Swap),
    core_word!("over", Over),
    core_word!("rot", Rot),
    core_word!("2dup", TwoDup),
    core_word!("2drop", TwoDrop),
    core_word!("nip", Nip),
    core_word!("tuck", Tuck),
    core_word!(">r", ToR),
    core_word!("r>", FromR),
    core_word!("r@", RFetch),
    core_word!("i", LoopI),
    core_word!("j", LoopJ),
    core_word!("k", LoopK),
    core_word!("+", Add),
    core_word!("-", Sub),
    core_word!("*", Mul),
    core_word!("/", Div),
    core_word!("mod", Mod),
    core_word!("=", Eq),
    core_word!("!=", Ne),
    core_word!("<", Lt),
    core_word!("<=", Le),
    core_word!(">", Gt),
    core_word!(">=", Ge),
    core_word!(":", Colon),
    core_word!(";", Semicolon, immediate),
    core_word!("if", If, immediate),
    core_word!("else", Else, immediate),
    core_word!("then", Then, immediate),
    core_word!("do", Do, immediate),
    core_word!("?do", QDo, immediate),
    core_word!("loop", Loop, immediate),
    core_word!("+loop", PlusLoop, immediate),
    core_word!("leave", Leave, immediate),
    core_word!("unloop", Unloop, immediate),
    core_word!("'", Tick),
    core_word!(",", Comma),
    core_word!("here", Here),
    core_word!("immediate", Immediate, immediate),
    core_word!("hidden", Hidden),
    core_word!("key", Key),
    core_word!("word", Word),
    core_word!(".", Dot),
    core_word!("cr", Cr),
    core_word!("emit", Emit),
    core_word!("words", Words),
    core_word!("dumpmem", DumpMem),
    core_word!("must", Must),
    core_word!("align", Align),
    core_word!("r0", RZero),
    core_word!("s0", SZero),
];

/// Runtime primitives. Compile-time (IMMEDIATE) control-flow words live with
/// the outer interpreter in `vm/mod.rs`.
impl Forth {
    // --- threading ---

    pub(crate) fn enter(&mut self) -> Result<(), Error> {
        self.return_stack.push(&mut self.arena, self.ip)?;
        self.ip = self.w;
        Ok(())
    }

    pub(crate) fn exit(&mut self) -> Result<(), Error> {
        self.ip = self.return_stack.pop(&self.arena)?;
        Ok(())
    }

    /// Push the cell following Ip in the token stream and skip it.
    pub(crate) fn lit(&mut self) -> Result<(), Error> {
        let val = self.arena.read_cell(self.ip)?;
        self.data_stack.push(&mut self.arena, val)?;
        self.ip += CELLS;
        Ok(())
    }

    /// Add the offset cell at Ip to Ip.
    pub(crate) fn branch(&mut self) -> Result<(), Error> {
        let offset = self.arena.read_cell(self.ip)?;
        self.ip = self.ip.wrapping_add(offset);
        Ok(())
    }

    pub(crate) fn zero_branch(&mut self) -> Result<(), Error> {
        let flag = self.data_stack.pop(&self.arena)?;
        if flag == 0 {
            self.branch()
        } else {
            self.ip += CELLS;
            Ok(())
        }
    }

    /// Increment the loop index on top of the return stack.
    pub(crate) fn incr_i(&mut self) -> Result<(), Error> {
        let index = self.return_stack.peek(&self.arena, 0)?;
        self.return_stack
            .poke(&mut self.arena, 0, index.wrapping_add(1))
    }

    /// Compare index against limit: branch back while they differ, otherwise
    /// drop both loop cells and fall through.
    pub(crate) fn loop_branch(&mut self) -> Result<(), Error> {
        let index = self.return_stack.peek(&self.arena, 0)?;
        let limit = self.return_stack.peek(&self.arena, 1)?;
        if index != limit {
            self.branch()
        } else {
            self.ip += CELLS;
            self.return_stack.pop(&self.arena)?;
            self.return_stack.pop(&self.arena)?;
            Ok(())
        }
    }

    // --- data stack ---

    pub(crate) fn dup(&mut self) -> Result<(), Error> {
        let top = self.data_stack.peek(&self.arena, 0)?;
        self.data_stack.push(&mut self.arena, top)
    }

    pub(crate) fn drop_top(&mut self) -> Result<(), Error> {
        self.data_stack.pop(&self.arena)?;
        Ok(())
    }

    pub(crate) fn swap(&mut self) -> Result<(), Error> {
        let a = self.data_stack.peek(&self.arena, 0)?;
        let b = self.data_stack.peek(&self.arena, 1)?;
        self.data_stack.poke(&mut self.arena, 0, b)?;
        self.data_stack.poke(&mut self.arena, 1, a)
    }

    pub(crate) fn over(&mut self) -> Result<(), Error> {
        let second = self.data_stack.peek(&self.arena, 1)?;
        self.data_stack.push(&mut self.arena, second)
    }

    pub(crate) fn rot(&mut self) -> Result<(), Error> {
        let c = self.data_stack.peek(&self.arena, 0)?;
        let b = self.data_stack.peek(&self.arena, 1)?;
        let a = self.data_stack.peek(&self.arena, 2)?;
        self.data_stack.poke(&mut self.arena, 0, a)?;
        self.data_stack.poke(&mut self.arena, 1, c)?;
        self.data_stack.poke(&mut self.arena, 2, b)
    }

    pub(crate) fn two_dup(&mut self) -> Result<(), Error> {
        let b = self.data_stack.peek(&self.arena, 0)?;
        let a = self.data_stack.peek(&self.arena, 1)?;
        self.data_stack.push(&mut self.arena, a)?;
        self.data_stack.push(&mut self.arena, b)
    }

    pub(crate) fn two_drop(&mut self) -> Result<(), Error> {
        self.data_stack.pop(&self.arena)?;
        self.data_stack.pop(&self.arena)?;
        Ok(())
    }

    pub(crate) fn nip(&mut self) -> Result<(), Error> {
        let top = self.data_stack.peek(&self.arena, 0)?;
        self.data_stack.drop_poke(&mut self.arena, top)
    }

    pub(crate) fn tuck(&mut self) -> Result<(), Error> {
        let b = self.data_stack.peek(&self.arena, 0)?;
        let a = self.data_stack.peek(&self.arena, 1)?;
        self.data_stack.poke(&mut self.arena, 0, a)?;
        self.data_stack.poke(&mut self.arena, 1, b)?;
        self.data_stack.push(&mut self.arena, b)
    }

    // --- return stack ---

    pub(crate) fn to_r(&mut self) -> Result<(), Error> {
        let val = self.data_stack.pop(&self.arena)?;
        self.return_stack.push(&mut self.arena, val)
    }

    pub(crate) fn from_r(&mut self) -> Result<(), Error> {
        let val = self.return_stack.pop(&self.arena)?;
        self.data_stack.push(&mut self.arena, val)
    }

    pub(crate) fn r_fetch(&mut self) -> Result<(), Error> {
        let val = self.return_stack.peek(&self.arena, 0)?;
        self.data_stack.push(&mut self.arena, val)
    }

    // Loop indices sit at fixed return stack offsets: the innermost pair is
    // (index, limit) at 0/1, the next one out at 2/3, and so on.

    pub(crate) fn loop_i(&mut self) -> Result<(), Error> {
        let val = self.return_stack.peek(&self.arena, 0)?;
        self.data_stack.push(&mut self.arena, val)
    }

    pub(crate) fn loop_j(&mut self) -> Result<(), Error> {
        let val = self.return_stack.peek(&self.arena, 2)?;
        self.data_stack.push(&mut self.arena, val)
    }

    pub(crate) fn loop_k(&mut self) -> Result<(), Error> {
        let val = self.return_stack.peek(&self.arena, 4)?;
        self.data_stack.push(&mut self.arena, val)
    }

    // --- arithmetic / comparison ---
    //
    // Binary operators take ( a b -- a<op>b ): the top of stack is the right
    // operand. Results truncate to the configured cell width.

    fn binary_op(&mut self, f: impl FnOnce(Cell, Cell) -> Result<Cell, Error>) -> Result<(), Error> {
        let b = self.data_stack.peek(&self.arena, 0)? as Cell;
        let a = self.data_stack.peek(&self.arena, 1)? as Cell;
        let res = f(a, b)?;
        self.data_stack.drop_poke(&mut self.arena, res as UCell)
    }

    fn compare(&mut self, f: impl FnOnce(Cell, Cell) -> bool) -> Result<(), Error> {
        self.binary_op(|a, b| Ok(if f(a, b) { -1 } else { 0 }))
    }

    pub(crate) fn add(&mut self) -> Result<(), Error> {
        self.binary_op(|a, b| Ok(a.wrapping_add(b)))
    }

    pub(crate) fn sub(&mut self) -> Result<(), Error> {
        self.binary_op(|a, b| Ok(a.wrapping_sub(b)))
    }

    pub(crate) fn mul(&mut self) -> Result<(), Error> {
        self.binary_op(|a, b| Ok(a.wrapping_mul(b)))
    }

    pub(crate) fn div(&mut self) -> Result<(), Error> {
        self.binary_op(|a, b| {
            if b == 0 {
                Err(Error::DivideByZero)
            } else {
                Ok(a.wrapping_div(b))
            }
        })
    }

    pub(crate) fn modu(&mut self) -> Result<(), Error> {
        self.binary_op(|a, b| {
            if b == 0 {
                Err(Error::DivideByZero)
            } else {
                Ok(a.wrapping_rem(b))
            }
        })
    }

    pub(crate) fn equal(&mut self) -> Result<(), Error> {
        self.compare(|a, b| a == b)
    }

    pub(crate) fn not_equal(&mut self) -> Result<(), Error> {
        self.compare(|a, b| a != b)
    }

    pub(crate) fn less(&mut self) -> Result<(), Error> {
        self.compare(|a, b| a < b)
    }

    pub(crate) fn less_eq(&mut self) -> Result<(), Error> {
        self.compare(|a, b| a <= b)
    }

    pub(crate) fn greater(&mut self) -> Result<(), Error> {
        self.compare(|a, b| a > b)
    }

    pub(crate) fn greater_eq(&mut self) -> Result<(), Error> {
        self.compare(|a, b| a >= b)
    }

    // --- compiler meta ---

    /// `'` — read the next token and push its code field address.
    pub(crate) fn tick(&mut self) -> Result<(), Error> {
        let token = self.next_token()?.ok_or(Error::TickMissingName)?;
        match self.dict.lookup(&self.arena, &token)? {
            Some((cfa, _)) => self.data_stack.push(&mut self.arena, cfa),
            None => Err(Error::UnknownWord(token)),
        }
    }

    /// `,` — pop a cell and append it to the dictionary.
    pub(crate) fn comma_top(&mut self) -> Result<(), Error> {
        let val = self.data_stack.pop(&self.arena)?;
        self.dict.comma(&mut self.arena, val)
    }

    pub(crate) fn push_here(&mut self) -> Result<(), Error> {
        let here = self.dict.here(&self.arena)?;
        self.data_stack.push(&mut self.arena, here)
    }

    pub(crate) fn make_immediate(&mut self) -> Result<(), Error> {
        self.dict.toggle_immediate(&mut self.arena)
    }

    /// `hidden` — pop a header address and toggle its HIDDEN flag.
    pub(crate) fn make_hidden(&mut self) -> Result<(), Error> {
        let header = self.data_stack.pop(&self.arena)?;
        self.dict.toggle_hidden(&mut self.arena, header)
    }

    // --- i/o and misc ---

    /// `key` — push the next raw input byte, or an all-ones cell at end of
    /// input.
    pub(crate) fn key(&mut self) -> Result<(), Error> {
        let val = match self.input.next_key()? {
            Some(b) => b as UCell,
            None => UCell::MAX,
        };
        self.data_stack.push(&mut self.arena, val)
    }

    /// `word` — parse one token into the scratch buffer, pushing its address
    /// and length.
    pub(crate) fn word(&mut self) -> Result<(), Error> {
        let len = match self.read_token()? {
            Some(len) => len,
            None => return Err(Error::UnexpectedEof),
        };
        self.data_stack.push(&mut self.arena, 1)?;
        self.data_stack.push(&mut self.arena, len)
    }

    pub(crate) fn pop_print(&mut self) -> Result<(), Error> {
        let val = self.data_stack.pop(&self.arena)? as Cell;
        write!(&mut self.output, "{}. ", val).map_err(|_| OutputError::FormattingErr)?;
        Ok(())
    }

    pub(crate) fn cr(&mut self) -> Result<(), Error> {
        self.output.push_str("\n")?;
        Ok(())
    }

    pub(crate) fn emit(&mut self) -> Result<(), Error> {
        let val = self.data_stack.pop(&self.arena)?;
        self.output.push_byte(val as u8)?;
        Ok(())
    }

    /// `words` — list every visible name, newest first.
    pub(crate) fn list_words(&mut self) -> Result<(), Error> {
        let entries = self.dict.entries(&self.arena)?;
        for entry in entries.iter().filter(|e| !e.is_hidden()) {
            write!(&mut self.output, "{} ", entry.name).map_err(|_| OutputError::FormattingErr)?;
        }
        Ok(())
    }

    pub(crate) fn dump_mem(&mut self) -> Result<(), Error> {
        let mut text = String::new();
        crate::dump::write_dump(&mut text, self).map_err(|_| OutputError::FormattingErr)?;
        self.output.push_str(&text)?;
        Ok(())
    }

    /// `must` — assertion word for test scripts: fails on zero.
    pub(crate) fn must(&mut self) -> Result<(), Error> {
        let val = self.data_stack.pop(&self.arena)?;
        if val == 0 {
            return Err(Error::MustFailed);
        }
        Ok(())
    }

    pub(crate) fn align_top(&mut self) -> Result<(), Error> {
        let val = self.data_stack.peek(&self.arena, 0)?;
        self.data_stack.poke(&mut self.arena, 0, aligned(val))
    }

    pub(crate) fn r_zero(&mut self) -> Result<(), Error> {
        let base = self.return_stack.base();
        self.data_stack.push(&mut self.arena, base)
    }

    pub(crate) fn s_zero(&mut self) -> Result<(), Error> {
        let base = self.data_stack.base();
        self.data_stack.push(&mut self.arena, base)
    }
}
