use tracing::trace;

use crate::{
    dictionary::{Dictionary, Entry, IMMEDIATE_BIT},
    input::Input,
    mem::Arena,
    output::OutputBuf,
    stack::Stack,
    vm::opcode::Opcode,
    word::{UCell, CELLS},
    Error, Mode,
};

pub mod builtins;
pub mod opcode;

/// Token scratch sits at the bottom of the arena: the length byte at address
/// 0, up to 31 token bytes from address 1. Address 0 is therefore never a
/// valid header or data location.
const SCRATCH_LEN: UCell = 64;
const TOKEN_MAX: UCell = 31;

/// Value a control-flow word writes into a cell it will patch later.
const PATCH_SENTINEL: UCell = 0xEEEE;
/// Debugging mark in the wasted cell at each stack base.
const STACK_MARK: UCell = 0xEEEE;

/// Sizing knobs for a VM instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForthParams {
    pub mem_bytes: usize,
    pub data_stack_cells: UCell,
    pub return_stack_cells: UCell,
    pub output_cap: usize,
}

impl Default for ForthParams {
    fn default() -> Self {
        Self {
            mem_bytes: if CELLS == 2 { 0x1_0000 } else { 1_000_000 },
            data_stack_cells: 256,
            return_stack_cells: 128,
            // One word invocation's worth of output between host drains.
            output_cap: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Done,
    NotDone,
}

/// Compile-time bookkeeping for one open control structure. Keeping these on
/// a typed stack of their own (rather than on the runtime data stack) makes
/// the compile/run phase separation structural, and lets mismatched control
/// words fail fast instead of corrupting later code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlFrame {
    If { orig: UCell },
    Else { orig: UCell },
    Do { back: UCell, skip: Option<UCell> },
    Leave { orig: UCell },
}

/// The whole VM: one arena plus the registers that address into it.
///
/// Layout, low to high: token scratch, the `Here`/`Latest`/`State`
/// variables, the dictionary (bump-allocated upward), then the data and
/// return stack regions growing downward from the top. The instruction
/// pointer and W register are the only state kept outside the arena, along
/// with the compiler's control-flow stack.
pub struct Forth {
    pub(crate) arena: Arena,
    pub(crate) dict: Dictionary,
    pub(crate) data_stack: Stack,
    pub(crate) return_stack: Stack,
    pub(crate) ip: UCell,
    pub(crate) w: UCell,
    state_ptr: UCell,
    control_stack: Vec<ControlFrame>,
    pub input: Input,
    pub output: OutputBuf,
}

impl Forth {
    pub fn new(params: ForthParams) -> Result<Self, Error> {
        let cell = CELLS as usize;
        if params.mem_bytes > 0 && params.mem_bytes - 1 > UCell::MAX as usize {
            return Err(Error::ArenaTooLarge);
        }
        let top = params.mem_bytes & !(cell - 1);

        let here_ptr = SCRATCH_LEN;
        let latest_ptr = here_ptr + CELLS;
        let state_ptr = latest_ptr + CELLS;
        let dict_start = state_ptr + CELLS;

        // Waste the top cell of each stack region for the debugging mark.
        let rs0 = top.checked_sub(cell).ok_or(Error::ArenaTooSmall)?;
        let ds0 = rs0
            .checked_sub(params.return_stack_cells as usize * cell)
            .ok_or(Error::ArenaTooSmall)?;
        let dict_limit = ds0
            .checked_sub(params.data_stack_cells as usize * cell)
            .ok_or(Error::ArenaTooSmall)?;
        if dict_limit < dict_start as usize + 16 * cell {
            return Err(Error::ArenaTooSmall);
        }

        let mut arena = Arena::new(params.mem_bytes);
        let rs0 = rs0 as UCell;
        let ds0 = ds0 as UCell;
        let dict_limit = dict_limit as UCell;

        let dict = Dictionary::new(here_ptr, latest_ptr, dict_limit);
        dict.set_here(&mut arena, dict_start)?;
        dict.set_latest(&mut arena, 0)?;
        arena.write_cell(state_ptr, 0)?;
        arena.write_cell(rs0, STACK_MARK)?;
        arena.write_cell(ds0, STACK_MARK)?;

        let mut forth = Self {
            arena,
            dict,
            data_stack: Stack::new(ds0, dict_limit),
            return_stack: Stack::new(rs0, ds0 + CELLS),
            ip: 0,
            w: 0,
            state_ptr,
            control_stack: Vec::new(),
            input: Input::new(),
            output: OutputBuf::new(params.output_cap),
        };
        for word in builtins::CORE_WORDS {
            forth
                .dict
                .create(&mut forth.arena, word.name, word.op as UCell, word.flags)?;
        }
        Ok(forth)
    }

    // --- mode ---

    pub fn mode(&self) -> Result<Mode, Error> {
        Ok(if self.compiling()? {
            Mode::Compile
        } else {
            Mode::Run
        })
    }

    fn compiling(&self) -> Result<bool, Error> {
        Ok(self.arena.read_cell(self.state_ptr)? != 0)
    }

    fn set_compiling(&mut self, on: bool) -> Result<(), Error> {
        Ok(self.arena.write_cell(self.state_ptr, on as UCell)?)
    }

    // --- introspection ---

    pub fn ip(&self) -> UCell {
        self.ip
    }

    pub fn w(&self) -> UCell {
        self.w
    }

    pub fn here(&self) -> Result<UCell, Error> {
        self.dict.here(&self.arena)
    }

    pub fn latest(&self) -> Result<UCell, Error> {
        self.dict.latest(&self.arena)
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn data_stack_depth(&self) -> UCell {
        self.data_stack.depth()
    }

    pub fn return_stack_depth(&self) -> UCell {
        self.return_stack.depth()
    }

    pub fn data_stack_contents(&self) -> Result<Vec<UCell>, Error> {
        self.data_stack.contents(&self.arena)
    }

    pub fn return_stack_contents(&self) -> Result<Vec<UCell>, Error> {
        self.return_stack.contents(&self.arena)
    }

    pub fn dictionary_entries(&self) -> Result<Vec<Entry>, Error> {
        self.dict.entries(&self.arena)
    }

    /// Throw away transient execution state after an error so an interactive
    /// host can keep going. The dictionary keeps whatever was built; a
    /// half-compiled definition stays behind as garbage, which is why batch
    /// hosts treat every error as fatal instead.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.data_stack.clear();
        self.return_stack.clear();
        self.control_stack.clear();
        self.ip = 0;
        self.w = 0;
        self.set_compiling(false)
    }

    // --- token reading ---

    /// Read one blank-delimited token into the arena scratch area (bytes
    /// <= 32 separate tokens). Returns its length, or `None` on clean end of
    /// input.
    pub(crate) fn read_token(&mut self) -> Result<Option<UCell>, Error> {
        let mut c = loop {
            match self.input.next_key()? {
                None => return Ok(None),
                Some(c) if c > 32 => break c,
                Some(_) => {}
            }
        };
        let mut len: UCell = 0;
        loop {
            if len == TOKEN_MAX {
                return Err(Error::NameTooLong);
            }
            self.arena.write_byte(1 + len, c)?;
            len += 1;
            match self.input.next_key()? {
                None => break,
                Some(next) if next <= 32 => break,
                Some(next) => c = next,
            }
        }
        self.arena.write_byte(1 + len, 0)?;
        self.arena.write_byte(0, len as u8)?;
        Ok(Some(len))
    }

    fn scratch_token(&self) -> Result<String, Error> {
        let len = self.arena.read_byte(0)? as UCell;
        let mut token = String::with_capacity(len as usize);
        for i in 0..len {
            token.push(self.arena.read_byte(1 + i)? as char);
        }
        Ok(token)
    }

    pub(crate) fn next_token(&mut self) -> Result<Option<String>, Error> {
        match self.read_token()? {
            Some(_) => Ok(Some(self.scratch_token()?)),
            None => Ok(None),
        }
    }

    // --- outer interpreter ---

    /// Consume the input until it runs dry.
    pub fn interpret(&mut self) -> Result<(), Error> {
        while self.interpret_one()? != Step::Done {}
        Ok(())
    }

    /// Read and resolve one token: execute it, compile it, or treat it as an
    /// integer literal. `Step::Done` on clean end of input.
    pub fn interpret_one(&mut self) -> Result<Step, Error> {
        let token = match self.next_token()? {
            Some(token) => token,
            None => return Ok(Step::Done),
        };
        let compiling = self.compiling()?;
        match self.dict.lookup(&self.arena, &token)? {
            Some((cfa, flags)) => {
                if compiling && flags & IMMEDIATE_BIT == 0 {
                    trace!(%token, cfa, "compile");
                    self.dict.comma(&mut self.arena, cfa)?;
                } else {
                    trace!(%token, cfa, "execute");
                    self.execute_cfa(cfa)?;
                }
            }
            None => match parse_literal(&token) {
                Some(val) => {
                    if compiling {
                        let lit = self.find_cfa("(lit)")?;
                        self.dict.comma(&mut self.arena, lit)?;
                        self.dict.comma(&mut self.arena, val)?;
                    } else {
                        self.data_stack.push(&mut self.arena, val)?;
                    }
                }
                None => return Err(Error::UnknownWord(token)),
            },
        }
        Ok(Step::NotDone)
    }

    pub(crate) fn find_cfa(&self, name: &str) -> Result<UCell, Error> {
        match self.dict.lookup(&self.arena, name)? {
            Some((cfa, _)) => Ok(cfa),
            None => Err(Error::WordNotInDict),
        }
    }

    // --- inner interpreter ---

    /// Run the word at `cfa` to completion inside a private return stack
    /// frame: a `0` sentinel under the cfa cell halts the dispatch loop once
    /// the word returns. Immediate words executed mid-compilation go through
    /// here too, so they can never disturb an enclosing call. The frame is
    /// verified before teardown.
    pub fn execute_cfa(&mut self, cfa: UCell) -> Result<(), Error> {
        self.return_stack.push(&mut self.arena, 0)?;
        self.return_stack.push(&mut self.arena, cfa)?;
        let frame = self.return_stack.ptr();
        self.ip = frame;

        self.dispatch_loop()?;

        if self.return_stack.ptr() != frame
            || self.return_stack.pop(&self.arena)? != cfa
            || self.return_stack.pop(&self.arena)? != 0
        {
            return Err(Error::CallStackCorrupted);
        }
        Ok(())
    }

    fn dispatch_loop(&mut self) -> Result<(), Error> {
        loop {
            let cfa = self.arena.read_cell(self.ip)?;
            if cfa == 0 {
                return Ok(());
            }
            let code = self.arena.read_cell(cfa)?;
            let op = Opcode::try_from(code).map_err(|()| Error::BadOpcode(code))?;
            self.w = cfa + CELLS;
            self.ip += CELLS;
            trace!(ip = self.ip, ?op, "dispatch");
            self.execute_op(op)?;
        }
    }

    fn execute_op(&mut self, op: Opcode) -> Result<(), Error> {
        match op {
            Opcode::Enter => self.enter(),
            Opcode::Exit => self.exit(),
            Opcode::Lit => self.lit(),
            Opcode::Branch => self.branch(),
            Opcode::ZeroBranch => self.zero_branch(),
            Opcode::IncrI => self.incr_i(),
            Opcode::LoopBranch => self.loop_branch(),
            Opcode::Nop => Ok(()),
            Opcode::Dup => self.dup(),
            Opcode::Drop => self.drop_top(),
            Opcode::Swap => self.swap(),
            Opcode::Over => self.over(),
            Opcode::Rot => self.rot(),
            Opcode::TwoDup => self.two_dup(),
            Opcode::TwoDrop => self.two_drop(),
            Opcode::Nip => self.nip(),
            Opcode::Tuck => self.tuck(),
            Opcode::ToR => self.to_r(),
            Opcode::FromR => self.from_r(),
            Opcode::RFetch => self.r_fetch(),
            Opcode::LoopI => self.loop_i(),
            Opcode::LoopJ => self.loop_j(),
            Opcode::LoopK => self.loop_k(),
            Opcode::Add => self.add(),
            Opcode::Sub => self.sub(),
            Opcode::Mul => self.mul(),
            Opcode::Div => self.div(),
            Opcode::Mod => self.modu(),
            Opcode::Eq => self.equal(),
            Opcode::Ne => self.not_equal(),
            Opcode::Lt => self.less(),
            Opcode::Le => self.less_eq(),
            Opcode::Gt => self.greater(),
            Opcode::Ge => self.greater_eq(),
            Opcode::Colon => self.colon(),
            Opcode::Semicolon => self.semicolon(),
            Opcode::If => self.compile_if(),
            Opcode::Else => self.compile_else(),
            Opcode::Then => self.compile_then(),
            Opcode::Do => self.compile_do(false),
            Opcode::QDo => self.compile_do(true),
            Opcode::Loop => self.compile_loop(false),
            Opcode::PlusLoop => self.compile_loop(true),
            Opcode::Leave => self.compile_leave(),
            Opcode::Unloop => self.compile_unloop(),
            Opcode::Tick => self.tick(),
            Opcode::Comma => self.comma_top(),
            Opcode::Here => self.push_here(),
            Opcode::Immediate => self.make_immediate(),
            Opcode::Hidden => self.make_hidden(),
            Opcode::Key => self.key(),
            Opcode::Word => self.word(),
            Opcode::Dot => self.pop_print(),
            Opcode::Cr => self.cr(),
            Opcode::Emit => self.emit(),
            Opcode::Words => self.list_words(),
            Opcode::DumpMem => self.dump_mem(),
            Opcode::Must => self.must(),
            Opcode::Align => self.align_top(),
            Opcode::RZero => self.r_zero(),
            Opcode::SZero => self.s_zero(),
        }
    }

    // --- colon compiler & control flow ---
    //
    // These all run at compile time, as IMMEDIATE words. Emitted branches are
    // relative: a placeholder at `at` is later patched to `target - at`, the
    // offset `branch`/`0branch` adds to Ip at run time.

    fn require_compiling(&self) -> Result<(), Error> {
        if self.compiling()? {
            Ok(())
        } else {
            Err(Error::InterpretingCompileOnlyWord)
        }
    }

    fn comma_word(&mut self, name: &str) -> Result<(), Error> {
        let cfa = self.find_cfa(name)?;
        self.dict.comma(&mut self.arena, cfa)
    }

    fn comma_placeholder(&mut self) -> Result<UCell, Error> {
        let at = self.dict.here(&self.arena)?;
        self.dict.comma(&mut self.arena, PATCH_SENTINEL)?;
        Ok(at)
    }

    fn patch(&mut self, at: UCell, target: UCell) -> Result<(), Error> {
        trace!(at, target, "patch");
        Ok(self.arena.write_cell(at, target.wrapping_sub(at))?)
    }

    pub(crate) fn colon(&mut self) -> Result<(), Error> {
        if self.compiling()? {
            return Err(Error::NestedColon);
        }
        let name = self.next_token()?.ok_or(Error::ColonMissingName)?;
        self.dict
            .create(&mut self.arena, &name, Opcode::Enter as UCell, 0)?;
        self.set_compiling(true)
    }

    pub(crate) fn semicolon(&mut self) -> Result<(), Error> {
        if !self.compiling()? {
            return Err(Error::NotCompiling);
        }
        if let Some(frame) = self.control_stack.pop() {
            return Err(match frame {
                ControlFrame::If { .. } | ControlFrame::Else { .. } => Error::IfWithoutThen,
                ControlFrame::Do { .. } | ControlFrame::Leave { .. } => Error::DoWithoutLoop,
            });
        }
        self.comma_word("(exit)")?;
        self.set_compiling(false)
    }

    pub(crate) fn compile_if(&mut self) -> Result<(), Error> {
        self.require_compiling()?;
        self.comma_word("0branch")?;
        let orig = self.comma_placeholder()?;
        self.control_stack.push(ControlFrame::If { orig });
        Ok(())
    }

    /// Pop the nearest `If`/`Else` frame. `Leave` frames may sit on top of it
    /// (LEAVE inside the conditional's arm); they belong to the enclosing
    /// loop and are left in place underneath the match.
    fn pop_conditional(&mut self, err: Error) -> Result<ControlFrame, Error> {
        let mut leaves = Vec::new();
        let found = loop {
            match self.control_stack.pop() {
                Some(ControlFrame::Leave { orig }) => leaves.push(orig),
                Some(frame @ ControlFrame::If { .. }) | Some(frame @ ControlFrame::Else { .. }) => {
                    break frame
                }
                _ => return Err(err),
            }
        };
        for orig in leaves.into_iter().rev() {
            self.control_stack.push(ControlFrame::Leave { orig });
        }
        Ok(found)
    }

    pub(crate) fn compile_else(&mut self) -> Result<(), Error> {
        self.require_compiling()?;
        let orig = match self.pop_conditional(Error::ElseWithoutIf)? {
            ControlFrame::If { orig } => orig,
            _ => return Err(Error::ElseWithoutIf),
        };
        self.comma_word("branch")?;
        let else_orig = self.comma_placeholder()?;
        let here = self.dict.here(&self.arena)?;
        self.patch(orig, here)?;
        self.control_stack
            .push(ControlFrame::Else { orig: else_orig });
        Ok(())
    }

    pub(crate) fn compile_then(&mut self) -> Result<(), Error> {
        self.require_compiling()?;
        let orig = match self.pop_conditional(Error::ThenWithoutIf)? {
            ControlFrame::If { orig } | ControlFrame::Else { orig } => orig,
            _ => return Err(Error::ThenWithoutIf),
        };
        let here = self.dict.here(&self.arena)?;
        self.patch(orig, here)
    }

    /// DO/?DO: move limit and index to the return stack at run time. ?DO also
    /// branches to the loop's closing test, so a zero trip count skips the
    /// body entirely.
    pub(crate) fn compile_do(&mut self, zero_trip: bool) -> Result<(), Error> {
        self.require_compiling()?;
        self.comma_word("swap")?;
        self.comma_word(">r")?;
        self.comma_word(">r")?;
        let skip = if zero_trip {
            self.comma_word("branch")?;
            Some(self.comma_placeholder()?)
        } else {
            None
        };
        let back = self.dict.here(&self.arena)?;
        self.control_stack.push(ControlFrame::Do { back, skip });
        Ok(())
    }

    /// LOOP/+LOOP: emit the increment and the closing test with its
    /// branch-back offset, then resolve the ?DO skip and any pending LEAVEs.
    pub(crate) fn compile_loop(&mut self, runtime_increment: bool) -> Result<(), Error> {
        self.require_compiling()?;
        let mut leaves = Vec::new();
        let (back, skip) = loop {
            match self.control_stack.pop() {
                Some(ControlFrame::Leave { orig }) => leaves.push(orig),
                Some(ControlFrame::Do { back, skip }) => break (back, skip),
                Some(ControlFrame::If { .. }) | Some(ControlFrame::Else { .. }) => {
                    return Err(Error::IfWithoutThen)
                }
                None => return Err(Error::LoopWithoutDo),
            }
        };
        if runtime_increment {
            // The increment is on the data stack: fold it into the index.
            self.comma_word("r>")?;
            self.comma_word("+")?;
            self.comma_word(">r")?;
        } else {
            self.comma_word("(incr-i)")?;
        }
        let test = self.dict.here(&self.arena)?;
        self.comma_word("(loop)")?;
        let off_at = self.dict.here(&self.arena)?;
        self.dict.comma(&mut self.arena, back.wrapping_sub(off_at))?;
        if let Some(skip) = skip {
            self.patch(skip, test)?;
        }
        let exit = self.dict.here(&self.arena)?;
        for orig in leaves {
            self.patch(orig, exit)?;
        }
        Ok(())
    }

    /// LEAVE: drop the loop cells and jump to the not-yet-known loop exit.
    pub(crate) fn compile_leave(&mut self) -> Result<(), Error> {
        self.require_compiling()?;
        if !self
            .control_stack
            .iter()
            .any(|frame| matches!(frame, ControlFrame::Do { .. }))
        {
            return Err(Error::LeaveWithoutDo);
        }
        self.compile_unloop_seq()?;
        self.comma_word("branch")?;
        let orig = self.comma_placeholder()?;
        self.control_stack.push(ControlFrame::Leave { orig });
        Ok(())
    }

    /// UNLOOP: drop the loop cells without branching, for a manual early
    /// exit inside a loop body.
    pub(crate) fn compile_unloop(&mut self) -> Result<(), Error> {
        self.require_compiling()?;
        self.compile_unloop_seq()
    }

    fn compile_unloop_seq(&mut self) -> Result<(), Error> {
        self.comma_word("r>")?;
        self.comma_word("drop")?;
        self.comma_word("r>")?;
        self.comma_word("drop")
    }
}

fn parse_literal(token: &str) -> Option<UCell> {
    let bytes = token.as_bytes();
    let (negative, digits) = match bytes.split_first() {
        Some((b'-', rest)) if !rest.is_empty() => (true, rest),
        _ => (false, bytes),
    };
    if digits.is_empty() {
        return None;
    }
    let mut val: UCell = 0;
    for &d in digits {
        if !d.is_ascii_digit() {
            return None;
        }
        val = val.wrapping_mul(10).wrapping_add((d - b'0') as UCell);
    }
    Some(if negative { val.wrapping_neg() } else { val })
}

#[cfg(test)]
pub mod test {
    use super::{parse_literal, Forth, ForthParams};
    use crate::{
        stack::StackError,
        word::{Cell, UCell},
        Error, Mode,
    };

    pub(crate) fn forth_with(input: &str) -> Forth {
        let mut forth = Forth::new(ForthParams::default()).unwrap();
        forth.input.push_text(input);
        forth
    }

    fn run(input: &str) -> Forth {
        let mut forth = forth_with(input);
        forth.interpret().unwrap();
        forth
    }

    fn data(forth: &Forth) -> Vec<Cell> {
        forth
            .data_stack_contents()
            .unwrap()
            .into_iter()
            .map(|c| c as Cell)
            .collect()
    }

    #[test]
    fn literals_and_arithmetic() {
        let forth = run("2 3 + 10 2 - 7 2 / 7 2 mod -5");
        // Top first.
        assert_eq!(data(&forth), vec![-5, 1, 3, 8, 5]);
    }

    #[test]
    fn literal_grammar_is_narrow() {
        assert_eq!(parse_literal("42"), Some(42));
        assert_eq!(parse_literal("-7"), Some((7 as UCell).wrapping_neg()));
        assert_eq!(parse_literal("+7"), None);
        assert_eq!(parse_literal("0x1f"), None);
        assert_eq!(parse_literal("1.5"), None);
        assert_eq!(parse_literal("-"), None);
        assert_eq!(parse_literal(""), None);
    }

    #[test]
    fn unknown_word_is_fatal() {
        let mut forth = forth_with("2 3 frobnicate");
        assert_eq!(
            forth.interpret(),
            Err(Error::UnknownWord("frobnicate".into()))
        );
    }

    #[test]
    fn colon_defines_a_word() {
        let forth = run(": double dup + ; 5 double");
        assert_eq!(data(&forth), vec![10]);
    }

    #[test]
    fn definitions_shadow_older_ones() {
        // `old` keeps calling the first `val`; bare `val` resolves to the
        // redefinition.
        let forth = run(": val 1 ; : old val ; : val 2 ; old val");
        assert_eq!(data(&forth), vec![2, 1]);
    }

    #[test]
    fn if_then_converges() {
        let mut forth = run(": abs dup 0 < if -1 * then ; -7 abs");
        assert_eq!(data(&forth), vec![7]);
        forth.input.push_text("7 abs");
        forth.interpret().unwrap();
        assert_eq!(data(&forth), vec![7, 7]);
    }

    #[test]
    fn if_else_takes_one_branch() {
        let mut forth = run(": sign dup 0 < if drop -1 else 0 != if 1 else 0 then then ;");
        for (input, expect) in [("-9 sign", -1), ("0 sign", 0), ("9 sign", 1)] {
            forth.input.push_text(input);
            forth.interpret().unwrap();
            assert_eq!(data(&forth).first(), Some(&expect));
            forth.data_stack.clear();
        }
    }

    #[test]
    fn counted_loop_runs_limit_times() {
        let forth = run(": count 0 do i . loop ; 5 count");
        assert_eq!(forth.output.as_str(), "0. 1. 2. 3. 4. ");
    }

    #[test]
    fn nested_loops_expose_j() {
        let forth = run(": grid 2 0 do 2 0 do j . i . loop loop ; grid");
        assert_eq!(forth.output.as_str(), "0. 0. 0. 1. 1. 0. 1. 1. ");
    }

    #[test]
    fn question_do_skips_zero_trips() {
        let forth = run(": maybe 0 ?do i . loop ; 0 maybe 3 maybe");
        assert_eq!(forth.output.as_str(), "0. 1. 2. ");
        assert!(forth.return_stack_contents().unwrap().is_empty());
    }

    #[test]
    fn plus_loop_steps_by_increment() {
        let forth = run(": evens 10 0 do i . 2 +loop ; evens");
        assert_eq!(forth.output.as_str(), "0. 2. 4. 6. 8. ");
    }

    #[test]
    fn leave_exits_early() {
        let forth = run(": first3 10 0 do i 3 = if leave then i . loop ; first3");
        assert_eq!(forth.output.as_str(), "0. 1. 2. ");
        assert!(forth.return_stack_contents().unwrap().is_empty());
    }

    #[test]
    fn immediate_words_run_during_compilation() {
        // `immediate` makes `star` run at compile time; its output must not
        // be deferred, and no token for it may land in `late`.
        let mut forth = run(": star 42 emit ; immediate");
        forth.input.push_text(": late star ;");
        forth.interpret().unwrap();
        assert_eq!(forth.output.as_str(), "*");
        forth.output.clear();
        forth.input.push_text("late");
        forth.interpret().unwrap();
        assert_eq!(forth.output.as_str(), "");
    }

    #[test]
    fn tick_pushes_code_field_addresses() {
        let mut forth = forth_with("' dup ' dup ' drop");
        forth.interpret().unwrap();
        let cells = forth.data_stack_contents().unwrap();
        assert_eq!(cells[1], cells[2]);
        assert_ne!(cells[0], cells[1]);
        assert_eq!(cells[1], forth.find_cfa("dup").unwrap());
    }

    #[test]
    fn comma_appends_at_here() {
        let forth = run("here 123 , here");
        let cells = forth.data_stack_contents().unwrap();
        let (after, before) = (cells[0], cells[1]);
        assert_eq!(after, before + crate::word::CELLS);
        assert_eq!(forth.arena().read_cell(before).unwrap(), 123);
    }

    #[test]
    fn immediate_words_append_only_what_they_comma() {
        // `compdup` runs while `q` is being compiled; the only token it
        // leaves behind in `q` is the dup it explicitly comma'd.
        let mut forth = forth_with("");
        let dup_cfa = forth.find_cfa("dup").unwrap();
        forth.input.push_text(&format!(
            ": compdup {dup_cfa} , ; immediate : q 5 compdup + ; q"
        ));
        forth.interpret().unwrap();
        assert_eq!(data(&forth), vec![10]);
    }

    #[test]
    fn words_lists_newest_first() {
        let forth = run(": aaa ; : bbb ; words");
        let listing = forth.output.as_str();
        let bbb = listing.find("bbb").unwrap();
        let aaa = listing.find("aaa").unwrap();
        assert!(bbb < aaa);
        assert!(listing.contains("dup"));
    }

    #[test]
    fn hidden_words_disappear_from_lookup() {
        let mut forth = run(": secret 9 ;");
        let header = forth.latest().unwrap();
        forth.input.push_text(&format!("{header} hidden secret"));
        assert_eq!(
            forth.interpret(),
            Err(Error::UnknownWord("secret".into()))
        );
    }

    #[test]
    fn compile_only_words_fail_while_interpreting() {
        for (src, err) in [
            ("if", Error::InterpretingCompileOnlyWord),
            ("else", Error::InterpretingCompileOnlyWord),
            ("then", Error::InterpretingCompileOnlyWord),
            ("do", Error::InterpretingCompileOnlyWord),
            ("loop", Error::InterpretingCompileOnlyWord),
            ("leave", Error::InterpretingCompileOnlyWord),
            (";", Error::NotCompiling),
        ] {
            let mut forth = forth_with(src);
            assert_eq!(forth.interpret(), Err(err), "input {src:?}");
        }
    }

    #[test]
    fn structural_mismatches_fail_fast() {
        for (src, err) in [
            (": x else ;", Error::ElseWithoutIf),
            (": x then ;", Error::ThenWithoutIf),
            (": x loop ;", Error::LoopWithoutDo),
            (": x leave ;", Error::LeaveWithoutDo),
            (": x 1 if ;", Error::IfWithoutThen),
            (": x 1 0 do ;", Error::DoWithoutLoop),
            (": x 1 0 do 1 if loop ;", Error::IfWithoutThen),
            // `:` is not immediate, so nesting it takes an immediate wrapper.
            (": colonify : ; immediate : x colonify", Error::NestedColon),
        ] {
            let mut forth = forth_with(src);
            assert_eq!(forth.interpret(), Err(err), "input {src:?}");
        }
    }

    #[test]
    fn stack_underflow_is_fatal() {
        let mut forth = forth_with("+");
        assert_eq!(
            forth.interpret(),
            Err(Error::Stack(StackError::StackUnderflow))
        );
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let mut forth = forth_with("1 0 /");
        assert_eq!(forth.interpret(), Err(Error::DivideByZero));
    }

    #[test]
    fn branch_offsets_land_on_block_starts() {
        // Nested conditionals, with and without else; every arm must leave
        // exactly its own marker.
        let src = ": classify dup 0 < if drop 100 else dup 10 < if drop 200 then then ;";
        let mut forth = run(src);
        for (input, expect) in [("-1 classify", 100), ("5 classify", 200), ("50 classify", 50)]
        {
            forth.input.push_text(input);
            forth.interpret().unwrap();
            assert_eq!(data(&forth), vec![expect], "input {input:?}");
            forth.data_stack.clear();
        }
    }

    #[test]
    fn mode_flips_with_colon_and_semicolon() {
        let mut forth = forth_with(": half 2 /");
        forth.interpret().unwrap();
        assert_eq!(forth.mode().unwrap(), Mode::Compile);
        forth.input.push_text(";");
        forth.interpret().unwrap();
        assert_eq!(forth.mode().unwrap(), Mode::Run);
        forth.input.push_text("8 half");
        forth.interpret().unwrap();
        assert_eq!(data(&forth), vec![4]);
    }

    #[test]
    fn long_tokens_are_fatal() {
        let mut forth = forth_with(": x ; this-token-is-way-too-long-to-fit-the-scratch-buffer");
        assert_eq!(forth.interpret(), Err(Error::NameTooLong));
    }

    #[test]
    fn must_asserts() {
        let mut forth = forth_with("1 must 2 2 = must");
        forth.interpret().unwrap();
        forth.input.push_text("0 must");
        assert_eq!(forth.interpret(), Err(Error::MustFailed));
    }

    #[test]
    fn key_reads_raw_bytes() {
        // The delimiter after `key` is consumed by the token reader, so the
        // primitive sees the byte right after it.
        let forth = run("key A");
        assert_eq!(data(&forth), vec![b'A' as Cell]);

        // At end of input, key pushes an all-ones cell.
        let forth = run("key");
        assert_eq!(data(&forth), vec![-1]);
    }

    #[test]
    fn execute_cfa_balances_the_frame() {
        let mut forth = forth_with("");
        let cfa = forth.find_cfa("nop").unwrap();
        forth.execute_cfa(cfa).unwrap();
        assert!(forth.return_stack_contents().unwrap().is_empty());
    }
}
