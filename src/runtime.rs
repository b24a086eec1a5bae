use std::{cmp::Ordering, fmt};

use crate::{
    catalog::{self, Descriptor, Format, InstrKind},
    image::{Image, NO_MEMORY},
    symbol::Register,
};

/// COMET-II addresses 64K words.
pub const MEMORY_MAX: usize = 0x10000;

/// Stack pointer with nothing pushed. The first push lands at `0xFFFE`.
pub const STACK_EMPTY: u16 = 0xFFFF;

/// Condition bits set by loads, arithmetic, logical, compare and shift instructions.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct Flags {
    /// Overflow
    pub of: bool,
    /// Sign
    pub sf: bool,
    /// Zero
    pub zf: bool,
}

impl Flags {
    fn from_result(val: u16, of: bool) -> Self {
        Flags {
            of,
            sf: val & 0x8000 != 0,
            zf: val == 0,
        }
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OF={} SF={} ZF={}",
            self.of as u8, self.sf as u8, self.zf as u8
        )
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    Running,
    Halted,
    Faulted,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FaultKind {
    /// Word at `addr` has no instruction for its opcode
    IllegalOpcode { opcode: u8, addr: u16 },
    /// Register field above GR7 in the instruction at `addr`
    IllegalRegister { reg: u16, addr: u16 },
    /// Access to the one unaddressable word
    OutOfBounds { addr: u16 },
    /// Program still running after `limit` instructions
    StepLimit { limit: u64 },
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalOpcode { opcode, addr } => {
                write!(f, "illegal opcode {opcode:02X} at address {addr:04X}")
            }
            Self::IllegalRegister { reg, addr } => {
                write!(f, "illegal register {reg} at address {addr:04X}")
            }
            Self::OutOfBounds { addr } => write!(f, "memory access out of bounds at {addr:04X}"),
            Self::StepLimit { limit } => write!(f, "step limit of {limit} instructions exceeded"),
        }
    }
}

/// Execution stopped abnormally. Holds the machine as it was when the fault occurred; the
/// PC points at the faulting instruction.
#[derive(Debug)]
pub struct RuntimeFault {
    pub kind: FaultKind,
    pub state: FinalState,
}

impl fmt::Display for RuntimeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (PC {:04X})", self.kind, self.state.pc)
    }
}

impl std::error::Error for RuntimeFault {}

/// Machine state after execution stopped.
pub struct FinalState {
    pub gr: [u16; 8],
    pub sp: u16,
    pub pc: u16,
    pub flags: Flags,
    pub status: Status,
    /// Instructions executed
    pub steps: u64,
    /// Empty unless tracing was enabled
    pub trace: Vec<TraceEntry>,
    mem: Box<[u16]>,
}

impl FinalState {
    pub fn mem(&self) -> &[u16] {
        &self.mem
    }

    pub fn read(&self, addr: u16) -> u16 {
        self.mem[addr as usize]
    }

    pub fn reg(&self, reg: Register) -> u16 {
        self.gr[reg.index() as usize]
    }
}

impl fmt::Debug for FinalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinalState")
            .field("gr", &self.gr)
            .field("sp", &self.sp)
            .field("pc", &self.pc)
            .field("flags", &self.flags)
            .field("status", &self.status)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

/// What a single instruction changed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Effect {
    None,
    Register { reg: u16, value: u16 },
    Memory { addr: u16, value: u16 },
    /// Compare: only flags changed
    Flags,
    Branch { target: u16, taken: bool },
    Call { target: u16, ret: u16 },
    Return { target: u16 },
    Supervisor { code: u16 },
    Halt,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Register { reg, value } => write!(f, "GR{reg} <- {value:04X}"),
            Self::Memory { addr, value } => write!(f, "[{addr:04X}] <- {value:04X}"),
            Self::Flags => write!(f, "compare"),
            Self::Branch { target, taken: true } => write!(f, "jump {target:04X}"),
            Self::Branch { taken: false, .. } => write!(f, "no jump"),
            Self::Call { target, ret } => write!(f, "call {target:04X} (return {ret:04X})"),
            Self::Return { target } => write!(f, "return {target:04X}"),
            Self::Supervisor { code } => write!(f, "svc {code:04X}"),
            Self::Halt => write!(f, "halt"),
        }
    }
}

/// One executed instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TraceEntry {
    pub addr: u16,
    pub word: u16,
    pub operand: Option<u16>,
    pub mnemonic: &'static str,
    pub effect: Effect,
    /// Flags after execution
    pub flags: Flags,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operand = match self.operand {
            Some(word) => format!("{word:04X}"),
            None => "    ".to_string(),
        };
        write!(
            f,
            "{:04X}: {:04X} {operand}  {:<5} {}  {}",
            self.addr, self.word, self.mnemonic, self.effect, self.flags
        )
    }
}

/// Host side of `SVC`.
pub trait Supervisor {
    /// Called with the effective address of the `SVC` instruction. `mem` excludes the
    /// unaddressable word at `0xFFFF`.
    fn call(&mut self, code: u16, gr: &mut [u16; 8], mem: &mut [u16]);
}

/// Treats every supervisor call as a no-op.
pub struct NoSupervisor;

impl Supervisor for NoSupervisor {
    fn call(&mut self, _code: u16, _gr: &mut [u16; 8], _mem: &mut [u16]) {}
}

/// Fields of a fetched instruction.
struct Decoded {
    desc: &'static Descriptor,
    addr: u16,
    r: u16,
    x: u16,
    /// Address word, 0 for single word instructions
    operand: u16,
}

/// Where the second operand of a register instruction comes from.
#[derive(Clone, Copy)]
enum Source {
    Reg(usize),
    Addr(u16),
}

/// Represents complete program state during runtime.
pub struct RunState {
    /// Full 64K words. The last word can never be accessed.
    mem: Box<[u16]>,
    /// Program counter
    pc: u16,
    /// 8x 16-bit registers
    gr: [u16; 8],
    /// Stack pointer
    sp: u16,
    flags: Flags,
    status: Status,
    steps: u64,
    /// First address after the loaded program. Reaching it ends execution.
    end: u16,
    supervisor: Box<dyn Supervisor>,
    trace: Option<Vec<TraceEntry>>,
}

impl RunState {
    /// Load `image` at address 0 and point the PC at its entry.
    pub fn new(image: &Image) -> Self {
        let mut mem = vec![0; MEMORY_MAX].into_boxed_slice();
        mem[..image.len()].copy_from_slice(image.words());
        RunState {
            mem,
            pc: image.entry(),
            gr: [0; 8],
            sp: STACK_EMPTY,
            flags: Flags::default(),
            status: Status::Running,
            steps: 0,
            end: image.len() as u16,
            supervisor: Box::new(NoSupervisor),
            trace: None,
        }
    }

    pub fn with_entry(mut self, entry: u16) -> Self {
        self.pc = entry;
        self
    }

    pub fn with_supervisor(mut self, supervisor: impl Supervisor + 'static) -> Self {
        self.supervisor = Box::new(supervisor);
        self
    }

    /// Record every executed instruction in [`FinalState::trace`].
    pub fn with_trace(mut self) -> Self {
        self.trace = Some(Vec::new());
        self
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn reg(&self, reg: Register) -> u16 {
        self.gr[reg.index() as usize]
    }

    pub fn set_reg(&mut self, reg: Register, val: u16) {
        self.gr[reg.index() as usize] = val;
    }

    /// Run until halted, faulted or `step_limit` instructions have executed.
    pub fn run(mut self, step_limit: u64) -> Result<FinalState, RuntimeFault> {
        while self.status == Status::Running {
            if self.pc >= self.end {
                self.status = Status::Halted;
                break;
            }
            if self.steps >= step_limit {
                self.status = Status::Faulted;
                return Err(self.fault(FaultKind::StepLimit { limit: step_limit }));
            }
            if let Err(kind) = self.step() {
                return Err(self.fault(kind));
            }
        }
        Ok(self.finish())
    }

    /// Execute a single instruction. Running past the loaded program halts.
    pub fn step(&mut self) -> Result<Status, FaultKind> {
        if self.status != Status::Running {
            return Ok(self.status);
        }
        if self.pc >= self.end {
            self.status = Status::Halted;
            return Ok(self.status);
        }
        let addr = self.pc;
        match self.execute(addr) {
            Ok(entry) => {
                self.steps += 1;
                if let Some(trace) = &mut self.trace {
                    trace.push(entry);
                }
                Ok(self.status)
            }
            Err(kind) => {
                self.pc = addr;
                self.status = Status::Faulted;
                Err(kind)
            }
        }
    }

    fn fault(self, kind: FaultKind) -> RuntimeFault {
        RuntimeFault {
            kind,
            state: self.finish(),
        }
    }

    fn finish(self) -> FinalState {
        FinalState {
            gr: self.gr,
            sp: self.sp,
            pc: self.pc,
            flags: self.flags,
            status: self.status,
            steps: self.steps,
            trace: self.trace.unwrap_or_default(),
            mem: self.mem,
        }
    }

    fn execute(&mut self, addr: u16) -> Result<TraceEntry, FaultKind> {
        let word = self.read(addr)?;
        self.pc = addr.wrapping_add(1);

        let opcode = (word >> 8) as u8;
        let desc = catalog::by_opcode(opcode).ok_or(FaultKind::IllegalOpcode { opcode, addr })?;
        let operand = if desc.format.has_address_word() {
            let val = self.read(self.pc)?;
            self.pc = self.pc.wrapping_add(1);
            Some(val)
        } else {
            None
        };

        let instr = Decoded {
            desc,
            addr,
            r: (word >> 4) & 0xF,
            x: word & 0xF,
            operand: operand.unwrap_or(0),
        };
        let effect = match desc.format {
            Format::RegOrMem | Format::RegMem => self.exec_reg_mem(&instr)?,
            Format::Mem => self.exec_mem(&instr)?,
            Format::Reg => self.exec_reg(&instr)?,
            Format::NoOperand => self.exec_no_operand(&instr)?,
            Format::DefineConstant | Format::DefineStorage | Format::Directive => {
                return Err(FaultKind::IllegalOpcode { opcode, addr })
            }
        };

        Ok(TraceEntry {
            addr,
            word,
            operand,
            mnemonic: desc.mnemonic,
            effect,
            flags: self.flags,
        })
    }

    /// `r1, r2` and `r, adr, x`
    fn exec_reg_mem(&mut self, instr: &Decoded) -> Result<Effect, FaultKind> {
        use InstrKind::*;
        let r = self.check_reg(instr.r, instr)?;
        let source = if instr.desc.format == Format::RegOrMem && instr.operand == NO_MEMORY {
            Source::Reg(self.check_reg(instr.x, instr)?)
        } else {
            Source::Addr(self.effective(instr)?)
        };

        let effect = match (instr.desc.kind, source) {
            (St, Source::Addr(ea)) => {
                let value = self.gr[r];
                self.write(ea, value)?;
                Effect::Memory { addr: ea, value }
            }
            (Lad, Source::Addr(ea)) => self.set_result(r, ea, false),
            (Ld, source) => {
                let value = self.fetch(source)?;
                self.set_result(r, value, false)
            }
            (Cpa, source) => {
                let rhs = self.fetch(source)?;
                self.compare((self.gr[r] as i16).cmp(&(rhs as i16)))
            }
            (Cpl, source) => {
                let rhs = self.fetch(source)?;
                self.compare(self.gr[r].cmp(&rhs))
            }
            (kind @ (Sla | Sra | Sll | Srl), source) => {
                // Shift count is the effective address itself, not the word it points to
                let count = match source {
                    Source::Reg(n) => self.gr[n],
                    Source::Addr(ea) => ea,
                } & 0xF;
                let value = shift(kind, self.gr[r], count);
                self.set_result(r, value, false)
            }
            (kind, source) => {
                let rhs = self.fetch(source)?;
                let (value, of) = alu(kind, self.gr[r], rhs).ok_or(FaultKind::IllegalOpcode {
                    opcode: instr.desc.opcode,
                    addr: instr.addr,
                })?;
                self.set_result(r, value, of)
            }
        };
        Ok(effect)
    }

    /// `adr, x`
    fn exec_mem(&mut self, instr: &Decoded) -> Result<Effect, FaultKind> {
        use InstrKind::*;
        let ea = self.effective(instr)?;
        let effect = match instr.desc.kind {
            kind @ (Jump | Jpl | Jmi | Jnz | Jze | Jov) => {
                let taken = self.condition(kind);
                if taken {
                    self.pc = ea;
                }
                Effect::Branch { target: ea, taken }
            }
            Push => {
                let addr = self.push(ea)?;
                Effect::Memory { addr, value: ea }
            }
            Call => {
                let ret = self.pc;
                self.push(ret)?;
                self.pc = ea;
                Effect::Call { target: ea, ret }
            }
            Svc => {
                self.supervisor
                    .call(ea, &mut self.gr, &mut self.mem[..NO_MEMORY as usize]);
                Effect::Supervisor { code: ea }
            }
            _ => return Err(self.illegal(instr)),
        };
        Ok(effect)
    }

    /// `r`
    fn exec_reg(&mut self, instr: &Decoded) -> Result<Effect, FaultKind> {
        let r = self.check_reg(instr.r, instr)?;
        match instr.desc.kind {
            InstrKind::Pop => {
                let value = self.pop()?;
                self.gr[r] = value;
                Ok(Effect::Register {
                    reg: r as u16,
                    value,
                })
            }
            _ => Err(self.illegal(instr)),
        }
    }

    fn exec_no_operand(&mut self, instr: &Decoded) -> Result<Effect, FaultKind> {
        match instr.desc.kind {
            InstrKind::Nop => Ok(Effect::None),
            InstrKind::Halt => {
                self.status = Status::Halted;
                Ok(Effect::Halt)
            }
            // Returning with nothing on the stack hands control back to the host
            InstrKind::Ret if self.sp == STACK_EMPTY => {
                self.status = Status::Halted;
                Ok(Effect::Halt)
            }
            InstrKind::Ret => {
                let target = self.pop()?;
                self.pc = target;
                Ok(Effect::Return { target })
            }
            _ => Err(self.illegal(instr)),
        }
    }

    fn illegal(&self, instr: &Decoded) -> FaultKind {
        FaultKind::IllegalOpcode {
            opcode: instr.desc.opcode,
            addr: instr.addr,
        }
    }

    fn check_reg(&self, field: u16, instr: &Decoded) -> Result<usize, FaultKind> {
        if field > 7 {
            return Err(FaultKind::IllegalRegister {
                reg: field,
                addr: instr.addr,
            });
        }
        Ok(field as usize)
    }

    /// Address word plus index register. GR0 contributes zero.
    fn effective(&self, instr: &Decoded) -> Result<u16, FaultKind> {
        let x = self.check_reg(instr.x, instr)?;
        Ok(match x {
            0 => instr.operand,
            x => instr.operand.wrapping_add(self.gr[x]),
        })
    }

    fn fetch(&self, source: Source) -> Result<u16, FaultKind> {
        match source {
            Source::Reg(n) => Ok(self.gr[n]),
            Source::Addr(ea) => self.read(ea),
        }
    }

    fn read(&self, addr: u16) -> Result<u16, FaultKind> {
        if addr == NO_MEMORY {
            return Err(FaultKind::OutOfBounds { addr });
        }
        Ok(self.mem[addr as usize])
    }

    fn write(&mut self, addr: u16, val: u16) -> Result<(), FaultKind> {
        if addr == NO_MEMORY {
            return Err(FaultKind::OutOfBounds { addr });
        }
        self.mem[addr as usize] = val;
        Ok(())
    }

    /// Returns the address written to.
    fn push(&mut self, val: u16) -> Result<u16, FaultKind> {
        let sp = self.sp.wrapping_sub(1);
        self.write(sp, val)?;
        self.sp = sp;
        Ok(sp)
    }

    fn pop(&mut self) -> Result<u16, FaultKind> {
        let val = self.read(self.sp)?;
        self.sp = self.sp.wrapping_add(1);
        Ok(val)
    }

    fn set_result(&mut self, r: usize, value: u16, of: bool) -> Effect {
        self.gr[r] = value;
        self.flags = Flags::from_result(value, of);
        Effect::Register {
            reg: r as u16,
            value,
        }
    }

    fn compare(&mut self, ord: Ordering) -> Effect {
        self.flags = Flags {
            of: false,
            sf: ord == Ordering::Less,
            zf: ord == Ordering::Equal,
        };
        Effect::Flags
    }

    fn condition(&self, kind: InstrKind) -> bool {
        let Flags { of, sf, zf } = self.flags;
        match kind {
            InstrKind::Jpl => !sf && !zf,
            InstrKind::Jmi => sf,
            InstrKind::Jnz => !zf,
            InstrKind::Jze => zf,
            InstrKind::Jov => of,
            _ => true,
        }
    }
}

/// Result and overflow of the two operand arithmetic and logical instructions.
fn alu(kind: InstrKind, lhs: u16, rhs: u16) -> Option<(u16, bool)> {
    Some(match kind {
        InstrKind::Adda => {
            let (val, of) = (lhs as i16).overflowing_add(rhs as i16);
            (val as u16, of)
        }
        InstrKind::Suba => {
            let (val, of) = (lhs as i16).overflowing_sub(rhs as i16);
            (val as u16, of)
        }
        InstrKind::Addl => lhs.overflowing_add(rhs),
        InstrKind::Subl => lhs.overflowing_sub(rhs),
        InstrKind::And => (lhs & rhs, false),
        InstrKind::Or => (lhs | rhs, false),
        InstrKind::Xor => (lhs ^ rhs, false),
        _ => return None,
    })
}

/// `count` is below 16.
fn shift(kind: InstrKind, val: u16, count: u16) -> u16 {
    match kind {
        InstrKind::Sla => (val & 0x8000) | ((val << count) & 0x7FFF),
        InstrKind::Sra => ((val as i16) >> count) as u16,
        InstrKind::Sll => val << count,
        _ => val >> count,
    }
}

/// Load `image` and execute from `entry` for at most `step_limit` instructions.
pub fn run(image: &Image, entry: u16, step_limit: u64) -> Result<FinalState, RuntimeFault> {
    RunState::new(image).with_entry(entry).run(step_limit)
}
