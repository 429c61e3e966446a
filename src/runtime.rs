use crate::error::{Fault, ImageError};
use crate::isa::{Opcode, Record, Size, RECORD_SIZE, REGISTER_COUNT};
use crate::output::Output;
use crate::screen::{Screen, SCREEN_BASE, SCREEN_BYTES};
use crate::tprintln;

/// Read-only program image, mapped from address 0.
pub const ROM_SIZE: usize = 2 * 1024 * 1024;
/// Writable memory, mapped directly after ROM.
pub const RAM_SIZE: usize = 512 * 1024;
/// First address past the end of the unified address space.
pub const MEMORY_END: u32 = (ROM_SIZE + RAM_SIZE) as u32;

const RECORD_LEN: u32 = RECORD_SIZE as u32;

/// Receives the values printed by the debug output instruction.
pub trait DebugSink {
    fn emit(&mut self, reg: u8, value: u32);
}

/// Prints debug output to stdout.
#[derive(Clone, Copy, Default, Debug)]
pub struct Terminal;

impl DebugSink for Terminal {
    fn emit(&mut self, reg: u8, value: u32) {
        Output::Normal.print_str(&format!("reg{reg}: {value} ({value:#010x})\n"));
    }
}

/// Collects debug output, mostly useful for tests and embedding.
impl DebugSink for Vec<(u8, u32)> {
    fn emit(&mut self, reg: u8, value: u32) {
        self.push((reg, value));
    }
}

/// Outcome of a single step.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Step {
    /// Instruction executed, more may follow.
    Continue,
    /// `hcf` was executed, now or earlier.
    Halted,
}

/// How a bounded run ended.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Exit {
    Halted { steps: u64 },
    /// The step budget ran out before the program halted.
    StepLimit { steps: u64 },
}

/// Represents complete machine state during runtime.
///
/// The program counter always names the record about to execute. A step fetches the
/// record at the program counter, then advances it by one record, then executes.
pub struct RunState<S: DebugSink = Terminal> {
    /// Program image, never written after loading
    rom: Box<[u8]>,
    /// Data, including the display window at the very top
    ram: Box<[u8]>,
    /// 16x 32-bit registers
    reg: [u32; REGISTER_COUNT],
    /// Program counter
    pc: u32,
    /// Address of the record currently executing, reported by faults
    instr_pc: u32,
    halted: bool,
    /// First fault raised. Once set, the machine never executes again
    fault: Option<Fault>,
    /// Amount of records executed so far
    steps: u64,
    /// Print each record before it is executed
    trace: bool,
    sink: S,
}

impl RunState<Terminal> {
    /// Load an image into ROM at address 0, printing debug output to the terminal.
    pub fn from_image(image: &[u8]) -> Result<Self, ImageError> {
        Self::with_sink(image, Terminal)
    }
}

impl<S: DebugSink> RunState<S> {
    pub fn with_sink(image: &[u8], sink: S) -> Result<Self, ImageError> {
        if image.len() > ROM_SIZE {
            return Err(ImageError::TooLarge { len: image.len() });
        }
        if image.len() % RECORD_SIZE != 0 {
            return Err(ImageError::Misaligned { len: image.len() });
        }

        let mut rom = vec![0; ROM_SIZE].into_boxed_slice();
        rom[..image.len()].copy_from_slice(image);

        Ok(RunState {
            rom,
            ram: vec![0; RAM_SIZE].into_boxed_slice(),
            reg: [0; REGISTER_COUNT],
            pc: 0,
            instr_pc: 0,
            halted: false,
            fault: None,
            steps: 0,
            trace: false,
            sink,
        })
    }

    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Panics if `idx` is not a valid register index.
    pub fn reg(&self, idx: usize) -> u32 {
        self.reg[idx]
    }

    /// Panics if `idx` is not a valid register index.
    pub fn set_reg(&mut self, idx: usize, value: u32) {
        self.reg[idx] = value;
    }

    pub fn registers(&self) -> &[u32; REGISTER_COUNT] {
        &self.reg
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Fault that stopped the machine, if any.
    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Single byte of the unified address space, `None` past the end.
    pub fn peek(&self, addr: u32) -> Option<u8> {
        let addr = addr as usize;
        if addr < ROM_SIZE {
            Some(self.rom[addr])
        } else {
            self.ram.get(addr - ROM_SIZE).copied()
        }
    }

    /// Read-only view of the memory-mapped display window.
    pub fn screen(&self) -> Screen<'_> {
        Screen::new(&self.ram[SCREEN_BASE..SCREEN_BASE + SCREEN_BYTES])
    }

    /// Execute records until `hcf`, a fault, or `max_steps` records have executed.
    pub fn run_until_halt(&mut self, max_steps: Option<u64>) -> Result<Exit, Fault> {
        let start = self.steps;
        loop {
            if max_steps.is_some_and(|max| self.steps - start >= max) {
                return Ok(Exit::StepLimit { steps: self.steps });
            }
            if self.step()? == Step::Halted {
                return Ok(Exit::Halted { steps: self.steps });
            }
        }
    }

    /// Fetch, decode and execute one record.
    ///
    /// Faults are fatal: after one, every further call reports the same fault again.
    pub fn step(&mut self) -> Result<Step, Fault> {
        if self.halted {
            return Ok(Step::Halted);
        }
        if let Some(fault) = self.fault {
            return Err(fault);
        }
        let result = self.execute();
        if let Err(fault) = result {
            self.fault = Some(fault);
        }
        result
    }

    fn execute(&mut self) -> Result<Step, Fault> {
        self.instr_pc = self.pc;
        let record = self.fetch(self.pc)?;
        // PC incremented before instruction is performed
        self.pc += RECORD_LEN;

        if self.trace {
            tprintln!("{:#08x}  {}", self.instr_pc, record);
        }

        let Ok(opcode) = Opcode::try_from(record.opcode) else {
            return Err(Fault::UnknownOpcode {
                opcode: record.opcode,
                pc: self.instr_pc,
            });
        };

        match opcode {
            Opcode::Hcf => self.halted = true,
            Opcode::Add => self.reg[2] = self.reg[0].wrapping_add(self.reg[1]),
            Opcode::Sub => self.reg[2] = self.reg[0].wrapping_sub(self.reg[1]),
            Opcode::Mul => self.reg[2] = self.reg[0].wrapping_mul(self.reg[1]),
            Opcode::Div => self.div()?,
            Opcode::LoadImm => self.load_imm(record)?,
            Opcode::Move => self.mov(record)?,
            Opcode::Load => self.load(record)?,
            Opcode::Store => self.store(record)?,
            Opcode::Swap => self.swap(record)?,
            Opcode::Exchange => self.exchange(record)?,
            // Copies rather than complements, as the opcode always has
            #[allow(clippy::identity_op)]
            Opcode::Not => self.bitwise(record, |src, _| src ^ 0)?,
            Opcode::And => self.bitwise(record, |src, dest| src & dest)?,
            Opcode::Or => self.bitwise(record, |src, dest| src | dest)?,
            Opcode::Xor => self.bitwise(record, |src, dest| src ^ dest)?,
            Opcode::Copy => self.bitwise(record, |src, _| src)?,
            Opcode::Jump => self.jump(record)?,
            Opcode::JumpEqZero => self.jump_if(record, opcode, |val| val == 0)?,
            Opcode::JumpNeqZero => self.jump_if(record, opcode, |val| val != 0)?,
            Opcode::DebugOut => self.dout(record)?,
            Opcode::Mu => {
                if self.trace {
                    tprintln!("mu");
                }
            }
        }

        self.steps += 1;
        Ok(if self.halted {
            Step::Halted
        } else {
            Step::Continue
        })
    }

    fn fetch(&self, addr: u32) -> Result<Record, Fault> {
        let mut raw = [0; RECORD_SIZE];
        for (i, byte) in raw.iter_mut().enumerate() {
            *byte = self.read(addr.wrapping_add(i as u32), addr)?;
        }
        Ok(Record::decode(&raw))
    }

    /// Register selected by the low byte of a field.
    #[inline]
    fn reg_index(&self, field: u32) -> Result<usize, Fault> {
        let index = (field & 0xFF) as u8;
        if index as usize >= REGISTER_COUNT {
            return Err(Fault::InvalidRegister {
                index,
                pc: self.instr_pc,
            });
        }
        Ok(index as usize)
    }

    /// Data width of memory and immediate instructions. Constant variants are not valid here.
    fn width(&self, record: Record, opcode: Opcode) -> Result<Size, Fault> {
        match Size::try_from(record.size) {
            Ok(size @ (Size::Byte | Size::Word | Size::Longword)) => Ok(size),
            _ => Err(Fault::InvalidSize {
                size: record.size,
                mnemonic: opcode.mnemonic(),
                pc: self.instr_pc,
            }),
        }
    }

    fn read(&self, addr: u32, base: u32) -> Result<u8, Fault> {
        // Wrapping around the end of the address space counts as out of range
        if addr < base {
            return Err(self.out_of_range(base));
        }
        self.peek(addr).ok_or_else(|| self.out_of_range(addr))
    }

    /// Big-endian read of 1, 2 or 4 bytes, zero-extended.
    fn read_be(&self, addr: u32, size: Size) -> Result<u32, Fault> {
        let mut val = 0;
        for i in 0..size.bytes() as u32 {
            val = (val << 8) | self.read(addr.wrapping_add(i), addr)? as u32;
        }
        Ok(val)
    }

    /// Make sure every byte of `[addr, addr + len)` is writable before touching any of them.
    fn check_write(&self, addr: u32, len: usize) -> Result<(), Fault> {
        if (addr as usize) < ROM_SIZE {
            return Err(Fault::MemoryProtection {
                addr,
                pc: self.instr_pc,
            });
        }
        if addr as u64 + len as u64 > MEMORY_END as u64 {
            return Err(self.out_of_range(addr));
        }
        Ok(())
    }

    /// Big-endian write of the low 1, 2 or 4 bytes of `val`.
    fn write_be(&mut self, addr: u32, size: Size, val: u32) -> Result<(), Fault> {
        self.check_write(addr, size.bytes())?;
        let start = addr as usize - ROM_SIZE;
        let bytes = val.to_be_bytes();
        self.ram[start..start + size.bytes()].copy_from_slice(&bytes[4 - size.bytes()..]);
        Ok(())
    }

    fn out_of_range(&self, addr: u32) -> Fault {
        Fault::AddressOutOfRange {
            addr,
            pc: self.instr_pc,
        }
    }

    fn div(&mut self) -> Result<(), Fault> {
        match self.reg[0].checked_div(self.reg[1]) {
            Some(val) => {
                self.reg[2] = val;
                Ok(())
            }
            None => Err(Fault::Arithmetic { pc: self.instr_pc }),
        }
    }

    fn load_imm(&mut self, record: Record) -> Result<(), Fault> {
        let size = self.width(record, Opcode::LoadImm)?;
        let dest = self.reg_index(record.dest)?;
        self.reg[dest] = record.source & size.mask();
        Ok(())
    }

    fn mov(&mut self, record: Record) -> Result<(), Fault> {
        let size = self.width(record, Opcode::Move)?;
        // Read everything first so a bad destination leaves memory untouched
        let val = self.read_be(record.source, size)?;
        self.write_be(record.dest, size, val)
    }

    fn load(&mut self, record: Record) -> Result<(), Fault> {
        let size = self.width(record, Opcode::Load)?;
        let dest = self.reg_index(record.dest)?;
        self.reg[dest] = self.read_be(record.source, size)?;
        Ok(())
    }

    fn store(&mut self, record: Record) -> Result<(), Fault> {
        let size = self.width(record, Opcode::Store)?;
        let src = self.reg_index(record.source)?;
        self.write_be(record.dest, size, self.reg[src])
    }

    fn swap(&mut self, record: Record) -> Result<(), Fault> {
        let reg = self.reg_index(record.dest)?;
        self.reg[reg] = self.reg[reg].rotate_left(16);
        Ok(())
    }

    fn exchange(&mut self, record: Record) -> Result<(), Fault> {
        let first = self.reg_index(record.source)?;
        let second = self.reg_index(record.dest)?;
        self.reg.swap(first, second);
        Ok(())
    }

    /// `op(source, dest) -> dest` over two registers.
    fn bitwise(&mut self, record: Record, op: impl Fn(u32, u32) -> u32) -> Result<(), Fault> {
        let src = self.reg_index(record.source)?;
        let dest = self.reg_index(record.dest)?;
        self.reg[dest] = op(self.reg[src], self.reg[dest]);
        Ok(())
    }

    /// Register-held target for size byte, literal target for constant longword.
    fn target(&self, record: Record, field: u32, opcode: Opcode) -> Result<u32, Fault> {
        let target = match Size::try_from(record.size) {
            Ok(Size::Byte) => self.reg[self.reg_index(field)?],
            Ok(Size::ConstLongword) => field,
            _ => {
                return Err(Fault::InvalidSize {
                    size: record.size,
                    mnemonic: opcode.mnemonic(),
                    pc: self.instr_pc,
                })
            }
        };
        if target % RECORD_LEN != 0 {
            return Err(Fault::MisalignedJump {
                target,
                pc: self.instr_pc,
            });
        }
        if target > MEMORY_END - RECORD_LEN {
            return Err(self.out_of_range(target));
        }
        Ok(target)
    }

    fn jump(&mut self, record: Record) -> Result<(), Fault> {
        self.pc = self.target(record, record.source, Opcode::Jump)?;
        Ok(())
    }

    fn jump_if(
        &mut self,
        record: Record,
        opcode: Opcode,
        cond: impl Fn(u32) -> bool,
    ) -> Result<(), Fault> {
        let reg = self.reg_index(record.source)?;
        // Not taken: falls through without looking at the target
        if cond(self.reg[reg]) {
            self.pc = self.target(record, record.dest, opcode)?;
        }
        Ok(())
    }

    fn dout(&mut self, record: Record) -> Result<(), Fault> {
        let reg = self.reg_index(record.dest)?;
        self.sink.emit(reg as u8, self.reg[reg]);
        Ok(())
    }
}
