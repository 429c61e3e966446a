use std::cell::RefCell;

use colored::{ColoredString, Colorize};

use crate::isa::REGISTER_COUNT;
use crate::runtime::{DebugSink, RunState};

/// Print a trace line to stderr. Suppressed entirely with `--minimal`.
#[macro_export]
macro_rules! tprintln {
    ( $fmt:literal $($tt:tt)* ) => {{
        let s = format!(
            concat!($fmt, "\n")
            $($tt)*
        );
        $crate::output::Output::Trace.print_str(&s);
    }};
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Output {
    /// Program output on stdout
    Normal,
    /// Execution trace on stderr
    Trace,
}

impl Output {
    thread_local! {
        static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
    }

    pub fn set_minimal(new_value: bool) -> bool {
        Self::IS_MINIMAL.with(|value| value.replace(new_value))
    }
    pub fn is_minimal() -> bool {
        Self::IS_MINIMAL.with(|value| *value.borrow())
    }

    pub fn print_str(&self, string: &str) {
        match self {
            Self::Normal => {
                // Program output keeps its colour, even if `--minimal`
                print!("{}", string);
            }
            Self::Trace => {
                if !Self::is_minimal() {
                    eprint!("{}", ColoredString::from(string).blue());
                }
            }
        }
    }

    /// Register file, program counter and step count of a machine.
    pub fn print_registers<S: DebugSink>(&self, state: &RunState<S>) {
        if Self::is_minimal() {
            for (i, value) in state.registers().iter().enumerate() {
                self.print_str(&format!("R{} {}\n", i, value));
            }
            self.print_str(&format!("PC {}\n", state.pc()));
            return;
        }

        self.print_str("\x1b[2m┌──────────────────────────────────┐\x1b[0m\n");
        self.print_str("\x1b[2m│        \x1b[3mhex             uint\x1b[0m\x1b[2m     │\x1b[0m\n");
        for i in 0..REGISTER_COUNT {
            self.print_str("\x1b[2m│\x1b[0m");
            self.print_str(&format!(" \x1b[1m{:<5}\x1b[0m ", format!("R{i}")));
            self.print_integer(state.reg(i));
            self.print_str(" \x1b[2m│\x1b[0m\n");
        }
        self.print_str("\x1b[2m│\x1b[0m");
        self.print_str(&format!(" \x1b[1mPC\x1b[0m    0x{:08x}", state.pc()));
        self.print_str(&format!(" \x1b[1mN\x1b[0m {:>12}", state.steps()));
        self.print_str(" \x1b[2m│\x1b[0m\n");
        self.print_str("\x1b[2m└──────────────────────────────────┘\x1b[0m\n");
    }

    pub fn print_integer(&self, value: u32) {
        if Self::is_minimal() {
            self.print_str(&format!("{}", value));
            return;
        }
        self.print_str(&format!("0x{:08x}  ", value));
        self.print_str(&format!("{:>10}    ", value));
    }
}
