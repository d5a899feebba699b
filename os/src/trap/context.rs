/// User registers saved when a trap enters the kernel.
///
/// Only the MIPS registers the syscall and fault paths touch are kept:
///
/// - `v0`: syscall number on entry, return value or errno on exit
/// - `v1`: second return word
/// - `a0`..`a3`: arguments; `a3` is 0 on success and 1 on failure after a syscall
/// - `sp`, `ra`: stack pointer and return address
/// - `epc`: address of the trapping instruction
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub v0: u32,
    pub v1: u32,
    pub a0: u32,
    pub a1: u32,
    pub a2: u32,
    pub a3: u32,
    pub sp: u32,
    pub ra: u32,
    pub epc: u32,
}

impl TrapFrame {
    /// Initial frame of a freshly loaded program:
    /// `main(argc, argv)` at `entry` with the stack at `sp`.
    pub fn app_init_context(entry: u32, sp: u32, argc: u32, argv: u32) -> Self {
        Self {
            a0: argc,
            a1: argv,
            sp,
            epc: entry,
            ..Self::default()
        }
    }

    /// Step past the trapping `syscall` instruction.
    pub fn advance(&mut self) {
        self.epc = self.epc.wrapping_add(4);
    }
}
