//! Error numbers reported to callers and, through the syscall layer, to user programs.

use thiserror::Error;

/// Kernel error numbers.
///
/// The numeric values follow the POSIX/Linux assignments so a trap frame can
/// carry them back to user space unchanged. `EUNIMP` has no POSIX counterpart
/// and is reported with `ENOTSUP`'s number.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
pub enum Errno {
    /// No such file or directory (unknown program path).
    #[error("no such file or directory")]
    ENOENT,
    /// Argument list too long.
    #[error("argument list too long")]
    E2BIG,
    /// No such child process.
    #[error("no child process")]
    ECHILD,
    /// Out of memory.
    #[error("out of memory")]
    ENOMEM,
    /// Bad memory reference.
    #[error("bad memory reference")]
    EFAULT,
    /// Invalid argument.
    #[error("invalid argument")]
    EINVAL,
    /// Write to read-only memory.
    #[error("read-only memory")]
    EROFS,
    /// Function not implemented.
    #[error("function not implemented")]
    ENOSYS,
    /// Unimplemented feature.
    #[error("unimplemented feature")]
    EUNIMP,
}

impl Errno {
    /// Numeric value placed in `v0` when a syscall fails.
    pub fn code(self) -> i32 {
        match self {
            Errno::ENOENT => 2,
            Errno::E2BIG => 7,
            Errno::ECHILD => 10,
            Errno::ENOMEM => 12,
            Errno::EFAULT => 14,
            Errno::EINVAL => 22,
            Errno::EROFS => 30,
            Errno::ENOSYS => 38,
            Errno::EUNIMP => 95,
        }
    }
}

impl From<Errno> for i32 {
    fn from(e: Errno) -> Self {
        e.code()
    }
}
