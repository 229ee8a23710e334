#[macro_use]
mod trace;

mod args;
mod boot;
mod buffers;
mod entry;
mod frozen;
mod path;

#[cfg(feature = "cpython")]
pub mod cpython;

pub use args::{
    escape_byte, host_decoder, transcode, transcode_native, unescape, unescape_unit, ArgRepr,
    EscapeDecoder, NativeArg, NativeArgv, WideChar, WideDecoder, WideString,
};
#[cfg(any(unix, windows))]
pub use args::{LocaleDecoder, LocaleOverride};
pub use boot::{boot, start, BootConfig, FrozenBlobs, HostArgs, MainTarget};
pub use buffers::retain_argv;
pub use entry::{collect_args, collect_path};
#[cfg(feature = "cpython")]
pub use entry::frozen_start;
pub use frozen::{ExtensionModule, ExtensionTable, FrozenModule, FrozenTable, MAIN_MODULE};
pub use path::{search_path, MINIMAL_PATH};

use std::ffi::CStr;
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BootFlags {
    pub frozen_imports: bool,
    pub no_site: bool,
    // Hosts without a locale subsystem.
    pub utf8_filesystem: bool,
}

impl BootFlags {
    pub const fn for_host() -> Self {
        BootFlags {
            frozen_imports: true,
            no_site: true,
            utf8_filesystem: cfg!(target_os = "android"),
        }
    }
}

/// The embedded runtime holds an error pending; see [`Runtime::print_error`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RuntimeError;

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("runtime error pending")
    }
}

impl std::error::Error for RuntimeError {}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TableError;

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("module-initialisation table rejected the entries")
    }
}

impl std::error::Error for TableError {}

/// Fatal bootstrap failure. Every variant ends the process with exit code 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootError {
    Alloc { what: String },
    /// Host argument `index` has no native representation.
    Convert { index: usize },
    /// The program path does not match the runtime's argument representation.
    ProgramRepr,
    DuplicateFrozen { name: String },
    InstallFrozen,
    AppendBuiltin,
    ExtendBuiltin,
    /// Reported through [`Runtime::print_error`], not through `Display`.
    Runtime,
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alloc { what } => write!(f, "allocation of {what} failed"),
            Self::Convert { index } => {
                write!(f, "Could not convert argument {index} to string")
            }
            Self::ProgramRepr => f.write_str(
                "program path does not match the runtime's argument representation",
            ),
            Self::DuplicateFrozen { name } => {
                write!(f, "frozen module {name} is listed twice")
            }
            Self::InstallFrozen => f.write_str("install frozen module table failed"),
            Self::AppendBuiltin => f.write_str("append builtin module table failed"),
            Self::ExtendBuiltin => f.write_str("extend builtin module table failed"),
            Self::Runtime => f.write_str("runtime error"),
        }
    }
}

impl std::error::Error for BootError {}

impl From<RuntimeError> for BootError {
    fn from(_: RuntimeError) -> Self {
        BootError::Runtime
    }
}

/// Handle on the embedded runtime's process-wide state.
///
/// There is one handle per process. [`start`] consumes it, so the bootstrap
/// sequence runs at most once against a given handle. Implementations may
/// keep raw pointers into the [`NativeArg`] values they are given: argument
/// buffers are retained until process exit.
pub trait Runtime {
    type Init: Copy;

    fn bootstrap_module(&self) -> &'static CStr;

    fn importer(&self) -> (&'static CStr, Self::Init);

    /// Whether the import machinery must be imported explicitly before the
    /// search path can be changed.
    fn imports_bootstrap(&self) -> bool;

    fn arg_repr(&self) -> ArgRepr<'_>;

    fn set_flags(&mut self, flags: BootFlags);

    fn install_frozen(&mut self, table: FrozenTable) -> Result<(), TableError>;

    fn append_builtin(&mut self, name: &'static CStr, init: Self::Init) -> Result<(), TableError>;

    fn extend_builtins(&mut self, table: &ExtensionTable<Self::Init>) -> Result<(), TableError>;

    fn set_program_name(&mut self, program: &NativeArg);

    fn initialize(&mut self) -> Result<(), RuntimeError>;

    fn set_argv(&mut self, argv: &NativeArgv) -> Result<(), RuntimeError>;

    fn import_frozen(&mut self, name: &CStr) -> Result<(), RuntimeError>;

    fn set_search_path(&mut self, path: &[&CStr]) -> Result<(), RuntimeError>;

    fn set_main_file(&mut self, filename: &CStr) -> Result<(), RuntimeError>;

    /// Imports `module` through the search path and calls `callable` with no arguments.
    fn run_entry_point(&mut self, module: &CStr, callable: &CStr) -> Result<(), RuntimeError>;

    fn finalize(&mut self);

    /// Prints the pending runtime error and its trace to stderr.
    fn print_error(&mut self);
}
