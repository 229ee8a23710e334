use crate::rt::args::{transcode, transcode_native, ArgRepr, NativeArg};
use crate::rt::buffers::retain_argv;
use crate::rt::frozen::{ExtensionTable, FrozenTable, MAIN_MODULE};
use crate::rt::path::search_path;
use crate::rt::{BootError, BootFlags, Runtime};
use std::ffi::{c_int, CStr};

/// Byte-code blobs produced by the freezing tool.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrozenBlobs {
    /// The import machinery.
    pub bootstrap: &'static [u8],
    /// The application's `__main__`.
    pub main: &'static [u8],
}

/// What runs once the runtime is up.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MainTarget<'a> {
    /// Import `__main__` from the frozen table.
    Frozen,
    /// Import `module` through the search path and call `callable`.
    EntryPoint {
        module: &'a CStr,
        callable: &'a CStr,
    },
}

/// Arguments as the host executable received them.
#[derive(Debug, Copy, Clone)]
pub enum HostArgs<'a> {
    /// Byte strings, transcoded to the runtime's representation.
    Bytes(&'a [&'a CStr]),
    /// Already in the runtime's representation.
    Native(&'a [NativeArg]),
}

impl<'a> From<&'a [&'a CStr]> for HostArgs<'a> {
    fn from(args: &'a [&'a CStr]) -> Self {
        HostArgs::Bytes(args)
    }
}

/// Everything the generated entry point hands to the bootstrapper.
#[derive(Debug)]
pub struct BootConfig<'a, I> {
    pub blobs: FrozenBlobs,
    /// Canonical program path; replaces argument 0.
    pub program: NativeArg,
    /// Value of `__main__.__file__`.
    pub main_filename: &'a CStr,
    pub extensions: Option<&'a ExtensionTable<I>>,
    /// Appended after the minimal search path.
    pub path: Option<&'a [&'a CStr]>,
    pub main: MainTarget<'a>,
}

impl<'a, I> BootConfig<'a, I> {
    pub fn new(blobs: FrozenBlobs, program: NativeArg, main_filename: &'a CStr) -> Self {
        BootConfig {
            blobs,
            program,
            main_filename,
            extensions: None,
            path: None,
            main: MainTarget::Frozen,
        }
    }

    pub fn with_extensions(mut self, extensions: &'a ExtensionTable<I>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    pub fn with_path(mut self, path: &'a [&'a CStr]) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_entry_point(mut self, module: &'a CStr, callable: &'a CStr) -> Self {
        self.main = MainTarget::EntryPoint { module, callable };
        self
    }
}

fn same_repr(repr: ArgRepr<'_>, program: &NativeArg) -> bool {
    matches!(
        (repr, program),
        (ArgRepr::Bytes, NativeArg::Bytes(_)) | (ArgRepr::Wide(_), NativeArg::Wide(_))
    )
}

/// Brings the runtime up, runs the application and shuts the runtime down.
///
/// Stops at the first failing step. Runtime-internal failures come back as
/// [`BootError::Runtime`] with the error still pending inside `rt`.
pub fn boot<R: Runtime>(
    rt: &mut R,
    args: HostArgs<'_>,
    config: &BootConfig<'_, R::Init>,
) -> Result<(), BootError> {
    boot_trace!("boot.flags");
    rt.set_flags(BootFlags::for_host());

    let table = FrozenTable::new(
        rt.bootstrap_module(),
        config.blobs.bootstrap,
        config.blobs.main,
    )?;
    boot_trace!("boot.frozen modules={}", table.len());
    rt.install_frozen(table)
        .map_err(|_| BootError::InstallFrozen)?;

    let (importer, init) = rt.importer();
    rt.append_builtin(importer, init)
        .map_err(|_| BootError::AppendBuiltin)?;

    if let Some(extensions) = config.extensions {
        boot_trace!("boot.extensions count={}", extensions.len());
        rt.extend_builtins(extensions)
            .map_err(|_| BootError::ExtendBuiltin)?;
    }

    let argv = match args {
        HostArgs::Bytes(args) => transcode(rt.arg_repr(), &config.program, args)?,
        HostArgs::Native(args) => {
            if !same_repr(rt.arg_repr(), &config.program) {
                return Err(BootError::ProgramRepr);
            }
            transcode_native(&config.program, args)?
        }
    };
    boot_trace!("boot.args argc={}", argv.len());
    let argv = retain_argv(argv)?;

    rt.set_program_name(argv.program());
    boot_trace!("runtime.init");
    rt.initialize()?;
    rt.set_argv(&argv)?;

    if rt.imports_bootstrap() {
        let bootstrap = rt.bootstrap_module();
        rt.import_frozen(bootstrap)?;
    }

    let path = search_path(config.path);
    boot_trace!("boot.path entries={}", path.len());
    rt.set_search_path(&path)?;

    rt.set_main_file(config.main_filename)?;

    match config.main {
        MainTarget::Frozen => {
            boot_trace!("boot.main frozen");
            rt.import_frozen(MAIN_MODULE)?;
        }
        MainTarget::EntryPoint { module, callable } => {
            boot_trace!(
                "boot.main entry={}:{}",
                module.to_string_lossy(),
                callable.to_string_lossy()
            );
            rt.run_entry_point(module, callable)?;
        }
    }

    boot_trace!("runtime.finalize");
    rt.finalize();

    Ok(())
}

/// Runs [`boot`] and maps the outcome to a process exit code.
///
/// Failures print exactly one diagnostic: runtime failures through
/// [`Runtime::print_error`], everything else as a line on stderr.
pub fn start<R: Runtime>(mut rt: R, args: HostArgs<'_>, config: &BootConfig<'_, R::Init>) -> c_int {
    match boot(&mut rt, args, config) {
        Ok(()) => 0,
        Err(BootError::Runtime) => {
            rt.print_error();
            1
        }
        Err(e) => {
            eprintln!("{e}");
            1
        }
    }
}
