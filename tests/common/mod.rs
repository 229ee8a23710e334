#![allow(dead_code)]

use frozen_start::rt::{
    ArgRepr, BootConfig, BootFlags, EscapeDecoder, ExtensionTable, FrozenBlobs, FrozenTable,
    NativeArg, NativeArgv, Runtime, RuntimeError, TableError, WideDecoder, WideString,
};
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::rc::Rc;

pub static BOOTSTRAP_BLOB: [u8; 4] = [0xE3, 0, 0, 0];
pub static MAIN_BLOB: [u8; 3] = [0xE3, 1, 0];

pub const BLOBS: FrozenBlobs = FrozenBlobs {
    bootstrap: &BOOTSTRAP_BLOB,
    main: &MAIN_BLOB,
};

pub type Init = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Flags(BootFlags),
    Frozen(Vec<String>),
    AppendBuiltin(String, Init),
    ExtendBuiltins(Vec<(String, Init)>),
    ProgramName(String),
    Initialize,
    Argv(Vec<String>),
    ImportFrozen(String),
    SearchPath(Vec<String>),
    MainFile(String),
    EntryPoint(String, String),
    Finalize,
    PrintError,
}

/// Step at which the runtime double reports a failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Failure {
    InstallFrozen,
    AppendBuiltin,
    ExtendBuiltins,
    Initialize,
    ImportFrozen(&'static str),
    SearchPath,
    MainFile,
    EntryPoint,
}

pub type Log = Rc<RefCell<Vec<Event>>>;

/// Runtime double that records every call in order.
pub struct RecordingRuntime {
    log: Log,
    wide: bool,
    legacy: bool,
    decoder: Box<dyn WideDecoder>,
    fail: Option<Failure>,
}

impl RecordingRuntime {
    /// Wide-argument runtime with the escape decoder.
    pub fn wide() -> (Self, Log) {
        let log = Log::default();
        let rt = RecordingRuntime {
            log: log.clone(),
            wide: true,
            legacy: false,
            decoder: Box::new(EscapeDecoder),
            fail: None,
        };
        (rt, log)
    }

    /// Byte-argument runtime that imports its bootstrap module explicitly.
    pub fn legacy() -> (Self, Log) {
        let (mut rt, log) = Self::wide();
        rt.wide = false;
        rt.legacy = true;
        (rt, log)
    }

    pub fn with_decoder(mut self, decoder: impl WideDecoder + 'static) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    pub fn failing(mut self, failure: Failure) -> Self {
        self.fail = Some(failure);
        self
    }

    fn record(&self, event: Event) {
        self.log.borrow_mut().push(event);
    }

    fn fails(&self, failure: Failure) -> bool {
        self.fail == Some(failure)
    }

    fn outcome(&self, failure: Failure) -> Result<(), RuntimeError> {
        if self.fails(failure) {
            Err(RuntimeError)
        } else {
            Ok(())
        }
    }
}

pub fn lossy(arg: &NativeArg) -> String {
    match arg {
        NativeArg::Bytes(b) => b.to_string_lossy().into_owned(),
        NativeArg::Wide(w) => w.to_string_lossy(),
    }
}

fn text(s: &CStr) -> String {
    s.to_string_lossy().into_owned()
}

impl Runtime for RecordingRuntime {
    type Init = Init;

    fn bootstrap_module(&self) -> &'static CStr {
        if self.legacy {
            c"__bootstrap__"
        } else {
            c"_frozen_importlib"
        }
    }

    fn importer(&self) -> (&'static CStr, Init) {
        (c"frozen_importer", 0)
    }

    fn imports_bootstrap(&self) -> bool {
        self.legacy
    }

    fn arg_repr(&self) -> ArgRepr<'_> {
        if self.wide {
            ArgRepr::Wide(self.decoder.as_ref())
        } else {
            ArgRepr::Bytes
        }
    }

    fn set_flags(&mut self, flags: BootFlags) {
        self.record(Event::Flags(flags));
    }

    fn install_frozen(&mut self, table: FrozenTable) -> Result<(), TableError> {
        if self.fails(Failure::InstallFrozen) {
            return Err(TableError);
        }
        self.record(Event::Frozen(table.iter().map(|m| text(m.name)).collect()));
        Ok(())
    }

    fn append_builtin(&mut self, name: &'static CStr, init: Init) -> Result<(), TableError> {
        if self.fails(Failure::AppendBuiltin) {
            return Err(TableError);
        }
        self.record(Event::AppendBuiltin(text(name), init));
        Ok(())
    }

    fn extend_builtins(&mut self, table: &ExtensionTable<Init>) -> Result<(), TableError> {
        if self.fails(Failure::ExtendBuiltins) {
            return Err(TableError);
        }
        let entries = table
            .modules()
            .iter()
            .map(|m| (text(m.name), m.init))
            .collect();
        self.record(Event::ExtendBuiltins(entries));
        Ok(())
    }

    fn set_program_name(&mut self, program: &NativeArg) {
        self.record(Event::ProgramName(lossy(program)));
    }

    fn initialize(&mut self) -> Result<(), RuntimeError> {
        self.record(Event::Initialize);
        self.outcome(Failure::Initialize)
    }

    fn set_argv(&mut self, argv: &NativeArgv) -> Result<(), RuntimeError> {
        self.record(Event::Argv(argv.iter().map(lossy).collect()));
        Ok(())
    }

    fn import_frozen(&mut self, name: &CStr) -> Result<(), RuntimeError> {
        let name = text(name);
        let failed = matches!(self.fail, Some(Failure::ImportFrozen(n)) if n == name);
        self.record(Event::ImportFrozen(name));
        if failed {
            Err(RuntimeError)
        } else {
            Ok(())
        }
    }

    fn set_search_path(&mut self, path: &[&CStr]) -> Result<(), RuntimeError> {
        self.record(Event::SearchPath(path.iter().map(|p| text(p)).collect()));
        self.outcome(Failure::SearchPath)
    }

    fn set_main_file(&mut self, filename: &CStr) -> Result<(), RuntimeError> {
        self.record(Event::MainFile(text(filename)));
        self.outcome(Failure::MainFile)
    }

    fn run_entry_point(&mut self, module: &CStr, callable: &CStr) -> Result<(), RuntimeError> {
        self.record(Event::EntryPoint(text(module), text(callable)));
        self.outcome(Failure::EntryPoint)
    }

    fn finalize(&mut self) {
        self.record(Event::Finalize);
    }

    fn print_error(&mut self) {
        self.record(Event::PrintError);
    }
}

pub fn wide_program(path: &str) -> NativeArg {
    NativeArg::Wide(WideString::new(path).unwrap())
}

pub fn bytes_program(path: &str) -> NativeArg {
    NativeArg::Bytes(CString::new(path).unwrap())
}

pub fn config<'a>(program: NativeArg) -> BootConfig<'a, Init> {
    BootConfig::new(BLOBS, program, c":/main.py")
}

pub fn minimal_path() -> Vec<String> {
    vec![":/".into(), ":/stdlib".into(), ":/site-packages".into()]
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
