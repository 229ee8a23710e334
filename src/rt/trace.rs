use std::sync::OnceLock;

pub const TRACE_ENV: &str = "FROZEN_START_TRACE";

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

#[inline]
pub fn enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();

    *ENABLED.get_or_init(|| env_bool(TRACE_ENV, false))
}

macro_rules! boot_trace {
    ($($arg:tt)*) => {
        if $crate::rt::trace::enabled() {
            eprintln!("frozen-start: {}", format_args!($($arg)*));
        }
    };
}
