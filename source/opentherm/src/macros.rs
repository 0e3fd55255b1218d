#![allow(unused_macros)]

#[cfg(feature = "defmt-logging")]
macro_rules! ot_log {
    (trace,   $($arg:expr),*) => { defmt::trace!($($arg),*) };
    (debug,   $($arg:expr),*) => { defmt::debug!($($arg),*) };
    (info,    $($arg:expr),*) => { defmt::info!($($arg),*) };
    (warn,    $($arg:expr),*) => { defmt::warn!($($arg),*) };
    (error,   $($arg:expr),*) => { defmt::error!($($arg),*) };
}

#[cfg(not(feature = "defmt-logging"))]
macro_rules! ot_log {
    ($level:ident, $($arg:expr),*) => {{ $( let _ = $arg; )* }}
}

macro_rules! ot_trace {
    ($($arg:expr),*) => (ot_log!(trace, $($arg),*));
}

macro_rules! ot_debug {
    ($($arg:expr),*) => (ot_log!(debug, $($arg),*));
}

macro_rules! ot_info {
    ($($arg:expr),*) => (ot_log!(info, $($arg),*));
}

macro_rules! ot_warn {
    ($($arg:expr),*) => (ot_log!(warn, $($arg),*));
}

macro_rules! ot_error {
    ($($arg:expr),*) => (ot_log!(error, $($arg),*));
}
