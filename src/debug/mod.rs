//! Depuração e logging do alocador.

pub mod klog;
pub mod logging;

pub use klog::{install_sink, LogSink};
