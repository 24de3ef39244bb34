//! Saída de log do alocador
//!
//! O kmem não conhece a serial do kernel. Quem inicializa o alocador instala
//! um `LogSink` uma única vez; até lá, todos os logs são descartados.
//!
//! Sem `core::fmt`: apenas strings literais e valores em hexadecimal.

use spin::Once;

/// Destino dos bytes de log (serial, console, buffer de teste...)
pub trait LogSink: Sync {
    fn write_str(&self, s: &str);
}

static SINK: Once<&'static dyn LogSink> = Once::new();

/// Instala o destino de log.
///
/// Retorna `false` se outro sink já estava instalado (o primeiro vence).
pub fn install_sink(sink: &'static dyn LogSink) -> bool {
    let mut installed = false;
    SINK.call_once(|| {
        installed = true;
        sink
    });
    installed
}

/// Verifica se há um sink instalado
pub fn has_sink() -> bool {
    SINK.get().is_some()
}

#[inline]
pub fn emit_str(s: &str) {
    if let Some(sink) = SINK.get() {
        sink.write_str(s);
    }
}

#[inline]
pub fn emit_nl() {
    emit_str("\n");
}

/// Emite `value` como `0x` + 16 dígitos hexadecimais
pub fn emit_hex(value: u64) {
    if !has_sink() {
        return;
    }

    let mut buf = [0u8; 18];
    buf[0] = b'0';
    buf[1] = b'x';

    let mut i = 0usize;
    while i < 16 {
        let shift = (15 - i) * 4;
        buf[2 + i] = nibble_to_ascii(((value >> shift) & 0xF) as u8);
        i += 1;
    }

    // Sempre ASCII
    if let Ok(s) = core::str::from_utf8(&buf) {
        emit_str(s);
    }
}

#[inline(always)]
fn nibble_to_ascii(nibble: u8) -> u8 {
    match nibble {
        0..=9 => b'0' + nibble,
        _ => b'A' + (nibble - 10),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nibbles_map_to_uppercase_hex() {
        assert_eq!(nibble_to_ascii(0), b'0');
        assert_eq!(nibble_to_ascii(9), b'9');
        assert_eq!(nibble_to_ascii(10), b'A');
        assert_eq!(nibble_to_ascii(15), b'F');
    }
}
