use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

static TRACING: OnceCell<()> = OnceCell::new();

/// Installs the global fmt subscriber. `RUST_LOG` takes precedence over
/// `default_filter`. Returns whether this call did the installing.
pub fn init_tracing(default_filter: &str) -> bool {
    let mut installed = false;
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));
        let fmt_subscriber = fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(false)
            .finish();
        installed = tracing::subscriber::set_global_default(fmt_subscriber).is_ok();
    });
    installed
}

fn dump_line(buffer: &[u8], addr: usize, end: usize) -> (String, String) {
    let mut hex = String::new();
    let mut chars = String::new();
    for byte in buffer.iter().take(end + 1).skip(addr).take(16) {
        hex.push_str(&format!("{:02x} ", byte));
        let c = *byte as char;
        chars.push(if c.is_ascii_graphic() || c == ' ' {
            c
        } else {
            '.'
        });
    }
    (hex, chars)
}

/// Classic 16-bytes-per-line dump of `buffer[start..=end]`.
pub fn hexdump(buffer: &[u8], start: u16, end: u16) -> String {
    let mut str = String::new();
    let end = (end as usize).min(buffer.len().saturating_sub(1));
    let mut addr = start as usize;
    while addr <= end && addr < buffer.len() {
        let (hex, chars) = dump_line(buffer, addr, end);
        str.push_str(&format!("{:04x}: {:<48} {}\n", addr, hex, chars));
        addr += 16;
    }
    str
}

/// Like [`hexdump`], but runs of identical lines collapse into a single `*`.
pub fn partial_hexdump(buffer: &[u8], start: u16, end: u16) -> String {
    let mut str = String::new();
    let end = (end as usize).min(buffer.len().saturating_sub(1));
    let mut addr = start as usize;
    let mut previous: Option<String> = None;
    let mut skipping = false;

    while addr <= end && addr < buffer.len() {
        let (hex, chars) = dump_line(buffer, addr, end);
        if previous.as_deref() == Some(hex.as_str()) {
            if !skipping {
                str.push_str("*\n");
                skipping = true;
            }
        } else {
            str.push_str(&format!("{:04x}: {:<48} {}\n", addr, hex, chars));
            skipping = false;
        }
        previous = Some(hex);
        addr += 16;
    }
    str
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hexdump() {
        let buffer: Vec<u8> = (0..32).collect();
        let dump = hexdump(&buffer, 0, 31);

        assert_eq!(dump.lines().count(), 2);
        assert!(dump.starts_with("0000: 00 01 02"));
        assert!(dump.lines().nth(1).unwrap().starts_with("0010: 10 11"));
    }

    #[test]
    fn test_partial_hexdump_collapses_repeats() {
        let mut buffer = vec![0u8; 0x100];
        buffer[0x80] = b'A';
        let dump = partial_hexdump(&buffer, 0, 0xFF);

        assert_eq!(
            dump.lines().collect::<Vec<_>>().len(),
            5,
            "unexpected dump:\n{}",
            dump
        );
        assert!(dump.contains("0080: 41"));
    }

    #[test]
    fn test_end_is_clamped() {
        let buffer = vec![0xEAu8; 8];
        let dump = hexdump(&buffer, 0, 0xFFFF);

        assert_eq!(dump.lines().count(), 1);
    }
}
