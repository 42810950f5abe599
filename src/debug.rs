pub(crate) fn enabled() -> bool {
    std::env::var("IPMB_DEBUG")
        .map(|v| !v.is_empty() && v != "0")
        .unwrap_or(false)
}

pub(crate) fn dump_frame(bus: usize, direction: &str, bytes: &[u8]) {
    if !enabled() {
        return;
    }
    let out = format_frame(bus, direction, bytes);

    #[cfg(feature = "tracing")]
    tracing::trace!("{out}");

    #[cfg(not(feature = "tracing"))]
    eprintln!("{out}");
}

fn format_frame(bus: usize, direction: &str, bytes: &[u8]) -> String {
    let mut out = String::with_capacity(direction.len() + bytes.len() * 3 + 16);
    out.push_str("ipmb[");
    out.push_str(&bus.to_string());
    out.push_str("] ");
    out.push_str(direction);
    out.push_str(" (");
    out.push_str(&bytes.len().to_string());
    out.push_str("):");
    for b in bytes {
        out.push(' ');
        out.push_str(&format!("{b:02x}"));
    }
    out
}
