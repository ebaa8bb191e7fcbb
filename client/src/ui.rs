use std::sync::atomic::{AtomicBool, Ordering};

/// Where the session reports: status text plus the on/off state of the
/// "request walls" control.
pub trait StatusSink: Send + Sync {
    fn status(&self, text: &str);
    fn set_request_enabled(&self, enabled: bool);
}

/// UI convenience: a request makes sense once both fields hold
/// something and the port is in range.
pub fn can_request(host: &str, port: &str) -> bool {
    !host.is_empty()
        && !port.is_empty()
        && port.parse::<u16>().map_or(false, |port| port != 0)
}

pub struct TermSink {
    term: console::Term,
    request_enabled: AtomicBool,
}

impl TermSink {
    pub fn new() -> Self {
        Self {
            term: console::Term::stdout(),
            request_enabled: AtomicBool::new(false),
        }
    }

    pub fn request_enabled(&self) -> bool {
        self.request_enabled.load(Ordering::SeqCst)
    }
}

impl StatusSink for TermSink {
    fn status(&self, text: &str) {
        let _ = self.term.write_line(text);
    }

    fn set_request_enabled(&self, enabled: bool) {
        self.request_enabled.store(enabled, Ordering::SeqCst);
    }
}
