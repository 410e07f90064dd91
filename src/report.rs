//! Fixed-format result lines.
//!
//! Every invocation ends with exactly one status line: `INFO: <action>: OK`
//! on stdout or `ERROR: <action>: FAILED - <reason>` on stderr, so scripts
//! can grep for the outcome regardless of what else was printed.

pub struct Reporter {
    debug_enabled: bool,
}

impl Reporter {
    pub fn new(debug_enabled: bool) -> Self {
        Self { debug_enabled }
    }

    pub fn info(&self, action: &str, details: Option<&str>) {
        match details {
            Some(details) => println!("INFO: {action}: OK - {details}"),
            None => println!("INFO: {action}: OK"),
        }
    }

    pub fn error(&self, action: &str, reason: &str) {
        eprintln!("ERROR: {action}: FAILED - {reason}");
    }

    pub fn debug(&self, message: &str) {
        if self.debug_enabled {
            eprintln!("DEBUG: {message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reporter_respects_debug_flag() {
        // output goes to the real streams; this only checks construction
        let quiet = Reporter::new(false);
        let loud = Reporter::new(true);
        assert!(!quiet.debug_enabled);
        assert!(loud.debug_enabled);
    }
}
