use anyhow::Result;

/// Text generation capability used by entities to phrase their work.
///
/// Implementations may fail or time out; callers go through [`ask`], which
/// never propagates the failure.
pub trait Responder {
    fn respond(&mut self, prompt: &str, context: &str) -> Result<String>;
}

/// Outcome of one responder call.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    /// Error description when the responder failed.
    pub failure: Option<String>,
}

impl Reply {
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

pub fn fallback_response(role: &str) -> String {
    format!(
        "[Simulated response from {role}]: Based on the request, I would analyze the situation and provide strategic guidance."
    )
}

/// Ask the responder, degrading to the fallback text when it is absent and to an
/// in-band error marker when it fails.
pub fn ask(responder: Option<&mut dyn Responder>, role: &str, prompt: &str, context: &str) -> Reply {
    let Some(responder) = responder else {
        return Reply {
            text: fallback_response(role),
            failure: None,
        };
    };

    match responder.respond(prompt, context) {
        Ok(text) => Reply {
            text,
            failure: None,
        },
        Err(error) => {
            log::warn!("responder failed for {role}: {error:#}");
            Reply {
                text: format!("Error communicating with responder: {error}"),
                failure: Some(format!("{error:#}")),
            }
        }
    }
}

/// Deterministic responder that echoes the first line of the prompt.
#[derive(Debug, Clone, Default)]
pub struct EchoResponder {
    pub n_calls: usize,
}

impl Responder for EchoResponder {
    fn respond(&mut self, prompt: &str, _context: &str) -> Result<String> {
        self.n_calls += 1;
        let first_line = prompt.lines().map(str::trim).find(|line| !line.is_empty());
        Ok(format!("Acknowledged: {}", first_line.unwrap_or("(empty request)")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    struct Offline;

    impl Responder for Offline {
        fn respond(&mut self, _prompt: &str, _context: &str) -> Result<String> {
            bail!("connection timed out")
        }
    }

    #[test]
    fn absent_responder_uses_fallback() {
        let reply = ask(None, "CFO", "Review cash flow", "");
        assert_eq!(reply.text, fallback_response("CFO"));
        assert!(!reply.failed());
    }

    #[test]
    fn failing_responder_yields_error_marker() {
        let mut offline = Offline;
        let reply = ask(Some(&mut offline), "CTO", "Plan the sprint", "");
        assert!(reply.failed());
        assert!(reply.text.starts_with("Error communicating with responder"));
    }

    #[test]
    fn echo_responder_answers_first_line() {
        let mut echo = EchoResponder::default();
        let reply = ask(Some(&mut echo), "HR", "\n  Hire two engineers\nsoon", "");
        assert_eq!(reply.text, "Acknowledged: Hire two engineers");
        assert_eq!(echo.n_calls, 1);
    }
}
