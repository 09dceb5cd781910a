//! Terminal rendering of the two screens.

use std::io::{BufRead, Stdin, StdinLock, Stdout, Write};

use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::warn;

use crate::error::Error;
use crate::navigation::{OnboardingOutcome, Screens};

/// Number of onboarding pages shown before "Get Started".
pub const ONBOARDING_PAGES: usize = 3;

/// Screens rendered as lines of text, with answers read from `input`.
#[derive(Debug)]
pub struct TerminalScreens<R, W> {
    input: R,
    output: W,
    assume_yes: bool,
}

impl TerminalScreens<StdinLock<'static>, Stdout> {
    /// Screens on the process's stdin and stdout.
    #[must_use]
    pub fn stdio(assume_yes: bool) -> Self {
        let stdin: Stdin = std::io::stdin();
        Self::new(stdin.lock(), std::io::stdout(), assume_yes)
    }
}

impl<R: BufRead, W: Write> TerminalScreens<R, W> {
    /// Create screens over arbitrary input and output.
    #[must_use]
    pub fn new(input: R, output: W, assume_yes: bool) -> Self {
        Self {
            input,
            output,
            assume_yes,
        }
    }

    /// Consume the screens, returning the output.
    #[must_use]
    pub fn into_output(self) -> W {
        self.output
    }

    fn say(&mut self, text: &str) {
        if let Err(e) = writeln!(self.output, "{text}").and_then(|()| self.output.flush()) {
            warn!(error = %e, "failed to write to terminal");
        }
    }

    /// Prompt and read one trimmed, lowercased answer; `None` on end of input.
    fn ask(&mut self, prompt: &str) -> Option<String> {
        if let Err(e) = write!(self.output, "{prompt} ").and_then(|()| self.output.flush()) {
            warn!(error = %e, "failed to write to terminal");
        }

        let mut answer = String::new();
        match read_answer(&mut self.input, &mut answer) {
            Ok(0) => None,
            Ok(_) => Some(answer.trim().to_lowercase()),
            Err(e) => {
                warn!(error = %e, "failed to read from terminal");
                None
            }
        }
    }
}

/// Read one line, moving off the async worker first when running on a
/// multi-threaded runtime so the user's think time does not stall it.
fn read_answer(input: &mut impl BufRead, answer: &mut String) -> std::io::Result<usize> {
    let multi_thread = Handle::try_current()
        .is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread);
    if multi_thread {
        tokio::task::block_in_place(|| input.read_line(answer))
    } else {
        input.read_line(answer)
    }
}

impl<R: BufRead, W: Write> Screens for TerminalScreens<R, W> {
    fn onboarding(&mut self) -> OnboardingOutcome {
        for page in 1..=ONBOARDING_PAGES {
            self.say(&format!("Onboarding Page {page}"));

            if self.assume_yes {
                continue;
            }
            if page < ONBOARDING_PAGES {
                match self.ask("[Enter] next, [q] quit:").as_deref() {
                    None | Some("q") => return OnboardingOutcome::Dismissed,
                    Some(_) => {}
                }
            }
        }

        if self.assume_yes {
            self.say("Get Started");
            return OnboardingOutcome::Completed;
        }

        match self.ask("Get Started? [Y/n]").as_deref() {
            None | Some("n" | "no" | "q") => OnboardingOutcome::Dismissed,
            Some(_) => OnboardingOutcome::Completed,
        }
    }

    fn home(&mut self) {
        self.say("Welcome to WAIOTECH");
        self.say("You're now in the main app!");
    }

    fn waiting(&mut self) {
        self.say("Starting...");
    }

    fn get_started_failed(&mut self, error: &Error) {
        self.say(&format!("Could not save your progress ({error}). Please try again."));
        // Retries are the user's call, never automatic.
        self.assume_yes = false;
    }
}
