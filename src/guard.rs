//! Confirmation gate for clicks on listings rated unsafe.

/// A click moving through the gate. Mirrors the parts of the host event the
/// gate is allowed to influence.
#[derive(Debug, Default)]
pub struct ClickEvent {
    default_prevented: bool,
    propagation_stopped: bool,
}

impl ClickEvent {
    /// A fresh, unhindered click.
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppresses the default navigation.
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    /// Stops the event from reaching outer handlers.
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    /// Whether default navigation was suppressed.
    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    /// Whether propagation was stopped.
    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}

/// Click behavior that existed before the gate was installed.
pub type ClickHandler = Box<dyn FnMut(&mut ClickEvent)>;

/// Host-provided warning dialog. Returns true when the user chooses to
/// proceed.
pub trait WarningPrompt {
    /// Shows `message` and reports the user's choice.
    fn confirm(&mut self, message: &str) -> bool;
}

/// Wraps a listing's click behavior behind a scam warning.
///
/// Cancel suppresses navigation and propagation; proceed delegates to the
/// prior handler, when one existed.
pub struct ClickGuard {
    message: String,
    prior: Option<ClickHandler>,
}

impl ClickGuard {
    /// Builds a guard summarizing `risk_factors` in its warning.
    pub fn new(risk_factors: &[String], prior: Option<ClickHandler>) -> Self {
        Self {
            message: warning_message(risk_factors),
            prior,
        }
    }

    /// The warning text shown on click.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Runs one click through the gate.
    pub fn handle(&mut self, prompt: &mut dyn WarningPrompt, event: &mut ClickEvent) {
        if !prompt.confirm(&self.message) {
            event.prevent_default();
            event.stop_propagation();
            return;
        }
        if let Some(prior) = self.prior.as_mut() {
            prior(event);
        }
    }
}

impl std::fmt::Debug for ClickGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickGuard")
            .field("message", &self.message)
            .field("wraps_prior", &self.prior.is_some())
            .finish()
    }
}

fn warning_message(risk_factors: &[String]) -> String {
    let factors = if risk_factors.is_empty() {
        "Multiple issues detected".to_string()
    } else {
        risk_factors.join(", ")
    };
    format!(
        "\u{26a0}\u{fe0f} MarketShield Warning \u{26a0}\u{fe0f}\n\n\
         This listing has been flagged as potentially unsafe.\n\
         Risk factors: {factors}\n\n\
         Do you want to continue viewing this listing?"
    )
}
