use crate::{bridge::Client, error::PinError, models::PinStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableRequest {
    Disabled,
    NeedsPin,
}

/// Safe mode switch. Turning it on is always allowed; turning it off asks
/// the backend to verify the PIN when one is configured.
#[derive(Debug, Clone, Default)]
pub struct SafeModeGate {
    enabled: bool,
    pin_required: bool,
    prompt_open: bool,
    error: Option<PinError>,
}

impl SafeModeGate {
    pub fn new(enabled: bool, pin_required: bool) -> Self {
        Self {
            enabled,
            pin_required,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn prompt_open(&self) -> bool {
        self.prompt_open
    }

    /// Inline message for the PIN prompt.
    pub fn error(&self) -> Option<&PinError> {
        self.error.as_ref()
    }

    pub fn set_pin_required(&mut self, required: bool) {
        self.pin_required = required;
    }

    pub fn enable(&mut self) {
        self.enabled = true;
        self.close_prompt();
    }

    pub fn request_disable(&mut self) -> DisableRequest {
        if !self.enabled || !self.pin_required {
            self.enabled = false;
            return DisableRequest::Disabled;
        }
        self.prompt_open = true;
        self.error = None;
        DisableRequest::NeedsPin
    }

    /// Checks `pin` and leaves safe mode on success. Failures stay on the gate
    /// so the prompt can show them.
    pub fn submit_pin(&mut self, pin: &str, client: &Client) -> Result<(), PinError> {
        match check_pin(client, pin) {
            Ok(()) => {
                self.enabled = false;
                self.close_prompt();
                Ok(())
            }
            Err(err) => {
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }

    pub fn close_prompt(&mut self) {
        self.prompt_open = false;
        self.error = None;
    }
}

pub fn check_pin(client: &Client, pin: &str) -> Result<(), PinError> {
    let status = client
        .verify_pin(pin)
        .map_err(|err| PinError::Backend(err.to_string()))?;
    status_to_result(&status)
}

fn status_to_result(status: &PinStatus) -> Result<(), PinError> {
    if status.valid {
        return Ok(());
    }
    if status.locked_seconds > 0 {
        return Err(PinError::LockedOut {
            seconds: status.locked_seconds,
        });
    }
    Err(PinError::Invalid {
        attempts_remaining: status.attempts_remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::{client_with, ScriptedBridge};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn disabling_without_pin_is_immediate() {
        let mut gate = SafeModeGate::new(true, false);
        assert_eq!(gate.request_disable(), DisableRequest::Disabled);
        assert!(!gate.is_enabled());
        gate.enable();
        assert!(gate.is_enabled());
    }

    #[test]
    fn wrong_pin_keeps_safe_mode_on() {
        let bridge = Arc::new(ScriptedBridge::default());
        let client = client_with(&bridge);
        bridge.reply(
            "verify_pin",
            json!({ "valid": false, "attempts_remaining": 2, "locked_seconds": 0 }),
        );
        let mut gate = SafeModeGate::new(true, true);
        assert_eq!(gate.request_disable(), DisableRequest::NeedsPin);
        assert!(gate.prompt_open());

        let err = gate.submit_pin("0000", &client).unwrap_err();
        assert_eq!(err, PinError::Invalid { attempts_remaining: 2 });
        assert!(gate.is_enabled());
        assert!(gate.prompt_open());
        assert_eq!(
            gate.error().map(ToString::to_string).as_deref(),
            Some("Incorrect PIN. 2 attempt(s) remaining.")
        );
        assert_eq!(bridge.calls_to("verify_pin"), vec![json!({ "pin": "0000" })]);
    }

    #[test]
    fn lockout_is_reported_with_wait_time() {
        let bridge = Arc::new(ScriptedBridge::default());
        let client = client_with(&bridge);
        bridge.reply(
            "verify_pin",
            json!({ "valid": false, "attempts_remaining": 0, "locked_seconds": 290 }),
        );
        let mut gate = SafeModeGate::new(true, true);
        gate.request_disable();
        let err = gate.submit_pin("1111", &client).unwrap_err();
        assert_eq!(err.to_string(), "Too many attempts. Try again in 5 min.");
    }

    #[test]
    fn correct_pin_unlocks_and_closes_prompt() {
        let bridge = Arc::new(ScriptedBridge::default());
        let client = client_with(&bridge);
        bridge.reply("verify_pin", json!({ "valid": true }));
        let mut gate = SafeModeGate::new(true, true);
        gate.request_disable();
        gate.submit_pin("1234", &client).unwrap();
        assert!(!gate.is_enabled());
        assert!(!gate.prompt_open());
        assert!(gate.error().is_none());
    }

    #[test]
    fn backend_failure_surfaces_as_pin_error() {
        let bridge = Arc::new(ScriptedBridge::default());
        let client = client_with(&bridge);
        bridge.fail("verify_pin", "offline");
        let err = check_pin(&client, "1234").unwrap_err();
        assert!(matches!(err, PinError::Backend(_)));
    }
}
