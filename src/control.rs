// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Control facade for externally-invoked camera operations.
//!
//! Every operation takes the same session lock as the acquisition loop, so
//! a control call never overlaps a frame acquisition.  Operations always
//! return a [`ServiceReply`] status/message pair; collaborator failures are
//! reported by value and never unwind across this boundary.

use crate::publish::{PublishBoundary, ServiceReply};
use crate::session::{self, SharedSession};
use log::warn;

/// Collaborator failure that did not carry its own device code.
pub const STATUS_GENERIC_ERROR: i32 = -1;
/// Operation advertised for interface parity but not implemented.
pub const STATUS_NOT_IMPLEMENTED: i32 = -3;

/// Target state for a sensor port transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Idle,
    Run,
}

impl PortState {
    pub fn as_str(self) -> &'static str {
        match self {
            PortState::Idle => "IDLE",
            PortState::Run => "RUN",
        }
    }
}

#[derive(Clone)]
pub struct ControlFacade {
    session: SharedSession,
}

impl ControlFacade {
    pub fn new(session: SharedSession) -> ControlFacade {
        ControlFacade { session }
    }

    /// Serialize the device's current configuration.
    pub fn dump(&self) -> ServiceReply {
        let mut session = session::lock(&self.session);
        let control = match session.control() {
            Some(control) => control,
            None => return ServiceReply::error(STATUS_GENERIC_ERROR, "camera not initialized"),
        };

        match control.to_json() {
            Ok(doc) => ServiceReply::ok(doc.to_string()),
            Err(err) => {
                warn!("dump: {}", err);
                ServiceReply::error(err.code, err.message)
            }
        }
    }

    /// Validate and apply a configuration document.
    ///
    /// No rollback on partial failure: the device keeps whatever state the
    /// apply left it in, and the status/message report what went wrong.
    pub fn config(&self, document: &str) -> ServiceReply {
        let doc: serde_json::Value = match serde_json::from_str(document) {
            Ok(doc) => doc,
            Err(err) => {
                return ServiceReply::error(
                    STATUS_GENERIC_ERROR,
                    format!("invalid configuration document: {}", err),
                )
            }
        };

        let mut session = session::lock(&self.session);
        let control = match session.control() {
            Some(control) => control,
            None => return ServiceReply::error(STATUS_GENERIC_ERROR, "camera not initialized"),
        };

        match control.from_json(&doc) {
            Ok(()) => ServiceReply::ok("OK"),
            Err(err) => {
                warn!("config: {} - {}", err.code, err.message);
                ServiceReply::error(err.code, err.message)
            }
        }
    }

    /// Software trigger, advertised for parity with sibling drivers in the
    /// same device family.
    pub fn trigger(&self) -> ServiceReply {
        warn!("triggering a camera head is currently not implemented");
        ServiceReply::error(
            STATUS_NOT_IMPLEMENTED,
            "software trigger is currently not implemented",
        )
    }

    /// Transition the data port to RUN and apply the active timeout preset.
    pub fn soft_on(&self) -> ServiceReply {
        self.set_port_state(PortState::Run)
    }

    /// Transition the data port to IDLE and apply the idle timeout preset.
    pub fn soft_off(&self) -> ServiceReply {
        self.set_port_state(PortState::Idle)
    }

    /// Issue a minimal port-state document to the device.
    ///
    /// This stands in for a richer power-state model the hardware does not
    /// expose yet; the port identifier is derived from the configured data
    /// port.
    fn set_port_state(&self, state: PortState) -> ServiceReply {
        let mut session = session::lock(&self.session);

        let port_index = session.config().data_port % 50010;
        let doc = serde_json::json!({
            "ports": {
                format!("port{}", port_index): { "state": state.as_str() }
            }
        });

        match session.control() {
            Some(control) => {
                if let Err(err) = control.from_json(&doc) {
                    warn!("port state: {} - {}", err.code, err.message);
                    return ServiceReply::error(err.code, err.message);
                }
            }
            None => return ServiceReply::error(STATUS_GENERIC_ERROR, "camera not initialized"),
        }

        let preset = match state {
            PortState::Run => session.on_preset,
            PortState::Idle => session.idle_preset,
        };
        session.params.timeout_millis = preset.timeout_millis;
        session.params.timeout_tolerance_secs = preset.timeout_tolerance_secs;
        session.params.assume_triggered = false;

        ServiceReply::ok(doc.to_string())
    }

    /// Advertise every control operation on the publishing boundary.
    pub fn advertise(&self, boundary: &dyn PublishBoundary) {
        let facade = self.clone();
        boundary.advertise_service("dump", Box::new(move |_| facade.dump()));

        let facade = self.clone();
        boundary.advertise_service("config", Box::new(move |request| facade.config(request)));

        let facade = self.clone();
        boundary.advertise_service("trigger", Box::new(move |_| facade.trigger()));

        let facade = self.clone();
        boundary.advertise_service("soft_on", Box::new(move |_| facade.soft_on()));

        let facade = self.clone();
        boundary.advertise_service("soft_off", Box::new(move |_| facade.soft_off()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Mask, ScriptedBackend, SessionConfig};
    use crate::session::{LoopParams, Session, TimeoutPreset};

    fn shared_session(backend: ScriptedBackend) -> SharedSession {
        let config = SessionConfig {
            camera_ip: String::from("192.0.2.1"),
            control_port: 80,
            data_port: 50010,
            password: String::new(),
        };
        Session::new(
            Box::new(backend),
            config,
            LoopParams::default(),
            TimeoutPreset {
                timeout_millis: 500,
                timeout_tolerance_secs: 5.0,
            },
            TimeoutPreset {
                timeout_millis: 500,
                timeout_tolerance_secs: 600.0,
            },
        )
        .shared()
    }

    fn initialized_facade(backend: ScriptedBackend) -> ControlFacade {
        let session = shared_session(backend);
        assert!(session::lock(&session).initialize(Mask::all_images(), 50010));
        ControlFacade::new(session)
    }

    #[test]
    fn test_dump_returns_device_config() {
        let backend = ScriptedBackend::new();
        backend.state.lock().unwrap().config = serde_json::json!({"ports": {"port0": {}}});

        let facade = initialized_facade(backend);
        let reply = facade.dump();
        assert_eq!(reply.status, 0);
        assert!(reply.message.contains("port0"));
    }

    #[test]
    fn test_dump_uninitialized_session() {
        let facade = ControlFacade::new(shared_session(ScriptedBackend::new()));
        let reply = facade.dump();
        assert_eq!(reply.status, STATUS_GENERIC_ERROR);
    }

    #[test]
    fn test_config_applies_document() {
        let backend = ScriptedBackend::new();
        let facade = initialized_facade(backend.clone());

        let reply = facade.config("{\"ports\":{\"port0\":{\"mode\":\"standard\"}}}");
        assert_eq!(reply.status, 0);
        assert_eq!(reply.message, "OK");

        let state = backend.state.lock().unwrap();
        assert_eq!(state.applied.len(), 1);
        assert_eq!(state.applied[0]["ports"]["port0"]["mode"], "standard");
    }

    #[test]
    fn test_config_rejects_malformed_document() {
        let facade = initialized_facade(ScriptedBackend::new());
        let reply = facade.config("not json");
        assert_eq!(reply.status, STATUS_GENERIC_ERROR);
        assert!(reply.message.contains("invalid configuration document"));
    }

    #[test]
    fn test_config_propagates_device_code() {
        let backend = ScriptedBackend::new();
        let facade = initialized_facade(backend.clone());
        backend.state.lock().unwrap().control_failure = Some((104, "invalid parameter"));

        let reply = facade.config("{}");
        assert_eq!(reply.status, 104);
        assert_eq!(reply.message, "invalid parameter");
    }

    #[test]
    fn test_trigger_not_implemented() {
        let facade = initialized_facade(ScriptedBackend::new());
        let reply = facade.trigger();
        assert_eq!(reply.status, STATUS_NOT_IMPLEMENTED);
    }

    #[test]
    fn test_soft_off_issues_idle_and_applies_preset() {
        let backend = ScriptedBackend::new();
        let facade = initialized_facade(backend.clone());

        let reply = facade.soft_off();
        assert_eq!(reply.status, 0);
        assert!(reply.message.contains("IDLE"));

        let state = backend.state.lock().unwrap();
        assert_eq!(state.applied.last().unwrap()["ports"]["port0"]["state"], "IDLE");
    }

    #[test]
    fn test_port_state_resets_loop_params() {
        let backend = ScriptedBackend::new();
        let session = shared_session(backend);
        assert!(session::lock(&session).initialize(Mask::all_images(), 50010));
        let facade = ControlFacade::new(session.clone());

        session::lock(&session).params.assume_triggered = true;

        assert_eq!(facade.soft_off().status, 0);
        let params = session::lock(&session).params;
        assert!((params.timeout_tolerance_secs - 600.0).abs() < f64::EPSILON);
        assert!(!params.assume_triggered);

        assert_eq!(facade.soft_on().status, 0);
        let params = session::lock(&session).params;
        assert!((params.timeout_tolerance_secs - 5.0).abs() < f64::EPSILON);
    }
}
