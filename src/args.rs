// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::camera::{Mask, SessionConfig};
use crate::session::{LoopParams, TimeoutPreset};
use clap::Parser;
use serde_json::json;
use std::time::Duration;
use zenoh::config::{Config, ValidatedMap, WhatAmI};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Camera hostname or IP address.
    #[arg(env)]
    pub target: String,

    /// Camera configuration (control) port.
    #[arg(long, env, default_value = "80")]
    pub control_port: u16,

    /// Camera data stream port.
    #[arg(long, env, default_value = "50010")]
    pub data_port: u16,

    /// Camera password, empty if the device has none set.
    #[arg(long, env, default_value = "")]
    pub password: String,

    /// Artifact mask requested once the calibration phase completes.
    /// The default enables every image kind.
    #[arg(long, env, default_value = "2127")]
    pub schema_mask: u16,

    /// Frame wait timeout in milliseconds.
    #[arg(long, env, default_value = "500")]
    pub timeout_millis: u64,

    /// Wall-clock seconds without a frame before the stream is rebuilt.
    #[arg(long, env, default_value = "5.0")]
    pub timeout_tolerance_secs: f64,

    /// Assume frames are externally triggered; timeouts are then expected
    /// and not warned about.
    #[arg(long, env, default_value = "false")]
    pub assume_triggered: bool,

    /// Frame timeout preset applied when the data port transitions to RUN.
    #[arg(long, env, default_value = "500")]
    pub soft_on_timeout_millis: u64,

    /// Timeout tolerance preset applied when the data port transitions to
    /// RUN.
    #[arg(long, env, default_value = "5.0")]
    pub soft_on_timeout_tolerance_secs: f64,

    /// Frame timeout preset applied when the data port transitions to IDLE.
    #[arg(long, env, default_value = "500")]
    pub soft_off_timeout_millis: u64,

    /// Timeout tolerance preset applied when the data port transitions to
    /// IDLE.  The long default keeps an idled port from thrashing
    /// reinitialization.
    #[arg(long, env, default_value = "600.0")]
    pub soft_off_timeout_tolerance_secs: f64,

    /// Sensor/host clock difference in seconds beyond which artifact
    /// timestamps fall back to the host receive time.
    #[arg(long, env, default_value = "60.0")]
    pub frame_latency_thresh: f64,

    /// Base name for the published coordinate frames; artifacts use
    /// "<base>_link" and "<base>_optical_link".
    #[arg(long, env, default_value = "tof")]
    pub frame_id_base: String,

    /// camera base topic
    #[arg(long, env, default_value = "rt/tof")]
    pub topic: String,

    /// zenoh connection mode
    #[arg(long, env, default_value = "peer")]
    mode: WhatAmI,

    /// connect to zenoh endpoints
    #[arg(long, env)]
    connect: Vec<String>,

    /// listen to zenoh endpoints
    #[arg(long, env)]
    listen: Vec<String>,

    /// disable zenoh multicast scouting
    #[arg(long, env)]
    no_multicast_scouting: bool,
}

impl Args {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            camera_ip: self.target.clone(),
            control_port: self.control_port,
            data_port: self.data_port,
            password: self.password.clone(),
        }
    }

    pub fn loop_params(&self) -> LoopParams {
        LoopParams {
            timeout_millis: self.timeout_millis,
            timeout_tolerance_secs: self.timeout_tolerance_secs,
            assume_triggered: self.assume_triggered,
        }
    }

    pub fn on_preset(&self) -> TimeoutPreset {
        TimeoutPreset {
            timeout_millis: self.soft_on_timeout_millis,
            timeout_tolerance_secs: self.soft_on_timeout_tolerance_secs,
        }
    }

    pub fn idle_preset(&self) -> TimeoutPreset {
        TimeoutPreset {
            timeout_millis: self.soft_off_timeout_millis,
            timeout_tolerance_secs: self.soft_off_timeout_tolerance_secs,
        }
    }

    pub fn loop_options(&self) -> crate::acquire::LoopOptions {
        crate::acquire::LoopOptions {
            schema_mask: Mask(self.schema_mask),
            data_port: self.data_port,
            frame_id: format!("{}_link", self.frame_id_base),
            optical_frame_id: format!("{}_optical_link", self.frame_id_base),
            frame_latency_thresh: self.frame_latency_thresh,
            retry_interval: Duration::from_secs(1),
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let mut config = Config::default();

        config
            .insert_json5("mode", &json!(args.mode).to_string())
            .unwrap();

        if !args.connect.is_empty() {
            config
                .insert_json5("connect/endpoints", &json!(args.connect).to_string())
                .unwrap();
        }

        if !args.listen.is_empty() {
            config
                .insert_json5("listen/endpoints", &json!(args.listen).to_string())
                .unwrap();
        }

        if args.no_multicast_scouting {
            config
                .insert_json5("scouting/multicast/enabled", &json!(false).to_string())
                .unwrap();
        }

        config
    }
}
