// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! EdgeFirst ToF Camera Publisher Library
//!
//! This library implements a resilient acquisition session for a network
//! attached 3D/2D time-of-flight camera and republishes its output as
//! ROS-schema messages.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌───────────────┐     ┌─────────────────┐
//! │  SensorBackend   │ ──► │   Session     │ ──► │  DecodeBuffer   │
//! │  (HTTP + TCP)    │     │  (lifecycle)  │     │  (client-owned) │
//! └──────────────────┘     └───────┬───────┘     └────────┬────────┘
//!                                  │ one mutex            │
//!                   ┌──────────────┴───────┐              ▼
//!                   │                      │     ┌─────────────────┐
//!           ┌───────┴────────┐   ┌─────────┴───┐ │  msg builders   │
//!           │ ControlFacade  │   │ Acquisition │ │  Image / Cloud  │
//!           │ dump / config  │   │    Loop     │►│  / Extrinsics   │
//!           └────────────────┘   └─────────────┘ └────────┬────────┘
//!                                                         ▼
//!                                               ┌─────────────────┐
//!                                               │ PublishBoundary │
//!                                               │ (zenoh / test)  │
//!                                               └─────────────────┘
//! ```
//!
//! The session (camera handle + decode buffer) is exclusively owned behind
//! a single mutex shared by the acquisition loop and the control facade.
//! Frame pull and raw extraction happen under the lock; encoding and
//! publishing happen outside it.
//!
//! # Modules
//!
//! - [`formats`]: pixel-format tag to layout mapping
//! - [`frame`]: client-owned decode buffer
//! - [`pcic`]: chunk parsing for the data stream
//! - [`camera`]: sensor collaborator boundary (production and scripted)
//! - [`msg`]: raw buffer to ROS-schema message builders
//! - [`session`]: lock-guarded session lifecycle
//! - [`acquire`]: the resilience state machine
//! - [`publish`]: publishing capability surface (zenoh and recording)
//! - [`control`]: externally-invoked control operations
//! - [`args`]: CLI and environment configuration

pub mod acquire;
pub mod args;
pub mod camera;
pub mod control;
pub mod formats;
pub mod frame;
pub mod msg;
pub mod pcic;
pub mod publish;
pub mod session;
