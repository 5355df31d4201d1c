// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Publishing boundary.
//!
//! The acquisition loop and control facade depend only on the three-method
//! capability surface in [`PublishBoundary`]: fire-and-forget publish,
//! latched publish (retained for late joiners, at most once per session
//! unless the session is rebuilt), and service advertisement.  The zenoh
//! implementation lives here; tests use [`RecordingBoundary`].

use log::{error, trace};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use zenoh::prelude::sync::*;
use zenoh::publication::Publisher;
use zenoh::queryable::Queryable;
use zenoh::sample::Sample;

/// Outcome of a control service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReply {
    pub status: i32,
    pub message: String,
}

impl ServiceReply {
    pub fn ok(message: impl Into<String>) -> ServiceReply {
        ServiceReply {
            status: 0,
            message: message.into(),
        }
    }

    pub fn error(status: i32, message: impl Into<String>) -> ServiceReply {
        ServiceReply {
            status,
            message: message.into(),
        }
    }
}

pub type ServiceHandler = Box<dyn Fn(&str) -> ServiceReply + Send + Sync>;

/// Minimal capability surface the core needs from a transport.
pub trait PublishBoundary: Send + Sync {
    /// Fire-and-forget publish of an encoded payload.
    fn publish(&self, name: &str, type_name: &'static str, payload: Vec<u8>);

    /// Publish and retain the payload for late joiners.
    fn publish_latched(&self, name: &str, type_name: &'static str, payload: Vec<u8>);

    /// Advertise a request/reply service.
    fn advertise_service(&self, name: &str, handler: ServiceHandler);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}

/// Zenoh transport implementation.
///
/// Publishers are declared lazily per artifact name and cached.  Latched
/// publishes keep the last value and answer queries on the same key so late
/// subscribers can recover it; services are plain queryables replying with a
/// JSON status document.
pub struct ZenohBoundary {
    session: Arc<zenoh::Session>,
    prefix: String,
    publishers: Mutex<HashMap<String, Publisher<'static>>>,
    latched: Arc<Mutex<HashMap<String, Value>>>,
    queryables: Mutex<Vec<Queryable<'static, ()>>>,
}

impl ZenohBoundary {
    pub fn new(session: Arc<zenoh::Session>, prefix: impl Into<String>) -> ZenohBoundary {
        ZenohBoundary {
            session,
            prefix: prefix.into(),
            publishers: Mutex::new(HashMap::new()),
            latched: Arc::new(Mutex::new(HashMap::new())),
            queryables: Mutex::new(Vec::new()),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }

    fn put(&self, key: &str, value: Value) {
        let mut publishers = lock(&self.publishers);

        if !publishers.contains_key(key) {
            let publisher = self
                .session
                .declare_publisher(key.to_string())
                .priority(Priority::DataHigh)
                .congestion_control(CongestionControl::Drop)
                .res_sync();
            match publisher {
                Ok(publisher) => {
                    publishers.insert(key.to_string(), publisher);
                }
                Err(err) => {
                    error!("failed to create publisher {}: {:?}", key, err);
                    return;
                }
            }
        }

        // Present by construction
        if let Some(publisher) = publishers.get(key) {
            match publisher.put(value).res_sync() {
                Ok(_) => trace!("{} message sent", key),
                Err(err) => error!("{} message error: {:?}", key, err),
            }
        }
    }
}

fn encoded(type_name: &'static str, payload: Vec<u8>) -> Value {
    Value::from(payload).encoding(Encoding::WithSuffix(
        KnownEncoding::AppOctetStream,
        type_name.into(),
    ))
}

impl PublishBoundary for ZenohBoundary {
    fn publish(&self, name: &str, type_name: &'static str, payload: Vec<u8>) {
        let key = self.key(name);
        self.put(&key, encoded(type_name, payload));
    }

    fn publish_latched(&self, name: &str, type_name: &'static str, payload: Vec<u8>) {
        let key = self.key(name);
        let value = encoded(type_name, payload);

        let first = {
            let mut latched = lock(&self.latched);
            latched.insert(key.clone(), value.clone()).is_none()
        };

        // One queryable per latched key replays the retained value to late
        // joiners.
        if first {
            let latched = self.latched.clone();
            let reply_key = key.clone();
            let queryable = self
                .session
                .declare_queryable(key.clone())
                .callback(move |query| {
                    let retained = lock(&latched).get(&reply_key).cloned();
                    if let Some(value) = retained {
                        if let Ok(key_expr) = KeyExpr::try_from(reply_key.clone()) {
                            if let Err(err) = query.reply(Ok(Sample::new(key_expr, value))).res_sync()
                            {
                                error!("{} latched reply error: {:?}", reply_key, err);
                            }
                        }
                    }
                })
                .res_sync();
            match queryable {
                Ok(queryable) => lock(&self.queryables).push(queryable),
                Err(err) => error!("failed to create latched queryable {}: {:?}", key, err),
            }
        }

        self.put(&key, value);
    }

    fn advertise_service(&self, name: &str, handler: ServiceHandler) {
        let key = self.key(name);
        let reply_key = key.clone();
        let queryable = self
            .session
            .declare_queryable(key.clone())
            .callback(move |query| {
                let request = query
                    .value()
                    .map(|value| String::from_utf8_lossy(&value.payload.contiguous()).into_owned())
                    .unwrap_or_default();

                let reply = handler(&request);
                let payload = serde_json::json!({
                    "status": reply.status,
                    "message": reply.message,
                })
                .to_string();

                if let Ok(key_expr) = KeyExpr::try_from(reply_key.clone()) {
                    let value =
                        Value::from(payload).encoding(KnownEncoding::AppJson.into());
                    if let Err(err) = query.reply(Ok(Sample::new(key_expr, value))).res_sync() {
                        error!("{} service reply error: {:?}", reply_key, err);
                    }
                }
            })
            .res_sync();

        match queryable {
            Ok(queryable) => lock(&self.queryables).push(queryable),
            Err(err) => error!("failed to advertise service {}: {:?}", key, err),
        }
    }
}

/// One recorded publish, for assertions in tests.
#[derive(Debug, Clone)]
pub struct PublishRecord {
    pub name: String,
    pub type_name: &'static str,
    pub latched: bool,
    pub payload: Vec<u8>,
}

/// In-memory boundary used by tests to observe the loop and call services
/// without a transport.
#[derive(Default)]
pub struct RecordingBoundary {
    records: Mutex<Vec<PublishRecord>>,
    services: Mutex<HashMap<String, ServiceHandler>>,
}

impl RecordingBoundary {
    pub fn new() -> RecordingBoundary {
        RecordingBoundary::default()
    }

    /// All publishes so far, in order.
    pub fn records(&self) -> Vec<PublishRecord> {
        lock(&self.records).clone()
    }

    /// Names of all publishes so far, in order.
    pub fn names(&self) -> Vec<String> {
        lock(&self.records)
            .iter()
            .map(|record| record.name.clone())
            .collect()
    }

    /// Invoke an advertised service as a remote caller would.
    pub fn call_service(&self, name: &str, request: &str) -> Option<ServiceReply> {
        let services = lock(&self.services);
        services.get(name).map(|handler| handler(request))
    }
}

impl PublishBoundary for RecordingBoundary {
    fn publish(&self, name: &str, type_name: &'static str, payload: Vec<u8>) {
        lock(&self.records).push(PublishRecord {
            name: name.to_string(),
            type_name,
            latched: false,
            payload,
        });
    }

    fn publish_latched(&self, name: &str, type_name: &'static str, payload: Vec<u8>) {
        lock(&self.records).push(PublishRecord {
            name: name.to_string(),
            type_name,
            latched: true,
            payload,
        });
    }

    fn advertise_service(&self, name: &str, handler: ServiceHandler) {
        lock(&self.services).insert(name.to_string(), handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_boundary_order() {
        let boundary = RecordingBoundary::new();
        boundary.publish_latched("unit_vectors", "sensor_msgs/msg/Image", vec![1]);
        boundary.publish("confidence", "sensor_msgs/msg/Image", vec![2]);
        boundary.publish("cloud", "sensor_msgs/msg/PointCloud2", vec![3]);

        assert_eq!(boundary.names(), vec!["unit_vectors", "confidence", "cloud"]);
        let records = boundary.records();
        assert!(records[0].latched);
        assert!(!records[1].latched);
    }

    #[test]
    fn test_recording_boundary_services() {
        let boundary = RecordingBoundary::new();
        boundary.advertise_service(
            "dump",
            Box::new(|_| ServiceReply::ok("{\"ports\":{}}")),
        );

        let reply = boundary.call_service("dump", "").unwrap();
        assert_eq!(reply.status, 0);
        assert!(boundary.call_service("missing", "").is_none());
    }
}
