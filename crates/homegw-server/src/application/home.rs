//! In-memory home domain: a map of device name → JSON state.
//!
//! This is the collaborator that gives the gateway something to serve.  It
//! answers `/res/devices...` requests and the `getdevices` / `setdevice`
//! channel commands, and every successful mutation is announced to all open
//! channels:
//!
//! ```text
//! {"msg":"devicechanged","name":"lamp","state":true}
//! ```
//!
//! Reads are open to every authenticated principal; writes need
//! [`AccessLevel::Control`] or higher.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use homegw_core::{AccessLevel, Principal, PushEvent};
use serde_json::{json, Map, Value};
use tracing::info;

use super::dispatch::{CommandError, CommandTable};
use super::registry::SessionRegistry;
use super::resources::{ResourceError, ResourceHandler, ResourceReply, ResourceRequest};

/// Name of the event broadcast after every device mutation.
pub const DEVICE_CHANGED: &str = "devicechanged";

/// Device states plus the registry used to announce changes.
#[derive(Debug)]
pub struct HomeState {
    devices: Mutex<BTreeMap<String, Value>>,
    registry: Arc<SessionRegistry>,
}

impl HomeState {
    /// Creates a home with the given devices.
    pub fn new<I, K>(registry: Arc<SessionRegistry>, devices: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            devices: Mutex::new(devices.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            registry,
        }
    }

    /// All devices as one JSON object.
    pub fn snapshot(&self) -> Value {
        let devices = self
            .devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Value::Object(devices.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Map<_, _>>())
    }

    /// Current state of one device.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    /// Replaces the state of an existing device and broadcasts the change.
    ///
    /// # Errors
    ///
    /// [`CommandError::Forbidden`] below `Control`, [`CommandError::NotFound`]
    /// for an unknown device.
    pub fn set(&self, principal: &Principal, name: &str, state: Value) -> Result<(), CommandError> {
        if !principal.allows(AccessLevel::Control) {
            return Err(CommandError::Forbidden);
        }
        let mut devices = self
            .devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let slot = devices
            .get_mut(name)
            .ok_or_else(|| CommandError::NotFound(name.to_string()))?;
        *slot = state.clone();
        info!("{} set {name} = {state}", principal.name);
        // Announced under the device lock: concurrent writers broadcast in
        // the order they stored.  `broadcast` only enqueues and never blocks.
        self.registry.broadcast(
            &PushEvent::new(DEVICE_CHANGED)
                .with("name", name)
                .with("state", state),
        );
        Ok(())
    }

    /// Registers `getdevices` and `setdevice` in `table`.
    pub fn register_commands(self: &Arc<Self>, table: &mut CommandTable) {
        let home = Arc::clone(self);
        table.register("getdevices", move |_ctx, response| {
            response.insert("devices", home.snapshot());
            Ok(())
        });

        let home = Arc::clone(self);
        table.register("setdevice", move |ctx, response| {
            let name = ctx
                .request
                .str_param("name")
                .ok_or(CommandError::InvalidArguments)?;
            let state = ctx
                .request
                .param("state")
                .cloned()
                .ok_or(CommandError::InvalidArguments)?;
            home.set(ctx.principal, name, state.clone())?;
            response.insert("name", name);
            response.insert("state", state);
            Ok(())
        });
    }
}

fn to_resource_error(e: CommandError) -> ResourceError {
    match e {
        CommandError::Forbidden => ResourceError::Forbidden,
        CommandError::NotFound(name) => ResourceError::NotFound(name),
        other => ResourceError::BadRequest(other.to_string()),
    }
}

#[async_trait]
impl ResourceHandler for HomeState {
    async fn handle(
        &self,
        principal: &Principal,
        request: ResourceRequest,
    ) -> Result<ResourceReply, ResourceError> {
        match (request.method.as_str(), request.segments().as_slice()) {
            ("GET", ["devices"]) => Ok(ResourceReply::json(&json!({ "devices": self.snapshot() }))),
            ("GET", ["devices", name]) => {
                let state = self
                    .get(name)
                    .ok_or_else(|| ResourceError::NotFound(request.path.clone()))?;
                Ok(ResourceReply::json(&json!({ "name": name, "state": state })))
            }
            ("PUT", ["devices", name]) => {
                let state: Value = serde_json::from_slice(&request.body)
                    .map_err(|e| ResourceError::BadRequest(e.to_string()))?;
                self.set(principal, name, state.clone())
                    .map_err(to_resource_error)?;
                Ok(ResourceReply::json(&json!({ "name": name, "state": state })))
            }
            (_, ["devices", ..]) => Err(ResourceError::MethodNotAllowed),
            _ => Err(ResourceError::NotFound(request.path.clone())),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::SessionHandle;
    use homegw_core::ChannelRequest;

    fn home() -> (Arc<HomeState>, Arc<SessionRegistry>) {
        let registry = Arc::new(SessionRegistry::new());
        let home = Arc::new(HomeState::new(
            Arc::clone(&registry),
            [("lamp", json!(false)), ("thermostat", json!(20))],
        ));
        (home, registry)
    }

    fn admin() -> Principal {
        Principal::new("admin", AccessLevel::Admin)
    }

    fn put(path: &str, body: &str) -> ResourceRequest {
        ResourceRequest {
            method: "PUT".to_string(),
            path: path.to_string(),
            query: None,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_set_updates_state_and_broadcasts() {
        // Arrange
        let (home, registry) = home();
        let (session, mut rx) = SessionHandle::new(admin(), "127.0.0.1:1".parse().unwrap());
        registry.register(&session);

        // Act
        home.set(&admin(), "lamp", json!(true)).unwrap();

        // Assert
        assert_eq!(home.get("lamp"), Some(json!(true)));
        let pushed: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(
            pushed,
            json!({"msg": "devicechanged", "name": "lamp", "state": true})
        );
    }

    #[test]
    fn test_concurrent_writers_broadcast_in_storage_order() {
        // Arrange
        let (home, registry) = home();
        let (session, mut rx) = SessionHandle::new(admin(), "127.0.0.1:1".parse().unwrap());
        registry.register(&session);

        // Act: eight writers race on one device
        std::thread::scope(|scope| {
            for writer in 0..8 {
                let home = &home;
                scope.spawn(move || {
                    for round in 0..50 {
                        home.set(&admin(), "thermostat", json!(writer * 100 + round))
                            .unwrap();
                    }
                });
            }
        });

        // Assert: the last announcement is the value that was kept
        let mut last = None;
        let mut count = 0;
        while let Ok(text) = rx.try_recv() {
            last = Some(serde_json::from_str::<Value>(&text).unwrap());
            count += 1;
        }
        assert_eq!(count, 400);
        assert_eq!(last.unwrap()["state"], home.get("thermostat").unwrap());
    }

    #[test]
    fn test_guest_cannot_write() {
        let (home, _registry) = home();
        let guest = Principal::new("g", AccessLevel::Guest);
        assert_eq!(
            home.set(&guest, "lamp", json!(true)),
            Err(CommandError::Forbidden)
        );
        assert_eq!(home.get("lamp"), Some(json!(false)));
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let (home, _registry) = home();
        assert_eq!(
            home.set(&admin(), "toaster", json!(1)),
            Err(CommandError::NotFound("toaster".to_string()))
        );
    }

    #[test]
    fn test_setdevice_command_without_state_is_invalid_arguments() {
        // Arrange
        let (home, _registry) = home();
        let mut table = CommandTable::new();
        home.register_commands(&mut table);
        let (session, _rx) = SessionHandle::new(admin(), "127.0.0.1:1".parse().unwrap());
        let req = ChannelRequest::parse(r#"{"msgid":5,"msg":"setdevice","name":"lamp"}"#).unwrap();

        // Act
        let resp = table.dispatch(session.principal(), &req, &session);

        // Assert
        assert_eq!(
            resp.to_json(),
            json!({"msgid": 5, "msg": "nack", "error": "invalid arguments"})
        );
    }

    #[test]
    fn test_getdevices_command_lists_devices() {
        let (home, _registry) = home();
        let mut table = CommandTable::new();
        home.register_commands(&mut table);
        let (session, _rx) = SessionHandle::new(admin(), "127.0.0.1:1".parse().unwrap());
        let req = ChannelRequest::parse(r#"{"msgid":6,"msg":"getdevices"}"#).unwrap();

        let json = table.dispatch(session.principal(), &req, &session).to_json();

        assert_eq!(json["devices"]["thermostat"], 20);
    }

    #[tokio::test]
    async fn test_put_resource_sets_device() {
        let (home, _registry) = home();

        let reply = home.handle(&admin(), put("devices/lamp", "true")).await.unwrap();

        assert_eq!(reply.status, 200);
        assert_eq!(home.get("lamp"), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_put_resource_with_invalid_json_is_bad_request() {
        let (home, _registry) = home();
        let result = home.handle(&admin(), put("devices/lamp", "{not json")).await;
        assert!(matches!(result, Err(ResourceError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_delete_is_method_not_allowed() {
        let (home, _registry) = home();
        let mut req = put("devices/lamp", "");
        req.method = "DELETE".to_string();
        assert_eq!(
            home.handle(&admin(), req).await,
            Err(ResourceError::MethodNotAllowed)
        );
    }
}
